// SPDX-License-Identifier: EPL-2.0 OR GPL-2.0-or-later
// SPDX-FileCopyrightText: tapead contributors
// SPDX-FileContributor: 2026 tapead contributors
//
//! The atomic-function hook: the sole approved external collaborator
//! for the sweep engines (§4.4 "Atomic-call boundaries").
//!
//! Link to [parent module](super)
//!
//! A `User...User` bracket on the tape names one atomic function, by
//! index into the tape's atomic-function registry, and brackets the
//! `UsrAp`/`UsrAv` argument markers and `UsrRp`/`UsrRv` result markers
//! that describe its call signature. The sweeps never look inside the
//! call; they marshal Taylor coefficients (or sparsity rows) in and out
//! through this trait, exactly as §6 "Atomic function hook" specifies.

use crate::ad::{arg_slot, AD};
use crate::index::IndexT;
use crate::op::{ArgKind, OpId};
use crate::record::sealed::ThisThreadRecorder;
use crate::record::{current_tape_id, is_recording, push_atomic, push_op};
use crate::scalar::Scalar;
use crate::sparsity::PackSetVec;

/// An externally supplied function the tape treats as opaque.
///
/// `n_in`/`n_out` are the call's argument/result counts, fixed when the
/// call is recorded; every method receives Taylor coefficients (or
/// sparsity rows) shaped by those counts.
pub trait AtomicFunction<B> {
    fn n_in(&self) -> usize;
    fn n_out(&self) -> usize;

    /// `tx` holds `n_in * (order + 1)` Taylor coefficients (variable
    /// major, then order); `ty` receives `n_out * (order + 1)`.
    fn forward(&self, order: usize, tx: &[B], ty: &mut [B]) -> bool;

    /// `tx`/`ty` are the same shape as in [AtomicFunction::forward] and
    /// hold the forward coefficients already computed for this call;
    /// `py` holds the partials of the result variables and `px`
    /// receives the partials of the argument variables.
    fn reverse(&self, order: usize, tx: &[B], ty: &[B], py: &[B], px: &mut [B]) -> bool;

    /// Propagates an independent-reachability sparsity row per argument
    /// (`pattern_x`, `n_in` rows) forward to one row per result
    /// (`pattern_y`, `n_out` rows).
    fn for_sparse_jac(&self, pattern_x: &PackSetVec, pattern_y: &mut PackSetVec);

    /// Propagates a dependent-reachability sparsity row per result
    /// (`pattern_y`, `n_out` rows) back to one row per argument
    /// (`pattern_x`, `n_in` rows).
    fn rev_sparse_jac(&self, pattern_y: &PackSetVec, pattern_x: &mut PackSetVec);

    /// Propagates a Hessian sparsity row per result back to one row per
    /// argument, folding in the pairwise-product rule for this call's
    /// own nonlinearity.
    fn rev_sparse_hes(
        &self,
        for_jac_x: &PackSetVec,
        rev_jac_y: &PackSetVec,
        pattern_y: &PackSetVec,
        pattern_x: &mut PackSetVec,
    );
}

/// Calls an atomic function, recording a `User...User` bracket around
/// one `UsrAv`/`UsrAp` marker per argument and one `UsrRv`/`UsrRp`
/// marker per result (§4.4 "Atomic-call boundaries").
///
/// When every argument is a constant the call is folded eagerly by
/// invoking [AtomicFunction::forward] at order 0 and returning plain
/// [crate::ad::ADRepr::Constant] results, the same shortcut
/// [crate::ad] takes for ordinary binary/unary ops -- the tape records
/// no call at all in that case.
pub fn call_atomic<B>(atom: Box<dyn AtomicFunction<B>>, args: &[AD<B>]) -> Vec<AD<B>>
where
    B: Scalar + ThisThreadRecorder,
{
    let n_in = atom.n_in();
    let n_out = atom.n_out();
    assert_eq!(args.len(), n_in, "call_atomic: argument count does not match n_in");
    let tx: Vec<B> = args.iter().map(AD::value).collect();
    let mut ty = vec![B::zero(); n_out];
    let ok = atom.forward(0, &tx, &mut ty);
    assert!(ok, "call_atomic: forward(order=0) failed");

    if !is_recording::<B>() || args.iter().all(|a| !a.is_variable()) {
        return ty.into_iter().map(AD::from).collect();
    }

    let atom_id = push_atomic::<B>(atom);
    let tape_id = current_tape_id::<B>().unwrap();
    let bracket_args: &[(IndexT, ArgKind)] =
        &[(atom_id, ArgKind::Par), (n_in as IndexT, ArgKind::Par), (n_out as IndexT, ArgKind::Par)];
    push_op::<B>(OpId::User, bracket_args);
    for a in args {
        let (idx, kind) = arg_slot(a);
        let marker = if kind == ArgKind::Var { OpId::UsrAv } else { OpId::UsrAp };
        push_op::<B>(marker, &[(idx, kind)]);
    }
    let mut result = Vec::with_capacity(n_out);
    for &value in &ty {
        let res = push_op::<B>(OpId::UsrRv, &[]);
        result.push(AD::variable(tape_id, res, value));
    }
    push_op::<B>(OpId::User, bracket_args);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{independent, stop};

    struct Square;

    impl AtomicFunction<f64> for Square {
        fn n_in(&self) -> usize {
            1
        }
        fn n_out(&self) -> usize {
            1
        }
        fn forward(&self, order: usize, tx: &[f64], ty: &mut [f64]) -> bool {
            if order != 0 {
                return false;
            }
            ty[0] = tx[0] * tx[0];
            true
        }
        fn reverse(&self, order: usize, tx: &[f64], _ty: &[f64], py: &[f64], px: &mut [f64]) -> bool {
            if order != 0 {
                return false;
            }
            px[0] = 2.0 * tx[0] * py[0];
            true
        }
        fn for_sparse_jac(&self, pattern_x: &PackSetVec, pattern_y: &mut PackSetVec) {
            pattern_y.union_into(0, pattern_x, 0);
        }
        fn rev_sparse_jac(&self, pattern_y: &PackSetVec, pattern_x: &mut PackSetVec) {
            pattern_x.union_into(0, pattern_y, 0);
        }
        fn rev_sparse_hes(
            &self,
            _for_jac_x: &PackSetVec,
            rev_jac_y: &PackSetVec,
            _pattern_y: &PackSetVec,
            pattern_x: &mut PackSetVec,
        ) {
            pattern_x.union_into(0, rev_jac_y, 0);
        }
    }

    #[test]
    fn constant_arguments_fold_without_touching_the_tape() {
        let y = call_atomic(Box::new(Square), &[AD::from(3.0f64)]);
        assert_eq!(y.len(), 1);
        assert_eq!(y[0].value(), 9.0);
        assert!(!y[0].is_variable());
    }

    #[test]
    fn variable_argument_records_a_user_bracket() {
        let ax = independent::<f64>(&[3.0]);
        let y = call_atomic(Box::new(Square), &[ax[0]]);
        assert_eq!(y[0].value(), 9.0);
        assert!(y[0].is_variable());
        let tape = stop(&y);
        assert_eq!(tape.ops[2], OpId::User);
        assert_eq!(tape.ops.iter().filter(|&&op| op == OpId::User).count(), 2);
    }
}
