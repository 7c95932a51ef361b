// SPDX-License-Identifier: EPL-2.0 OR GPL-2.0-or-later
// SPDX-FileCopyrightText: tapead contributors
// SPDX-FileContributor: 2026 tapead contributors
//
//! The function object: owns one recorded [crate::tape::Tape] plus the
//! Taylor-coefficient and sparsity caches its sweeps share across calls
//! (§5 "Taylor store and sparsity caches grow monotonically... owned
//! exclusively by the function object").
//!
//! Link to [parent module](super)
//!
//! Grounded on the `function::mod::{GADFun, ad_domain, ad_fun}`
//! free-function-returning-struct pattern; the domain/range evaluation,
//! Jacobian, and Hessian entry points here are this module's public
//! surface.

use crate::ad::AD;
use crate::record::sealed::ThisThreadRecorder;
use crate::record::stop;
use crate::scalar::Scalar;
use crate::sparsity::PackSetVec;
use crate::sweep::{forward, reverse, sparse, Operand};
use crate::tape::Tape;
use crate::taylor::TaylorStore;

/// A recorded tape plus the mutable caches its evaluations accumulate.
///
/// `forward`/`reverse` calls are stateful: `reverse` at order `p`
/// requires that `forward` has already populated Taylor coefficients up
/// through order `p - 1`, so callers must alternate
/// `forward(0, ..), forward(1, ..), ..., reverse(k, ..)` the same way a
/// CppAD-style `ADFun` does (§5 "Lifecycle").
pub struct AdFun<B> {
    tape: Tape<B>,
    taylor: TaylorStore<B>,
    array_owner: Vec<Vec<Operand<B>>>,
    /// Number of `Eq`/`Lt`/`Le` outcomes that disagreed with their
    /// recorded sign during the most recent order-0 [AdFun::forward]
    /// call; only maintained in debug builds (§9 "Open question": the
    /// teacher's own `compare_change` counter is likewise a debug-only
    /// diagnostic, never load-bearing in release code). See DESIGN.md.
    #[cfg(debug_assertions)]
    compare_change: usize,
}

impl<B: Scalar> AdFun<B> {
    /// Number of independent variables (§6 `domain`).
    pub fn domain(&self) -> usize {
        self.tape.num_domain()
    }

    /// Number of dependent variables (§6 `range`).
    pub fn range(&self) -> usize {
        self.tape.num_range()
    }

    /// Number of tape variables, including independents and every
    /// intermediate result (§6 `size_var`).
    pub fn size_var(&self) -> usize {
        self.tape.num_var()
    }

    /// Highest Taylor order currently cached for every variable (§6
    /// `taylor_size`).
    pub fn taylor_size(&self) -> usize {
        self.taylor.order_cur() + 1
    }

    /// Whether this tape recorded at least one on-tape array (§6
    /// `use_vec_tape`).
    pub fn use_vec_tape(&self) -> bool {
        self.tape.num_vec_array() > 0
    }

    /// True if dependent `i` is a parameter (its value never varies
    /// with the domain), per §6 `parameter`.
    pub fn parameter(&self, i: usize) -> bool {
        self.tape.dep_is_parameter(i)
    }

    /// Read access to the underlying tape, for callers (and tests) that
    /// need to inspect the recorded op sequence directly.
    pub fn tape(&self) -> &Tape<B> {
        &self.tape
    }

    /// Count of `Eq`/`Lt`/`Le` outcomes that disagreed with their
    /// recorded sign during the most recent order-0 [AdFun::forward]
    /// call (§6 `compare_change`, §4.3 "Branch consistency"). Always `0`
    /// in a release build.
    #[cfg(debug_assertions)]
    pub fn compare_change(&self) -> usize {
        self.compare_change
    }

    #[cfg(not(debug_assertions))]
    pub fn compare_change(&self) -> usize {
        0
    }

    /// Computes Taylor order `order` for every dependent, given the
    /// domain's order-`order` coefficients `u`. Requires that orders
    /// `0..order` were already computed by earlier `forward` calls on
    /// this same [AdFun] (§6 `forward`).
    pub fn forward(&mut self, order: usize, u: &[B]) -> Vec<B> {
        self.forward_trace(order, u, false)
    }

    /// Same as [AdFun::forward], additionally printing a trace of the
    /// sweep to stdout (§10.3 "Trace output").
    pub fn forward_trace(&mut self, order: usize, u: &[B], trace: bool) -> Vec<B> {
        let (y, mismatch) = forward::forward(&self.tape, &mut self.taylor, &mut self.array_owner, order, u, trace);
        #[cfg(debug_assertions)]
        if order == 0 {
            self.compare_change = mismatch;
        }
        #[cfg(not(debug_assertions))]
        let _ = mismatch;
        y
    }

    /// Accumulates domain adjoints at orders `0..order`, given dependent
    /// weights `w`; requires that [AdFun::forward] has already cached
    /// coefficients through order `order - 1` (§6 `reverse`).
    pub fn reverse(&self, order: usize, w: &[B]) -> Vec<B> {
        self.reverse_trace(order, w, false)
    }

    /// Same as [AdFun::reverse], additionally printing a trace of the
    /// sweep to stdout (§10.3 "Trace output").
    pub fn reverse_trace(&self, order: usize, w: &[B], trace: bool) -> Vec<B> {
        reverse::reverse(&self.tape, &self.taylor, order, w, trace)
    }

    /// Forward Jacobian sparsity: row `j` of `r` is the sparsity pattern
    /// already known for independent `j` (identity, for a first call);
    /// returns one row per dependent (§6 `for_sparse_jac`).
    pub fn for_sparse_jac(&self, q: usize, r: &PackSetVec) -> PackSetVec {
        sparse::for_sparse_jac(&self.tape, q, r)
    }

    /// Reverse Jacobian sparsity: row `i` of `s` is the sparsity pattern
    /// already known for dependent `i`; returns one row per independent
    /// (§6 `rev_sparse_jac`).
    pub fn rev_sparse_jac(&self, q: usize, s: &PackSetVec) -> PackSetVec {
        sparse::rev_sparse_jac(&self.tape, q, s)
    }

    /// Reverse Hessian sparsity for the linear combination of
    /// dependents selected by `s`, given the forward pattern `r` (§6
    /// `rev_sparse_hes`).
    pub fn rev_sparse_hes(&self, q: usize, r: &PackSetVec, s: &[bool]) -> PackSetVec {
        sparse::rev_sparse_hes(&self.tape, q, r, s)
    }

    /// Dependency pattern `{(i, j) : dependent i structurally depends on
    /// independent j}`, restricted to the selected independents/
    /// dependents (§4.7, §6 `sub_sparsity`).
    pub fn sub_sparsity(&self, select_domain: &[bool], select_range: &[bool], trace: bool) -> Vec<(usize, usize)> {
        crate::subgraph::dependency_pattern(&self.tape, select_domain, select_range, trace)
    }

    /// Drops the Taylor store's cached columns back to zero capacity
    /// (§5 "explicit shrink operations reset to zero capacity").
    pub fn shrink_taylor(&mut self) {
        self.taylor.shrink();
    }
}

/// Closes the recording opened by [crate::record::independent] and
/// returns the function object that owns the resulting tape (§6
/// `ad_fun`).
pub fn ad_fun<B>(dep: &[AD<B>]) -> AdFun<B>
where
    B: Scalar + ThisThreadRecorder,
{
    let tape = stop(dep);
    let n_var = tape.num_var();
    AdFun {
        tape,
        taylor: TaylorStore::new(n_var),
        array_owner: Vec::new(),
        #[cfg(debug_assertions)]
        compare_change: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::independent;

    #[test]
    fn domain_range_and_size_var_match_the_recording() {
        let ax = independent::<f64>(&[1.0, 2.0, 3.0]);
        let ay = vec![ax[0] + ax[1], ax[1] * ax[2]];
        let f = ad_fun(&ay);
        assert_eq!(f.domain(), 3);
        assert_eq!(f.range(), 2);
        assert!(f.size_var() >= 6);
        assert!(!f.use_vec_tape());
    }

    #[test]
    fn forward_zero_reproduces_recorded_values() {
        let ax = independent::<f64>(&[2.0, 5.0]);
        let ay = vec![ax[0] * ax[1] + ax[0].sin()];
        let mut f = ad_fun(&ay);
        let y = f.forward(0, &[2.0, 5.0]);
        assert_eq!(y.len(), 1);
        assert!((y[0] - (2.0 * 5.0 + 2.0f64.sin())).abs() < 1e-12);
    }

    #[test]
    fn reverse_order_one_matches_known_gradient() {
        let ax = independent::<f64>(&[3.0, 4.0]);
        let ay = vec![ax[0] * ax[1]];
        let mut f = ad_fun(&ay);
        let _ = f.forward(0, &[3.0, 4.0]);
        let dx = f.reverse(1, &[1.0]);
        assert_eq!(dx, vec![4.0, 3.0]);
    }

    #[test]
    fn parameter_dependent_is_reported() {
        let ax = independent::<f64>(&[1.0]);
        let ay = vec![AD::from(9.0f64), ax[0]];
        let f = ad_fun(&ay);
        assert!(f.parameter(0));
        assert!(!f.parameter(1));
    }

    #[test]
    fn shrink_taylor_drops_cached_higher_orders() {
        let ax = independent::<f64>(&[1.0]);
        let ay = vec![ax[0] * ax[0]];
        let mut f = ad_fun(&ay);
        let _ = f.forward(0, &[1.0]);
        let _ = f.forward(1, &[1.0]);
        assert_eq!(f.taylor_size(), 2);
        f.shrink_taylor();
        assert_eq!(f.taylor_size(), 1);
    }
}
