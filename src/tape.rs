// SPDX-License-Identifier: EPL-2.0 OR GPL-2.0-or-later
// SPDX-FileCopyrightText: tapead contributors
// SPDX-FileContributor: 2026 tapead contributors
//
//! The immutable tape (operation sequence) and its player interface.
//!
//! Link to [parent module](super)
//!
//! A [Tape] is built exactly once by [crate::record]'s recording
//! window and is immutable for the rest of its life (§5 "Lifecycle").
//! It owns the opcode sequence, the flattened argument-slot array, the
//! parameter pool, and the independent/dependent address lists.

use crate::atomic::AtomicFunction;
use crate::index::IndexT;
use crate::op::{ArgKind, OpId};
use crate::param::ParamPool;

/// One op in the tape plus the information needed to replay it: its
/// argument slots and the index of its first result variable.
pub struct OpInfo<'t> {
    pub op: OpId,
    pub args: &'t [IndexT],
    pub arg_type: &'t [ArgKind],
    pub first_res_vid: IndexT,
}

/// An immutable, recorded operation sequence.
///
/// See §3 DATA MODEL for the field-level invariants; [crate::record]
/// is the only producer of a [Tape], via its `stop` call, and checks
/// every invariant listed there before returning one.
pub struct Tape<B> {
    pub(crate) ops: Vec<OpId>,
    /// `op2arg[i]..op2arg[i+1]` is the argument-slot range for op `i`;
    /// length is `ops.len() + 1`.
    pub(crate) op2arg: Vec<IndexT>,
    pub(crate) args: Vec<IndexT>,
    pub(crate) arg_type: Vec<ArgKind>,
    pub(crate) pars: ParamPool<B>,
    /// `op2var[i]` is the first result variable index allocated by op
    /// `i`, or `n_var` if the op allocates no result.
    pub(crate) op2var: Vec<IndexT>,
    /// `var2op[v]` is the index of the op that produced variable `v`.
    pub(crate) var2op: Vec<IndexT>,
    pub(crate) n_var: usize,
    pub(crate) ind_taddr: Vec<IndexT>,
    pub(crate) dep_taddr: Vec<IndexT>,
    pub(crate) dep_is_parameter: Vec<bool>,
    /// For dependents with `dep_is_parameter[i] == true`, the parameter
    /// pool index holding that dependent's (derivative-free) value.
    pub(crate) dep_par_index: Vec<IndexT>,
    /// Recorded outcome of every `Eq`/`Lt`/`Le` op, in recording order;
    /// see [crate::record::RecorderState::cmp_sign].
    pub(crate) cmp_sign: Vec<bool>,
    /// Declaration-time (order-0) values of every on-tape array created
    /// by [crate::vecarray::new_array]; `VecLoad`/`VecStore` args name
    /// an index into this pool as their first argument slot (§3
    /// "array-on-tape").
    pub(crate) vec_init: Vec<Vec<B>>,
    /// Registry of atomic functions named by this tape's `User` call
    /// brackets (§4.4 "Atomic-call boundaries"); `User`'s first argument
    /// slot indexes this pool.
    pub(crate) atomics: Vec<Box<dyn AtomicFunction<B>>>,
}

impl<B> Tape<B> {
    pub fn num_op(&self) -> usize {
        self.ops.len()
    }

    pub fn num_var(&self) -> usize {
        self.n_var
    }

    pub fn num_par(&self) -> usize {
        self.pars.len()
    }

    pub fn num_domain(&self) -> usize {
        self.ind_taddr.len()
    }

    pub fn num_range(&self) -> usize {
        self.dep_taddr.len()
    }

    pub fn dep_taddr(&self) -> &[IndexT] {
        &self.dep_taddr
    }

    pub fn ind_taddr(&self) -> &[IndexT] {
        &self.ind_taddr
    }

    pub fn dep_is_parameter(&self, i: usize) -> bool {
        self.dep_is_parameter[i]
    }

    pub fn dep_par_value(&self, i: usize) -> B
    where
        B: Copy,
    {
        self.pars.value(self.dep_par_index[i] as usize)
    }

    pub fn parameter(&self, index: usize) -> B
    where
        B: Copy,
    {
        self.pars.value(index)
    }

    /// The op that produced variable `v`.
    pub fn var2op(&self, v: usize) -> usize {
        self.var2op[v] as usize
    }

    pub fn num_vec_array(&self) -> usize {
        self.vec_init.len()
    }

    pub fn vec_array_init(&self, array_id: usize) -> &[B] {
        &self.vec_init[array_id]
    }

    pub fn atomic(&self, atom_id: usize) -> &dyn AtomicFunction<B> {
        self.atomics[atom_id].as_ref()
    }

    /// The recorded outcome of the `i`-th `Eq`/`Lt`/`Le` op, in recording
    /// order; see [crate::record::RecorderState::cmp_sign].
    pub fn cmp_sign(&self, i: usize) -> bool {
        self.cmp_sign[i]
    }

    pub fn num_cmp(&self) -> usize {
        self.cmp_sign.len()
    }

    /// Sequential forward access to op `i`'s replay information.
    pub fn get_op_info(&self, i: usize) -> OpInfo<'_> {
        let begin = self.op2arg[i] as usize;
        let end = self.op2arg[i + 1] as usize;
        OpInfo {
            op: self.ops[i],
            args: &self.args[begin..end],
            arg_type: &self.arg_type[begin..end],
            first_res_vid: self.op2var[i],
        }
    }

    /// Iterates ops `0..num_op()` in recording order.
    pub fn iter_forward(&self) -> impl Iterator<Item = usize> {
        0..self.num_op()
    }

    /// Iterates ops `0..num_op()` in reverse recording order.
    pub fn iter_reverse(&self) -> impl Iterator<Item = usize> {
        (0..self.num_op()).rev()
    }
}

#[cfg(test)]
mod tests {
    use crate::function::ad_fun;
    use crate::record::independent;

    #[test]
    fn begin_and_end_bracket_every_tape() {
        let ax = independent::<f64>(&[1.0, 2.0]);
        let ay = vec![ax[0] + ax[1]];
        let f = ad_fun(&ay);
        let tape = f.tape();
        assert_eq!(tape.ops[0], crate::op::OpId::Begin);
        assert_eq!(*tape.ops.last().unwrap(), crate::op::OpId::End);
    }

    #[test]
    fn every_variable_argument_refers_to_an_earlier_variable() {
        let ax = independent::<f64>(&[1.0, 2.0, 3.0]);
        let ay = vec![(ax[0] * ax[1]).sin() + ax[2]];
        let f = ad_fun(&ay);
        let tape = f.tape();
        for i in 0..tape.num_op() {
            let info = tape.get_op_info(i);
            for (slot, &kind) in info.args.iter().zip(info.arg_type.iter()) {
                if kind == crate::op::ArgKind::Var {
                    assert!((*slot as usize) < info.first_res_vid as usize);
                }
            }
        }
    }
}
