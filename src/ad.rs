// SPDX-License-Identifier: EPL-2.0 OR GPL-2.0-or-later
// SPDX-FileCopyrightText: tapead contributors
// SPDX-FileContributor: 2026 tapead contributors
//
//! The differentiable scalar `AD<B>` and its recorded operators.
//!
//! Link to [parent module](super)
//!
//! `AD<B>` is either a plain [ADRepr::Constant] (never recorded, never
//! carries a derivative) or a [ADRepr::Variable] tagged with the id of
//! the recording that produced it and its tape variable index. Every
//! arithmetic operator and elementary function on `AD<B>` is a thin
//! wrapper: it computes the order-0 value eagerly (so ordinary Rust
//! code reads naturally) and, while a recording is active on this
//! thread, additionally appends the matching op to the tape.
//!
//! Two operands that are both [ADRepr::Constant] are folded eagerly
//! without ever touching the tape, since parameters never carry
//! derivatives (§3 DATA MODEL) and this crate has no API to mutate a
//! parameter's value after a tape is stopped (§5: "the parameter pool
//! ... is read-only after stop"); see `DESIGN.md` for why this makes
//! the `Pp` opcode variants unreachable in practice even though the
//! catalog names them for completeness.

use crate::index::IndexT;
use crate::op::{ArgKind, OpId};
use crate::record::sealed::ThisThreadRecorder;
use crate::record::{current_tape_id, is_recording, push_cmp_sign, push_op, push_param};
use crate::scalar::Scalar;

/// The two representations an `AD<B>` value may take.
#[derive(Clone, Copy, Debug)]
pub enum ADRepr<B> {
    Constant(B),
    Variable { tape_id: usize, vid: IndexT, value: B },
}

/// A differentiable scalar of base type `B`.
#[derive(Clone, Copy, Debug)]
pub struct AD<B> {
    repr: ADRepr<B>,
}

impl<B: Scalar> AD<B> {
    pub(crate) fn variable(tape_id: usize, vid: IndexT, value: B) -> Self {
        AD { repr: ADRepr::Variable { tape_id, vid, value } }
    }

    pub fn repr(&self) -> &ADRepr<B> {
        &self.repr
    }

    /// The current order-0 value, regardless of representation.
    pub fn value(&self) -> B {
        match self.repr {
            ADRepr::Constant(v) => v,
            ADRepr::Variable { value, .. } => value,
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.repr, ADRepr::Variable { .. })
    }
}

impl<B: Scalar> From<B> for AD<B> {
    fn from(value: B) -> Self {
        AD { repr: ADRepr::Constant(value) }
    }
}

pub(crate) fn arg_slot<B>(x: &AD<B>) -> (IndexT, ArgKind)
where
    B: Scalar + ThisThreadRecorder,
{
    match x.repr {
        ADRepr::Variable { vid, .. } => (vid, ArgKind::Var),
        ADRepr::Constant(value) => (push_param::<B>(value), ArgKind::Par),
    }
}

fn record_unary<B>(op: OpId, x: AD<B>, value_fn: impl Fn(B) -> B) -> AD<B>
where
    B: Scalar + ThisThreadRecorder,
{
    let value = value_fn(x.value());
    match x.repr {
        ADRepr::Constant(_) => AD::from(value),
        ADRepr::Variable { tape_id, vid, .. } => {
            debug_assert_eq!(
                current_tape_id::<B>(),
                Some(tape_id),
                "unary op: variable used outside the recording that produced it"
            );
            let res = push_op::<B>(op, &[(vid, ArgKind::Var)]);
            AD::variable(tape_id, res, value)
        }
    }
}

fn record_binary<B>(
    op_pv: OpId,
    op_vp: OpId,
    op_vv: OpId,
    lhs: AD<B>,
    rhs: AD<B>,
    value_fn: impl Fn(B, B) -> B,
) -> AD<B>
where
    B: Scalar + ThisThreadRecorder,
{
    let value = value_fn(lhs.value(), rhs.value());
    match (lhs.repr, rhs.repr) {
        (ADRepr::Constant(_), ADRepr::Constant(_)) => AD::from(value),
        (ADRepr::Constant(a), ADRepr::Variable { tape_id, vid, .. }) => {
            let par = push_param::<B>(a);
            let res = push_op::<B>(op_pv, &[(par, ArgKind::Par), (vid, ArgKind::Var)]);
            AD::variable(tape_id, res, value)
        }
        (ADRepr::Variable { tape_id, vid, .. }, ADRepr::Constant(b)) => {
            let par = push_param::<B>(b);
            let res = push_op::<B>(op_vp, &[(vid, ArgKind::Var), (par, ArgKind::Par)]);
            AD::variable(tape_id, res, value)
        }
        (
            ADRepr::Variable { tape_id: t1, vid: v1, .. },
            ADRepr::Variable { tape_id: t2, vid: v2, .. },
        ) => {
            assert_eq!(t1, t2, "binary op: operands belong to different tapes");
            let res = push_op::<B>(op_vv, &[(v1, ArgKind::Var), (v2, ArgKind::Var)]);
            AD::variable(t1, res, value)
        }
    }
}

macro_rules! impl_binary_op { ($trait_:ident, $method:ident, $op_pv:ident, $op_vp:ident, $op_vv:ident, $value_op:tt) => {
    impl<B: Scalar + ThisThreadRecorder> std::ops::$trait_ for AD<B> {
        type Output = AD<B>;
        fn $method(self, rhs: AD<B>) -> AD<B> {
            record_binary(OpId::$op_pv, OpId::$op_vp, OpId::$op_vv, self, rhs, |a, b| a $value_op b)
        }
    }
    impl<B: Scalar + ThisThreadRecorder> std::ops::$trait_<B> for AD<B> {
        type Output = AD<B>;
        fn $method(self, rhs: B) -> AD<B> {
            std::ops::$trait_::$method(self, AD::from(rhs))
        }
    }
} }
impl_binary_op!(Add, add, AddPv, AddVp, AddVv, +);
impl_binary_op!(Sub, sub, SubPv, SubVp, SubVv, -);
impl_binary_op!(Mul, mul, MulPv, MulVp, MulVv, *);
impl_binary_op!(Div, div, DivPv, DivVp, DivVv, /);

impl<B: Scalar + ThisThreadRecorder> std::ops::Neg for AD<B> {
    type Output = AD<B>;
    fn neg(self) -> AD<B> {
        record_unary(OpId::Neg, self, |x| -x)
    }
}

macro_rules! impl_plain_unary { ($method:ident, $op:ident) => {
    pub fn $method(self) -> AD<B> {
        record_unary(OpId::$op, self, |x| x.$method())
    }
} }

macro_rules! impl_companion_unary { ($method:ident, $op:ident) => {
    pub fn $method(self) -> AD<B> {
        record_unary(OpId::$op, self, |x| x.$method())
    }
} }

impl<B: Scalar + ThisThreadRecorder> AD<B> {
    impl_plain_unary!(abs, Abs);
    impl_plain_unary!(sqrt, Sqrt);
    impl_plain_unary!(exp, Exp);

    /// Natural log; recorded as [OpId::Log].
    pub fn ln(self) -> AD<B> {
        record_unary(OpId::Log, self, |x| x.ln())
    }

    /// CppAD's `sign` convention (`-1`, `0`, or `1`); recorded as
    /// [OpId::Sign].
    pub fn sign(self) -> AD<B> {
        record_unary(OpId::Sign, self, |x| x.sign())
    }

    impl_companion_unary!(sin, Sin);
    impl_companion_unary!(cos, Cos);
    impl_companion_unary!(tan, Tan);
    impl_companion_unary!(asin, Asin);
    impl_companion_unary!(acos, Acos);
    impl_companion_unary!(atan, Atan);
    impl_companion_unary!(sinh, Sinh);
    impl_companion_unary!(cosh, Cosh);
    impl_companion_unary!(tanh, Tanh);
    impl_companion_unary!(asinh, Asinh);
    impl_companion_unary!(acosh, Acosh);
    impl_companion_unary!(atanh, Atanh);
}

fn record_compare<B>(op: OpId, lhs: &AD<B>, rhs: &AD<B>, value_fn: impl Fn(B, B) -> bool) -> bool
where
    B: Scalar + ThisThreadRecorder,
{
    let result = value_fn(lhs.value(), rhs.value());
    if is_recording::<B>() {
        let (a_idx, a_kind) = arg_slot(lhs);
        let (b_idx, b_kind) = arg_slot(rhs);
        if a_kind == ArgKind::Var || b_kind == ArgKind::Var {
            push_op::<B>(op, &[(a_idx, a_kind), (b_idx, b_kind)]);
            push_cmp_sign::<B>(result);
        }
    }
    result
}

impl<B: Scalar + ThisThreadRecorder> AD<B> {
    /// Records an [OpId::Lt] comparison (if either operand is a
    /// variable) and returns its result.
    pub fn lt(&self, other: &Self) -> bool {
        record_compare(OpId::Lt, self, other, |a, b| a < b)
    }

    /// Records an [OpId::Le] comparison (if either operand is a
    /// variable) and returns its result.
    pub fn le(&self, other: &Self) -> bool {
        record_compare(OpId::Le, self, other, |a, b| a <= b)
    }
}

impl<B: Scalar + ThisThreadRecorder> PartialEq for AD<B> {
    /// Records an [OpId::Eq] comparison (if either operand is a
    /// variable) and returns its result.
    fn eq(&self, other: &Self) -> bool {
        record_compare(OpId::Eq, self, other, |a, b| a == b)
    }
}

/// Which predicate a [cond_expr] call evaluates between its two
/// comparison operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CondKind {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl CondKind {
    fn op_id(self) -> OpId {
        match self {
            CondKind::Lt => OpId::CondExpLt,
            CondKind::Le => OpId::CondExpLe,
            CondKind::Eq => OpId::CondExpEq,
            CondKind::Ge => OpId::CondExpGe,
            CondKind::Gt => OpId::CondExpGt,
        }
    }

    fn evaluate<B: PartialOrd + PartialEq>(self, left: B, right: B) -> bool {
        match self {
            CondKind::Lt => left < right,
            CondKind::Le => left <= right,
            CondKind::Eq => left == right,
            CondKind::Ge => left >= right,
            CondKind::Gt => left > right,
        }
    }
}

/// Records a `CondExp{kind}(left, right, if_true, if_false)` op: at
/// every forward sweep the live order-0 comparison of `left`/`right`
/// selects `if_true` or `if_false` (§4.3 "Branch consistency" -- unlike
/// `Eq`/`Lt`/`Le`, `CondExp` never looks at a recorded sign). The
/// result is always a fresh tape variable, even when every operand is
/// a constant.
pub fn cond_expr<B>(kind: CondKind, left: AD<B>, right: AD<B>, if_true: AD<B>, if_false: AD<B>) -> AD<B>
where
    B: Scalar + ThisThreadRecorder,
{
    assert!(
        is_recording::<B>(),
        "cond_expr: no recording is active on this thread"
    );
    let take_true = kind.evaluate(left.value(), right.value());
    let value = if take_true { if_true.value() } else { if_false.value() };
    let (l_idx, l_kind) = arg_slot(&left);
    let (r_idx, r_kind) = arg_slot(&right);
    let (t_idx, t_kind) = arg_slot(&if_true);
    let (f_idx, f_kind) = arg_slot(&if_false);
    let res = push_op::<B>(
        kind.op_id(),
        &[(l_idx, l_kind), (r_idx, r_kind), (t_idx, t_kind), (f_idx, f_kind)],
    );
    let tape_id = current_tape_id::<B>().unwrap();
    AD::variable(tape_id, res, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{independent, stop};

    #[test]
    fn constant_arithmetic_never_touches_the_tape() {
        let a = AD::from(2.0f64);
        let b = AD::from(3.0f64);
        let c = a + b;
        assert!(!c.is_variable());
        assert_eq!(c.value(), 5.0);
    }

    #[test]
    fn variable_plus_constant_records_a_pv_or_vp_op() {
        let ax = independent::<f64>(&[2.0]);
        let y = ax[0] + 3.0;
        assert_eq!(y.value(), 5.0);
        let tape = stop(&[y]);
        // Begin, Inv, AddVp, End
        assert_eq!(tape.num_op(), 4);
    }

    #[test]
    fn companion_unary_allocates_two_result_slots() {
        let ax = independent::<f64>(&[0.5]);
        let y = ax[0].sin();
        let tape = stop(&[y]);
        let sin_op = tape.get_op_info(2);
        assert_eq!(sin_op.op, OpId::Sin);
        assert_eq!(sin_op.op.n_res(), 2);
    }

    #[test]
    fn cond_expr_always_allocates_a_variable() {
        let ax = independent::<f64>(&[1.0]);
        let y = cond_expr(
            CondKind::Lt,
            ax[0],
            AD::from(0.0),
            AD::from(-1.0),
            AD::from(1.0),
        );
        assert_eq!(y.value(), 1.0);
        assert!(y.is_variable());
    }
}
