// SPDX-License-Identifier: EPL-2.0 OR GPL-2.0-or-later
// SPDX-FileCopyrightText: tapead contributors
// SPDX-FileContributor: 2026 tapead contributors
//
//! Forward and reverse Taylor-coefficient sweeps, and the sparsity
//! sweeps built on [crate::sparsity::PackSetVec].
//!
//! Link to [parent module](super)
//!
//! These are the engines a [crate::function::AdFun] drives; they never
//! touch anything outside a [crate::tape::Tape], a [crate::taylor::TaylorStore],
//! and (for `User` brackets) a [crate::atomic::AtomicFunction] -- the
//! sole approved external collaborator per §4.4.

pub mod forward;
pub mod reverse;
pub mod sparse;

use crate::index::IndexT;
use crate::op::{ArgKind, OpId};
use crate::scalar::Scalar;
use crate::tape::Tape;
use crate::taylor::TaylorStore;

/// One binary operand as seen by a sweep: either an earlier tape
/// variable or a pool parameter, abstracted so the sixteen arithmetic
/// opcodes (`{Add,Sub,Mul,Div} x {Pp,Pv,Vp,Vv}`) share one recurrence
/// each instead of one per suffix -- a parameter's Taylor series is
/// `(value, 0, 0, ...)`.
#[derive(Clone, Copy)]
pub(crate) enum Operand<B> {
    Var(usize),
    Par(B),
}

impl<B: Scalar> Operand<B> {
    pub(crate) fn from_arg(tape: &Tape<B>, raw: IndexT, kind: ArgKind) -> Self {
        match kind {
            ArgKind::Var => Operand::Var(raw as usize),
            ArgKind::Par => Operand::Par(tape.parameter(raw as usize)),
        }
    }

    pub(crate) fn coeff(&self, taylor: &TaylorStore<B>, k: usize) -> B {
        match *self {
            Operand::Var(v) => taylor.coeff(v, k),
            Operand::Par(p) => if k == 0 { p } else { B::zero() },
        }
    }
}

/// Which of the four arithmetic families an opcode belongs to,
/// irrespective of its `Pp`/`Pv`/`Vp`/`Vv` operand-role suffix.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum BinKind {
    Add,
    Sub,
    Mul,
    Div,
}

pub(crate) fn bin_kind(op: OpId) -> BinKind {
    use OpId::*;
    match op {
        AddPp | AddPv | AddVp | AddVv => BinKind::Add,
        SubPp | SubPv | SubVp | SubVv => BinKind::Sub,
        MulPp | MulPv | MulVp | MulVv => BinKind::Mul,
        DivPp | DivPv | DivVp | DivVv => BinKind::Div,
        _ => panic!("bin_kind: {op:?} is not an arithmetic opcode"),
    }
}

/// Sign and companion-divisor convention shared by the five
/// quotient-shaped inverse trig / inverse hyperbolic companion pairs:
/// `y' = sigma * x' / w`, where `w` is the op's companion result
/// (§4.3 "elementary unary ops use their ODE recurrence").
#[derive(Clone, Copy)]
pub(crate) struct QuotientShape {
    pub sigma: f64,
}

pub(crate) const ASIN_SHAPE: QuotientShape = QuotientShape { sigma: 1.0 };
pub(crate) const ACOS_SHAPE: QuotientShape = QuotientShape { sigma: -1.0 };
pub(crate) const ATAN_SHAPE: QuotientShape = QuotientShape { sigma: 1.0 };
pub(crate) const ASINH_SHAPE: QuotientShape = QuotientShape { sigma: 1.0 };
pub(crate) const ACOSH_SHAPE: QuotientShape = QuotientShape { sigma: 1.0 };
pub(crate) const ATANH_SHAPE: QuotientShape = QuotientShape { sigma: 1.0 };
