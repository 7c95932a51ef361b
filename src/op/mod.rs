// SPDX-License-Identifier: EPL-2.0 OR GPL-2.0-or-later
// SPDX-FileCopyrightText: tapead contributors
// SPDX-FileContributor: 2026 tapead contributors
//
//! The opcode catalog: every elementary operation a tape can record.
//!
//! Link to [parent module](super)
//!
//! Each [OpId] names an entry of the catalog described in the data model.
//! `n_arg` / `n_res` are fixed per opcode; `arg_is_variable` is fixed for
//! the opcodes whose operand roles are baked into the variant name
//! (the `Pv` / `Vp` / `Vv` / `Pp` binary suffixes). Opcodes whose operand
//! roles vary independently of the opcode itself (comparisons, `CondExp`,
//! the atomic-call bracket) instead carry a parallel [ArgKind] alongside
//! every argument slot in [crate::tape::Tape::arg_type].
// ---------------------------------------------------------------------------

/// One entry of the fixed opcode catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum OpId {
    /// Structural: the sentinel op at tape position 0; its result is
    /// variable index [crate::index::BEGIN_VID].
    Begin,
    /// Structural: the sentinel op at the last tape position.
    End,
    /// Structural: one independent variable.
    Inv,
    /// Structural: materializes a parameter-pool value as a variable.
    Par,
    //
    AddPp, AddPv, AddVp, AddVv,
    SubPp, SubPv, SubVp, SubVv,
    MulPp, MulPv, MulVp, MulVv,
    DivPp, DivPv, DivVp, DivVv,
    //
    Neg, Abs, Sign, Sqrt, Exp, Log,
    //
    /// Companion pair: `(sin x, cos x)`.
    Sin,
    /// Companion pair: `(cos x, sin x)`.
    Cos,
    /// Companion pair: `(tan x, tan^2 x)`.
    Tan,
    /// Companion pair: `(asin x, sqrt(1 - x^2))`.
    Asin,
    /// Companion pair: `(acos x, sqrt(1 - x^2))`.
    Acos,
    /// Companion pair: `(atan x, 1 + x^2)`.
    Atan,
    /// Companion pair: `(sinh x, cosh x)`.
    Sinh,
    /// Companion pair: `(cosh x, sinh x)`.
    Cosh,
    /// Companion pair: `(tanh x, 1 - tanh^2 x)`.
    Tanh,
    /// Companion pair: `(asinh x, sqrt(1 + x^2))`.
    Asinh,
    /// Companion pair: `(acosh x, sqrt(x^2 - 1))`.
    Acosh,
    /// Companion pair: `(atanh x, 1 - x^2)`.
    Atanh,
    //
    Eq, Lt, Le,
    CondExpLt, CondExpLe, CondExpEq, CondExpGe, CondExpGt,
    //
    VecLoad, VecStore,
    //
    /// Opens and closes an atomic-call bracket (the same opcode appears
    /// twice: once to open, once to close).
    User,
    /// Argument marker: the next arg slot is a parameter-pool index.
    UsrAp,
    /// Argument marker: the next arg slot is a variable index.
    UsrAv,
    /// Result marker: a parameter-typed result of the call.
    UsrRp,
    /// Result marker: a variable-typed result of the call; allocates
    /// the result variable.
    UsrRv,
}

/// Whether an argument slot holds a variable index or a parameter-pool
/// index; stored per-slot in [crate::tape::Tape::arg_type] for opcodes
/// whose operand roles are not baked into the opcode itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgKind {
    Var,
    Par,
}

impl OpId {
    /// Number of argument slots this opcode consumes.
    pub fn n_arg(self) -> usize {
        use OpId::*;
        match self {
            Begin | End | Inv => 0,
            Par => 1,
            AddPp | AddPv | AddVp | AddVv => 2,
            SubPp | SubPv | SubVp | SubVv => 2,
            MulPp | MulPv | MulVp | MulVv => 2,
            DivPp | DivPv | DivVp | DivVv => 2,
            Neg | Abs | Sign | Sqrt | Exp | Log => 1,
            Sin | Cos | Tan | Asin | Acos | Atan => 1,
            Sinh | Cosh | Tanh | Asinh | Acosh | Atanh => 1,
            Eq | Lt | Le => 2,
            CondExpLt | CondExpLe | CondExpEq | CondExpGe | CondExpGt => 4,
            VecLoad => 2,
            VecStore => 3,
            User => 3,
            UsrAp | UsrAv | UsrRp => 1,
            UsrRv => 0,
        }
    }

    /// Number of result variables this opcode allocates.
    pub fn n_res(self) -> usize {
        use OpId::*;
        match self {
            Begin | Inv | Par => 1,
            End => 0,
            AddPp | AddPv | AddVp | AddVv => 1,
            SubPp | SubPv | SubVp | SubVv => 1,
            MulPp | MulPv | MulVp | MulVv => 1,
            DivPp | DivPv | DivVp | DivVv => 1,
            Neg | Abs | Sign | Sqrt | Exp | Log => 1,
            Sin | Cos | Tan | Asin | Acos | Atan => 2,
            Sinh | Cosh | Tanh | Asinh | Acosh | Atanh => 2,
            Eq | Lt | Le => 0,
            CondExpLt | CondExpLe | CondExpEq | CondExpGe | CondExpGt => 1,
            VecLoad => 1,
            VecStore => 1,
            User => 0,
            UsrAp | UsrAv | UsrRp => 0,
            UsrRv => 1,
        }
    }

    /// True for the unary ops whose second result slot is a companion
    /// value needed only to express the primary's Taylor recurrence.
    pub fn has_companion(self) -> bool {
        self.n_res() == 2
    }

    /// Fixed variable/parameter role of each argument slot, for the
    /// opcodes whose operand roles are baked into the variant name.
    /// Returns an empty slice for opcodes whose roles are instead
    /// recorded per-instance in `Tape::arg_type`.
    pub fn arg_is_variable(self) -> &'static [bool] {
        use OpId::*;
        match self {
            AddPv | SubPv | MulPv | DivPv => &[false, true],
            AddVp | SubVp | MulVp | DivVp => &[true, false],
            AddVv | SubVv | MulVv | DivVv => &[true, true],
            AddPp | SubPp | MulPp | DivPp => &[false, false],
            Par => &[false],
            Neg | Abs | Sign | Sqrt | Exp | Log => &[true],
            Sin | Cos | Tan | Asin | Acos | Atan => &[true],
            Sinh | Cosh | Tanh | Asinh | Acosh | Atanh => &[true],
            _ => &[],
        }
    }

    /// Human-readable name, used by debug tracing (§10.3).
    pub fn name(self) -> &'static str {
        use OpId::*;
        match self {
            Begin => "begin", End => "end", Inv => "inv", Par => "par",
            AddPp => "add_pp", AddPv => "add_pv", AddVp => "add_vp", AddVv => "add_vv",
            SubPp => "sub_pp", SubPv => "sub_pv", SubVp => "sub_vp", SubVv => "sub_vv",
            MulPp => "mul_pp", MulPv => "mul_pv", MulVp => "mul_vp", MulVv => "mul_vv",
            DivPp => "div_pp", DivPv => "div_pv", DivVp => "div_vp", DivVv => "div_vv",
            Neg => "neg", Abs => "abs", Sign => "sign", Sqrt => "sqrt",
            Exp => "exp", Log => "log",
            Sin => "sin", Cos => "cos", Tan => "tan",
            Asin => "asin", Acos => "acos", Atan => "atan",
            Sinh => "sinh", Cosh => "cosh", Tanh => "tanh",
            Asinh => "asinh", Acosh => "acosh", Atanh => "atanh",
            Eq => "eq", Lt => "lt", Le => "le",
            CondExpLt => "cond_exp_lt", CondExpLe => "cond_exp_le",
            CondExpEq => "cond_exp_eq", CondExpGe => "cond_exp_ge",
            CondExpGt => "cond_exp_gt",
            VecLoad => "vec_load", VecStore => "vec_store",
            User => "user", UsrAp => "usr_ap", UsrAv => "usr_av",
            UsrRp => "usr_rp", UsrRv => "usr_rv",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_op_has_one_result() {
        assert_eq!(OpId::Begin.n_res(), 1);
        assert_eq!(OpId::Begin.n_arg(), 0);
    }

    #[test]
    fn companion_pairs_allocate_two_results() {
        for op in [OpId::Sin, OpId::Tan, OpId::Asinh, OpId::Atanh] {
            assert!(op.has_companion());
            assert_eq!(op.n_res(), 2);
        }
    }

    #[test]
    fn binary_variants_fix_argument_roles() {
        assert_eq!(OpId::AddPv.arg_is_variable(), &[false, true]);
        assert_eq!(OpId::MulVp.arg_is_variable(), &[true, false]);
        assert_eq!(OpId::DivVv.arg_is_variable(), &[true, true]);
    }

    #[test]
    fn comparisons_allocate_no_result() {
        for op in [OpId::Eq, OpId::Lt, OpId::Le] {
            assert_eq!(op.n_res(), 0);
        }
    }
}
