// SPDX-License-Identifier: EPL-2.0 OR GPL-2.0-or-later
// SPDX-FileCopyrightText: tapead contributors
// SPDX-FileContributor: 2026 tapead contributors
//
//! The sparsity sweeps: forward Jacobian, reverse Jacobian, and reverse
//! Hessian, all built on [crate::sparsity::PackSetVec] (§4.5, §4.6).
//!
//! Link to [parent module](super)
//!
//! Every sweep here propagates *structural reachability*, never an
//! actual derivative value: a bit set at `(row, column)` means "column
//! `column` of the seed pattern may reach row `row`", which is always
//! safe to over-approximate and never safe to under-approximate. The
//! three public entry points all take and return patterns indexed by
//! the caller's domain/range rows; the variable-indexed patterns used
//! internally never escape this module.
//!
//! An on-tape array ([crate::vecarray]) is treated the conservative way
//! CppAD itself treats a `VecAD` object: since a `VecLoad`'s element
//! index need not be a compile-time constant, a load's sparsity pattern
//! is the union of every store ever recorded to that array, and a
//! store's pattern feeds every load recorded after it, rather than
//! trying to track individual elements.

use super::Operand;
use crate::op::{ArgKind, OpId};
use crate::sparsity::PackSetVec;
use crate::tape::Tape;
use crate::scalar::Scalar;

fn union_var_args_into<B: Scalar>(_tape: &Tape<B>, var: &mut PackSetVec, dst: usize, args: &[crate::index::IndexT], kinds: &[ArgKind]) {
    for (&raw, &kind) in args.iter().zip(kinds.iter()) {
        if kind == ArgKind::Var {
            var.union_into_self(dst, raw as usize);
        }
    }
}

/// Forward sparsity sweep over every tape variable: `var[v]` becomes the
/// union, over every variable argument feeding `v` (directly or via a
/// companion pair), of that argument's row; independents are seeded
/// from `r`.
fn var_for_sparse_jac<B: Scalar>(tape: &Tape<B>, q: usize, r: &PackSetVec) -> PackSetVec {
    assert_eq!(r.n_set(), tape.num_domain(), "for_sparse_jac: r has the wrong number of rows");
    assert_eq!(r.end(), q, "for_sparse_jac: r has the wrong number of columns");

    let mut var = PackSetVec::new();
    var.resize(tape.num_var(), q);
    for (j, &vid) in tape.ind_taddr().iter().enumerate() {
        var.assignment(vid as usize, r, j);
    }

    let mut array_pattern: Vec<PackSetVec> = (0..tape.num_vec_array())
        .map(|_| {
            let mut p = PackSetVec::new();
            p.resize(1, q);
            p
        })
        .collect();

    for i in tape.iter_forward() {
        let info = tape.get_op_info(i);
        let op = info.op;
        if matches!(op, OpId::Begin | OpId::End | OpId::Inv | OpId::Par) {
            continue;
        }
        if matches!(op, OpId::Eq | OpId::Lt | OpId::Le) {
            continue;
        }
        if op == OpId::User {
            let atom_id = info.args[0] as usize;
            let n_in = info.args[1] as usize;
            let n_out = info.args[2] as usize;
            let mut pattern_x = PackSetVec::new();
            pattern_x.resize(n_in, q);
            for s in 0..n_in {
                let a_info = tape.get_op_info(i + 1 + s);
                if a_info.arg_type[0] == ArgKind::Var {
                    pattern_x.assignment(s, &var, a_info.args[0] as usize);
                }
            }
            let mut pattern_y = PackSetVec::new();
            pattern_y.resize(n_out, q);
            tape.atomic(atom_id).for_sparse_jac(&pattern_x, &mut pattern_y);
            for s in 0..n_out {
                let r_info = tape.get_op_info(i + 1 + n_in + s);
                if r_info.op == OpId::UsrRv {
                    var.assignment(r_info.first_res_vid as usize, &pattern_y, s);
                }
            }
            continue;
        }

        let z = info.first_res_vid as usize;
        match op {
            OpId::VecLoad => {
                let array_id = info.args[0] as usize;
                var.assignment(z, &array_pattern[array_id], 0);
            }
            OpId::VecStore => {
                let value = Operand::<B>::from_arg(tape, info.args[2], info.arg_type[2]);
                if let Operand::Var(v) = value {
                    let array_id = info.args[0] as usize;
                    array_pattern[array_id].union_into(0, &var, v);
                    var.assignment(z, &var, v);
                }
            }
            _ if op.has_companion() => {
                union_var_args_into(tape, &mut var, z, info.args, info.arg_type);
                let companion = z + 1;
                var.union_into(companion, &var, z);
            }
            _ => {
                union_var_args_into(tape, &mut var, z, info.args, info.arg_type);
            }
        }
    }
    var
}

/// Reverse sparsity sweep: `var[v]` becomes the union, over every
/// result row seeded from `seed`, of the rows of every op output `v`
/// feeds (companions folded together, `VecStore`s folded with every
/// `VecLoad` recorded after them).
fn var_rev_sparse_jac<B: Scalar>(tape: &Tape<B>, q: usize, seed: &PackSetVec) -> PackSetVec {
    assert_eq!(seed.n_set(), tape.num_range(), "rev_sparse_jac: seed has the wrong number of rows");
    assert_eq!(seed.end(), q, "rev_sparse_jac: seed has the wrong number of columns");

    let mut var = PackSetVec::new();
    var.resize(tape.num_var(), q);
    for (i, &vid) in tape.dep_taddr().iter().enumerate() {
        if !tape.dep_is_parameter(i) {
            var.union_into(vid as usize, seed, i);
        }
    }

    let mut array_pattern: Vec<PackSetVec> = (0..tape.num_vec_array())
        .map(|_| {
            let mut p = PackSetVec::new();
            p.resize(1, q);
            p
        })
        .collect();

    let n_op = tape.num_op();
    let mut i = n_op;
    while i > 0 {
        i -= 1;
        let info = tape.get_op_info(i);
        let op = info.op;
        if matches!(op, OpId::Begin | OpId::End | OpId::Inv | OpId::Par) {
            continue;
        }
        if matches!(op, OpId::Eq | OpId::Lt | OpId::Le) {
            continue;
        }
        if matches!(op, OpId::UsrAp | OpId::UsrAv | OpId::UsrRp | OpId::UsrRv) {
            continue;
        }
        if op == OpId::User {
            let n_in = info.args[1] as usize;
            let n_out = info.args[2] as usize;
            let atom_id = info.args[0] as usize;
            let p0 = i - n_in - n_out - 1;
            let mut pattern_y = PackSetVec::new();
            pattern_y.resize(n_out, q);
            for s in 0..n_out {
                let r_info = tape.get_op_info(p0 + 1 + n_in + s);
                if r_info.op == OpId::UsrRv {
                    pattern_y.assignment(s, &var, r_info.first_res_vid as usize);
                }
            }
            let mut pattern_x = PackSetVec::new();
            pattern_x.resize(n_in, q);
            tape.atomic(atom_id).rev_sparse_jac(&pattern_y, &mut pattern_x);
            for s in 0..n_in {
                let a_info = tape.get_op_info(p0 + 1 + s);
                if a_info.arg_type[0] == ArgKind::Var {
                    var.union_into(a_info.args[0] as usize, &pattern_x, s);
                }
            }
            i = p0;
            continue;
        }

        let z = info.first_res_vid as usize;
        match op {
            OpId::VecLoad => {
                let array_id = info.args[0] as usize;
                array_pattern[array_id].union_into(0, &var, z);
            }
            OpId::VecStore => {
                let value = Operand::<B>::from_arg(tape, info.args[2], info.arg_type[2]);
                if let Operand::Var(v) = value {
                    let array_id = info.args[0] as usize;
                    var.union_into(v, &var, z);
                    var.union_into(v, &array_pattern[array_id], 0);
                }
            }
            _ if op.has_companion() => {
                let companion = z + 1;
                var.union_into(z, &var, companion);
                for (&raw, &kind) in info.args.iter().zip(info.arg_type.iter()) {
                    if kind == ArgKind::Var {
                        var.union_into(raw as usize, &var, z);
                    }
                }
            }
            _ if matches!(op, OpId::CondExpLt | OpId::CondExpLe | OpId::CondExpEq | OpId::CondExpGe | OpId::CondExpGt) => {
                for (&raw, &kind) in info.args.iter().zip(info.arg_type.iter()) {
                    if kind == ArgKind::Var {
                        var.union_into(raw as usize, &var, z);
                    }
                }
            }
            _ => {
                for (&raw, &kind) in info.args.iter().zip(info.arg_type.iter()) {
                    if kind == ArgKind::Var {
                        var.union_into(raw as usize, &var, z);
                    }
                }
            }
        }
    }
    var
}

/// Propagates a domain-seeded pattern `r` (`n_set == tape.num_domain()`,
/// `end == q`) forward to the dependents (§4.6 "for_sparse_jac").
pub fn for_sparse_jac<B: Scalar>(tape: &Tape<B>, q: usize, r: &PackSetVec) -> PackSetVec {
    let var = var_for_sparse_jac(tape, q, r);
    let mut out = PackSetVec::new();
    out.resize(tape.num_range(), q);
    for (i, &vid) in tape.dep_taddr().iter().enumerate() {
        if !tape.dep_is_parameter(i) {
            out.assignment(i, &var, vid as usize);
        }
    }
    out
}

/// Propagates a range-seeded pattern `s` (`n_set == tape.num_range()`,
/// `end == q`) back to the independents (§4.6 "rev_sparse_jac").
pub fn rev_sparse_jac<B: Scalar>(tape: &Tape<B>, q: usize, s: &PackSetVec) -> PackSetVec {
    let var = var_rev_sparse_jac(tape, q, s);
    let mut out = PackSetVec::new();
    out.resize(tape.num_domain(), q);
    for (j, &vid) in tape.ind_taddr().iter().enumerate() {
        out.assignment(j, &var, vid as usize);
    }
    out
}

/// True if an arithmetic opcode is affine in its variable argument(s)
/// and so contributes no second-derivative (Hessian) term of its own.
fn is_linear_arithmetic(op: OpId) -> bool {
    use OpId::*;
    matches!(
        op,
        AddPp | AddPv | AddVp | AddVv
            | SubPp | SubPv | SubVp | SubVv
            | MulPv | MulVp
            | DivVp
    )
}

fn is_nonlinear_unary(op: OpId) -> bool {
    use OpId::*;
    matches!(
        op,
        Sqrt | Exp | Log | Sin | Cos | Sinh | Cosh | Tan | Tanh
            | Asin | Acos | Atan | Asinh | Acosh | Atanh
    )
}

/// Marks every pair `(i, j)` with `i` from row `a` of `pattern` and `j`
/// from row `b`, in both orientations (`H` need not be symmetric to
/// represent, but every Hessian sparsity pattern this crate produces
/// is, so both halves are always filled together).
fn mark_pairs(h: &mut PackSetVec, pattern: &PackSetVec, a: usize, b: usize) {
    for i in pattern.iter_row(a) {
        for j in pattern.iter_row(b) {
            h.add_element(i, j);
            h.add_element(j, i);
        }
    }
}

/// Reverse Hessian sparsity sweep (§4.6 "rev_sparse_hes"): given the
/// forward pattern `r` from a prior [for_sparse_jac] call (`n_set ==
/// tape.num_var()` -- callers keep the variable-level pattern returned
/// internally by `for_sparse_jac`'s own forward sweep rather than its
/// dependent-only projection, so this function repeats that forward
/// sweep itself) and a dependent selector `s`, returns the `q x q`
/// pattern of directions whose second partial derivative of `s^T F`
/// may be non-zero.
///
/// `q x q` rather than `n x q`: every sparsity sweep in this module is
/// expressed in terms of the `q` columns named by the caller's seed
/// pattern, not raw domain indices; when `r` is the identity pattern
/// (`q == tape.num_domain()`) this coincides with the usual `n x n`
/// Hessian sparsity pattern. See DESIGN.md.
pub fn rev_sparse_hes<B: Scalar>(tape: &Tape<B>, q: usize, r: &PackSetVec, s: &[bool]) -> PackSetVec {
    assert_eq!(s.len(), tape.num_range(), "rev_sparse_hes: wrong number of selector entries");
    let var_r = var_for_sparse_jac(tape, q, r);

    let mut seed = PackSetVec::new();
    seed.resize(tape.num_range(), 1);
    for (i, &take) in s.iter().enumerate() {
        if take {
            seed.add_element(i, 0);
        }
    }
    let var_rev = var_rev_sparse_jac(tape, 1, &seed);
    let var_rev_jac = |v: usize| var_rev.is_element(v, 0);

    let mut h = PackSetVec::new();
    h.resize(q, q);

    for i in tape.iter_forward() {
        let info = tape.get_op_info(i);
        let op = info.op;
        if matches!(op, OpId::Begin | OpId::End | OpId::Inv | OpId::Par) {
            continue;
        }
        if matches!(op, OpId::Eq | OpId::Lt | OpId::Le) {
            continue;
        }
        if op == OpId::User {
            let atom_id = info.args[0] as usize;
            let n_in = info.args[1] as usize;
            let n_out = info.args[2] as usize;
            let mut for_jac_x = PackSetVec::new();
            for_jac_x.resize(n_in, q);
            for s_idx in 0..n_in {
                let a_info = tape.get_op_info(i + 1 + s_idx);
                if a_info.arg_type[0] == ArgKind::Var {
                    for_jac_x.assignment(s_idx, &var_r, a_info.args[0] as usize);
                }
            }
            let mut rev_jac_y = PackSetVec::new();
            rev_jac_y.resize(n_out, 1);
            let mut pattern_y = PackSetVec::new();
            pattern_y.resize(n_out, q);
            for s_idx in 0..n_out {
                let r_info = tape.get_op_info(i + 1 + n_in + s_idx);
                if r_info.op == OpId::UsrRv && var_rev_jac(r_info.first_res_vid as usize) {
                    rev_jac_y.add_element(s_idx, 0);
                }
            }
            let mut pattern_x = PackSetVec::new();
            pattern_x.resize(n_in, q);
            tape.atomic(atom_id).rev_sparse_hes(&for_jac_x, &rev_jac_y, &pattern_y, &mut pattern_x);
            for a in 0..n_in {
                for b in a..n_in {
                    mark_pairs(&mut h, &pattern_x, a, b);
                }
            }
            continue;
        }

        let z = info.first_res_vid as usize;
        if !var_rev_jac(z) {
            continue;
        }
        match op {
            op if matches!(op, OpId::MulVv | OpId::DivVv | OpId::DivPv) => {
                let x = info.args[0] as usize;
                let x_is_var = info.arg_type[0] == ArgKind::Var;
                let y = info.args[1] as usize;
                let y_is_var = info.arg_type[1] == ArgKind::Var;
                if x_is_var && y_is_var {
                    mark_pairs(&mut h, &var_r, x, y);
                    mark_pairs(&mut h, &var_r, y, y);
                    if op == OpId::MulVv {
                        mark_pairs(&mut h, &var_r, x, x);
                    }
                } else if y_is_var {
                    mark_pairs(&mut h, &var_r, y, y);
                } else if x_is_var && op == OpId::MulVv {
                    mark_pairs(&mut h, &var_r, x, x);
                }
            }
            op if is_linear_arithmetic(op) => {}
            op if is_nonlinear_unary(op) => {
                let x = info.args[0] as usize;
                if info.arg_type[0] == ArgKind::Var {
                    mark_pairs(&mut h, &var_r, x, x);
                }
            }
            _ => {}
        }
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::ad_fun;
    use crate::record::independent;

    #[test]
    fn s5_jacobian_sparsity_of_a_product() {
        // S5: y = x0 * x1 + sin(x2); J has nonzeros at (0,0),(0,1),(0,2).
        let ax = independent::<f64>(&[1.0, 2.0, 3.0]);
        let ay = vec![ax[0] * ax[1] + ax[2].sin()];
        let f = ad_fun(&ay);
        let n = f.domain();
        let mut r = PackSetVec::new();
        r.resize(n, n);
        for j in 0..n {
            r.add_element(j, j);
        }
        let jac = for_sparse_jac(f.tape(), n, &r);
        let row: Vec<usize> = jac.iter_row(0).collect();
        assert_eq!(row, vec![0, 1, 2]);
    }

    #[test]
    fn rev_sparse_jac_matches_forward_for_identity_seed() {
        let ax = independent::<f64>(&[1.0, 2.0]);
        let ay = vec![ax[0] + ax[1], ax[0] * ax[1]];
        let f = ad_fun(&ay);
        let n = f.domain();
        let m = f.range();
        let mut r = PackSetVec::new();
        r.resize(n, n);
        for j in 0..n {
            r.add_element(j, j);
        }
        let fwd = for_sparse_jac(f.tape(), n, &r);
        let mut s = PackSetVec::new();
        s.resize(m, m);
        for i in 0..m {
            s.add_element(i, i);
        }
        let rev = rev_sparse_jac(f.tape(), m, &s);
        for i in 0..m {
            for j in 0..n {
                assert_eq!(fwd.is_element(i, j), rev.is_element(j, i), "mismatch at ({i},{j})");
            }
        }
    }

    #[test]
    fn linear_function_has_empty_hessian_sparsity() {
        let ax = independent::<f64>(&[1.0, 2.0]);
        let ay = vec![ax[0] + ax[1] * 3.0];
        let f = ad_fun(&ay);
        let n = f.domain();
        let mut r = PackSetVec::new();
        r.resize(n, n);
        for j in 0..n {
            r.add_element(j, j);
        }
        let h = rev_sparse_hes(f.tape(), n, &r, &[true]);
        for i in 0..n {
            assert_eq!(h.number_elements(i), 0);
        }
    }

    #[test]
    fn product_of_two_variables_has_cross_hessian_term() {
        let ax = independent::<f64>(&[1.0, 2.0]);
        let ay = vec![ax[0] * ax[1]];
        let f = ad_fun(&ay);
        let n = f.domain();
        let mut r = PackSetVec::new();
        r.resize(n, n);
        for j in 0..n {
            r.add_element(j, j);
        }
        let h = rev_sparse_hes(f.tape(), n, &r, &[true]);
        assert!(h.is_element(0, 1));
        assert!(h.is_element(1, 0));
    }
}
