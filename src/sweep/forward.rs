// SPDX-License-Identifier: EPL-2.0 OR GPL-2.0-or-later
// SPDX-FileCopyrightText: tapead contributors
// SPDX-FileContributor: 2026 tapead contributors
//
//! The forward Taylor-coefficient sweep (§4.3).
//!
//! Link to [parent module](super)
//!
//! One call computes order `order` for every tape variable from orders
//! `0..order` (already valid in `taylor`, per its own contract) plus the
//! domain coefficients `u` supplied for this order. Elementary unary ops
//! follow the ODE / power-series recurrences of Griewank & Walther; the
//! sixteen arithmetic opcodes share one recurrence per family via
//! [super::Operand].

use super::{
    bin_kind, BinKind, Operand, QuotientShape, ACOSH_SHAPE, ACOS_SHAPE, ASINH_SHAPE, ASIN_SHAPE,
    ATANH_SHAPE, ATAN_SHAPE,
};
use crate::op::OpId;
use crate::scalar::Scalar;
use crate::tape::Tape;
use crate::taylor::TaylorStore;

fn square_coeff<B: Scalar>(taylor: &TaylorStore<B>, x: Operand<B>, k: usize) -> B {
    let mut s = B::zero();
    for j in 0..=k {
        s = s + x.coeff(taylor, j) * x.coeff(taylor, k - j);
    }
    s
}

/// Advances a sqrt-shaped companion `c = sqrt(w)` from order `order - 1`
/// to `order`, given this order's already-computed `w_k`. Uses the same
/// in-place self-reference as the plain [OpId::Sqrt] op: `c`'s own
/// lower-order coefficients, already valid, supply the Cauchy term.
fn sqrt_self_forward<B: Scalar>(taylor: &mut TaylorStore<B>, c_idx: usize, w_k: B, order: usize) {
    let c0 = taylor.coeff(c_idx, 0);
    let mut s = B::zero();
    for j in 1..order {
        s = s + taylor.coeff(c_idx, j) * taylor.coeff(c_idx, order - j);
    }
    let ck = (w_k - s) / (c0 + c0);
    taylor.set_coeff(c_idx, order, ck);
}

/// Advances the quotient-shaped companion relation shared by
/// asin/acos/atan/asinh/acosh/atanh: `y' = shape.sigma * x' / d`, where
/// `d` is either the sqrt companion (asin/acos/asinh/acosh) or the bare
/// companion itself (atan/atanh, which have no sqrt stage).
fn quotient_forward<B: Scalar>(
    taylor: &mut TaylorStore<B>,
    x: Operand<B>,
    y: usize,
    d: usize,
    shape: QuotientShape,
    order: usize,
) {
    let k = order;
    let mut sum_term = B::zero();
    for i in 1..k {
        sum_term = sum_term + B::from_f64(i as f64) * taylor.coeff(y, i) * taylor.coeff(d, k - i);
    }
    let numerator = B::from_f64(shape.sigma) * x.coeff(taylor, k) * B::from_f64(k as f64) - sum_term;
    let yk = numerator / (B::from_f64(k as f64) * taylor.coeff(d, 0));
    taylor.set_coeff(y, k, yk);
}

fn cond_take_true<B: Scalar>(op: OpId, l: B, r: B) -> bool {
    match op {
        OpId::CondExpLt => l < r,
        OpId::CondExpLe => l <= r,
        OpId::CondExpEq => l == r,
        OpId::CondExpGe => l >= r,
        OpId::CondExpGt => l > r,
        _ => unreachable!("cond_take_true: {op:?} is not a CondExp opcode"),
    }
}

fn is_arithmetic(op: OpId) -> bool {
    use OpId::*;
    matches!(
        op,
        AddPp | AddPv | AddVp | AddVv
            | SubPp | SubPv | SubVp | SubVv
            | MulPp | MulPv | MulVp | MulVv
            | DivPp | DivPv | DivVp | DivVv
    )
}

fn is_cond_exp(op: OpId) -> bool {
    use OpId::*;
    matches!(op, CondExpLt | CondExpLe | CondExpEq | CondExpGe | CondExpGt)
}

fn is_compare(op: OpId) -> bool {
    matches!(op, OpId::Eq | OpId::Lt | OpId::Le)
}

/// Computes Taylor order `order` for every tape variable, given the
/// order-`order` coefficients of the independent variables in `u`
/// (`|u| == tape.num_domain()`), and returns the resulting coefficients
/// of the dependent variables plus the number of `Eq`/`Lt`/`Le`
/// comparisons whose live outcome no longer matches the one recorded
/// (only ever nonzero when `order == 0`; see §4.3 "Branch consistency").
///
/// `array_owner` is scratch, owned by the caller across the whole
/// sweep of a function evaluation (orders `0, 1, 2, ...`): at `order ==
/// 0` it is reset to the tape's declared array contents, and `VecStore`
/// mutates it in place so a later `VecLoad` (at any order) sees the
/// write, mirroring the array's state during recording.
#[allow(clippy::too_many_arguments)]
pub fn forward<B: Scalar>(
    tape: &Tape<B>,
    taylor: &mut TaylorStore<B>,
    array_owner: &mut Vec<Vec<Operand<B>>>,
    order: usize,
    u: &[B],
    trace: bool,
) -> (Vec<B>, usize) {
    assert_eq!(u.len(), tape.num_domain(), "forward: wrong number of domain values");
    taylor.ensure_order_cap(order);

    if trace {
        println!("Begin Trace: forward: order = {order}, n_var = {}", tape.num_var());
    }

    if order == 0 {
        array_owner.clear();
        for a in 0..tape.num_vec_array() {
            array_owner.push(tape.vec_array_init(a).iter().map(|&v| Operand::Par(v)).collect());
        }
    }

    taylor.set_coeff(0, order, B::zero());
    for (i, &vid) in tape.ind_taddr().iter().enumerate() {
        taylor.set_coeff(vid as usize, order, u[i]);
    }

    let mut compare_mismatch = 0usize;
    let mut cmp_idx = 0usize;
    let n_op = tape.num_op();
    let mut i = 0usize;
    while i < n_op {
        let info = tape.get_op_info(i);
        let op = info.op;
        if matches!(op, OpId::Begin | OpId::End | OpId::Inv) {
            i += 1;
            continue;
        }
        if op == OpId::User {
            let atom_id = info.args[0] as usize;
            let n_in = info.args[1] as usize;
            let n_out = info.args[2] as usize;
            let mut args = Vec::with_capacity(n_in);
            for s in 0..n_in {
                let a_info = tape.get_op_info(i + 1 + s);
                args.push(Operand::from_arg(tape, a_info.args[0], a_info.arg_type[0]));
            }
            let mut res_vids = Vec::with_capacity(n_out);
            for s in 0..n_out {
                let r_info = tape.get_op_info(i + 1 + n_in + s);
                res_vids.push((r_info.op == OpId::UsrRv).then_some(r_info.first_res_vid as usize));
            }
            let mut tx = vec![B::zero(); n_in * (order + 1)];
            for (a, operand) in args.iter().enumerate() {
                for k in 0..=order {
                    tx[a * (order + 1) + k] = operand.coeff(taylor, k);
                }
            }
            let mut ty = vec![B::zero(); n_out * (order + 1)];
            let ok = tape.atomic(atom_id).forward(order, &tx, &mut ty);
            assert!(ok, "forward: atomic function forward(order={order}) failed");
            for (r, vid) in res_vids.into_iter().enumerate() {
                if let Some(vid) = vid {
                    taylor.set_coeff(vid, order, ty[r * (order + 1) + order]);
                }
            }
            if trace {
                println!("{i}, user, atom_id={atom_id}, n_in={n_in}, n_out={n_out}");
            }
            i += 2 + n_in + n_out;
            continue;
        }

        let z = info.first_res_vid as usize;
        match op {
            OpId::Par => {
                let val = tape.parameter(info.args[0] as usize);
                taylor.set_coeff(z, order, if order == 0 { val } else { B::zero() });
            }
            op if is_arithmetic(op) => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let y = Operand::from_arg(tape, info.args[1], info.arg_type[1]);
                let val = match bin_kind(op) {
                    BinKind::Add => x.coeff(taylor, order) + y.coeff(taylor, order),
                    BinKind::Sub => x.coeff(taylor, order) - y.coeff(taylor, order),
                    BinKind::Mul => {
                        let mut s = B::zero();
                        for j in 0..=order {
                            s = s + x.coeff(taylor, j) * y.coeff(taylor, order - j);
                        }
                        s
                    }
                    BinKind::Div => {
                        let y0 = y.coeff(taylor, 0);
                        let mut s = x.coeff(taylor, order);
                        for j in 0..order {
                            s = s - taylor.coeff(z, j) * y.coeff(taylor, order - j);
                        }
                        s / y0
                    }
                };
                taylor.set_coeff(z, order, val);
            }
            OpId::Neg => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                taylor.set_coeff(z, order, -x.coeff(taylor, order));
            }
            OpId::Abs => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let x0 = x.coeff(taylor, 0);
                if order == 0 {
                    taylor.set_coeff(z, 0, x0.abs());
                } else {
                    taylor.set_coeff(z, order, x0.sign() * x.coeff(taylor, order));
                }
            }
            OpId::Sign => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                taylor.set_coeff(z, order, if order == 0 { x.coeff(taylor, 0).sign() } else { B::zero() });
            }
            OpId::Sqrt => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                if order == 0 {
                    taylor.set_coeff(z, 0, x.coeff(taylor, 0).sqrt());
                } else {
                    let z0 = taylor.coeff(z, 0);
                    let mut s = x.coeff(taylor, order);
                    for j in 1..order {
                        s = s - taylor.coeff(z, j) * taylor.coeff(z, order - j);
                    }
                    taylor.set_coeff(z, order, s / (z0 + z0));
                }
            }
            OpId::Exp => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                if order == 0 {
                    taylor.set_coeff(z, 0, x.coeff(taylor, 0).exp());
                } else {
                    let mut s = B::zero();
                    for k in 1..=order {
                        s = s + B::from_f64(k as f64) * x.coeff(taylor, k) * taylor.coeff(z, order - k);
                    }
                    taylor.set_coeff(z, order, s / B::from_f64(order as f64));
                }
            }
            OpId::Log => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                if order == 0 {
                    taylor.set_coeff(z, 0, x.coeff(taylor, 0).ln());
                } else {
                    let x0 = x.coeff(taylor, 0);
                    let mut s = x.coeff(taylor, order) * B::from_f64(order as f64);
                    for j in 1..order {
                        s = s - B::from_f64(j as f64) * taylor.coeff(z, j) * x.coeff(taylor, order - j);
                    }
                    taylor.set_coeff(z, order, s / (B::from_f64(order as f64) * x0));
                }
            }
            OpId::Sin | OpId::Cos => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let (s_idx, c_idx) = if op == OpId::Sin { (z, z + 1) } else { (z + 1, z) };
                if order == 0 {
                    let x0 = x.coeff(taylor, 0);
                    taylor.set_coeff(s_idx, 0, x0.sin());
                    taylor.set_coeff(c_idx, 0, x0.cos());
                } else {
                    let mut s_acc = B::zero();
                    let mut c_acc = B::zero();
                    for k in 1..=order {
                        let xk = x.coeff(taylor, k);
                        let kf = B::from_f64(k as f64);
                        s_acc = s_acc + kf * xk * taylor.coeff(c_idx, order - k);
                        c_acc = c_acc - kf * xk * taylor.coeff(s_idx, order - k);
                    }
                    let kf = B::from_f64(order as f64);
                    taylor.set_coeff(s_idx, order, s_acc / kf);
                    taylor.set_coeff(c_idx, order, c_acc / kf);
                }
            }
            OpId::Sinh | OpId::Cosh => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let (sh, ch) = if op == OpId::Sinh { (z, z + 1) } else { (z + 1, z) };
                if order == 0 {
                    let x0 = x.coeff(taylor, 0);
                    taylor.set_coeff(sh, 0, x0.sinh());
                    taylor.set_coeff(ch, 0, x0.cosh());
                } else {
                    let mut sh_acc = B::zero();
                    let mut ch_acc = B::zero();
                    for k in 1..=order {
                        let xk = x.coeff(taylor, k);
                        let kf = B::from_f64(k as f64);
                        sh_acc = sh_acc + kf * xk * taylor.coeff(ch, order - k);
                        ch_acc = ch_acc + kf * xk * taylor.coeff(sh, order - k);
                    }
                    let kf = B::from_f64(order as f64);
                    taylor.set_coeff(sh, order, sh_acc / kf);
                    taylor.set_coeff(ch, order, ch_acc / kf);
                }
            }
            OpId::Tan => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let (t, u_idx) = (z, z + 1);
                if order == 0 {
                    let t0 = x.coeff(taylor, 0).tan();
                    taylor.set_coeff(t, 0, t0);
                    taylor.set_coeff(u_idx, 0, t0 * t0);
                } else {
                    let mut t_acc = B::zero();
                    for k in 1..=order {
                        let xk = x.coeff(taylor, k);
                        let b = if order - k == 0 { B::one() + taylor.coeff(u_idx, 0) } else { taylor.coeff(u_idx, order - k) };
                        t_acc = t_acc + B::from_f64(k as f64) * xk * b;
                    }
                    taylor.set_coeff(t, order, t_acc / B::from_f64(order as f64));
                    let mut u_acc = B::zero();
                    for j in 0..=order {
                        u_acc = u_acc + taylor.coeff(t, j) * taylor.coeff(t, order - j);
                    }
                    taylor.set_coeff(u_idx, order, u_acc);
                }
            }
            OpId::Tanh => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let (t, v_idx) = (z, z + 1);
                if order == 0 {
                    let t0 = x.coeff(taylor, 0).tanh();
                    taylor.set_coeff(t, 0, t0);
                    taylor.set_coeff(v_idx, 0, B::one() - t0 * t0);
                } else {
                    let mut t_acc = B::zero();
                    for k in 1..=order {
                        let xk = x.coeff(taylor, k);
                        t_acc = t_acc + B::from_f64(k as f64) * xk * taylor.coeff(v_idx, order - k);
                    }
                    taylor.set_coeff(t, order, t_acc / B::from_f64(order as f64));
                    let mut tt = B::zero();
                    for j in 0..=order {
                        tt = tt + taylor.coeff(t, j) * taylor.coeff(t, order - j);
                    }
                    taylor.set_coeff(v_idx, order, -tt);
                }
            }
            OpId::Asin | OpId::Acos => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let y = z;
                let c = z + 1;
                let shape = if op == OpId::Asin { ASIN_SHAPE } else { ACOS_SHAPE };
                if order == 0 {
                    let x0 = x.coeff(taylor, 0);
                    taylor.set_coeff(y, 0, if op == OpId::Asin { x0.asin() } else { x0.acos() });
                    taylor.set_coeff(c, 0, (B::one() - x0 * x0).sqrt());
                } else {
                    let w_k = -square_coeff(taylor, x, order);
                    sqrt_self_forward(taylor, c, w_k, order);
                    quotient_forward(taylor, x, y, c, shape, order);
                }
            }
            OpId::Asinh => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let (y, c) = (z, z + 1);
                if order == 0 {
                    let x0 = x.coeff(taylor, 0);
                    taylor.set_coeff(y, 0, x0.asinh());
                    taylor.set_coeff(c, 0, (B::one() + x0 * x0).sqrt());
                } else {
                    let w_k = square_coeff(taylor, x, order);
                    sqrt_self_forward(taylor, c, w_k, order);
                    quotient_forward(taylor, x, y, c, ASINH_SHAPE, order);
                }
            }
            OpId::Acosh => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let (y, c) = (z, z + 1);
                if order == 0 {
                    let x0 = x.coeff(taylor, 0);
                    taylor.set_coeff(y, 0, x0.acosh());
                    taylor.set_coeff(c, 0, (x0 * x0 - B::one()).sqrt());
                } else {
                    let w_k = square_coeff(taylor, x, order);
                    sqrt_self_forward(taylor, c, w_k, order);
                    quotient_forward(taylor, x, y, c, ACOSH_SHAPE, order);
                }
            }
            OpId::Atan => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let (y, w) = (z, z + 1);
                if order == 0 {
                    let x0 = x.coeff(taylor, 0);
                    taylor.set_coeff(y, 0, x0.atan());
                    taylor.set_coeff(w, 0, B::one() + x0 * x0);
                } else {
                    let w_k = square_coeff(taylor, x, order);
                    taylor.set_coeff(w, order, w_k);
                    quotient_forward(taylor, x, y, w, ATAN_SHAPE, order);
                }
            }
            OpId::Atanh => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let (y, w) = (z, z + 1);
                if order == 0 {
                    let x0 = x.coeff(taylor, 0);
                    taylor.set_coeff(y, 0, x0.atanh());
                    taylor.set_coeff(w, 0, B::one() - x0 * x0);
                } else {
                    let w_k = -square_coeff(taylor, x, order);
                    taylor.set_coeff(w, order, w_k);
                    quotient_forward(taylor, x, y, w, ATANH_SHAPE, order);
                }
            }
            op if is_compare(op) => {
                if order == 0 {
                    let l = Operand::from_arg(tape, info.args[0], info.arg_type[0]).coeff(taylor, 0);
                    let r = Operand::from_arg(tape, info.args[1], info.arg_type[1]).coeff(taylor, 0);
                    let live = match op {
                        OpId::Eq => l == r,
                        OpId::Lt => l < r,
                        OpId::Le => l <= r,
                        _ => unreachable!(),
                    };
                    if live != tape.cmp_sign(cmp_idx) {
                        compare_mismatch += 1;
                    }
                }
                cmp_idx += 1;
            }
            op if is_cond_exp(op) => {
                let left = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let right = Operand::from_arg(tape, info.args[1], info.arg_type[1]);
                let if_true = Operand::from_arg(tape, info.args[2], info.arg_type[2]);
                let if_false = Operand::from_arg(tape, info.args[3], info.arg_type[3]);
                let take_true = cond_take_true::<B>(op, left.coeff(taylor, 0), right.coeff(taylor, 0));
                let val = if take_true { if_true.coeff(taylor, order) } else { if_false.coeff(taylor, order) };
                taylor.set_coeff(z, order, val);
            }
            OpId::VecLoad => {
                let array_id = info.args[0] as usize;
                let idx = Operand::from_arg(tape, info.args[1], info.arg_type[1]);
                let slot = idx.coeff(taylor, 0).to_f64() as usize;
                let owner = array_owner[array_id][slot];
                taylor.set_coeff(z, order, owner.coeff(taylor, order));
            }
            OpId::VecStore => {
                let array_id = info.args[0] as usize;
                let idx = Operand::from_arg(tape, info.args[1], info.arg_type[1]);
                let slot = idx.coeff(taylor, 0).to_f64() as usize;
                let value = Operand::from_arg(tape, info.args[2], info.arg_type[2]);
                array_owner[array_id][slot] = value;
                taylor.set_coeff(z, order, value.coeff(taylor, order));
            }
            _ => unreachable!("forward: unhandled opcode {op:?}"),
        }
        if trace {
            println!("{i}, {}, z = {}", op.name(), taylor.coeff(z, order));
        }
        i += 1;
    }

    taylor.set_order_cur(order);
    let mut y = Vec::with_capacity(tape.num_range());
    for i in 0..tape.num_range() {
        let value = if tape.dep_is_parameter(i) {
            if order == 0 { tape.dep_par_value(i) } else { B::zero() }
        } else {
            taylor.coeff(tape.dep_taddr()[i] as usize, order)
        };
        y.push(value);
    }

    if trace {
        println!("End Trace: forward: order = {order}");
    }
    (y, compare_mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::ad_fun;
    use crate::record::independent;

    #[test]
    fn order_zero_reproduces_the_recorded_value() {
        let ax = independent::<f64>(&[2.0, 3.0]);
        let ay = vec![ax[0] * ax[1] + ax[0].sin()];
        let f = ad_fun(&ay);
        let y = f.forward(0, &[2.0, 3.0]);
        assert!((y[0] - (2.0 * 3.0 + 2f64.sin())).abs() < 1e-12);
    }

    #[test]
    fn first_order_directional_derivative_of_product() {
        // z = x*y at (x,y)=(2,3) in direction (1,0) has dz/dt = y = 3
        let ax = independent::<f64>(&[2.0, 3.0]);
        let ay = vec![ax[0] * ax[1]];
        let f = ad_fun(&ay);
        let _ = f.forward(0, &[2.0, 3.0]);
        let y1 = f.forward(1, &[1.0, 0.0]);
        assert!((y1[0] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn acosh_of_cosh_is_locally_the_identity_to_high_order() {
        // S1: acosh(cosh(x)) == x for x > 0; all directional derivatives
        // beyond order 0 vanish.
        let ax = independent::<f64>(&[0.5]);
        let ay = vec![ax[0].cosh().acosh()];
        let f = ad_fun(&ay);
        let y0 = f.forward(0, &[0.5]);
        assert!((y0[0] - 0.5).abs() < 1e-10);
        let y1 = f.forward(1, &[1.0]);
        assert!((y1[0] - 1.0).abs() < 1e-8);
        for order in 2..=4 {
            let mut u = vec![0.0];
            let _ = order;
            let yk = f.forward(order, &u);
            u[0] = 0.0;
            assert!(yk[0].abs() < 1e-6, "order {order} coefficient should vanish, got {}", yk[0]);
        }
    }
}
