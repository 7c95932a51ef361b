// SPDX-License-Identifier: EPL-2.0 OR GPL-2.0-or-later
// SPDX-FileCopyrightText: tapead contributors
// SPDX-FileContributor: 2026 tapead contributors
//
//! The reverse Taylor-coefficient sweep (§4.4).
//!
//! Link to [parent module](super)
//!
//! One call computes the adjoint (partial-derivative) coefficients of
//! every independent, at every order `0..order`, given forward Taylor
//! coefficients already valid to order `order - 1` and a weight vector
//! seeding the dependents' adjoints. The tape is visited in reverse
//! recording order; within one op, orders are unwound from the highest
//! requested down to `0`, since an op whose forward recurrence is
//! self-referential (`Div`, `Sqrt`, `Tan`, the inverse-trig companions,
//! ...) feeds corrections back into its own lower-order adjoints before
//! those are read.

use super::{
    bin_kind, BinKind, Operand, QuotientShape, ACOS_SHAPE, ASINH_SHAPE, ASIN_SHAPE, ATANH_SHAPE,
    ATAN_SHAPE,
};
use crate::op::OpId;
use crate::scalar::Scalar;
use crate::tape::Tape;
use crate::taylor::TaylorStore;

/// Dense `n_var x order` adjoint buffer; scratch for one [reverse] call,
/// unlike [TaylorStore] this never grows across calls.
struct Partials<B> {
    order: usize,
    data: Vec<B>,
}

impl<B: Scalar> Partials<B> {
    fn new(n_var: usize, order: usize) -> Self {
        Partials { order, data: vec![B::zero(); n_var * order] }
    }

    fn get(&self, v: usize, k: usize) -> B {
        self.data[v * self.order + k]
    }

    fn add(&mut self, v: usize, k: usize, value: B) {
        self.data[v * self.order + k] = self.data[v * self.order + k] + value;
    }

    fn add_operand(&mut self, x: Operand<B>, k: usize, value: B) {
        if let Operand::Var(v) = x {
            self.add(v, k, value);
        }
    }
}

/// Undoes `w_k = sign * sum_{j=0}^{k} x_j * x_{k-j}` (the self-square
/// shared by the sqrt-companion chain and by `atan`/`atanh`'s bare
/// `w`), distributing `bar_wk` into `x`'s adjoint at every order
/// `0..=k`.
fn square_coeff_reverse<B: Scalar>(bar: &mut Partials<B>, taylor: &TaylorStore<B>, x: Operand<B>, bar_wk: B, sign: f64, k: usize) {
    let s = B::from_f64(sign);
    for m in 0..=k {
        let x_km = x.coeff(taylor, k - m);
        bar.add_operand(x, m, s * bar_wk * (x_km + x_km));
    }
}

/// Undoes `c_k = (w_k - sum_{j=1}^{k-1} c_j c_{k-j}) / (2 c_0)`
/// (`c = sqrt(w)`, companion forward recurrence shared by
/// `asin`/`acos`/`asinh`/`acosh`; see [super::forward::sqrt_self_forward]),
/// consuming `bar[c_idx][order]` and returning the adjoint that belongs
/// to `w` at that order; corrects `bar[c_idx][0..order]` in place.
fn sqrt_self_reverse<B: Scalar>(bar: &mut Partials<B>, taylor: &TaylorStore<B>, c_idx: usize, order: usize) -> B {
    let c0 = taylor.coeff(c_idx, 0);
    let bar_ck = bar.get(c_idx, order);
    for m in 0..order {
        let c_term = taylor.coeff(c_idx, order - m);
        bar.add(c_idx, m, -bar_ck * c_term / c0);
    }
    bar_ck / (c0 + c0)
}

/// Undoes `y_k = (sigma * x_k * k - sum_{i=1}^{k-1} i * y_i * d_{k-i}) /
/// (k * d_0)`, the quotient-shaped companion recurrence shared by
/// `asin`/`acos`/`atan`/`asinh`/`acosh`/`atanh` (see
/// [super::forward::quotient_forward]). Consumes `bar[y][order]`;
/// distributes into `x`'s adjoint at `order`, `bar[d][0]`, and corrects
/// `bar[d][1..order]`/`bar[y][1..order]` in place.
#[allow(clippy::too_many_arguments)]
fn quotient_reverse<B: Scalar>(
    bar: &mut Partials<B>,
    taylor: &TaylorStore<B>,
    x: Operand<B>,
    y: usize,
    d: usize,
    shape: QuotientShape,
    order: usize,
) {
    let k = order;
    let d0 = taylor.coeff(d, 0);
    let yk = taylor.coeff(y, k);
    let bar_yk = bar.get(y, k);
    bar.add_operand(x, k, bar_yk * B::from_f64(shape.sigma) / d0);
    bar.add(d, 0, -bar_yk * yk / d0);
    let kf = B::from_f64(k as f64);
    for i in 1..k {
        let factor = bar_yk * B::from_f64(i as f64) / (kf * d0);
        bar.add(d, k - i, -factor * taylor.coeff(y, i));
        bar.add(y, i, -factor * taylor.coeff(d, k - i));
    }
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

/// Rebuilds, for every `VecLoad` op, the operand it read at record/
/// forward time -- needed because the reverse sweep never re-plays the
/// array writes itself, it only needs to know who fed each load (§4.4
/// mirrors [super::forward]'s `array_owner` bookkeeping for this one
/// purpose).
fn rebuild_vec_load_sources<B: Scalar>(tape: &Tape<B>, taylor: &TaylorStore<B>) -> Vec<Option<Operand<B>>> {
    let mut owner: Vec<Vec<Operand<B>>> = (0..tape.num_vec_array())
        .map(|a| tape.vec_array_init(a).iter().map(|&v| Operand::Par(v)).collect())
        .collect();
    let mut sources = vec![None; tape.num_op()];
    for i in tape.iter_forward() {
        let info = tape.get_op_info(i);
        match info.op {
            OpId::VecLoad => {
                let array_id = info.args[0] as usize;
                let idx = Operand::from_arg(tape, info.args[1], info.arg_type[1]);
                let slot = idx.coeff(taylor, 0).to_f64() as usize;
                sources[i] = Some(owner[array_id][slot]);
            }
            OpId::VecStore => {
                let array_id = info.args[0] as usize;
                let idx = Operand::from_arg(tape, info.args[1], info.arg_type[1]);
                let slot = idx.coeff(taylor, 0).to_f64() as usize;
                let value = Operand::from_arg(tape, info.args[2], info.arg_type[2]);
                owner[array_id][slot] = value;
            }
            _ => {}
        }
    }
    sources
}

/// Accumulates adjoint coefficients of every independent, at orders
/// `0..order`, given forward coefficients already valid to `order - 1`
/// and dependent weights `w` (`|w| == tape.num_range() * order`).
/// Returns `|dx| == tape.num_domain() * order`, domain-major then order
/// (`dx[j * order + k]`).
pub fn reverse<B: Scalar>(
    tape: &Tape<B>,
    taylor: &TaylorStore<B>,
    order: usize,
    w: &[B],
    trace: bool,
) -> Vec<B> {
    assert_eq!(w.len(), tape.num_range() * order, "reverse: wrong number of weights");
    assert!(
        taylor.order_cur() + 1 >= order,
        "reverse: forward coefficients are only valid to order {}, but order {order} was requested",
        taylor.order_cur()
    );

    if trace {
        println!("Begin Trace: reverse: order = {order}, n_var = {}", tape.num_var());
    }

    let mut bar = Partials::new(tape.num_var(), order);
    for (i, &vid) in tape.dep_taddr().iter().enumerate() {
        if tape.dep_is_parameter(i) {
            continue;
        }
        for k in 0..order {
            bar.add(vid as usize, k, w[i * order + k]);
        }
    }

    let vec_load_source = rebuild_vec_load_sources(tape, taylor);

    let n_op = tape.num_op();
    let mut i = n_op;
    while i > 0 {
        i -= 1;
        let info = tape.get_op_info(i);
        let op = info.op;
        if matches!(op, OpId::Begin | OpId::End | OpId::Inv) {
            continue;
        }
        if matches!(op, OpId::UsrAp | OpId::UsrAv | OpId::UsrRp | OpId::UsrRv) {
            // only reached if a malformed tape skips past the closing
            // `User`; the well-formed path always jumps clear of these.
            continue;
        }
        if op == OpId::User {
            let atom_id = info.args[0] as usize;
            let n_in = info.args[1] as usize;
            let n_out = info.args[2] as usize;
            let p0 = i - n_in - n_out - 1;
            let mut args = Vec::with_capacity(n_in);
            for s in 0..n_in {
                let a_info = tape.get_op_info(p0 + 1 + s);
                args.push(Operand::from_arg(tape, a_info.args[0], a_info.arg_type[0]));
            }
            let mut res_vids = Vec::with_capacity(n_out);
            for s in 0..n_out {
                let r_info = tape.get_op_info(p0 + 1 + n_in + s);
                res_vids.push((r_info.op == OpId::UsrRv).then_some(r_info.first_res_vid as usize));
            }
            let mut tx = vec![B::zero(); n_in * order];
            for (a, operand) in args.iter().enumerate() {
                for k in 0..order {
                    tx[a * order + k] = operand.coeff(taylor, k);
                }
            }
            let mut ty = vec![B::zero(); n_out * order];
            let mut py = vec![B::zero(); n_out * order];
            for (r, vid) in res_vids.iter().enumerate() {
                if let Some(vid) = vid {
                    for k in 0..order {
                        ty[r * order + k] = taylor.coeff(*vid, k);
                        py[r * order + k] = bar.get(*vid, k);
                    }
                }
            }
            let mut px = vec![B::zero(); n_in * order];
            let ok = tape.atomic(atom_id).reverse(order - 1, &tx, &ty, &py, &mut px);
            assert!(ok, "reverse: atomic function reverse(order={}) failed", order - 1);
            for (a, operand) in args.iter().enumerate() {
                for k in 0..order {
                    bar.add_operand(*operand, k, px[a * order + k]);
                }
            }
            if trace {
                println!("{p0}, user, atom_id={atom_id}, n_in={n_in}, n_out={n_out}");
            }
            i = p0;
            continue;
        }

        let z = info.first_res_vid as usize;
        match op {
            OpId::Par => {}
            op if is_arithmetic(op) => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let y = Operand::from_arg(tape, info.args[1], info.arg_type[1]);
                match bin_kind(op) {
                    BinKind::Add => {
                        for k in (0..order).rev() {
                            let bar_zk = bar.get(z, k);
                            bar.add_operand(x, k, bar_zk);
                            bar.add_operand(y, k, bar_zk);
                        }
                    }
                    BinKind::Sub => {
                        for k in (0..order).rev() {
                            let bar_zk = bar.get(z, k);
                            bar.add_operand(x, k, bar_zk);
                            bar.add_operand(y, k, -bar_zk);
                        }
                    }
                    BinKind::Mul => {
                        for k in (0..order).rev() {
                            let bar_zk = bar.get(z, k);
                            for j in 0..=k {
                                bar.add_operand(x, j, bar_zk * y.coeff(taylor, k - j));
                                bar.add_operand(y, k - j, bar_zk * x.coeff(taylor, j));
                            }
                        }
                    }
                    BinKind::Div => {
                        let Operand::Par(_) = y else {
                            for k in (0..order).rev() {
                                let bar_zk = bar.get(z, k);
                                let y0 = y.coeff(taylor, 0);
                                let zk = taylor.coeff(z, k);
                                bar.add_operand(x, k, bar_zk / y0);
                                bar.add_operand(y, 0, -bar_zk * zk / y0);
                                for j in 0..k {
                                    bar.add_operand(y, k - j, -bar_zk * taylor.coeff(z, j) / y0);
                                    bar.add(z, j, -bar_zk * y.coeff(taylor, k - j) / y0);
                                }
                            }
                            continue;
                        };
                        // y is a bare parameter: the Div recurrence collapses
                        // to ordinary scalar division, no self-reference.
                        let y0 = y.coeff(taylor, 0);
                        for k in (0..order).rev() {
                            let bar_zk = bar.get(z, k);
                            bar.add_operand(x, k, bar_zk / y0);
                        }
                    }
                }
            }
            OpId::Neg => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                for k in 0..order {
                    bar.add_operand(x, k, -bar.get(z, k));
                }
            }
            OpId::Abs => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let sign = x.coeff(taylor, 0).sign();
                for k in 0..order {
                    bar.add_operand(x, k, bar.get(z, k) * sign);
                }
            }
            OpId::Sign => {}
            OpId::Sqrt => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let z0 = taylor.coeff(z, 0);
                for k in (1..order).rev() {
                    let bar_zk = bar.get(z, k);
                    bar.add_operand(x, k, bar_zk / (z0 + z0));
                    for m in 0..k {
                        bar.add(z, m, -bar_zk * taylor.coeff(z, k - m) / z0);
                    }
                }
                if order > 0 {
                    bar.add_operand(x, 0, bar.get(z, 0) / (z0 + z0));
                }
            }
            OpId::Exp => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                for k in (1..order).rev() {
                    let bar_zk = bar.get(z, k) / B::from_f64(k as f64);
                    for j in 1..=k {
                        let coef = bar_zk * B::from_f64(j as f64);
                        bar.add_operand(x, j, coef * taylor.coeff(z, k - j));
                        bar.add(z, k - j, coef * x.coeff(taylor, j));
                    }
                }
                if order > 0 {
                    bar.add_operand(x, 0, bar.get(z, 0) * taylor.coeff(z, 0));
                }
            }
            OpId::Log => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let x0 = x.coeff(taylor, 0);
                for k in (1..order).rev() {
                    let bar_zk = bar.get(z, k);
                    let zk = taylor.coeff(z, k);
                    bar.add_operand(x, k, bar_zk / x0);
                    bar.add_operand(x, 0, -bar_zk * zk / x0);
                    let kf = B::from_f64(k as f64);
                    for j in 1..k {
                        let factor = bar_zk * B::from_f64(j as f64) / (kf * x0);
                        bar.add_operand(x, k - j, -factor * taylor.coeff(z, j));
                        bar.add(z, j, -factor * x.coeff(taylor, k - j));
                    }
                }
                if order > 0 {
                    bar.add_operand(x, 0, bar.get(z, 0) / x0);
                }
            }
            OpId::Sin | OpId::Cos => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let (s_idx, c_idx) = if op == OpId::Sin { (z, z + 1) } else { (z + 1, z) };
                for k in (1..order).rev() {
                    let kf = B::from_f64(k as f64);
                    let bar_sk = bar.get(s_idx, k) / kf;
                    let bar_ck = bar.get(c_idx, k) / kf;
                    for j in 1..=k {
                        let jf = B::from_f64(j as f64);
                        let xk = x.coeff(taylor, j);
                        bar.add_operand(
                            x,
                            j,
                            jf * (bar_sk * taylor.coeff(c_idx, k - j) - bar_ck * taylor.coeff(s_idx, k - j)),
                        );
                        bar.add(c_idx, k - j, jf * bar_sk * xk);
                        bar.add(s_idx, k - j, -jf * bar_ck * xk);
                    }
                }
                if order > 0 {
                    let s0 = taylor.coeff(s_idx, 0);
                    let c0 = taylor.coeff(c_idx, 0);
                    let bar_s0 = bar.get(s_idx, 0);
                    let bar_c0 = bar.get(c_idx, 0);
                    bar.add_operand(x, 0, bar_s0 * c0 - bar_c0 * s0);
                }
            }
            OpId::Sinh | OpId::Cosh => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let (sh, ch) = if op == OpId::Sinh { (z, z + 1) } else { (z + 1, z) };
                for k in (1..order).rev() {
                    let kf = B::from_f64(k as f64);
                    let bar_shk = bar.get(sh, k) / kf;
                    let bar_chk = bar.get(ch, k) / kf;
                    for j in 1..=k {
                        let jf = B::from_f64(j as f64);
                        let xk = x.coeff(taylor, j);
                        bar.add_operand(
                            x,
                            j,
                            jf * (bar_shk * taylor.coeff(ch, k - j) + bar_chk * taylor.coeff(sh, k - j)),
                        );
                        bar.add(ch, k - j, jf * bar_shk * xk);
                        bar.add(sh, k - j, jf * bar_chk * xk);
                    }
                }
                if order > 0 {
                    let sh0 = taylor.coeff(sh, 0);
                    let ch0 = taylor.coeff(ch, 0);
                    let bar_sh0 = bar.get(sh, 0);
                    let bar_ch0 = bar.get(ch, 0);
                    bar.add_operand(x, 0, bar_sh0 * ch0 + bar_ch0 * sh0);
                }
            }
            OpId::Tan => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let (t, u_idx) = (z, z + 1);
                for k in (1..order).rev() {
                    // undo u_k = sum_{j=0}^k t_j t_{k-j} into bar[t]
                    let bar_uk = bar.get(u_idx, k);
                    for m in 0..=k {
                        let t_term = taylor.coeff(t, k - m);
                        bar.add(t, m, bar_uk * (t_term + t_term));
                    }
                    // undo t_k = (1/k) sum_{j=1}^k j x_j b_{k-j}
                    let bar_tk = bar.get(t, k) / B::from_f64(k as f64);
                    for j in 1..=k {
                        let m = k - j;
                        let jf = B::from_f64(j as f64);
                        let b_m = if m == 0 { B::one() + taylor.coeff(u_idx, 0) } else { taylor.coeff(u_idx, m) };
                        bar.add_operand(x, j, jf * bar_tk * b_m);
                        let xj = x.coeff(taylor, j);
                        if m == 0 {
                            bar.add(u_idx, 0, jf * bar_tk * xj);
                        } else {
                            bar.add(u_idx, m, jf * bar_tk * xj);
                        }
                    }
                }
                if order > 0 {
                    let t0 = taylor.coeff(t, 0);
                    let u0 = taylor.coeff(u_idx, 0);
                    bar.add(t, 0, bar.get(u_idx, 0) * (t0 + t0));
                    bar.add_operand(x, 0, bar.get(t, 0) * (B::one() + u0));
                }
            }
            OpId::Tanh => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let (t, v_idx) = (z, z + 1);
                for k in (1..order).rev() {
                    // undo v_k = -sum_{j=0}^k t_j t_{k-j} into bar[t]
                    let bar_vk = bar.get(v_idx, k);
                    for m in 0..=k {
                        let t_term = taylor.coeff(t, k - m);
                        bar.add(t, m, -bar_vk * (t_term + t_term));
                    }
                    // undo t_k = (1/k) sum_{j=1}^k j x_j v_{k-j}
                    let bar_tk = bar.get(t, k) / B::from_f64(k as f64);
                    for j in 1..=k {
                        let m = k - j;
                        let jf = B::from_f64(j as f64);
                        bar.add_operand(x, j, jf * bar_tk * taylor.coeff(v_idx, m));
                        bar.add(v_idx, m, jf * bar_tk * x.coeff(taylor, j));
                    }
                }
                if order > 0 {
                    let t0 = taylor.coeff(t, 0);
                    let v0 = taylor.coeff(v_idx, 0);
                    bar.add(t, 0, -bar.get(v_idx, 0) * (t0 + t0));
                    bar.add_operand(x, 0, bar.get(t, 0) * v0);
                }
            }
            OpId::Asin | OpId::Acos => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let (y, c) = (z, z + 1);
                let shape = if op == OpId::Asin { ASIN_SHAPE } else { ACOS_SHAPE };
                for k in (1..order).rev() {
                    quotient_reverse(&mut bar, taylor, x, y, c, shape, k);
                    let bar_wk = sqrt_self_reverse(&mut bar, taylor, c, k);
                    square_coeff_reverse(&mut bar, taylor, x, bar_wk, -1.0, k);
                }
                if order > 0 {
                    let c0 = taylor.coeff(c, 0);
                    bar.add_operand(x, 0, bar.get(y, 0) * B::from_f64(shape.sigma) / c0);
                    let x0 = x.coeff(taylor, 0);
                    bar.add_operand(x, 0, bar.get(c, 0) * (-x0) / c0);
                }
            }
            OpId::Asinh | OpId::Acosh => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let (y, c) = (z, z + 1);
                for k in (1..order).rev() {
                    quotient_reverse(&mut bar, taylor, x, y, c, ASINH_SHAPE, k);
                    let bar_wk = sqrt_self_reverse(&mut bar, taylor, c, k);
                    square_coeff_reverse(&mut bar, taylor, x, bar_wk, 1.0, k);
                }
                if order > 0 {
                    let c0 = taylor.coeff(c, 0);
                    bar.add_operand(x, 0, bar.get(y, 0) / c0);
                    let x0 = x.coeff(taylor, 0);
                    bar.add_operand(x, 0, bar.get(c, 0) * x0 / c0);
                }
            }
            OpId::Atan => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let (y, w) = (z, z + 1);
                for k in (1..order).rev() {
                    quotient_reverse(&mut bar, taylor, x, y, w, ATAN_SHAPE, k);
                    let bar_wk = bar.get(w, k);
                    square_coeff_reverse(&mut bar, taylor, x, bar_wk, 1.0, k);
                }
                if order > 0 {
                    let w0 = taylor.coeff(w, 0);
                    bar.add_operand(x, 0, bar.get(y, 0) / w0);
                    let x0 = x.coeff(taylor, 0);
                    bar.add_operand(x, 0, bar.get(w, 0) * (x0 + x0));
                }
            }
            OpId::Atanh => {
                let x = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let (y, w) = (z, z + 1);
                for k in (1..order).rev() {
                    quotient_reverse(&mut bar, taylor, x, y, w, ATANH_SHAPE, k);
                    let bar_wk = bar.get(w, k);
                    square_coeff_reverse(&mut bar, taylor, x, bar_wk, -1.0, k);
                }
                if order > 0 {
                    let w0 = taylor.coeff(w, 0);
                    bar.add_operand(x, 0, bar.get(y, 0) / w0);
                    let x0 = x.coeff(taylor, 0);
                    bar.add_operand(x, 0, bar.get(w, 0) * (-(x0 + x0)));
                }
            }
            op if is_cond_exp(op) => {
                let left = Operand::from_arg(tape, info.args[0], info.arg_type[0]);
                let right = Operand::from_arg(tape, info.args[1], info.arg_type[1]);
                let if_true = Operand::from_arg(tape, info.args[2], info.arg_type[2]);
                let if_false = Operand::from_arg(tape, info.args[3], info.arg_type[3]);
                let take_true = cond_take_true::<B>(op, left.coeff(taylor, 0), right.coeff(taylor, 0));
                for k in 0..order {
                    let bar_zk = bar.get(z, k);
                    if take_true {
                        bar.add_operand(if_true, k, bar_zk);
                    } else {
                        bar.add_operand(if_false, k, bar_zk);
                    }
                }
            }
            OpId::Eq | OpId::Lt | OpId::Le => {}
            OpId::VecLoad => {
                if let Some(owner) = vec_load_source[i] {
                    for k in 0..order {
                        bar.add_operand(owner, k, bar.get(z, k));
                    }
                }
            }
            OpId::VecStore => {
                let value = Operand::from_arg(tape, info.args[2], info.arg_type[2]);
                for k in 0..order {
                    bar.add_operand(value, k, bar.get(z, k));
                }
            }
            _ => unreachable!("reverse: unhandled opcode {op:?}"),
        }
        if trace {
            println!("{i}, {}", op.name());
        }
    }

    let mut dx = Vec::with_capacity(tape.num_domain() * order);
    for &vid in tape.ind_taddr() {
        for k in 0..order {
            dx.push(bar.get(vid as usize, k));
        }
    }

    if trace {
        println!("End Trace: reverse");
    }
    dx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::ad_fun;
    use crate::record::independent;

    #[test]
    fn s4_division_reverse() {
        // S4: y = 1/x at x0 = 2 => reverse(1, [1]) = [-1/4].
        let ax = independent::<f64>(&[2.0]);
        let ay = vec![crate::ad::AD::from(1.0f64) / ax[0]];
        let mut f = ad_fun(&ay);
        let _ = f.forward(0, &[2.0]);
        let dx = f.reverse(1, &[1.0]);
        assert!((dx[0] - (-0.25)).abs() < 1e-12);
    }

    #[test]
    fn round_trip_matches_column_wise_forward() {
        // f(x,y) = x*y + sin(x); reverse(1, e_i) matches forward(1, e_j)
        // column-wise for the Jacobian.
        let ax = independent::<f64>(&[2.0, 3.0]);
        let ay = vec![ax[0] * ax[1] + ax[0].sin()];
        let mut f = ad_fun(&ay);
        let _ = f.forward(0, &[2.0, 3.0]);
        let dx = f.reverse(1, &[1.0]);
        let mut fwd0 = ad_fun(&ay);
        let _ = fwd0.forward(0, &[2.0, 3.0]);
        let dcol0 = fwd0.forward(1, &[1.0, 0.0]);
        let mut fwd1 = ad_fun(&ay);
        let _ = fwd1.forward(0, &[2.0, 3.0]);
        let dcol1 = fwd1.forward(1, &[0.0, 1.0]);
        assert!((dx[0] - dcol0[0]).abs() < 1e-10);
        assert!((dx[1] - dcol1[0]).abs() < 1e-10);
    }

    #[test]
    fn linearity_of_reverse() {
        let ax = independent::<f64>(&[2.0, 3.0]);
        let ay = vec![ax[0] * ax[1], ax[0] + ax[1]];
        let mut f = ad_fun(&ay);
        let _ = f.forward(0, &[2.0, 3.0]);
        let dx1 = f.reverse(1, &[1.0, 0.0]);
        let dx2 = f.reverse(1, &[0.0, 1.0]);
        let alpha = 2.0;
        let beta = 5.0;
        let dx_combo = f.reverse(1, &[alpha, beta]);
        for j in 0..2 {
            let expect = alpha * dx1[j] + beta * dx2[j];
            assert!((dx_combo[j] - expect).abs() < 1e-10);
        }
    }

    #[test]
    fn s1_acosh_round_trip_reverse() {
        let ax = independent::<f64>(&[0.5]);
        let ay = vec![ax[0].cosh().acosh()];
        let mut f = ad_fun(&ay);
        for order in 0..5 {
            let u = if order == 0 { vec![0.5] } else { vec![0.0] };
            let _ = f.forward(order, &u);
        }
        let dx = f.reverse(5, &[1.0, 0.0, 0.0, 0.0, 0.0]);
        let expect = [1.0, 0.0, 0.0, 0.0, 0.0];
        for k in 0..5 {
            assert!((dx[k] - expect[k]).abs() < 200.0 * f64::EPSILON, "order {k}: {} vs {}", dx[k], expect[k]);
        }
    }
}
