// SPDX-License-Identifier: EPL-2.0 OR GPL-2.0-or-later
// SPDX-FileCopyrightText: tapead contributors
// SPDX-FileContributor: 2026 tapead contributors
//
//! The concrete scenarios S1-S6 (§8), at the whole-crate level.

use tapead::function::ad_fun;
use tapead::record::independent;
use tapead::sparsity::PackSetVec;

const EPS: f64 = f64::EPSILON;

/// S1: `y = acosh(cosh(x))` at `x0 = 0.5`.
#[test]
fn s1_acosh_round_trip() {
    let ax = independent::<f64>(&[0.5]);
    let ay = vec![ax[0].cosh().acosh()];
    let mut f = ad_fun(&ay);

    let y0 = f.forward(0, &[0.5]);
    assert!((y0[0] - 0.5).abs() < 200.0 * EPS);

    let y1 = f.forward(1, &[1.0]);
    assert!((y1[0] - 1.0).abs() < 200.0 * EPS);

    for _ in 2..=4 {
        let yk = f.forward(f.taylor_size(), &[0.0]);
        assert!(yk[0].abs() < 200.0 * EPS);
    }

    let dx = f.reverse(5, &[1.0, 0.0, 0.0, 0.0, 0.0]);
    assert_eq!(dx.len(), 5);
    assert!((dx[0] - 1.0).abs() < 200.0 * EPS);
    for k in 1..5 {
        assert!(dx[k].abs() < 200.0 * EPS);
    }
}

/// S2: `f(x, p) = sign(p0) + sign(x0) + sign(c0)`, `c0 = -0.1` constant,
/// `p0 = 0.2` a dynamic parameter, `x0 = 0.3` independent.
#[test]
fn s2_sign_graph() {
    let ax = independent::<f64>(&[0.3]);
    let p0 = tapead::AD::from(0.2f64);
    let c0 = tapead::AD::from(-0.1f64);
    let ay = vec![p0.sign() + ax[0].sign() + c0.sign()];
    let mut f = ad_fun(&ay);
    let y = f.forward(0, &[0.3]);
    assert!((y[0] - 1.0).abs() < EPS);
}

/// S3: `y = x * x` at `x0 = 3`.
#[test]
fn s3_multiplication_taylor() {
    let ax = independent::<f64>(&[3.0]);
    let ay = vec![ax[0] * ax[0]];
    let mut f = ad_fun(&ay);
    assert_eq!(f.forward(0, &[3.0]), vec![9.0]);
    assert_eq!(f.forward(1, &[1.0]), vec![6.0]);
    assert_eq!(f.forward(2, &[0.0]), vec![1.0]);
    assert_eq!(f.forward(3, &[0.0]), vec![0.0]);
}

/// S4: `y = 1 / x` at `x0 = 2`.
#[test]
fn s4_division_reverse() {
    let ax = independent::<f64>(&[2.0]);
    let ay = vec![tapead::AD::from(1.0f64) / ax[0]];
    let mut f = ad_fun(&ay);
    let _ = f.forward(0, &[2.0]);
    let dx = f.reverse(1, &[1.0]);
    assert!((dx[0] - (-0.25)).abs() < EPS);
}

/// S5: `f(x1,x2,x3) = (x1*x3, x2+x3)`; `for_sparse_jac(3, I3)` is
/// `{(0,0),(0,2),(1,1),(1,2)}`.
#[test]
fn s5_sparsity_jacobian() {
    let ax = independent::<f64>(&[1.0, 2.0, 3.0]);
    let ay = vec![ax[0] * ax[2], ax[1] + ax[2]];
    let f = ad_fun(&ay);
    let mut r = PackSetVec::new();
    r.resize(3, 3);
    for j in 0..3 {
        r.add_element(j, j);
    }
    let jac = f.for_sparse_jac(3, &r);
    let mut pattern: Vec<(usize, usize)> = Vec::new();
    for i in 0..f.range() {
        for j in jac.iter_row(i) {
            pattern.push((i, j));
        }
    }
    pattern.sort();
    assert_eq!(pattern, vec![(0, 0), (0, 2), (1, 1), (1, 2)]);
}

/// S6: `pack_setvec` iteration, at the public API surface.
#[test]
fn s6_pack_setvec_iteration() {
    let mut pv = PackSetVec::new();
    pv.resize(2, 70);
    pv.add_element(0, 0);
    pv.add_element(0, 65);
    pv.add_element(1, 3);
    assert_eq!(pv.iter_row(0).collect::<Vec<_>>(), vec![0, 65]);
    assert_eq!(pv.iter_row(1).collect::<Vec<_>>(), vec![3]);
    assert_eq!(pv.number_elements(0), 2);
}
