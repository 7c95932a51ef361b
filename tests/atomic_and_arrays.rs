// SPDX-License-Identifier: EPL-2.0 OR GPL-2.0-or-later
// SPDX-FileCopyrightText: tapead contributors
// SPDX-FileContributor: 2026 tapead contributors
//
//! End-to-end coverage, through [tapead::function::AdFun], of the two
//! opaque-to-the-sweeps boundaries: atomic function calls (`User...User`
//! brackets) and on-tape arrays (`VecLoad`/`VecStore`).

use tapead::atomic::AtomicFunction;
use tapead::function::ad_fun;
use tapead::record::independent;
use tapead::sparsity::PackSetVec;
use tapead::vecarray::new_array;
use tapead::AD;

struct Square;

impl AtomicFunction<f64> for Square {
    fn n_in(&self) -> usize {
        1
    }
    fn n_out(&self) -> usize {
        1
    }
    fn forward(&self, order: usize, tx: &[f64], ty: &mut [f64]) -> bool {
        match order {
            0 => {
                ty[0] = tx[0] * tx[0];
                true
            }
            1 => {
                ty[0] = 2.0 * tx[0] * tx[1];
                true
            }
            _ => false,
        }
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
fn atomic_call_forward_and_reverse_through_ad_fun() {
    let ax = independent::<f64>(&[3.0]);
    let ay = tapead::atomic::call_atomic(Box::new(Square), &[ax[0]]);
    let mut f = ad_fun(&ay);

    let y0 = f.forward(0, &[3.0]);
    assert!((y0[0] - 9.0).abs() < 1e-12);

    let y1 = f.forward(1, &[1.0]);
    assert!((y1[0] - 6.0).abs() < 1e-12);

    let dx = f.reverse(1, &[1.0]);
    assert!((dx[0] - 6.0).abs() < 1e-12);
}

#[test]
fn atomic_call_sparsity_propagates_through_the_bracket() {
    let ax = independent::<f64>(&[1.0, 2.0]);
    let squared = tapead::atomic::call_atomic(Box::new(Square), &[ax[0]]);
    let ay = vec![squared[0] + ax[1]];
    let f = ad_fun(&ay);

    let mut r = PackSetVec::new();
    r.resize(2, 2);
    r.add_element(0, 0);
    r.add_element(1, 1);
    let jac = f.for_sparse_jac(2, &r);
    assert!(jac.is_element(0, 0));
    assert!(jac.is_element(0, 1));
}

#[test]
fn array_on_tape_round_trips_through_forward_and_reverse() {
    let ax = independent::<f64>(&[10.0, 20.0, 30.0]);
    let arr = new_array(&ax);
    arr.store(AD::from(1.0f64), ax[0] * 2.0);
    let loaded = arr.load(AD::from(1.0f64));
    let ay = vec![loaded + ax[2]];
    let mut f = ad_fun(&ay);
    assert!(f.use_vec_tape());

    let y0 = f.forward(0, &[10.0, 20.0, 30.0]);
    assert!((y0[0] - (10.0 * 2.0 + 30.0)).abs() < 1e-12);

    let y1 = f.forward(1, &[1.0, 0.0, 0.0]);
    assert!((y1[0] - 2.0).abs() < 1e-12);

    let dx = f.reverse(1, &[1.0]);
    assert!((dx[0] - 2.0).abs() < 1e-12);
    assert!(dx[1].abs() < 1e-12);
    assert!((dx[2] - 1.0).abs() < 1e-12);
}
