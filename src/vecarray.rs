// SPDX-License-Identifier: EPL-2.0 OR GPL-2.0-or-later
// SPDX-FileCopyrightText: tapead contributors
// SPDX-FileContributor: 2026 tapead contributors
//
//! Array-on-tape: a fixed-length array of `AD<B>` values addressable by
//! a (possibly variable) index.
//!
//! Link to [parent module](super)
//!
//! [OpId::VecLoad] and [OpId::VecStore] carry the array's pool index as
//! their first argument slot and the element index as their second;
//! that pool index is never resolved through the parameter pool or the
//! variable list, so it is recorded with a placeholder [ArgKind::Par]
//! that the sweeps never interpret as such (§3 "array-on-tape").
//! `VecStore` allocates one result variable per §op-catalog arity, a
//! copy of the stored value, so that a later `VecLoad` addressing the
//! same slot has a tape variable to depend on even when the index
//! itself is a variable (the load/store pair cannot be resolved to a
//! fixed variable at record time in that case).

use crate::ad::{arg_slot, AD};
use crate::op::{ArgKind, OpId};
use crate::record::sealed::ThisThreadRecorder;
use crate::record::{current_tape_id, is_recording, push_array, push_op, read_array, write_array};
use crate::scalar::Scalar;

/// A handle to one array declared on the active recording.
#[derive(Clone, Copy, Debug)]
pub struct VecArrayHandle {
    array_id: u32,
    len: usize,
}

/// Declares a new on-tape array, initialized to `init`'s order-0 values.
///
/// Must be called while a recording is active; panics otherwise.
pub fn new_array<B>(init: &[AD<B>]) -> VecArrayHandle
where
    B: Scalar + ThisThreadRecorder,
{
    assert!(is_recording::<B>(), "new_array: no recording is active on this thread");
    let values: Vec<B> = init.iter().map(AD::value).collect();
    let len = values.len();
    let array_id = push_array::<B>(values);
    VecArrayHandle { array_id, len }
}

fn index_to_slot<B: Scalar>(index: &AD<B>) -> usize {
    let f = index.value().to_f64();
    assert!(f >= 0.0 && f.fract() == 0.0, "array index must be a nonnegative integer");
    f as usize
}

impl VecArrayHandle {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads the element `index` currently addresses, recording a
    /// [OpId::VecLoad].
    pub fn load<B>(&self, index: AD<B>) -> AD<B>
    where
        B: Scalar + ThisThreadRecorder,
    {
        let slot = index_to_slot(&index);
        assert!(slot < self.len, "VecLoad index out of range");
        let value = read_array::<B>(self.array_id as usize, slot);
        let (idx_arg, idx_kind) = arg_slot(&index);
        let res = push_op::<B>(
            OpId::VecLoad,
            &[(self.array_id, ArgKind::Par), (idx_arg, idx_kind)],
        );
        let tape_id = current_tape_id::<B>().unwrap();
        AD::variable(tape_id, res, value)
    }

    /// Writes `value` to the element `index` currently addresses,
    /// recording a [OpId::VecStore].
    pub fn store<B>(&self, index: AD<B>, value: AD<B>)
    where
        B: Scalar + ThisThreadRecorder,
    {
        let slot = index_to_slot(&index);
        assert!(slot < self.len, "VecStore index out of range");
        write_array::<B>(self.array_id as usize, slot, value.value());
        let (idx_arg, idx_kind) = arg_slot(&index);
        let (val_arg, val_kind) = arg_slot(&value);
        push_op::<B>(
            OpId::VecStore,
            &[(self.array_id, ArgKind::Par), (idx_arg, idx_kind), (val_arg, val_kind)],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{independent, stop};

    #[test]
    fn load_after_store_sees_the_new_value() {
        let ax = independent::<f64>(&[10.0, 11.0]);
        let arr = new_array(&ax);
        arr.store(AD::from(0.0f64), AD::from(99.0));
        let loaded = arr.load(AD::from(0.0f64));
        assert_eq!(loaded.value(), 99.0);
        let tape = stop(&[loaded]);
        assert_eq!(tape.num_vec_array(), 1);
        assert_eq!(tape.vec_array_init(0), &[10.0, 11.0]);
    }

    #[test]
    fn variable_index_load_records_the_live_operand() {
        let ax = independent::<f64>(&[5.0, 6.0, 7.0]);
        let arr = new_array(&ax);
        let loaded = arr.load(AD::from(2.0f64));
        assert_eq!(loaded.value(), 7.0);
        let _ = stop(&[loaded]);
    }
}
