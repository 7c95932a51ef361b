// SPDX-License-Identifier: EPL-2.0 OR GPL-2.0-or-later
// SPDX-FileCopyrightText: tapead contributors
// SPDX-FileContributor: 2026 tapead contributors
//
//! Hash-consed pool of parameter values.
//!
//! Link to [parent module](super)
//!
//! A tape's parameter pool deduplicates equal bit-patterns of `B`: the
//! same numeric value recorded twice is stored once and both
//! occurrences address the same pool index. Deduplication is by
//! *bit* pattern (see [crate::scalar::Scalar::bit_key]), not by
//! mathematical value, so `+0.0` and `-0.0` occupy distinct entries,
//! as do distinct NaN payloads.
//!
//! The pool is read-only once [crate::record] finalizes a tape
//! (§5 "shared resources"): a finished [ParamPool] is safe for
//! concurrent readers.

use crate::scalar::Scalar;
use rustc_hash::FxHashMap;

/// A deduplicated store of parameter (constant) values.
#[derive(Clone, Debug)]
pub struct ParamPool<B> {
    values: Vec<B>,
    index: FxHashMap<u64, usize>,
}

impl<B: Scalar> Default for ParamPool<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Scalar> ParamPool<B> {
    pub fn new() -> Self {
        ParamPool { values: Vec::new(), index: FxHashMap::default() }
    }

    /// Looks up `value`'s bit pattern in the pool, inserting a fresh
    /// entry if this exact bit pattern has not been seen before.
    /// Returns the (possibly pre-existing) pool index.
    pub fn get_or_insert(&mut self, value: B) -> usize {
        let key = value.bit_key();
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let i = self.values.len();
        self.values.push(value);
        self.index.insert(key, i);
        i
    }

    pub fn value(&self, index: usize) -> B {
        self.values[index]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_values_dedup_to_one_index() {
        let mut pool: ParamPool<f64> = ParamPool::new();
        let a = pool.get_or_insert(3.0);
        let b = pool.get_or_insert(3.0);
        assert_eq!(a, b);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn positive_and_negative_zero_are_distinct() {
        let mut pool: ParamPool<f64> = ParamPool::new();
        let pos = pool.get_or_insert(0.0);
        let neg = pool.get_or_insert(-0.0);
        assert_ne!(pos, neg);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn nan_gets_its_own_entry_each_time_it_differs_in_bits() {
        let mut pool: ParamPool<f64> = ParamPool::new();
        let a = pool.get_or_insert(f64::NAN);
        let b = pool.get_or_insert(f64::NAN);
        // the literal NAN constant has a fixed bit pattern, so these dedup
        assert_eq!(a, b);
        // a distinct NaN payload is a distinct bit pattern, so it is not
        // folded into the same entry the way value-equality would.
        let other = f64::from_bits(f64::NAN.to_bits() ^ 1);
        let c = pool.get_or_insert(other);
        assert_ne!(a, c);
        assert_eq!(pool.len(), 2);
    }
}
