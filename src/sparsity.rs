// SPDX-License-Identifier: EPL-2.0 OR GPL-2.0-or-later
// SPDX-FileCopyrightText: tapead contributors
// SPDX-FileContributor: 2026 tapead contributors
//
//! `pack_setvec`: a packed-bitset vector-of-sets, the transport type for
//! every sparsity pattern the sweeps compute.
//!
//! Link to [parent module](super)
//!
//! Represents a logical `n_set x end` bit matrix packed into machine
//! words, with per-row union / intersection / assignment / element
//! count / ascending iteration. A `vec_set`-style union-of-immutable-sets
//! representation is a structurally different fit for its own use case
//! (a Jacobian-sparsity forward sweep that never mutates a set once
//! built) and is not reused here -- `pack_setvec`'s rows are mutated in
//! place by `binary_union`/`binary_intersection`, which that representation
//! cannot do without rebuilding a new set id each time. See DESIGN.md.

const WORD_BITS: usize = usize::BITS as usize;

/// Packed `n_set x end` bit matrix.
///
/// Deliberately not `Clone`/`Copy`: §4.5 calls copy-by-value "a
/// programming error" and requires [PackSetVec::assignment] instead.
pub struct PackSetVec {
    n_set: usize,
    end: usize,
    words_per_row: usize,
    data: Vec<usize>,
}

impl PackSetVec {
    /// An empty matrix (`n_set == 0`, `end == 0`).
    pub fn new() -> Self {
        PackSetVec { n_set: 0, end: 0, words_per_row: 0, data: Vec::new() }
    }

    /// Reallocates to `n_set` rows of logical length `end`, zeroed.
    pub fn resize(&mut self, n_set: usize, end: usize) {
        self.n_set = n_set;
        self.end = end;
        self.words_per_row = end.div_ceil(WORD_BITS);
        self.data = vec![0usize; n_set * self.words_per_row];
    }

    pub fn n_set(&self) -> usize {
        self.n_set
    }

    pub fn end(&self) -> usize {
        self.end
    }

    fn row_range(&self, i: usize) -> std::ops::Range<usize> {
        let start = i * self.words_per_row;
        start..start + self.words_per_row
    }

    /// Sets bit `(i, j)`; idempotent.
    pub fn add_element(&mut self, i: usize, j: usize) {
        debug_assert!(i < self.n_set && j < self.end);
        let word = i * self.words_per_row + j / WORD_BITS;
        self.data[word] |= 1usize << (j % WORD_BITS);
    }

    /// Same contract as [PackSetVec::add_element]; this implementation
    /// applies the element immediately, so `process_post` is a no-op --
    /// §4.5 only requires that posted elements be visible *by the time*
    /// `process_post` returns, not that they be deferred.
    pub fn post_element(&mut self, i: usize, j: usize) {
        self.add_element(i, j);
    }

    /// See [PackSetVec::post_element].
    pub fn process_post(&mut self, _i: usize) {}

    pub fn is_element(&self, i: usize, j: usize) -> bool {
        debug_assert!(i < self.n_set && j < self.end);
        let word = self.data[i * self.words_per_row + j / WORD_BITS];
        (word >> (j % WORD_BITS)) & 1 == 1
    }

    pub fn number_elements(&self, i: usize) -> usize {
        self.data[self.row_range(i)]
            .iter()
            .map(|w| w.count_ones() as usize)
            .sum()
    }

    /// Ascending element indices of row `i`, each exactly once.
    pub fn iter_row(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        let words_per_row = self.words_per_row;
        let end = self.end;
        let row = &self.data[self.row_range(i)];
        (0..words_per_row).flat_map(move |w| {
            let mut bits = row[w];
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let b = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                let j = w * WORD_BITS + b;
                if j < end { Some(j) } else { None }
            })
        })
    }

    pub fn clear(&mut self, i: usize) {
        for w in self.row_range(i) {
            self.data[w] = 0;
        }
    }

    /// `self` row `t` becomes a copy of `other` row `v` (§4.5
    /// "Non-copyable by value" -- this is the sanctioned substitute for
    /// whole-value `Clone`).
    pub fn assignment(&mut self, t: usize, other: &PackSetVec, v: usize) {
        debug_assert_eq!(self.words_per_row, other.words_per_row);
        let src = other.row_range(v);
        let dst_start = t * self.words_per_row;
        self.data[dst_start..dst_start + self.words_per_row]
            .copy_from_slice(&other.data[src]);
    }

    /// `self` row `t` becomes the union of `other` rows `l` and `r`.
    pub fn binary_union(&mut self, t: usize, other: &PackSetVec, l: usize, r: usize) {
        debug_assert_eq!(self.words_per_row, other.words_per_row);
        let lr = other.row_range(l);
        let rr = other.row_range(r);
        let dst_start = t * self.words_per_row;
        for w in 0..self.words_per_row {
            self.data[dst_start + w] = other.data[lr.start + w] | other.data[rr.start + w];
        }
    }

    /// `self` row `t` becomes the intersection of `other` rows `l` and `r`.
    pub fn binary_intersection(&mut self, t: usize, other: &PackSetVec, l: usize, r: usize) {
        debug_assert_eq!(self.words_per_row, other.words_per_row);
        let lr = other.row_range(l);
        let rr = other.row_range(r);
        let dst_start = t * self.words_per_row;
        for w in 0..self.words_per_row {
            self.data[dst_start + w] = other.data[lr.start + w] & other.data[rr.start + w];
        }
    }

    /// Unions `other` row `v` directly into `self` row `t`, in place
    /// (used by the sparsity sweeps to accumulate a result row from
    /// several argument rows one at a time).
    pub fn union_into(&mut self, t: usize, other: &PackSetVec, v: usize) {
        debug_assert_eq!(self.words_per_row, other.words_per_row);
        let src = other.row_range(v);
        let dst_start = t * self.words_per_row;
        for w in 0..self.words_per_row {
            self.data[dst_start + w] |= other.data[src.start + w];
        }
    }

    /// Unions row `v` into row `t` within this same matrix -- the
    /// sparsity sweeps need this often (a companion pair folding into
    /// its primary, an argument accumulating a result's row) and the
    /// borrow checker can't see that two row indices of the same
    /// `PackSetVec` don't alias, so [PackSetVec::union_into] (which
    /// takes a second, separate matrix) can't be called with `self`
    /// passed as its own `other`.
    pub fn union_into_self(&mut self, t: usize, v: usize) {
        if t == v {
            return;
        }
        let wpr = self.words_per_row;
        let src: Vec<usize> = self.data[v * wpr..v * wpr + wpr].to_vec();
        let dst_start = t * wpr;
        for (w, word) in src.into_iter().enumerate() {
            self.data[dst_start + w] |= word;
        }
    }

    pub fn swap(&mut self, other: &mut PackSetVec) {
        std::mem::swap(&mut self.n_set, &mut other.n_set);
        std::mem::swap(&mut self.end, &mut other.end);
        std::mem::swap(&mut self.words_per_row, &mut other.words_per_row);
        std::mem::swap(&mut self.data, &mut other.data);
    }

    /// Bytes of backing storage, for the same diagnostic purpose as the
    /// library's own memory-tracking hooks (out of scope here; this is
    /// just a number, not a registration with any global allocator
    /// tracker).
    pub fn memory(&self) -> usize {
        self.data.len() * std::mem::size_of::<usize>()
    }
}

impl Default for PackSetVec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S6: `resize(2, 70)`, `add_element(0,0)`, `add_element(0,65)`,
    /// `add_element(1,3)`; row 0 iterates `0, 65`; row 1 iterates `3`;
    /// `number_elements(0) == 2`.
    #[test]
    fn s6_pack_setvec_iteration() {
        let mut pv = PackSetVec::new();
        pv.resize(2, 70);
        pv.add_element(0, 0);
        pv.add_element(0, 65);
        pv.add_element(1, 3);
        let row0: Vec<usize> = pv.iter_row(0).collect();
        assert_eq!(row0, vec![0, 65]);
        let row1: Vec<usize> = pv.iter_row(1).collect();
        assert_eq!(row1, vec![3]);
        assert_eq!(pv.number_elements(0), 2);
        assert_eq!(pv.number_elements(1), 1);
    }

    #[test]
    fn add_element_is_idempotent() {
        let mut pv = PackSetVec::new();
        pv.resize(1, 10);
        pv.add_element(0, 4);
        pv.add_element(0, 4);
        assert_eq!(pv.number_elements(0), 1);
        assert!(pv.is_element(0, 4));
    }

    #[test]
    fn binary_union_is_commutative_and_idempotent() {
        let mut src = PackSetVec::new();
        src.resize(3, 20);
        src.add_element(0, 1);
        src.add_element(0, 5);
        src.add_element(1, 5);
        src.add_element(1, 9);
        //
        let mut ab = PackSetVec::new();
        ab.resize(1, 20);
        ab.binary_union(0, &src, 0, 1);
        let mut ba = PackSetVec::new();
        ba.resize(1, 20);
        ba.binary_union(0, &src, 1, 0);
        assert_eq!(ab.iter_row(0).collect::<Vec<_>>(), ba.iter_row(0).collect::<Vec<_>>());
        //
        src.assignment(2, &ab, 0);
        let mut idem = PackSetVec::new();
        idem.resize(1, 20);
        idem.binary_union(0, &src, 2, 2);
        assert_eq!(idem.iter_row(0).collect::<Vec<_>>(), ab.iter_row(0).collect::<Vec<_>>());
    }

    #[test]
    fn binary_intersection_basic() {
        let mut src = PackSetVec::new();
        src.resize(2, 10);
        src.add_element(0, 1);
        src.add_element(0, 2);
        src.add_element(1, 2);
        src.add_element(1, 3);
        let mut out = PackSetVec::new();
        out.resize(1, 10);
        out.binary_intersection(0, &src, 0, 1);
        assert_eq!(out.iter_row(0).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn number_elements_matches_iteration_count() {
        let mut pv = PackSetVec::new();
        pv.resize(1, 200);
        for j in [0usize, 63, 64, 127, 199] {
            pv.add_element(0, j);
        }
        assert_eq!(pv.number_elements(0), pv.iter_row(0).count());
    }
}
