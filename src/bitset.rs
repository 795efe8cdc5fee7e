//! Atomic membership bitsets and the growable parallel scratch array.
//!
//! These are the shared-memory primitives the streaming layer leans on:
//! delta-chain readers use a bitset to resolve head-wins duplicates, matrix
//! deltas use the sparse row-to-bitset map, and the collect/reduce pipeline
//! helpers use [`ParallelArray`] as a per-batch scratch slot written
//! concurrently and consumed in order.

use crate::index::Ix;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{OnceLock, RwLock};

const WORD: usize = 64;

/// A word-packed membership set with atomic insertion.
///
/// `set` is safe under concurrency (atomic or); `clr` is reserved for
/// single-threaded sections and takes `&mut self` to make that explicit.
#[derive(Debug)]
pub struct AtomicBitset {
    words: Vec<AtomicU64>,
    len: usize,
}

impl AtomicBitset {
    /// An empty set over the domain `0..len`.
    pub fn new(len: usize) -> Self {
        let n = len.div_ceil(WORD);
        AtomicBitset {
            words: (0..n).map(|_| AtomicU64::new(0)).collect(),
            len,
        }
    }

    /// Domain size.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the domain is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert `i`; returns `true` when the bit was newly set.
    pub fn set(&self, i: usize) -> bool {
        debug_assert!(i < self.len);
        let bit = 1u64 << (i % WORD);
        let prev = self.words[i / WORD].fetch_or(bit, Ordering::AcqRel);
        prev & bit == 0
    }

    /// Membership test.
    pub fn get(&self, i: usize) -> bool {
        debug_assert!(i < self.len);
        self.words[i / WORD].load(Ordering::Acquire) & (1u64 << (i % WORD)) != 0
    }

    /// Remove `i`. Single-threaded sections only.
    pub fn clr(&mut self, i: usize) {
        debug_assert!(i < self.len);
        let w = self.words[i / WORD].get_mut();
        *w &= !(1u64 << (i % WORD));
    }

    /// Word-parallel union of `other` into `self`.
    ///
    /// The domains must match.
    pub fn or_with(&self, other: &AtomicBitset) {
        debug_assert_eq!(self.len, other.len);
        for (w, o) in self.words.iter().zip(&other.words) {
            let bits = o.load(Ordering::Acquire);
            if bits != 0 {
                w.fetch_or(bits, Ordering::AcqRel);
            }
        }
    }

    /// Present members in ascending order.
    pub fn to_slice(&self) -> Vec<Ix> {
        let mut out = Vec::new();
        for (wi, w) in self.words.iter().enumerate() {
            let mut bits = w.load(Ordering::Acquire);
            while bits != 0 {
                let b = bits.trailing_zeros() as usize;
                out.push((wi * WORD + b) as Ix);
                bits &= bits - 1;
            }
        }
        out
    }
}

/// A sparse matrix membership set: a map from row to a row bitset.
#[derive(Debug)]
pub struct MatrixBitset {
    rows: RwLock<BTreeMap<Ix, AtomicBitset>>,
    ncols: usize,
}

impl MatrixBitset {
    /// An empty set over `ncols` columns.
    pub fn new(ncols: usize) -> Self {
        MatrixBitset {
            rows: RwLock::new(BTreeMap::new()),
            ncols,
        }
    }

    /// Insert `(r, c)`; returns `true` when newly set.
    pub fn set(&self, r: Ix, c: usize) -> bool {
        {
            let rows = self.rows.read().expect("matrix bitset lock");
            if let Some(row) = rows.get(&r) {
                return row.set(c);
            }
        }
        let mut rows = self.rows.write().expect("matrix bitset lock");
        rows.entry(r)
            .or_insert_with(|| AtomicBitset::new(self.ncols))
            .set(c)
    }

    /// Membership test.
    pub fn get(&self, r: Ix, c: usize) -> bool {
        let rows = self.rows.read().expect("matrix bitset lock");
        rows.get(&r).map(|row| row.get(c)).unwrap_or(false)
    }

    /// Union of `other` into `self`, merging row-by-row with the vector
    /// bitset's or.
    pub fn or_with(&self, other: &MatrixBitset) {
        let theirs = other.rows.read().expect("matrix bitset lock");
        for (&r, row) in theirs.iter() {
            {
                let rows = self.rows.read().expect("matrix bitset lock");
                if let Some(mine) = rows.get(&r) {
                    mine.or_with(row);
                    continue;
                }
            }
            let mut rows = self.rows.write().expect("matrix bitset lock");
            rows.entry(r)
                .or_insert_with(|| AtomicBitset::new(self.ncols))
                .or_with(row);
        }
    }
}

/// A lock-protected growable slot vector written concurrently by pipeline
/// workers and drained in order afterwards.
///
/// `set` takes the read lock on the fast path; a per-slot once-cell records
/// presence. Growth doubles capacity under the write lock.
#[derive(Debug)]
pub struct ParallelArray<T> {
    slots: RwLock<Vec<OnceLock<T>>>,
}

impl<T> ParallelArray<T> {
    /// An empty array.
    pub fn new() -> Self {
        ParallelArray {
            slots: RwLock::new(Vec::new()),
        }
    }

    /// Store `v` at slot `i`. The first write to a slot wins; slots are
    /// written at most once per pipeline run.
    pub fn set(&self, i: usize, v: T) {
        {
            let slots = self.slots.read().expect("parallel array lock");
            if i < slots.len() {
                let _ = slots[i].set(v);
                return;
            }
        }
        let mut slots = self.slots.write().expect("parallel array lock");
        let mut cap = slots.len().max(4);
        while cap <= i {
            cap *= 2;
        }
        while slots.len() < cap {
            slots.push(OnceLock::new());
        }
        let _ = slots[i].set(v);
    }

    /// Consume all slots in index order, yielding only the present ones.
    pub fn drain(self) -> impl Iterator<Item = T> {
        self.slots
            .into_inner()
            .expect("parallel array lock")
            .into_iter()
            .filter_map(|cell| cell.into_inner())
    }
}

impl<T> Default for ParallelArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitset_set_get_clr() {
        let mut b = AtomicBitset::new(130);
        assert!(b.set(0));
        assert!(b.set(129));
        assert!(!b.set(129));
        assert!(b.get(0) && b.get(129) && !b.get(64));
        b.clr(0);
        assert!(!b.get(0));
        assert_eq!(b.to_slice(), vec![129]);
    }

    #[test]
    fn bitset_or_is_wordwise() {
        let a = AtomicBitset::new(80);
        let b = AtomicBitset::new(80);
        a.set(3);
        b.set(3);
        b.set(70);
        a.or_with(&b);
        assert_eq!(a.to_slice(), vec![3, 70]);
    }

    #[test]
    fn matrix_bitset_merges_rows() {
        let a = MatrixBitset::new(10);
        let b = MatrixBitset::new(10);
        a.set(1, 2);
        b.set(1, 5);
        b.set(7, 0);
        a.or_with(&b);
        assert!(a.get(1, 2) && a.get(1, 5) && a.get(7, 0));
        assert!(!a.get(7, 1));
    }

    #[test]
    fn parallel_array_grows_and_drains_in_order() {
        let arr = ParallelArray::new();
        arr.set(5, "f");
        arr.set(0, "a");
        arr.set(17, "z");
        let got: Vec<_> = arr.drain().collect();
        assert_eq!(got, vec!["a", "f", "z"]);
    }

    #[test]
    fn concurrent_bitset_inserts() {
        use std::sync::Arc;
        let b = Arc::new(AtomicBitset::new(1024));
        std::thread::scope(|s| {
            for t in 0..4 {
                let b = Arc::clone(&b);
                s.spawn(move || {
                    for i in (t..1024).step_by(4) {
                        b.set(i);
                    }
                });
            }
        });
        assert_eq!(b.to_slice().len(), 1024);
    }
}
