//! Sparse slices: the batched unit of data flowing through pipelines.
//!
//! A slice is a set of aligned columns — indices and values for vectors,
//! rows/cols/values for matrices — each held in a [`CowBuf`]. Buffers are
//! shared by `Arc` and carry a copy-on-write bit: splitting a slice shares
//! both buffers (both sides get the bit), and any mutator that would write a
//! shared buffer clones the live sub-range first and clears the bit. A
//! transform that leaves a column untouched leaves that column's sharing
//! state untouched.
//!
//! Keys are strictly increasing within a slice (index order for vectors,
//! lexicographic (row, col) for matrices); sources guarantee the same across
//! consecutive slices.

use crate::index::Ix;
use std::sync::Arc;

/// A shared, copy-on-write view over a `Vec<T>`.
///
/// The view may cover a sub-range of the backing buffer (the product of
/// splitting). Mutable access re-owns exactly the live sub-range.
#[derive(Clone, Debug)]
pub struct CowBuf<T> {
    data: Arc<Vec<T>>,
    /// `None` covers the whole buffer; `Some((lo, hi))` a sub-range.
    range: Option<(usize, usize)>,
    shared: bool,
}

impl<T: Clone> CowBuf<T> {
    /// Own a fresh buffer.
    pub fn new(v: Vec<T>) -> Self {
        CowBuf {
            data: Arc::new(v),
            range: None,
            shared: false,
        }
    }

    /// Borrow an existing shared buffer; the cow bit is set.
    pub fn from_arc(data: Arc<Vec<T>>) -> Self {
        CowBuf {
            data,
            range: None,
            shared: true,
        }
    }

    /// Borrow a sub-range of an existing shared buffer.
    pub fn from_arc_range(data: Arc<Vec<T>>, lo: usize, hi: usize) -> Self {
        debug_assert!(lo <= hi && hi <= data.len());
        CowBuf {
            data,
            range: Some((lo, hi)),
            shared: true,
        }
    }

    /// The live contents.
    pub fn as_slice(&self) -> &[T] {
        match self.range {
            None => &self.data,
            Some((lo, hi)) => &self.data[lo..hi],
        }
    }

    /// Number of live elements.
    pub fn len(&self) -> usize {
        match self.range {
            None => self.data.len(),
            Some((lo, hi)) => hi - lo,
        }
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the buffer is (possibly) shared with another slice.
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// Split the view at `at` (relative to the view); both halves share the
    /// backing buffer and carry the cow bit.
    pub fn split_at(&self, at: usize) -> (CowBuf<T>, CowBuf<T>) {
        let (lo, hi) = match self.range {
            None => (0, self.data.len()),
            Some(r) => r,
        };
        debug_assert!(at <= hi - lo);
        (
            CowBuf {
                data: Arc::clone(&self.data),
                range: Some((lo, lo + at)),
                shared: true,
            },
            CowBuf {
                data: Arc::clone(&self.data),
                range: Some((lo + at, hi)),
                shared: true,
            },
        )
    }

    /// Mutable access; clones the live sub-range first when the buffer is
    /// shared (and clears the bit).
    pub fn to_mut(&mut self) -> &mut Vec<T> {
        let whole = self.range.is_none();
        if self.shared || !whole || Arc::strong_count(&self.data) > 1 {
            let owned: Vec<T> = self.as_slice().to_vec();
            self.data = Arc::new(owned);
            self.range = None;
            self.shared = false;
        }
        Arc::get_mut(&mut self.data).expect("buffer uniquely owned after re-own")
    }
}

/* ===================== vector slices ===================== */

/// An ordered batch of (index, value) pairs.
#[derive(Clone, Debug)]
pub struct VecSlice<T> {
    /// Strictly increasing indices.
    pub idx: CowBuf<Ix>,
    /// Values aligned with `idx`.
    pub val: CowBuf<T>,
}

impl<T: Clone> VecSlice<T> {
    /// Own fresh index/value buffers.
    pub fn new(idx: Vec<Ix>, val: Vec<T>) -> Self {
        debug_assert_eq!(idx.len(), val.len());
        VecSlice {
            idx: CowBuf::new(idx),
            val: CowBuf::new(val),
        }
    }

    /// Share a window of existing storage (both cow bits set).
    pub fn shared(idx: Arc<Vec<Ix>>, val: Arc<Vec<T>>, lo: usize, hi: usize) -> Self {
        VecSlice {
            idx: CowBuf::from_arc_range(idx, lo, hi),
            val: CowBuf::from_arc_range(val, lo, hi),
        }
    }

    /// The empty slice.
    pub fn empty() -> Self {
        VecSlice::new(Vec::new(), Vec::new())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.idx.len()
    }

    /// Whether the slice has no entries.
    pub fn is_empty(&self) -> bool {
        self.idx.is_empty()
    }

    /// The index column.
    pub fn indices(&self) -> &[Ix] {
        self.idx.as_slice()
    }

    /// The value column.
    pub fn values(&self) -> &[T] {
        self.val.as_slice()
    }

    /// Smallest key, if any.
    pub fn first_key(&self) -> Option<Ix> {
        self.indices().first().copied()
    }

    /// Largest key, if any.
    pub fn last_key(&self) -> Option<Ix> {
        self.indices().last().copied()
    }

    /// Split into (head, tail) so that every head key is `< stop`.
    pub fn split_key(&self, stop: Ix) -> (VecSlice<T>, VecSlice<T>) {
        let at = self.indices().partition_point(|&i| i < stop);
        let (il, ir) = self.idx.split_at(at);
        let (vl, vr) = self.val.split_at(at);
        (VecSlice { idx: il, val: vl }, VecSlice { idx: ir, val: vr })
    }

    /// Keep entries satisfying the predicate.
    ///
    /// When nothing is dropped the slice passes through with its sharing
    /// state intact; otherwise both columns are freshly owned.
    pub fn retain(self, pred: impl Fn(Ix, &T) -> bool) -> VecSlice<T> {
        let keep_all = self
            .indices()
            .iter()
            .zip(self.values())
            .all(|(&i, v)| pred(i, v));
        if keep_all {
            return self;
        }
        let mut idx = Vec::with_capacity(self.len());
        let mut val = Vec::with_capacity(self.len());
        for (&i, v) in self.indices().iter().zip(self.values()) {
            if pred(i, v) {
                idx.push(i);
                val.push(v.clone());
            }
        }
        VecSlice::new(idx, val)
    }

    /// Transform values in place; the index column keeps its sharing state,
    /// the value column is freshly owned.
    pub fn map<U: Clone>(self, f: impl Fn(Ix, &T) -> U) -> VecSlice<U> {
        let val: Vec<U> = self
            .indices()
            .iter()
            .zip(self.values())
            .map(|(&i, v)| f(i, v))
            .collect();
        VecSlice {
            idx: self.idx,
            val: CowBuf::new(val),
        }
    }
}

/* ===================== matrix slices ===================== */

/// An ordered batch of (row, col, value) triples, lexicographic by (row, col).
#[derive(Clone, Debug)]
pub struct MatSlice<T> {
    /// Row coordinates.
    pub row: CowBuf<Ix>,
    /// Column coordinates aligned with `row`.
    pub col: CowBuf<Ix>,
    /// Values aligned with the coordinates.
    pub val: CowBuf<T>,
}

impl<T: Clone> MatSlice<T> {
    /// Own fresh buffers.
    pub fn new(row: Vec<Ix>, col: Vec<Ix>, val: Vec<T>) -> Self {
        debug_assert_eq!(row.len(), col.len());
        debug_assert_eq!(row.len(), val.len());
        MatSlice {
            row: CowBuf::new(row),
            col: CowBuf::new(col),
            val: CowBuf::new(val),
        }
    }

    /// The empty slice.
    pub fn empty() -> Self {
        MatSlice::new(Vec::new(), Vec::new(), Vec::new())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.row.len()
    }

    /// Whether the slice has no entries.
    pub fn is_empty(&self) -> bool {
        self.row.is_empty()
    }

    /// The row column.
    pub fn rows(&self) -> &[Ix] {
        self.row.as_slice()
    }

    /// The col column.
    pub fn cols(&self) -> &[Ix] {
        self.col.as_slice()
    }

    /// The value column.
    pub fn values(&self) -> &[T] {
        self.val.as_slice()
    }

    /// Key at position `p`.
    pub fn key(&self, p: usize) -> (Ix, Ix) {
        (self.rows()[p], self.cols()[p])
    }

    /// Smallest key, if any.
    pub fn first_key(&self) -> Option<(Ix, Ix)> {
        (!self.is_empty()).then(|| self.key(0))
    }

    /// Largest key, if any.
    pub fn last_key(&self) -> Option<(Ix, Ix)> {
        (!self.is_empty()).then(|| self.key(self.len() - 1))
    }

    /// Split into (head, tail) so that every head key is `< stop`
    /// lexicographically; the split point is found by binary search over the
    /// parallel coordinate arrays.
    pub fn split_key(&self, stop: (Ix, Ix)) -> (MatSlice<T>, MatSlice<T>) {
        let rows = self.rows();
        let cols = self.cols();
        let mut lo = 0usize;
        let mut hi = self.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if (rows[mid], cols[mid]) < stop {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        let (rl, rr) = self.row.split_at(lo);
        let (cl, cr) = self.col.split_at(lo);
        let (vl, vr) = self.val.split_at(lo);
        (
            MatSlice {
                row: rl,
                col: cl,
                val: vl,
            },
            MatSlice {
                row: rr,
                col: cr,
                val: vr,
            },
        )
    }

    /// Keep entries satisfying the predicate; pass-through when nothing is
    /// dropped, freshly owned columns otherwise.
    pub fn retain(self, pred: impl Fn(Ix, Ix, &T) -> bool) -> MatSlice<T> {
        let keep_all = (0..self.len()).all(|p| {
            let (r, c) = self.key(p);
            pred(r, c, &self.values()[p])
        });
        if keep_all {
            return self;
        }
        let mut row = Vec::with_capacity(self.len());
        let mut col = Vec::with_capacity(self.len());
        let mut val = Vec::with_capacity(self.len());
        for p in 0..self.len() {
            let (r, c) = self.key(p);
            let v = &self.values()[p];
            if pred(r, c, v) {
                row.push(r);
                col.push(c);
                val.push(v.clone());
            }
        }
        MatSlice::new(row, col, val)
    }

    /// Transform values; coordinate columns keep their sharing state.
    pub fn map<U: Clone>(self, f: impl Fn(Ix, Ix, &T) -> U) -> MatSlice<U> {
        let val: Vec<U> = (0..self.len())
            .map(|p| {
                let (r, c) = self.key(p);
                f(r, c, &self.values()[p])
            })
            .collect();
        MatSlice {
            row: self.row,
            col: self.col,
            val: CowBuf::new(val),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_shares_and_mutation_reowns() {
        let s = VecSlice::new(vec![1, 3, 5, 7], vec![10, 30, 50, 70]);
        let (head, mut tail) = s.split_key(5);
        assert_eq!(head.indices(), &[1, 3]);
        assert_eq!(tail.indices(), &[5, 7]);
        assert!(head.idx.is_shared() && tail.idx.is_shared());

        tail.val.to_mut()[0] = 99;
        assert!(!tail.val.is_shared());
        assert_eq!(tail.values(), &[99, 70]);
        // head still sees the original storage
        assert_eq!(head.values(), &[10, 30]);
    }

    #[test]
    fn retain_passthrough_keeps_sharing() {
        let base = VecSlice::new(vec![0, 2, 4], vec![1, 2, 3]);
        let (shared, _) = base.split_key(10);
        let kept = shared.retain(|_, _| true);
        assert!(kept.idx.is_shared());
        let filtered = kept.retain(|i, _| i != 2);
        assert!(!filtered.idx.is_shared());
        assert_eq!(filtered.indices(), &[0, 4]);
    }

    #[test]
    fn map_keeps_index_sharing() {
        let base = VecSlice::new(vec![0, 1], vec![5.0f64, 6.0]);
        let (shared, _) = base.split_key(100);
        let mapped = shared.map(|_, v| *v > 5.0);
        assert!(mapped.idx.is_shared());
        assert!(!mapped.val.is_shared());
        assert_eq!(mapped.values(), &[false, true]);
    }

    #[test]
    fn mat_split_is_lexicographic() {
        let s = MatSlice::new(vec![0, 0, 1, 2], vec![1, 5, 0, 2], vec![1, 2, 3, 4]);
        let (head, tail) = s.split_key((1, 0));
        assert_eq!(head.rows(), &[0, 0]);
        assert_eq!(tail.rows(), &[1, 2]);
        assert_eq!(tail.cols(), &[0, 2]);
    }
}
