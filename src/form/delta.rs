//! List-delta representations: single-coordinate edits layered atop a base
//! reference, read most-recent-first.
//!
//! A delta chain node stores a sign-encoded coordinate — a removal of index
//! `i` is stored as `-(i + 1)` so that index 0 round-trips — and the chain
//! links most-recent-first; the head wins when the same coordinate appears
//! more than once. Streaming resolves the chain into a coordinate-sorted
//! pending list (head-wins de-duplication through a bitset), then zippers
//! that list against the base stream window by window: base entries erased
//! by a pending edit are masked out, pending sets are overlaid, and once the
//! base is exhausted the remaining sets are flushed in batches of at most
//! 512. Removals never reach the output.

use crate::bitset::{AtomicBitset, MatrixBitset};
use crate::error::Result;
use crate::form::{
    BoxOuter, FnOuter, MatSource, MatrixForm, OuterSource, VecSource, VectorForm,
};
use crate::index::Ix;
use crate::pipeline::{BatchVecSource, Source};
use crate::reference::{MatRef, VecRef};
use crate::slice::{MatSlice, VecSlice};
use crate::types::Element;
use std::sync::Arc;

const FLUSH_BATCH: usize = 512;

#[inline]
fn encode_remove(i: Ix) -> Ix {
    -(i + 1)
}

#[inline]
fn decode(coord: Ix) -> Ix {
    if coord < 0 { -coord - 1 } else { coord }
}

/* ===================== vector delta ===================== */

/// One edit in a vector chain.
pub struct DeltaNode<T> {
    coord: Ix,
    value: Option<T>,
    next: Option<Arc<DeltaNode<T>>>,
}

/// A vector with a chain of pending single-entry edits over a base reference.
pub struct DeltaVector<T: Element> {
    size: Ix,
    base: VecRef<T>,
    head: Arc<DeltaNode<T>>,
}

impl<T: Element> DeltaVector<T> {
    /// Layer a set of `v` at `i` over `base`, extending `base`'s chain when
    /// it is itself a delta over the same storage.
    pub fn set(base: VecRef<T>, i: Ix, v: T) -> Self {
        Self::push(base, i, Some(v))
    }

    /// Layer a removal of `i` over `base`.
    pub fn remove(base: VecRef<T>, i: Ix) -> Self {
        Self::push(base, i, None)
    }

    fn push(base: VecRef<T>, i: Ix, value: Option<T>) -> Self {
        let coord = if value.is_some() { i } else { encode_remove(i) };
        let size = base.size();
        let (base, next) = match base.form().delta_parts() {
            Some((inner, head)) => (inner, Some(head)),
            None => (base, None),
        };
        DeltaVector {
            size,
            base,
            head: Arc::new(DeltaNode { coord, value, next }),
        }
    }

    /// Resolve the chain into coordinate-sorted pending edits, head-wins.
    fn pending(&self) -> Vec<(Ix, Option<T>)> {
        let seen = AtomicBitset::new(self.size.max(0) as usize);
        let mut out: Vec<(Ix, Option<T>)> = Vec::new();
        let mut node = Some(&self.head);
        while let Some(n) = node {
            let i = decode(n.coord);
            if (i as usize) < seen.len() && seen.set(i as usize) {
                out.push((i, n.value.clone()));
            }
            node = n.next.as_ref();
        }
        out.sort_unstable_by_key(|&(i, _)| i);
        out
    }
}

impl<T: Element> VectorForm<T> for DeltaVector<T> {
    fn size(&self) -> Ix {
        self.size
    }

    fn get(&self, i: Ix) -> Result<Option<T>> {
        let mut node = Some(&self.head);
        while let Some(n) = node {
            if decode(n.coord) == i {
                return Ok(n.value.clone());
            }
            node = n.next.as_ref();
        }
        self.base.form().get(i)
    }

    fn stream(&self) -> Result<VecSource<T>> {
        Ok(merge_pending(self.base.form().stream()?, self.pending()))
    }

    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<T>>> {
        if n >= self.size {
            return Ok(Arc::new(DeltaVector {
                size: n,
                base: self.base.resized(n)?,
                head: Arc::clone(&self.head),
            }));
        }
        // Shrinking filters; collapse first, the chain is cheap to replay.
        let sparse = self
            .optimized()?
            .expect("delta chains always rebuild on optimize");
        sparse.resized(n)
    }

    fn delta_parts(&self) -> Option<(VecRef<T>, Arc<DeltaNode<T>>)> {
        Some((self.base.clone(), Arc::clone(&self.head)))
    }
}

/// Merge a coordinate-sorted pending list into a base stream.
pub(crate) fn merge_pending<T: Element>(
    base: VecSource<T>,
    pending: Vec<(Ix, Option<T>)>,
) -> VecSource<T> {
    Box::new(PendingMerge {
        base,
        pending,
        p: 0,
        base_done: false,
    })
}

struct PendingMerge<T: Element> {
    base: VecSource<T>,
    pending: Vec<(Ix, Option<T>)>,
    p: usize,
    base_done: bool,
}

impl<T: Element> Source for PendingMerge<T> {
    type Batch = VecSlice<T>;

    fn fetch(&mut self, size: usize) -> Result<Option<VecSlice<T>>> {
        loop {
            if self.base_done {
                let mut idx = Vec::new();
                let mut val = Vec::new();
                while self.p < self.pending.len() && idx.len() < FLUSH_BATCH {
                    let (i, v) = &self.pending[self.p];
                    self.p += 1;
                    if let Some(v) = v {
                        idx.push(*i);
                        val.push(v.clone());
                    }
                }
                if idx.is_empty() {
                    if self.p >= self.pending.len() {
                        return Ok(None);
                    }
                    continue;
                }
                return Ok(Some(VecSlice::new(idx, val)));
            }

            let Some(b) = self.base.fetch(size)? else {
                self.base_done = true;
                continue;
            };
            if b.is_empty() {
                continue;
            }
            let wmax = b.last_key().expect("non-empty batch");
            let q = self.p
                + self.pending[self.p..].partition_point(|&(i, _)| i <= wmax);
            let (bi, bv) = (b.indices(), b.values());
            let mut idx = Vec::with_capacity(bi.len());
            let mut val = Vec::with_capacity(bi.len());
            let mut x = 0usize;
            let mut y = self.p;
            while x < bi.len() || y < q {
                if y < q && (x >= bi.len() || self.pending[y].0 <= bi[x]) {
                    let pk = self.pending[y].0;
                    if x < bi.len() && bi[x] == pk {
                        x += 1; // superseded base entry
                    }
                    if let Some(v) = &self.pending[y].1 {
                        idx.push(pk);
                        val.push(v.clone());
                    }
                    y += 1;
                } else {
                    idx.push(bi[x]);
                    val.push(bv[x].clone());
                    x += 1;
                }
            }
            self.p = q;
            if idx.is_empty() {
                continue;
            }
            return Ok(Some(VecSlice::new(idx, val)));
        }
    }
}

/* ===================== matrix delta ===================== */

/// One edit in a matrix chain; the sign bit lives on the row coordinate.
pub struct MatDeltaNode<T> {
    row: Ix,
    col: Ix,
    value: Option<T>,
    next: Option<Arc<MatDeltaNode<T>>>,
}

/// A matrix with a chain of pending single-entry edits over a base reference.
pub struct DeltaMatrix<T: Element> {
    nr: Ix,
    nc: Ix,
    base: MatRef<T>,
    head: Arc<MatDeltaNode<T>>,
}

impl<T: Element> DeltaMatrix<T> {
    /// Layer a set of `v` at `(r, c)` over `base`.
    pub fn set(base: MatRef<T>, r: Ix, c: Ix, v: T) -> Self {
        Self::push(base, r, c, Some(v))
    }

    /// Layer a removal of `(r, c)` over `base`.
    pub fn remove(base: MatRef<T>, r: Ix, c: Ix) -> Self {
        Self::push(base, r, c, None)
    }

    fn push(base: MatRef<T>, r: Ix, c: Ix, value: Option<T>) -> Self {
        let row = if value.is_some() { r } else { encode_remove(r) };
        let (nr, nc) = (base.nrows(), base.ncols());
        let (base, next) = match base.form().delta_parts() {
            Some((inner, head)) => (inner, Some(head)),
            None => (base, None),
        };
        DeltaMatrix {
            nr,
            nc,
            base,
            head: Arc::new(MatDeltaNode {
                row,
                col: c,
                value,
                next,
            }),
        }
    }

    /// Resolve the chain into (row, col)-sorted pending edits, head-wins.
    fn pending(&self) -> Vec<(Ix, Ix, Option<T>)> {
        let seen = MatrixBitset::new(self.nc.max(0) as usize);
        let mut out: Vec<(Ix, Ix, Option<T>)> = Vec::new();
        let mut node = Some(&self.head);
        while let Some(n) = node {
            let r = decode(n.row);
            if seen.set(r, n.col as usize) {
                out.push((r, n.col, n.value.clone()));
            }
            node = n.next.as_ref();
        }
        out.sort_unstable_by_key(|&(r, c, _)| (r, c));
        out
    }
}

impl<T: Element> MatrixForm<T> for DeltaMatrix<T> {
    fn nrows(&self) -> Ix {
        self.nr
    }

    fn ncols(&self) -> Ix {
        self.nc
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<T>> {
        let mut node = Some(&self.head);
        while let Some(n) = node {
            if decode(n.row) == r && n.col == c {
                return Ok(n.value.clone());
            }
            node = n.next.as_ref();
        }
        self.base.form().get(r, c)
    }

    fn stream(&self) -> Result<MatSource<T>> {
        Ok(Box::new(PendingMatMerge {
            base: self.base.form().stream()?,
            pending: self.pending(),
            p: 0,
            base_done: false,
        }))
    }

    fn row(&self, r: Ix) -> Result<VecSource<T>> {
        let row_pending: Vec<(Ix, Option<T>)> = self
            .pending()
            .into_iter()
            .filter(|&(pr, _, _)| pr == r)
            .map(|(_, c, v)| (c, v))
            .collect();
        Ok(merge_pending(self.base.form().row(r)?, row_pending))
    }

    fn col(&self, c: Ix) -> Result<VecSource<T>> {
        let col_pending: Vec<(Ix, Option<T>)> = self
            .pending()
            .into_iter()
            .filter(|&(_, pc, _)| pc == c)
            .map(|(r, _, v)| (r, v))
            .collect();
        Ok(merge_pending(self.base.form().col(c)?, col_pending))
    }

    fn rows(&self) -> Result<BoxOuter<T>> {
        let mut by_row: Vec<(Ix, Vec<(Ix, Option<T>)>)> = Vec::new();
        for (r, c, v) in self.pending() {
            match by_row.last_mut() {
                Some((lr, entries)) if *lr == r => entries.push((c, v)),
                _ => by_row.push((r, vec![(c, v)])),
            }
        }
        Ok(merge_outer(self.base.form().rows()?, by_row))
    }

    fn cols(&self) -> Result<BoxOuter<T>> {
        let mut pending: Vec<(Ix, Ix, Option<T>)> = self.pending();
        pending.sort_unstable_by_key(|&(r, c, _)| (c, r));
        let mut by_col: Vec<(Ix, Vec<(Ix, Option<T>)>)> = Vec::new();
        for (r, c, v) in pending {
            match by_col.last_mut() {
                Some((lc, entries)) if *lc == c => entries.push((r, v)),
                _ => by_col.push((c, vec![(r, v)])),
            }
        }
        Ok(merge_outer(self.base.form().cols()?, by_col))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<T>>> {
        if nr >= self.nr && nc >= self.nc {
            return Ok(Arc::new(DeltaMatrix {
                nr,
                nc,
                base: self.base.resized(nr, nc)?,
                head: Arc::clone(&self.head),
            }));
        }
        let csr = self
            .optimized()?
            .expect("delta chains always rebuild on optimize");
        csr.resized(nr, nc)
    }

    fn delta_parts(&self) -> Option<(MatRef<T>, Arc<MatDeltaNode<T>>)> {
        Some((self.base.clone(), Arc::clone(&self.head)))
    }
}

struct PendingMatMerge<T: Element> {
    base: MatSource<T>,
    pending: Vec<(Ix, Ix, Option<T>)>,
    p: usize,
    base_done: bool,
}

impl<T: Element> Source for PendingMatMerge<T> {
    type Batch = MatSlice<T>;

    fn fetch(&mut self, size: usize) -> Result<Option<MatSlice<T>>> {
        loop {
            if self.base_done {
                let mut row = Vec::new();
                let mut col = Vec::new();
                let mut val = Vec::new();
                while self.p < self.pending.len() && row.len() < FLUSH_BATCH {
                    let (r, c, v) = &self.pending[self.p];
                    self.p += 1;
                    if let Some(v) = v {
                        row.push(*r);
                        col.push(*c);
                        val.push(v.clone());
                    }
                }
                if row.is_empty() {
                    if self.p >= self.pending.len() {
                        return Ok(None);
                    }
                    continue;
                }
                return Ok(Some(MatSlice::new(row, col, val)));
            }

            let Some(b) = self.base.fetch(size)? else {
                self.base_done = true;
                continue;
            };
            if b.is_empty() {
                continue;
            }
            let wmax = b.last_key().expect("non-empty batch");
            let q = self.p
                + self.pending[self.p..].partition_point(|&(r, c, _)| (r, c) <= wmax);
            let mut row = Vec::with_capacity(b.len());
            let mut col = Vec::with_capacity(b.len());
            let mut val = Vec::with_capacity(b.len());
            let mut x = 0usize;
            let mut y = self.p;
            while x < b.len() || y < q {
                let pend_first = y < q
                    && (x >= b.len() || {
                        let (pr, pc, _) = &self.pending[y];
                        (*pr, *pc) <= b.key(x)
                    });
                if pend_first {
                    let (pr, pc, v) = &self.pending[y];
                    if x < b.len() && b.key(x) == (*pr, *pc) {
                        x += 1; // superseded base entry
                    }
                    if let Some(v) = v {
                        row.push(*pr);
                        col.push(*pc);
                        val.push(v.clone());
                    }
                    y += 1;
                } else {
                    let (br, bc) = b.key(x);
                    row.push(br);
                    col.push(bc);
                    val.push(b.values()[x].clone());
                    x += 1;
                }
            }
            self.p = q;
            if row.is_empty() {
                continue;
            }
            return Ok(Some(MatSlice::new(row, col, val)));
        }
    }
}

/// Merge an ascending (key, entries) pending grouping into an outer stream.
fn merge_outer<T: Element>(
    base: BoxOuter<T>,
    grouped: Vec<(Ix, Vec<(Ix, Option<T>)>)>,
) -> BoxOuter<T> {
    let mut base = base;
    let mut held: Option<(Ix, VecSource<T>)> = None;
    let mut base_done = false;
    let mut g = 0usize;
    let mut grouped = grouped;
    Box::new(FnOuter::new(move || {
        loop {
            if held.is_none() && !base_done {
                match base.next()? {
                    Some(pair) => held = Some(pair),
                    None => base_done = true,
                }
            }
            let base_key = held.as_ref().map(|(k, _)| *k);
            let pend_key = (g < grouped.len()).then(|| grouped[g].0);
            match (base_key, pend_key) {
                (None, None) => return Ok(None),
                (Some(_), None) => return Ok(held.take()),
                (Some(bk), Some(pk)) if bk < pk => return Ok(held.take()),
                (bk, Some(pk)) => {
                    let entries = std::mem::take(&mut grouped[g].1);
                    g += 1;
                    let inner: VecSource<T> = if bk == Some(pk) {
                        let (_, src) = held.take().expect("checked");
                        merge_pending(src, entries)
                    } else {
                        let sets: (Vec<Ix>, Vec<T>) = entries
                            .into_iter()
                            .filter_map(|(i, v)| v.map(|v| (i, v)))
                            .unzip();
                        if sets.0.is_empty() {
                            continue; // removals only; nothing at this key
                        }
                        Box::new(BatchVecSource::new(vec![VecSlice::new(sets.0, sets.1)]))
                    };
                    return Ok(Some((pk, inner)));
                }
            }
        }
    }))
}
