//! Matrix representations: empty, singleton, CSR-like, constant,
//! homogeneous-scalar, diagonal-view, transposed-view.

use crate::error::Result;
use crate::form::{
    BoxOuter, FnOuter, MatSource, MatrixForm, OuterSource, StreamRows, VecSource, VectorForm,
};
use crate::index::Ix;
use crate::pipeline::collect::collect_mat;
use crate::pipeline::{BatchVecSource, EmptySource, Source};
use crate::reference::{MatRef, ScalarRef, VecRef};
use crate::slice::{CowBuf, MatSlice, VecSlice};
use crate::types::Element;
use std::sync::Arc;

/// Filter a matrix stream to entries within new bounds and rebuild CSR; the
/// shared resize path for view and computed variants.
pub(crate) fn resize_collect<T: Element>(
    src: MatSource<T>,
    nr: Ix,
    nc: Ix,
) -> Result<Arc<dyn MatrixForm<T>>> {
    struct Clip<T> {
        src: MatSource<T>,
        nr: Ix,
        nc: Ix,
    }
    impl<T: Element> Source for Clip<T> {
        type Batch = MatSlice<T>;

        fn fetch(&mut self, size: usize) -> Result<Option<MatSlice<T>>> {
            let Some(b) = self.src.fetch(size)? else {
                return Ok(None);
            };
            let (nr, nc) = (self.nr, self.nc);
            Ok(Some(b.retain(|r, c, _| r < nr && c < nc)))
        }
    }
    Ok(Arc::new(CsrMatrix::collect(
        nr,
        nc,
        Box::new(Clip { src, nr, nc }),
    )?))
}

/* ===================== empty ===================== */

/// The matrix with no entries.
pub struct EmptyMatrix {
    nr: Ix,
    nc: Ix,
}

impl EmptyMatrix {
    /// An empty matrix of the given shape.
    pub fn new(nr: Ix, nc: Ix) -> Self {
        EmptyMatrix { nr, nc }
    }
}

impl<T: Element> MatrixForm<T> for EmptyMatrix {
    fn nrows(&self) -> Ix {
        self.nr
    }

    fn ncols(&self) -> Ix {
        self.nc
    }

    fn nvals_hint(&self) -> Option<Ix> {
        Some(0)
    }

    fn get(&self, _r: Ix, _c: Ix) -> Result<Option<T>> {
        Ok(None)
    }

    fn stream(&self) -> Result<MatSource<T>> {
        Ok(Box::new(EmptySource::new()))
    }

    fn row(&self, _r: Ix) -> Result<VecSource<T>> {
        Ok(Box::new(EmptySource::new()))
    }

    fn col(&self, _c: Ix) -> Result<VecSource<T>> {
        Ok(Box::new(EmptySource::new()))
    }

    fn rows(&self) -> Result<BoxOuter<T>> {
        Ok(Box::new(FnOuter::new(|| Ok(None))))
    }

    fn cols(&self) -> Result<BoxOuter<T>> {
        Ok(Box::new(FnOuter::new(|| Ok(None))))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<T>>> {
        Ok(Arc::new(EmptyMatrix::new(nr, nc)))
    }

    fn optimized(&self) -> Result<Option<CsrMatrix<T>>> {
        Ok(None)
    }
}

/* ===================== singleton ===================== */

/// Exactly one stored entry.
pub struct SingletonMatrix<T> {
    nr: Ix,
    nc: Ix,
    r: Ix,
    c: Ix,
    v: T,
}

impl<T: Element> SingletonMatrix<T> {
    /// A matrix holding one entry.
    pub fn new(nr: Ix, nc: Ix, r: Ix, c: Ix, v: T) -> Self {
        SingletonMatrix { nr, nc, r, c, v }
    }
}

impl<T: Element> MatrixForm<T> for SingletonMatrix<T> {
    fn nrows(&self) -> Ix {
        self.nr
    }

    fn ncols(&self) -> Ix {
        self.nc
    }

    fn nvals_hint(&self) -> Option<Ix> {
        Some(1)
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<T>> {
        Ok((r == self.r && c == self.c).then(|| self.v.clone()))
    }

    fn stream(&self) -> Result<MatSource<T>> {
        Ok(Box::new(BatchVecSource::new(vec![MatSlice::new(
            vec![self.r],
            vec![self.c],
            vec![self.v.clone()],
        )])))
    }

    fn row(&self, r: Ix) -> Result<VecSource<T>> {
        if r == self.r {
            Ok(Box::new(BatchVecSource::new(vec![VecSlice::new(
                vec![self.c],
                vec![self.v.clone()],
            )])))
        } else {
            Ok(Box::new(EmptySource::new()))
        }
    }

    fn col(&self, c: Ix) -> Result<VecSource<T>> {
        if c == self.c {
            Ok(Box::new(BatchVecSource::new(vec![VecSlice::new(
                vec![self.r],
                vec![self.v.clone()],
            )])))
        } else {
            Ok(Box::new(EmptySource::new()))
        }
    }

    fn rows(&self) -> Result<BoxOuter<T>> {
        let pair = Some((self.r, self.c, self.v.clone()));
        Ok(Box::new(singleton_outer(pair, false)))
    }

    fn cols(&self) -> Result<BoxOuter<T>> {
        let pair = Some((self.r, self.c, self.v.clone()));
        Ok(Box::new(singleton_outer(pair, true)))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<T>>> {
        if self.r < nr && self.c < nc {
            Ok(Arc::new(SingletonMatrix::new(
                nr,
                nc,
                self.r,
                self.c,
                self.v.clone(),
            )))
        } else {
            Ok(Arc::new(EmptyMatrix::new(nr, nc)))
        }
    }

    fn optimized(&self) -> Result<Option<CsrMatrix<T>>> {
        Ok(None)
    }
}

fn singleton_outer<T: Element>(
    mut entry: Option<(Ix, Ix, T)>,
    transposed: bool,
) -> impl crate::form::OuterSource<T> {
    FnOuter::new(move || {
        let Some((r, c, v)) = entry.take() else {
            return Ok(None);
        };
        let (outer, inner) = if transposed { (c, r) } else { (r, c) };
        let src: VecSource<T> = Box::new(BatchVecSource::new(vec![VecSlice::new(
            vec![inner],
            vec![v],
        )]));
        Ok(Some((outer, src)))
    })
}

/* ===================== CSR-like ===================== */

/// The canonical sparse matrix: non-empty row keys, a span prefix into the
/// column array, and strictly increasing columns per row.
pub struct CsrMatrix<T> {
    nr: Ix,
    nc: Ix,
    row_keys: Arc<Vec<Ix>>,
    spans: Arc<Vec<usize>>,
    cols: Arc<Vec<Ix>>,
    vals: Arc<Vec<T>>,
}

impl<T: Element> CsrMatrix<T> {
    /// Build from row-major sorted, duplicate-free triples.
    pub fn from_triples(nr: Ix, nc: Ix, rows: Vec<Ix>, cols: Vec<Ix>, vals: Vec<T>) -> Self {
        debug_assert_eq!(rows.len(), cols.len());
        debug_assert_eq!(rows.len(), vals.len());
        let mut row_keys: Vec<Ix> = Vec::new();
        let mut spans: Vec<usize> = Vec::new();
        for (p, &r) in rows.iter().enumerate() {
            if row_keys.last() != Some(&r) {
                row_keys.push(r);
                spans.push(p);
            }
        }
        spans.push(rows.len());
        CsrMatrix {
            nr,
            nc,
            row_keys: Arc::new(row_keys),
            spans: Arc::new(spans),
            cols: Arc::new(cols),
            vals: Arc::new(vals),
        }
    }

    /// Drain a row-major stream into CSR form.
    pub fn collect(nr: Ix, nc: Ix, src: MatSource<T>) -> Result<Self> {
        let (rows, cols, vals) = collect_mat(src)?;
        Ok(CsrMatrix::from_triples(nr, nc, rows, cols, vals))
    }

    /// Entry count.
    pub fn len(&self) -> usize {
        self.cols.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.cols.is_empty()
    }

    fn row_span(&self, r: Ix) -> Option<(usize, usize)> {
        self.row_keys
            .binary_search(&r)
            .ok()
            .map(|k| (self.spans[k], self.spans[k + 1]))
    }
}

struct CsrStream<T> {
    row_keys: Arc<Vec<Ix>>,
    spans: Arc<Vec<usize>>,
    cols: Arc<Vec<Ix>>,
    vals: Arc<Vec<T>>,
    entry: usize,
    row_at: usize,
}

impl<T: Element> Source for CsrStream<T> {
    type Batch = MatSlice<T>;

    fn prepare(&mut self) -> Option<usize> {
        Some(self.cols.len())
    }

    fn fetch(&mut self, size: usize) -> Result<Option<MatSlice<T>>> {
        if self.entry >= self.cols.len() {
            return Ok(None);
        }
        let hi = (self.entry + size.max(1)).min(self.cols.len());
        let mut rows = Vec::with_capacity(hi - self.entry);
        for p in self.entry..hi {
            while self.spans[self.row_at + 1] <= p {
                self.row_at += 1;
            }
            rows.push(self.row_keys[self.row_at]);
        }
        let out = MatSlice {
            row: CowBuf::new(rows),
            col: CowBuf::from_arc_range(Arc::clone(&self.cols), self.entry, hi),
            val: CowBuf::from_arc_range(Arc::clone(&self.vals), self.entry, hi),
        };
        self.entry = hi;
        Ok(Some(out))
    }
}

struct CsrColStream<T> {
    row_keys: Arc<Vec<Ix>>,
    spans: Arc<Vec<usize>>,
    cols: Arc<Vec<Ix>>,
    vals: Arc<Vec<T>>,
    c: Ix,
    row_at: usize,
}

impl<T: Element> Source for CsrColStream<T> {
    type Batch = VecSlice<T>;

    fn fetch(&mut self, size: usize) -> Result<Option<VecSlice<T>>> {
        let mut idx = Vec::new();
        let mut val = Vec::new();
        while self.row_at < self.row_keys.len() && idx.len() < size.max(1) {
            let (lo, hi) = (self.spans[self.row_at], self.spans[self.row_at + 1]);
            if let Ok(p) = self.cols[lo..hi].binary_search(&self.c) {
                idx.push(self.row_keys[self.row_at]);
                val.push(self.vals[lo + p].clone());
            }
            self.row_at += 1;
        }
        Ok((!idx.is_empty()).then(|| VecSlice::new(idx, val)))
    }
}

impl<T: Element> MatrixForm<T> for CsrMatrix<T> {
    fn nrows(&self) -> Ix {
        self.nr
    }

    fn ncols(&self) -> Ix {
        self.nc
    }

    fn nvals_hint(&self) -> Option<Ix> {
        Some(self.cols.len() as Ix)
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<T>> {
        let Some((lo, hi)) = self.row_span(r) else {
            return Ok(None);
        };
        Ok(self.cols[lo..hi]
            .binary_search(&c)
            .ok()
            .map(|p| self.vals[lo + p].clone()))
    }

    fn stream(&self) -> Result<MatSource<T>> {
        Ok(Box::new(CsrStream {
            row_keys: Arc::clone(&self.row_keys),
            spans: Arc::clone(&self.spans),
            cols: Arc::clone(&self.cols),
            vals: Arc::clone(&self.vals),
            entry: 0,
            row_at: 0,
        }))
    }

    fn row(&self, r: Ix) -> Result<VecSource<T>> {
        match self.row_span(r) {
            None => Ok(Box::new(EmptySource::new())),
            Some((lo, hi)) => Ok(Box::new(BatchVecSource::new(vec![VecSlice::shared(
                Arc::clone(&self.cols),
                Arc::clone(&self.vals),
                lo,
                hi,
            )]))),
        }
    }

    fn col(&self, c: Ix) -> Result<VecSource<T>> {
        Ok(Box::new(CsrColStream {
            row_keys: Arc::clone(&self.row_keys),
            spans: Arc::clone(&self.spans),
            cols: Arc::clone(&self.cols),
            vals: Arc::clone(&self.vals),
            c,
            row_at: 0,
        }))
    }

    fn rows(&self) -> Result<BoxOuter<T>> {
        let row_keys = Arc::clone(&self.row_keys);
        let spans = Arc::clone(&self.spans);
        let cols = Arc::clone(&self.cols);
        let vals = Arc::clone(&self.vals);
        let mut k = 0usize;
        Ok(Box::new(FnOuter::new(move || {
            if k >= row_keys.len() {
                return Ok(None);
            }
            let (lo, hi) = (spans[k], spans[k + 1]);
            let key = row_keys[k];
            k += 1;
            let src: VecSource<T> = Box::new(BatchVecSource::new(vec![VecSlice::shared(
                Arc::clone(&cols),
                Arc::clone(&vals),
                lo,
                hi,
            )]));
            Ok(Some((key, src)))
        })))
    }

    fn cols(&self) -> Result<BoxOuter<T>> {
        let mut keys: Vec<Ix> = self.cols.as_slice().to_vec();
        keys.sort_unstable();
        keys.dedup();
        let row_keys = Arc::clone(&self.row_keys);
        let spans = Arc::clone(&self.spans);
        let cols = Arc::clone(&self.cols);
        let vals = Arc::clone(&self.vals);
        let mut k = 0usize;
        Ok(Box::new(FnOuter::new(move || {
            if k >= keys.len() {
                return Ok(None);
            }
            let key = keys[k];
            k += 1;
            let src: VecSource<T> = Box::new(CsrColStream {
                row_keys: Arc::clone(&row_keys),
                spans: Arc::clone(&spans),
                cols: Arc::clone(&cols),
                vals: Arc::clone(&vals),
                c: key,
                row_at: 0,
            });
            Ok(Some((key, src)))
        })))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<T>>> {
        if nr >= self.nr && nc >= self.nc {
            return Ok(Arc::new(CsrMatrix {
                nr,
                nc,
                row_keys: Arc::clone(&self.row_keys),
                spans: Arc::clone(&self.spans),
                cols: Arc::clone(&self.cols),
                vals: Arc::clone(&self.vals),
            }));
        }
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        let mut vals = Vec::new();
        for k in 0..self.row_keys.len() {
            let r = self.row_keys[k];
            if r >= nr {
                break;
            }
            let (lo, hi) = (self.spans[k], self.spans[k + 1]);
            let keep = lo + self.cols[lo..hi].partition_point(|&c| c < nc);
            for p in lo..keep {
                rows.push(r);
                cols.push(self.cols[p]);
                vals.push(self.vals[p].clone());
            }
        }
        Ok(Arc::new(CsrMatrix::from_triples(nr, nc, rows, cols, vals)))
    }

    fn optimized(&self) -> Result<Option<CsrMatrix<T>>> {
        Ok(None)
    }
}

/* ===================== constant / homogeneous-scalar ===================== */

/// Every position holds the same value.
pub struct ConstantMatrix<T> {
    nr: Ix,
    nc: Ix,
    value: T,
}

impl<T: Element> ConstantMatrix<T> {
    /// A dense constant matrix.
    pub fn new(nr: Ix, nc: Ix, value: T) -> Self {
        ConstantMatrix { nr, nc, value }
    }
}

struct ConstMatStream<T> {
    nr: Ix,
    nc: Ix,
    value: T,
    r: Ix,
    c: Ix,
}

impl<T: Element> Source for ConstMatStream<T> {
    type Batch = MatSlice<T>;

    fn fetch(&mut self, size: usize) -> Result<Option<MatSlice<T>>> {
        if self.r >= self.nr || self.nc == 0 {
            return Ok(None);
        }
        let mut rows = Vec::with_capacity(size);
        let mut cols = Vec::with_capacity(size);
        while rows.len() < size.max(1) && self.r < self.nr {
            rows.push(self.r);
            cols.push(self.c);
            self.c += 1;
            if self.c >= self.nc {
                self.c = 0;
                self.r += 1;
            }
        }
        let vals = vec![self.value.clone(); rows.len()];
        Ok(Some(MatSlice::new(rows, cols, vals)))
    }
}

impl<T: Element> MatrixForm<T> for ConstantMatrix<T> {
    fn nrows(&self) -> Ix {
        self.nr
    }

    fn ncols(&self) -> Ix {
        self.nc
    }

    fn nvals_hint(&self) -> Option<Ix> {
        Some(self.nr * self.nc)
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<T>> {
        Ok((r >= 0 && r < self.nr && c >= 0 && c < self.nc).then(|| self.value.clone()))
    }

    fn stream(&self) -> Result<MatSource<T>> {
        Ok(Box::new(ConstMatStream {
            nr: self.nr,
            nc: self.nc,
            value: self.value.clone(),
            r: 0,
            c: 0,
        }))
    }

    fn row(&self, r: Ix) -> Result<VecSource<T>> {
        if r < 0 || r >= self.nr {
            return Ok(Box::new(EmptySource::new()));
        }
        crate::form::vector::ConstantVector::new(self.nc, self.value.clone()).stream()
    }

    fn col(&self, c: Ix) -> Result<VecSource<T>> {
        if c < 0 || c >= self.nc {
            return Ok(Box::new(EmptySource::new()));
        }
        crate::form::vector::ConstantVector::new(self.nr, self.value.clone()).stream()
    }

    fn rows(&self) -> Result<BoxOuter<T>> {
        let (nr, nc, value) = (self.nr, self.nc, self.value.clone());
        let mut r = 0;
        Ok(Box::new(FnOuter::new(move || {
            if r >= nr || nc == 0 {
                return Ok(None);
            }
            let key = r;
            r += 1;
            let src = crate::form::vector::ConstantVector::new(nc, value.clone()).stream()?;
            Ok(Some((key, src)))
        })))
    }

    fn cols(&self) -> Result<BoxOuter<T>> {
        let (nr, nc, value) = (self.nr, self.nc, self.value.clone());
        let mut c = 0;
        Ok(Box::new(FnOuter::new(move || {
            if c >= nc || nr == 0 {
                return Ok(None);
            }
            let key = c;
            c += 1;
            let src = crate::form::vector::ConstantVector::new(nr, value.clone()).stream()?;
            Ok(Some((key, src)))
        })))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<T>>> {
        Ok(Arc::new(ConstantMatrix::new(nr, nc, self.value.clone())))
    }

    fn optimized(&self) -> Result<Option<CsrMatrix<T>>> {
        Ok(None)
    }
}

/// Homogeneous matrix over a possibly-unevaluated scalar.
pub struct ScalarMatrix<T: Element> {
    nr: Ix,
    nc: Ix,
    scalar: ScalarRef<T>,
}

/// Build the homogeneous-scalar form, collapsing when the scalar is known.
pub fn scalar_matrix<T: Element>(nr: Ix, nc: Ix, scalar: ScalarRef<T>) -> Arc<dyn MatrixForm<T>> {
    match scalar.known() {
        Some(Some(v)) => Arc::new(ConstantMatrix::new(nr, nc, v)),
        Some(None) => Arc::new(EmptyMatrix::new(nr, nc)),
        None => Arc::new(ScalarMatrix { nr, nc, scalar }),
    }
}

impl<T: Element> ScalarMatrix<T> {
    fn resolved(&self) -> Result<Arc<dyn MatrixForm<T>>> {
        match self.scalar.get()? {
            Some(v) => Ok(Arc::new(ConstantMatrix::new(self.nr, self.nc, v))),
            None => Ok(Arc::new(EmptyMatrix::new(self.nr, self.nc))),
        }
    }
}

impl<T: Element> MatrixForm<T> for ScalarMatrix<T> {
    fn nrows(&self) -> Ix {
        self.nr
    }

    fn ncols(&self) -> Ix {
        self.nc
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<T>> {
        if r < 0 || r >= self.nr || c < 0 || c >= self.nc {
            return Ok(None);
        }
        self.scalar.get()
    }

    fn stream(&self) -> Result<MatSource<T>> {
        self.resolved()?.stream()
    }

    fn row(&self, r: Ix) -> Result<VecSource<T>> {
        self.resolved()?.row(r)
    }

    fn col(&self, c: Ix) -> Result<VecSource<T>> {
        self.resolved()?.col(c)
    }

    fn rows(&self) -> Result<BoxOuter<T>> {
        self.resolved()?.rows()
    }

    fn cols(&self) -> Result<BoxOuter<T>> {
        self.resolved()?.cols()
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<T>>> {
        Ok(scalar_matrix(nr, nc, self.scalar.clone()))
    }
}

/* ===================== diagonal-view ===================== */

/// The k-th diagonal of a vector reference, viewed as a square matrix of
/// dimension `v.size() + |k|`.
pub struct DiagMatrix<T: Element> {
    n: Ix,
    k: Ix,
    v: VecRef<T>,
}

impl<T: Element> DiagMatrix<T> {
    /// View `v` as the k-th diagonal.
    pub fn new(v: VecRef<T>, k: Ix) -> Self {
        let n = v.size() + k.abs();
        DiagMatrix { n, k, v }
    }

    fn coords(&self, i: Ix) -> (Ix, Ix) {
        if self.k >= 0 { (i, i + self.k) } else { (i - self.k, i) }
    }

    fn diag_index(&self, r: Ix, c: Ix) -> Option<Ix> {
        (c - r == self.k).then(|| if self.k >= 0 { r } else { c })
    }
}

impl<T: Element> MatrixForm<T> for DiagMatrix<T> {
    fn nrows(&self) -> Ix {
        self.n
    }

    fn ncols(&self) -> Ix {
        self.n
    }

    fn nvals_hint(&self) -> Option<Ix> {
        self.v.form().nvals_hint()
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<T>> {
        match self.diag_index(r, c) {
            None => Ok(None),
            Some(i) => self.v.form().get(i),
        }
    }

    fn stream(&self) -> Result<MatSource<T>> {
        struct DiagStream<T> {
            src: VecSource<T>,
            k: Ix,
        }
        impl<T: Element> Source for DiagStream<T> {
            type Batch = MatSlice<T>;

            fn fetch(&mut self, size: usize) -> Result<Option<MatSlice<T>>> {
                let Some(b) = self.src.fetch(size)? else {
                    return Ok(None);
                };
                let k = self.k;
                let rows: Vec<Ix> = b
                    .indices()
                    .iter()
                    .map(|&i| if k >= 0 { i } else { i - k })
                    .collect();
                let cols: Vec<Ix> = b
                    .indices()
                    .iter()
                    .map(|&i| if k >= 0 { i + k } else { i })
                    .collect();
                Ok(Some(MatSlice {
                    row: CowBuf::new(rows),
                    col: CowBuf::new(cols),
                    val: b.val,
                }))
            }
        }
        Ok(Box::new(DiagStream {
            src: self.v.form().stream()?,
            k: self.k,
        }))
    }

    fn row(&self, r: Ix) -> Result<VecSource<T>> {
        let c = r + self.k;
        match self.diag_index(r, c).map(|i| self.v.form().get(i)) {
            Some(Ok(Some(v))) if c >= 0 && c < self.n => Ok(Box::new(BatchVecSource::new(vec![
                VecSlice::new(vec![c], vec![v]),
            ]))),
            Some(Err(e)) => Err(e),
            _ => Ok(Box::new(EmptySource::new())),
        }
    }

    fn col(&self, c: Ix) -> Result<VecSource<T>> {
        let r = c - self.k;
        match self.diag_index(r, c).map(|i| self.v.form().get(i)) {
            Some(Ok(Some(v))) if r >= 0 && r < self.n => Ok(Box::new(BatchVecSource::new(vec![
                VecSlice::new(vec![r], vec![v]),
            ]))),
            Some(Err(e)) => Err(e),
            _ => Ok(Box::new(EmptySource::new())),
        }
    }

    fn rows(&self) -> Result<BoxOuter<T>> {
        Ok(Box::new(StreamRows::new(self.stream()?)))
    }

    fn cols(&self) -> Result<BoxOuter<T>> {
        // Diagonal entries have one entry per column as well; reuse the
        // row grouping with swapped coordinates.
        let k = self.k;
        let mut src = self.v.form().stream()?;
        let mut pending: std::collections::VecDeque<(Ix, Ix, T)> = Default::default();
        Ok(Box::new(FnOuter::new(move || {
            if pending.is_empty() {
                if let Some(b) = src.fetch(crate::pipeline::DEFAULT_BATCH)? {
                    for (p, &i) in b.indices().iter().enumerate() {
                        let (r, c) = if k >= 0 { (i, i + k) } else { (i - k, i) };
                        pending.push_back((c, r, b.values()[p].clone()));
                    }
                }
            }
            let Some((c, r, v)) = pending.pop_front() else {
                return Ok(None);
            };
            let src: VecSource<T> =
                Box::new(BatchVecSource::new(vec![VecSlice::new(vec![r], vec![v])]));
            Ok(Some((c, src)))
        })))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<T>>> {
        resize_collect(self.stream()?, nr, nc)
    }
}

/* ===================== transposed-view ===================== */

/// A matrix reference with its coordinates swapped.
pub struct TransposeMatrix<T: Element> {
    base: MatRef<T>,
}

impl<T: Element> TransposeMatrix<T> {
    /// View `base` transposed.
    pub fn new(base: MatRef<T>) -> Self {
        TransposeMatrix { base }
    }

    /// The underlying reference.
    pub fn base(&self) -> &MatRef<T> {
        &self.base
    }
}

impl<T: Element> MatrixForm<T> for TransposeMatrix<T> {
    fn nrows(&self) -> Ix {
        self.base.ncols()
    }

    fn ncols(&self) -> Ix {
        self.base.nrows()
    }

    fn nvals_hint(&self) -> Option<Ix> {
        self.base.form().nvals_hint()
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<T>> {
        self.base.form().get(c, r)
    }

    fn stream(&self) -> Result<MatSource<T>> {
        // Row-major over the transpose is column-major over the base.
        struct TransposeStream<T: Element> {
            outer: BoxOuter<T>,
            cur: Option<(Ix, VecSource<T>)>,
        }
        impl<T: Element> Source for TransposeStream<T> {
            type Batch = MatSlice<T>;

            fn fetch(&mut self, size: usize) -> Result<Option<MatSlice<T>>> {
                loop {
                    if self.cur.is_none() {
                        self.cur = self.outer.next()?;
                    }
                    let Some((key, inner)) = self.cur.as_mut() else {
                        return Ok(None);
                    };
                    match inner.fetch(size)? {
                        Some(b) => {
                            let rows = vec![*key; b.len()];
                            return Ok(Some(MatSlice {
                                row: CowBuf::new(rows),
                                col: b.idx,
                                val: b.val,
                            }));
                        }
                        None => self.cur = None,
                    }
                }
            }
        }
        Ok(Box::new(TransposeStream {
            outer: self.base.form().cols()?,
            cur: None,
        }))
    }

    fn row(&self, r: Ix) -> Result<VecSource<T>> {
        self.base.form().col(r)
    }

    fn col(&self, c: Ix) -> Result<VecSource<T>> {
        self.base.form().row(c)
    }

    fn rows(&self) -> Result<BoxOuter<T>> {
        self.base.form().cols()
    }

    fn cols(&self) -> Result<BoxOuter<T>> {
        self.base.form().rows()
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<T>>> {
        resize_collect(self.stream()?, nr, nc)
    }
}

/// Fallback column grouping for forms without a native column family:
/// stream one column at a time by probing `col(c)` over the distinct column
/// keys found in the full stream.
pub(crate) fn cols_via_stream<T: Element>(
    stream: MatSource<T>,
    form: Arc<dyn MatrixForm<T>>,
) -> Result<BoxOuter<T>> {
    let (_, cols, _) = collect_mat(stream)?;
    let mut keys = cols;
    keys.sort_unstable();
    keys.dedup();
    let mut at = 0usize;
    Ok(Box::new(FnOuter::new(move || {
        if at >= keys.len() {
            return Ok(None);
        }
        let key = keys[at];
        at += 1;
        Ok(Some((key, form.col(key)?)))
    })))
}
