//! Extract producers: the inverse index remap.
//!
//! Output coordinate `j` reads source coordinate `indices[j]`; streaming
//! walks the source once and reverse-maps each entry through the sorted
//! (index, position) table, so repeated indices fan out and absent ones
//! drop. A non-monotone index list is a permutation of the output order, so
//! those paths collect and re-sort.

use crate::error::Result;
use crate::form::matrix::resize_collect;
use crate::form::vector::SparseVector;
use crate::form::{
    BoxOuter, FnOuter, MatSource, MatrixForm, OuterSource, StreamRows, VecSource, VectorForm,
};
use crate::index::{Ix, Region};
use crate::pipeline::collect::{collect_mat_sorted, collect_vec_sorted};
use crate::pipeline::{BatchVecSource, EmptySource, Source};
use crate::reference::{MatRef, VecRef};
use crate::slice::{MatSlice, VecSlice};
use crate::types::Element;
use std::sync::Arc;

/// Reverse-map a source stream through a region: entry at source index `i`
/// lands at every output position with `indices[p] == i`.
struct ReverseRemapVec<T: Element> {
    src: VecSource<T>,
    region: Region,
}

impl<T: Element> Source for ReverseRemapVec<T> {
    type Batch = VecSlice<T>;

    fn fetch(&mut self, size: usize) -> Result<Option<VecSlice<T>>> {
        loop {
            let Some(b) = self.src.fetch(size)? else {
                return Ok(None);
            };
            let mut idx = Vec::with_capacity(b.len());
            let mut val = Vec::with_capacity(b.len());
            for (p, &i) in b.indices().iter().enumerate() {
                for j in self.region.positions_of(i) {
                    idx.push(j);
                    val.push(b.values()[p].clone());
                }
            }
            if !idx.is_empty() {
                return Ok(Some(VecSlice::new(idx, val)));
            }
        }
    }
}

/// Reverse-remap, restoring output order when the list is a permutation.
pub(crate) fn reverse_remap_vec<T: Element>(
    src: VecSource<T>,
    region: Region,
) -> Result<VecSource<T>> {
    let monotone = region.monotone();
    let remapped: VecSource<T> = Box::new(ReverseRemapVec { src, region });
    if monotone {
        return Ok(remapped);
    }
    let (idx, val) = collect_vec_sorted(remapped)?;
    Ok(Box::new(BatchVecSource::new(vec![VecSlice::new(idx, val)])))
}

/* ===================== vector producer ===================== */

/// `w = u(I)` deferred.
pub(crate) struct ExtractVec<T: Element> {
    size: Ix,
    src: VecRef<T>,
    region: Region,
}

impl<T: Element> ExtractVec<T> {
    pub(crate) fn new(src: VecRef<T>, region: Region) -> Self {
        ExtractVec {
            size: region.len(),
            src,
            region,
        }
    }
}

impl<T: Element> VectorForm<T> for ExtractVec<T> {
    fn size(&self) -> Ix {
        self.size
    }

    fn get(&self, i: Ix) -> Result<Option<T>> {
        if i < 0 || i >= self.size {
            return Ok(None);
        }
        self.src.get(self.region.map(i))
    }

    fn stream(&self) -> Result<VecSource<T>> {
        reverse_remap_vec(self.src.stream()?, self.region.clone())
    }

    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<T>>> {
        SparseVector::collect(self.size, self.stream()?)?.resized(n)
    }
}

/// `w = A(I, c)` deferred: one column extracted into a vector.
pub(crate) struct ExtractColVec<T: Element> {
    size: Ix,
    a: MatRef<T>,
    rows: Region,
    col: Ix,
}

impl<T: Element> ExtractColVec<T> {
    pub(crate) fn new(a: MatRef<T>, rows: Region, col: Ix) -> Self {
        ExtractColVec {
            size: rows.len(),
            a,
            rows,
            col,
        }
    }
}

impl<T: Element> VectorForm<T> for ExtractColVec<T> {
    fn size(&self) -> Ix {
        self.size
    }

    fn get(&self, i: Ix) -> Result<Option<T>> {
        if i < 0 || i >= self.size {
            return Ok(None);
        }
        self.a.get(self.rows.map(i), self.col)
    }

    fn stream(&self) -> Result<VecSource<T>> {
        reverse_remap_vec(self.a.form().col(self.col)?, self.rows.clone())
    }

    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<T>>> {
        SparseVector::collect(self.size, self.stream()?)?.resized(n)
    }
}

/* ===================== matrix producer ===================== */

/// `C = A(I, J)` deferred.
pub(crate) struct ExtractMat<T: Element> {
    nr: Ix,
    nc: Ix,
    src: MatRef<T>,
    rows: Region,
    cols: Region,
}

impl<T: Element> ExtractMat<T> {
    pub(crate) fn new(src: MatRef<T>, rows: Region, cols: Region) -> Self {
        ExtractMat {
            nr: rows.len(),
            nc: cols.len(),
            src,
            rows,
            cols,
        }
    }
}

struct ReverseRemapMat<T: Element> {
    src: MatSource<T>,
    rows: Region,
    cols: Region,
}

impl<T: Element> Source for ReverseRemapMat<T> {
    type Batch = MatSlice<T>;

    fn fetch(&mut self, size: usize) -> Result<Option<MatSlice<T>>> {
        loop {
            let Some(b) = self.src.fetch(size)? else {
                return Ok(None);
            };
            let mut row = Vec::with_capacity(b.len());
            let mut col = Vec::with_capacity(b.len());
            let mut val = Vec::with_capacity(b.len());
            for p in 0..b.len() {
                let (r, c) = b.key(p);
                for i in self.rows.positions_of(r) {
                    for j in self.cols.positions_of(c) {
                        row.push(i);
                        col.push(j);
                        val.push(b.values()[p].clone());
                    }
                }
            }
            if !row.is_empty() {
                return Ok(Some(MatSlice::new(row, col, val)));
            }
        }
    }
}

impl<T: Element> MatrixForm<T> for ExtractMat<T> {
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
        self.src.get(self.rows.map(r), self.cols.map(c))
    }

    fn stream(&self) -> Result<MatSource<T>> {
        let monotone = self.rows.monotone() && self.cols.monotone();
        let remapped: MatSource<T> = Box::new(ReverseRemapMat {
            src: self.src.form().stream()?,
            rows: self.rows.clone(),
            cols: self.cols.clone(),
        });
        if monotone {
            return Ok(remapped);
        }
        let (row, col, val) = collect_mat_sorted(remapped)?;
        Ok(Box::new(BatchVecSource::new(vec![MatSlice::new(
            row, col, val,
        )])))
    }

    fn row(&self, r: Ix) -> Result<VecSource<T>> {
        if r < 0 || r >= self.nr {
            return Ok(Box::new(EmptySource::new()));
        }
        reverse_remap_vec(self.src.form().row(self.rows.map(r))?, self.cols.clone())
    }

    fn col(&self, c: Ix) -> Result<VecSource<T>> {
        if c < 0 || c >= self.nc {
            return Ok(Box::new(EmptySource::new()));
        }
        reverse_remap_vec(self.src.form().col(self.cols.map(c))?, self.rows.clone())
    }

    fn rows(&self) -> Result<BoxOuter<T>> {
        if !self.rows.monotone() {
            return Ok(Box::new(StreamRows::new(self.stream()?)));
        }
        let rows = self.rows.clone();
        let cols = self.cols.clone();
        let mut outer = self.src.form().rows()?;
        Ok(Box::new(FnOuter::new(move || {
            loop {
                let Some((r, src)) = outer.next()? else {
                    return Ok(None);
                };
                // Source rows outside the index list contribute nothing.
                let Some(i) = rows.positions_of(r).first().copied() else {
                    continue;
                };
                return Ok(Some((i, reverse_remap_vec(src, cols.clone())?)));
            }
        })))
    }

    fn cols(&self) -> Result<BoxOuter<T>> {
        if !self.cols.monotone() {
            let form: Arc<dyn MatrixForm<T>> = Arc::new(ExtractMat {
                nr: self.nr,
                nc: self.nc,
                src: self.src.clone(),
                rows: self.rows.clone(),
                cols: self.cols.clone(),
            });
            return crate::form::matrix::cols_via_stream(self.stream()?, form);
        }
        let rows = self.rows.clone();
        let cols = self.cols.clone();
        let mut outer = self.src.form().cols()?;
        Ok(Box::new(FnOuter::new(move || {
            loop {
                let Some((c, src)) = outer.next()? else {
                    return Ok(None);
                };
                let Some(j) = cols.positions_of(c).first().copied() else {
                    continue;
                };
                return Ok(Some((j, reverse_remap_vec(src, rows.clone())?)));
            }
        })))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<T>>> {
        resize_collect(self.stream()?, nr, nc)
    }
}
