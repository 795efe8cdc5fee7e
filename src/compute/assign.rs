//! Assign producers: the unmasked source-remapping side of assign.
//!
//! An assign producer emits the source in the *output* coordinate system,
//! restricted to the assignment region; the partial-update semantics (prior
//! values surviving outside the region) live in the masked wrapper, which
//! carries the region alongside these producers.
//!
//! When the index list is not strictly increasing the remapped stream loses
//! monotonicity; those paths collect and re-sort before emitting. An
//! assigned constant is generated, not stored; assigning an *empty* scalar
//! produces the empty stream, which under the wrapper's region semantics
//! deletes the region.

use crate::error::Result;
use crate::form::matrix::resize_collect;
use crate::form::vector::{ConstantVector, SparseVector};
use crate::form::{BoxOuter, FnOuter, MatSource, MatrixForm, OuterSource, VecSource, VectorForm};
use crate::index::{Ix, Region};
use crate::pipeline::collect::{collect_mat_sorted, collect_vec_sorted};
use crate::pipeline::{BatchVecSource, EmptySource, Source, DEFAULT_BATCH};
use crate::reference::{MatRef, ScalarRef, VecRef};
use crate::slice::{CowBuf, MatSlice, VecSlice};
use crate::types::Element;
use std::sync::Arc;

/// Remap a stream of source positions through a region's target list.
struct RemapVec<T: Element> {
    src: VecSource<T>,
    region: Region,
}

impl<T: Element> Source for RemapVec<T> {
    type Batch = VecSlice<T>;

    fn fetch(&mut self, size: usize) -> Result<Option<VecSlice<T>>> {
        let Some(b) = self.src.fetch(size)? else {
            return Ok(None);
        };
        let idx: Vec<Ix> = b.indices().iter().map(|&k| self.region.map(k)).collect();
        Ok(Some(VecSlice {
            idx: CowBuf::new(idx),
            val: b.val,
        }))
    }
}

/// Remap `src` through `region`; collects and re-sorts when the region is
/// not monotone (last write wins on repeated targets).
pub(crate) fn remap_vec<T: Element>(src: VecSource<T>, region: Region) -> Result<VecSource<T>> {
    let monotone = region.monotone();
    let remapped: VecSource<T> = Box::new(RemapVec { src, region });
    if monotone {
        return Ok(remapped);
    }
    let (mut idx, mut val) = collect_vec_sorted(remapped)?;
    // Stable sort keeps source order within a target; the first occurrence
    // wins on repeated targets.
    let mut w = 0usize;
    for p in 0..idx.len() {
        if w == 0 || idx[p] != idx[w - 1] {
            idx[w] = idx[p];
            val[w] = val[p].clone();
            w += 1;
        }
    }
    idx.truncate(w);
    val.truncate(w);
    Ok(Box::new(BatchVecSource::new(vec![VecSlice::new(idx, val)])))
}

struct RemapMat<T: Element> {
    src: MatSource<T>,
    rows: Region,
    cols: Region,
}

impl<T: Element> Source for RemapMat<T> {
    type Batch = MatSlice<T>;

    fn fetch(&mut self, size: usize) -> Result<Option<MatSlice<T>>> {
        let Some(b) = self.src.fetch(size)? else {
            return Ok(None);
        };
        let row: Vec<Ix> = b.rows().iter().map(|&i| self.rows.map(i)).collect();
        let col: Vec<Ix> = b.cols().iter().map(|&j| self.cols.map(j)).collect();
        Ok(Some(MatSlice {
            row: CowBuf::new(row),
            col: CowBuf::new(col),
            val: b.val,
        }))
    }
}

fn remap_mat<T: Element>(src: MatSource<T>, rows: Region, cols: Region) -> Result<MatSource<T>> {
    let monotone = rows.monotone() && cols.monotone();
    let remapped: MatSource<T> = Box::new(RemapMat { src, rows, cols });
    if monotone {
        return Ok(remapped);
    }
    let (mut row, mut col, mut val) = collect_mat_sorted(remapped)?;
    let mut w = 0usize;
    for p in 0..row.len() {
        if w == 0 || (row[p], col[p]) != (row[w - 1], col[w - 1]) {
            row[w] = row[p];
            col[w] = col[p];
            val[w] = val[p].clone();
            w += 1;
        }
    }
    row.truncate(w);
    col.truncate(w);
    val.truncate(w);
    Ok(Box::new(BatchVecSource::new(vec![MatSlice::new(
        row, col, val,
    )])))
}

/// Constant entries over a region's targets, ascending.
fn const_region_stream<T: Element>(region: &Region, v: T) -> Result<VecSource<T>> {
    match region {
        Region::All(n) => ConstantVector::new(*n, v).stream(),
        Region::List { .. } => {
            let targets = region.sorted_targets();
            let batches: Vec<VecSlice<T>> = targets
                .chunks(DEFAULT_BATCH)
                .map(|c| VecSlice::new(c.to_vec(), vec![v.clone(); c.len()]))
                .collect();
            Ok(Box::new(BatchVecSource::new(batches)))
        }
    }
}

/// Fix the row coordinate of a 1-D stream, yielding matrix slices.
struct RowBand<T: Element> {
    src: VecSource<T>,
    row: Ix,
}

impl<T: Element> Source for RowBand<T> {
    type Batch = MatSlice<T>;

    fn fetch(&mut self, size: usize) -> Result<Option<MatSlice<T>>> {
        let Some(b) = self.src.fetch(size)? else {
            return Ok(None);
        };
        Ok(Some(MatSlice {
            row: CowBuf::new(vec![self.row; b.len()]),
            col: b.idx,
            val: b.val,
        }))
    }
}

/// Fix the column coordinate of a 1-D stream keyed by row.
struct ColBand<T: Element> {
    src: VecSource<T>,
    col: Ix,
}

impl<T: Element> Source for ColBand<T> {
    type Batch = MatSlice<T>;

    fn fetch(&mut self, size: usize) -> Result<Option<MatSlice<T>>> {
        let Some(b) = self.src.fetch(size)? else {
            return Ok(None);
        };
        let n = b.len();
        Ok(Some(MatSlice {
            row: b.idx,
            col: CowBuf::new(vec![self.col; n]),
            val: b.val,
        }))
    }
}

/* ===================== vector producers ===================== */

/// `w(I) = u` deferred: the source emitted at the region's coordinates.
pub(crate) struct AssignVec<T: Element> {
    size: Ix,
    src: VecRef<T>,
    region: Region,
}

impl<T: Element> AssignVec<T> {
    pub(crate) fn new(size: Ix, src: VecRef<T>, region: Region) -> Self {
        AssignVec { size, src, region }
    }
}

impl<T: Element> VectorForm<T> for AssignVec<T> {
    fn size(&self) -> Ix {
        self.size
    }

    fn get(&self, i: Ix) -> Result<Option<T>> {
        match self.region.position(i) {
            None => Ok(None),
            Some(k) => self.src.get(k),
        }
    }

    fn stream(&self) -> Result<VecSource<T>> {
        remap_vec(self.src.stream()?, self.region.clone())
    }

    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<T>>> {
        SparseVector::collect(self.size, self.stream()?)?.resized(n)
    }
}

/// `w(I) = value` deferred; `None` is the empty producer (delete-at-region).
pub(crate) struct AssignConstVec<T: Element> {
    size: Ix,
    region: Region,
    value: Option<T>,
}

impl<T: Element> AssignConstVec<T> {
    pub(crate) fn new(size: Ix, region: Region, value: Option<T>) -> Self {
        AssignConstVec {
            size,
            region,
            value,
        }
    }
}

impl<T: Element> VectorForm<T> for AssignConstVec<T> {
    fn size(&self) -> Ix {
        self.size
    }

    fn get(&self, i: Ix) -> Result<Option<T>> {
        Ok(match &self.value {
            Some(v) if self.region.contains(i) => Some(v.clone()),
            _ => None,
        })
    }

    fn stream(&self) -> Result<VecSource<T>> {
        match &self.value {
            None => Ok(Box::new(EmptySource::new())),
            Some(v) => const_region_stream(&self.region, v.clone()),
        }
    }

    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<T>>> {
        SparseVector::collect(self.size, self.stream()?)?.resized(n)
    }
}

/// `w(I) = s` for a scalar reference, resolved at stream time; an empty
/// scalar reduces to delete-at-region.
pub(crate) struct AssignScalarVec<T: Element> {
    size: Ix,
    region: Region,
    scalar: ScalarRef<T>,
}

impl<T: Element> AssignScalarVec<T> {
    pub(crate) fn new(size: Ix, region: Region, scalar: ScalarRef<T>) -> Self {
        AssignScalarVec {
            size,
            region,
            scalar,
        }
    }
}

impl<T: Element> VectorForm<T> for AssignScalarVec<T> {
    fn size(&self) -> Ix {
        self.size
    }

    fn get(&self, i: Ix) -> Result<Option<T>> {
        if !self.region.contains(i) {
            return Ok(None);
        }
        self.scalar.get()
    }

    fn stream(&self) -> Result<VecSource<T>> {
        match self.scalar.get()? {
            None => Ok(Box::new(EmptySource::new())),
            Some(v) => const_region_stream(&self.region, v),
        }
    }

    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<T>>> {
        SparseVector::collect(self.size, self.stream()?)?.resized(n)
    }
}

/* ===================== matrix producers ===================== */

/// `C(I, J) = A` deferred.
pub(crate) struct AssignMat<T: Element> {
    nr: Ix,
    nc: Ix,
    src: MatRef<T>,
    rows: Region,
    cols: Region,
}

impl<T: Element> AssignMat<T> {
    pub(crate) fn new(nr: Ix, nc: Ix, src: MatRef<T>, rows: Region, cols: Region) -> Self {
        AssignMat {
            nr,
            nc,
            src,
            rows,
            cols,
        }
    }
}

impl<T: Element> MatrixForm<T> for AssignMat<T> {
    fn nrows(&self) -> Ix {
        self.nr
    }

    fn ncols(&self) -> Ix {
        self.nc
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<T>> {
        match (self.rows.position(r), self.cols.position(c)) {
            (Some(pr), Some(pc)) => self.src.get(pr, pc),
            _ => Ok(None),
        }
    }

    fn stream(&self) -> Result<MatSource<T>> {
        remap_mat(
            self.src.form().stream()?,
            self.rows.clone(),
            self.cols.clone(),
        )
    }

    fn row(&self, r: Ix) -> Result<VecSource<T>> {
        match self.rows.position(r) {
            None => Ok(Box::new(EmptySource::new())),
            Some(pr) => remap_vec(self.src.form().row(pr)?, self.cols.clone()),
        }
    }

    fn col(&self, c: Ix) -> Result<VecSource<T>> {
        match self.cols.position(c) {
            None => Ok(Box::new(EmptySource::new())),
            Some(pc) => remap_vec(self.src.form().col(pc)?, self.rows.clone()),
        }
    }

    fn rows(&self) -> Result<BoxOuter<T>> {
        if self.rows.monotone() {
            let rows = self.rows.clone();
            let cols = self.cols.clone();
            let mut outer = self.src.form().rows()?;
            return Ok(Box::new(FnOuter::new(move || {
                match outer.next()? {
                    None => Ok(None),
                    Some((k, src)) => Ok(Some((rows.map(k), remap_vec(src, cols.clone())?))),
                }
            })));
        }
        Ok(Box::new(crate::form::StreamRows::new(self.stream()?)))
    }

    fn cols(&self) -> Result<BoxOuter<T>> {
        if self.cols.monotone() {
            let rows = self.rows.clone();
            let cols = self.cols.clone();
            let mut outer = self.src.form().cols()?;
            return Ok(Box::new(FnOuter::new(move || {
                match outer.next()? {
                    None => Ok(None),
                    Some((k, src)) => Ok(Some((cols.map(k), remap_vec(src, rows.clone())?))),
                }
            })));
        }
        let form: Arc<dyn MatrixForm<T>> = Arc::new(AssignMat {
            nr: self.nr,
            nc: self.nc,
            src: self.src.clone(),
            rows: self.rows.clone(),
            cols: self.cols.clone(),
        });
        crate::form::matrix::cols_via_stream(self.stream()?, form)
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<T>>> {
        resize_collect(self.stream()?, nr, nc)
    }
}

/// `C(r, J) = u` deferred: one row updated from a vector.
pub(crate) struct AssignRowMat<T: Element> {
    nr: Ix,
    nc: Ix,
    row: Ix,
    cols: Region,
    src: VecRef<T>,
}

impl<T: Element> AssignRowMat<T> {
    pub(crate) fn new(nr: Ix, nc: Ix, row: Ix, cols: Region, src: VecRef<T>) -> Self {
        AssignRowMat {
            nr,
            nc,
            row,
            cols,
            src,
        }
    }
}

impl<T: Element> MatrixForm<T> for AssignRowMat<T> {
    fn nrows(&self) -> Ix {
        self.nr
    }

    fn ncols(&self) -> Ix {
        self.nc
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<T>> {
        if r != self.row {
            return Ok(None);
        }
        match self.cols.position(c) {
            None => Ok(None),
            Some(k) => self.src.get(k),
        }
    }

    fn stream(&self) -> Result<MatSource<T>> {
        let band = remap_vec(self.src.stream()?, self.cols.clone())?;
        Ok(Box::new(RowBand {
            src: band,
            row: self.row,
        }))
    }

    fn row(&self, r: Ix) -> Result<VecSource<T>> {
        if r != self.row {
            return Ok(Box::new(EmptySource::new()));
        }
        remap_vec(self.src.stream()?, self.cols.clone())
    }

    fn col(&self, c: Ix) -> Result<VecSource<T>> {
        match self.cols.position(c) {
            None => Ok(Box::new(EmptySource::new())),
            Some(k) => match self.src.get(k)? {
                None => Ok(Box::new(EmptySource::new())),
                Some(v) => Ok(Box::new(BatchVecSource::new(vec![VecSlice::new(
                    vec![self.row],
                    vec![v],
                )]))),
            },
        }
    }

    fn rows(&self) -> Result<BoxOuter<T>> {
        let mut pending = Some((self.row, self.src.clone(), self.cols.clone()));
        Ok(Box::new(FnOuter::new(move || {
            let Some((row, src, cols)) = pending.take() else {
                return Ok(None);
            };
            Ok(Some((row, remap_vec(src.stream()?, cols)?)))
        })))
    }

    fn cols(&self) -> Result<BoxOuter<T>> {
        let form: Arc<dyn MatrixForm<T>> = Arc::new(AssignRowMat {
            nr: self.nr,
            nc: self.nc,
            row: self.row,
            cols: self.cols.clone(),
            src: self.src.clone(),
        });
        crate::form::matrix::cols_via_stream(self.stream()?, form)
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<T>>> {
        resize_collect(self.stream()?, nr, nc)
    }
}

/// `C(I, c) = u` deferred: one column updated from a vector.
pub(crate) struct AssignColMat<T: Element> {
    nr: Ix,
    nc: Ix,
    col: Ix,
    rows: Region,
    src: VecRef<T>,
}

impl<T: Element> AssignColMat<T> {
    pub(crate) fn new(nr: Ix, nc: Ix, col: Ix, rows: Region, src: VecRef<T>) -> Self {
        AssignColMat {
            nr,
            nc,
            col,
            rows,
            src,
        }
    }
}

impl<T: Element> MatrixForm<T> for AssignColMat<T> {
    fn nrows(&self) -> Ix {
        self.nr
    }

    fn ncols(&self) -> Ix {
        self.nc
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<T>> {
        if c != self.col {
            return Ok(None);
        }
        match self.rows.position(r) {
            None => Ok(None),
            Some(k) => self.src.get(k),
        }
    }

    fn stream(&self) -> Result<MatSource<T>> {
        let band = remap_vec(self.src.stream()?, self.rows.clone())?;
        Ok(Box::new(ColBand {
            src: band,
            col: self.col,
        }))
    }

    fn row(&self, r: Ix) -> Result<VecSource<T>> {
        match self.rows.position(r) {
            None => Ok(Box::new(EmptySource::new())),
            Some(k) => match self.src.get(k)? {
                None => Ok(Box::new(EmptySource::new())),
                Some(v) => Ok(Box::new(BatchVecSource::new(vec![VecSlice::new(
                    vec![self.col],
                    vec![v],
                )]))),
            },
        }
    }

    fn col(&self, c: Ix) -> Result<VecSource<T>> {
        if c != self.col {
            return Ok(Box::new(EmptySource::new()));
        }
        remap_vec(self.src.stream()?, self.rows.clone())
    }

    fn rows(&self) -> Result<BoxOuter<T>> {
        Ok(Box::new(crate::form::StreamRows::new(self.stream()?)))
    }

    fn cols(&self) -> Result<BoxOuter<T>> {
        let mut pending = Some((self.col, self.src.clone(), self.rows.clone()));
        Ok(Box::new(FnOuter::new(move || {
            let Some((col, src, rows)) = pending.take() else {
                return Ok(None);
            };
            Ok(Some((col, remap_vec(src.stream()?, rows)?)))
        })))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<T>>> {
        resize_collect(self.stream()?, nr, nc)
    }
}

/// `C(I, J) = value` deferred; `None` deletes the region.
pub(crate) struct AssignConstMat<T: Element> {
    nr: Ix,
    nc: Ix,
    rows: Region,
    cols: Region,
    value: Option<T>,
}

impl<T: Element> AssignConstMat<T> {
    pub(crate) fn new(nr: Ix, nc: Ix, rows: Region, cols: Region, value: Option<T>) -> Self {
        AssignConstMat {
            nr,
            nc,
            rows,
            cols,
            value,
        }
    }
}

impl<T: Element> MatrixForm<T> for AssignConstMat<T> {
    fn nrows(&self) -> Ix {
        self.nr
    }

    fn ncols(&self) -> Ix {
        self.nc
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<T>> {
        Ok(match &self.value {
            Some(v) if self.rows.contains(r) && self.cols.contains(c) => Some(v.clone()),
            _ => None,
        })
    }

    fn stream(&self) -> Result<MatSource<T>> {
        let Some(v) = &self.value else {
            return Ok(Box::new(EmptySource::new()));
        };
        struct BandRows<T: Element> {
            row_targets: Vec<Ix>,
            cols: Region,
            v: T,
            at: usize,
            cur: Option<VecSource<T>>,
        }
        impl<T: Element> Source for BandRows<T> {
            type Batch = MatSlice<T>;

            fn fetch(&mut self, size: usize) -> Result<Option<MatSlice<T>>> {
                loop {
                    if self.cur.is_none() {
                        if self.at >= self.row_targets.len() {
                            return Ok(None);
                        }
                        self.cur = Some(const_region_stream(&self.cols, self.v.clone())?);
                    }
                    let row = self.row_targets[self.at];
                    match self.cur.as_mut().expect("current row stream").fetch(size)? {
                        Some(b) => {
                            return Ok(Some(MatSlice {
                                row: CowBuf::new(vec![row; b.len()]),
                                col: b.idx,
                                val: b.val,
                            }));
                        }
                        None => {
                            self.cur = None;
                            self.at += 1;
                        }
                    }
                }
            }
        }
        Ok(Box::new(BandRows {
            row_targets: self.rows.sorted_targets(),
            cols: self.cols.clone(),
            v: v.clone(),
            at: 0,
            cur: None,
        }))
    }

    fn row(&self, r: Ix) -> Result<VecSource<T>> {
        match &self.value {
            Some(v) if self.rows.contains(r) => const_region_stream(&self.cols, v.clone()),
            _ => Ok(Box::new(EmptySource::new())),
        }
    }

    fn col(&self, c: Ix) -> Result<VecSource<T>> {
        match &self.value {
            Some(v) if self.cols.contains(c) => const_region_stream(&self.rows, v.clone()),
            _ => Ok(Box::new(EmptySource::new())),
        }
    }

    fn rows(&self) -> Result<BoxOuter<T>> {
        let Some(v) = &self.value else {
            return Ok(Box::new(FnOuter::new(|| Ok(None))));
        };
        let targets = self.rows.sorted_targets();
        let cols = self.cols.clone();
        let v = v.clone();
        let mut at = 0usize;
        Ok(Box::new(FnOuter::new(move || {
            if at >= targets.len() {
                return Ok(None);
            }
            let key = targets[at];
            at += 1;
            Ok(Some((key, const_region_stream(&cols, v.clone())?)))
        })))
    }

    fn cols(&self) -> Result<BoxOuter<T>> {
        let Some(v) = &self.value else {
            return Ok(Box::new(FnOuter::new(|| Ok(None))));
        };
        let targets = self.cols.sorted_targets();
        let rows = self.rows.clone();
        let v = v.clone();
        let mut at = 0usize;
        Ok(Box::new(FnOuter::new(move || {
            if at >= targets.len() {
                return Ok(None);
            }
            let key = targets[at];
            at += 1;
            Ok(Some((key, const_region_stream(&rows, v.clone())?)))
        })))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<T>>> {
        resize_collect(self.stream()?, nr, nc)
    }
}

/// `C(I, J) = s` for a scalar reference, resolved at stream time.
pub(crate) struct AssignScalarMat<T: Element> {
    nr: Ix,
    nc: Ix,
    rows: Region,
    cols: Region,
    scalar: ScalarRef<T>,
}

impl<T: Element> AssignScalarMat<T> {
    pub(crate) fn new(nr: Ix, nc: Ix, rows: Region, cols: Region, scalar: ScalarRef<T>) -> Self {
        AssignScalarMat {
            nr,
            nc,
            rows,
            cols,
            scalar,
        }
    }

    fn resolved(&self) -> Result<AssignConstMat<T>> {
        Ok(AssignConstMat::new(
            self.nr,
            self.nc,
            self.rows.clone(),
            self.cols.clone(),
            self.scalar.get()?,
        ))
    }
}

impl<T: Element> MatrixForm<T> for AssignScalarMat<T> {
    fn nrows(&self) -> Ix {
        self.nr
    }

    fn ncols(&self) -> Ix {
        self.nc
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<T>> {
        if !(self.rows.contains(r) && self.cols.contains(c)) {
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
        resize_collect(self.stream()?, nr, nc)
    }
}
