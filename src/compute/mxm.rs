//! Multiplication nodes: matrix×matrix, matrix×vector, vector×matrix.
//!
//! `extract_one(r, c)` zippers row r of A against column c of B under the
//! semiring multiply and reduces under its monoid. The full stream iterates
//! the non-empty rows of A; for each, it walks the non-empty columns of B
//! computing dot products and batching results (512 per slice). Column
//! streams are regenerated per pairing — a deliberate simplicity choice —
//! with only the column key list gathered once per stream.

use crate::compute::materialize_vec;
use crate::error::Result;
use crate::form::matrix::resize_collect;
use crate::form::vector::SparseVector;
use crate::form::{BoxOuter, FnOuter, MatSource, MatrixForm, OuterSource, VecSource, VectorForm};
use crate::index::Ix;
use crate::ops::Semiring;
use crate::pipeline::{Source, DEFAULT_BATCH};
use crate::reference::{MatRef, VecRef};
use crate::slice::{MatSlice, VecSlice};
use crate::types::Element;
use std::sync::Arc;

/// Dot of a materialized left side against a streamed right side.
pub(crate) fn dot_mem_stream<A: Element, B: Element, C: Element>(
    x: &[(Ix, A)],
    mut y: VecSource<B>,
    ring: &Semiring<A, B, C>,
) -> Result<Option<C>> {
    if x.is_empty() {
        return Ok(None);
    }
    let mut acc: Option<C> = None;
    while let Some(b) = y.fetch(DEFAULT_BATCH)? {
        for (p, &i) in b.indices().iter().enumerate() {
            if let Ok(q) = x.binary_search_by_key(&i, |&(k, _)| k) {
                let prod = ring.mul().apply(&x[q].1, &b.values()[p]);
                acc = Some(match acc {
                    None => prod,
                    Some(a) => ring.add().fold(&a, &prod),
                });
            }
        }
    }
    Ok(acc)
}

/// Dot of a streamed left side against a materialized right side.
pub(crate) fn dot_stream_mem<A: Element, B: Element, C: Element>(
    mut x: VecSource<A>,
    y: &[(Ix, B)],
    ring: &Semiring<A, B, C>,
) -> Result<Option<C>> {
    if y.is_empty() {
        return Ok(None);
    }
    let mut acc: Option<C> = None;
    while let Some(b) = x.fetch(DEFAULT_BATCH)? {
        for (p, &i) in b.indices().iter().enumerate() {
            if let Ok(q) = y.binary_search_by_key(&i, |&(k, _)| k) {
                let prod = ring.mul().apply(&b.values()[p], &y[q].1);
                acc = Some(match acc {
                    None => prod,
                    Some(a) => ring.add().fold(&a, &prod),
                });
            }
        }
    }
    Ok(acc)
}

fn outer_keys<T: Element>(mut outer: BoxOuter<T>) -> Result<Vec<Ix>> {
    let mut keys = Vec::new();
    while let Some((k, _)) = outer.next()? {
        keys.push(k);
    }
    Ok(keys)
}

/* ===================== matrix × matrix ===================== */

/// `C = A · B` under a semiring, deferred.
pub(crate) struct MxMMat<A: Element, B: Element, C: Element> {
    a: MatRef<A>,
    b: MatRef<B>,
    ring: Semiring<A, B, C>,
}

impl<A: Element, B: Element, C: Element> Clone for MxMMat<A, B, C> {
    fn clone(&self) -> Self {
        MxMMat {
            a: self.a.clone(),
            b: self.b.clone(),
            ring: self.ring.clone(),
        }
    }
}

impl<A: Element, B: Element, C: Element> MxMMat<A, B, C> {
    pub(crate) fn new(a: MatRef<A>, b: MatRef<B>, ring: Semiring<A, B, C>) -> Self {
        MxMMat { a, b, ring }
    }
}

struct MxmStream<A: Element, B: Element, C: Element> {
    a_rows: BoxOuter<A>,
    b_form: Arc<dyn MatrixForm<B>>,
    b_cols: Vec<Ix>,
    ring: Semiring<A, B, C>,
    cur: Option<(Ix, Vec<(Ix, A)>)>,
    col_at: usize,
}

impl<A: Element, B: Element, C: Element> Source for MxmStream<A, B, C> {
    type Batch = MatSlice<C>;

    fn fetch(&mut self, _size: usize) -> Result<Option<MatSlice<C>>> {
        let mut row = Vec::new();
        let mut col = Vec::new();
        let mut val = Vec::new();
        loop {
            if self.cur.is_none() {
                match self.a_rows.next()? {
                    None => break,
                    Some((r, src)) => {
                        self.cur = Some((r, materialize_vec(src)?));
                        self.col_at = 0;
                    }
                }
            }
            let (r, x) = self.cur.as_ref().expect("current row");
            while self.col_at < self.b_cols.len() && val.len() < DEFAULT_BATCH {
                let c = self.b_cols[self.col_at];
                self.col_at += 1;
                if let Some(v) = dot_mem_stream(x, self.b_form.col(c)?, &self.ring)? {
                    row.push(*r);
                    col.push(c);
                    val.push(v);
                }
            }
            if self.col_at >= self.b_cols.len() {
                self.cur = None;
            }
            if val.len() >= DEFAULT_BATCH {
                break;
            }
        }
        Ok((!val.is_empty()).then(|| MatSlice::new(row, col, val)))
    }
}

impl<A: Element, B: Element, C: Element> MatrixForm<C> for MxMMat<A, B, C> {
    fn nrows(&self) -> Ix {
        self.a.nrows()
    }

    fn ncols(&self) -> Ix {
        self.b.ncols()
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<C>> {
        let x = materialize_vec(self.a.form().row(r)?)?;
        dot_mem_stream(&x, self.b.form().col(c)?, &self.ring)
    }

    fn stream(&self) -> Result<MatSource<C>> {
        let b_form = self.b.form();
        Ok(Box::new(MxmStream {
            a_rows: self.a.form().rows()?,
            b_cols: outer_keys(b_form.cols()?)?,
            b_form,
            ring: self.ring.clone(),
            cur: None,
            col_at: 0,
        }))
    }

    fn row(&self, r: Ix) -> Result<VecSource<C>> {
        let x = materialize_vec(self.a.form().row(r)?)?;
        let b_form = self.b.form();
        let b_cols = outer_keys(b_form.cols()?)?;
        let ring = self.ring.clone();
        struct RowDots<A: Element, B: Element, C: Element> {
            x: Vec<(Ix, A)>,
            b_form: Arc<dyn MatrixForm<B>>,
            b_cols: Vec<Ix>,
            ring: Semiring<A, B, C>,
            at: usize,
        }
        impl<A: Element, B: Element, C: Element> Source for RowDots<A, B, C> {
            type Batch = VecSlice<C>;

            fn fetch(&mut self, size: usize) -> Result<Option<VecSlice<C>>> {
                let mut idx = Vec::new();
                let mut val = Vec::new();
                while self.at < self.b_cols.len() && val.len() < size.max(1) {
                    let c = self.b_cols[self.at];
                    self.at += 1;
                    if let Some(v) = dot_mem_stream(&self.x, self.b_form.col(c)?, &self.ring)? {
                        idx.push(c);
                        val.push(v);
                    }
                }
                Ok((!idx.is_empty()).then(|| VecSlice::new(idx, val)))
            }
        }
        Ok(Box::new(RowDots {
            x,
            b_form,
            b_cols,
            ring,
            at: 0,
        }))
    }

    fn col(&self, c: Ix) -> Result<VecSource<C>> {
        let y = materialize_vec(self.b.form().col(c)?)?;
        let a_rows = self.a.form().rows()?;
        let ring = self.ring.clone();
        struct ColDots<A: Element, B: Element, C: Element> {
            y: Vec<(Ix, B)>,
            a_rows: BoxOuter<A>,
            ring: Semiring<A, B, C>,
        }
        impl<A: Element, B: Element, C: Element> Source for ColDots<A, B, C> {
            type Batch = VecSlice<C>;

            fn fetch(&mut self, size: usize) -> Result<Option<VecSlice<C>>> {
                let mut idx = Vec::new();
                let mut val = Vec::new();
                while val.len() < size.max(1) {
                    let Some((r, src)) = self.a_rows.next()? else {
                        break;
                    };
                    if let Some(v) = dot_stream_mem(src, &self.y, &self.ring)? {
                        idx.push(r);
                        val.push(v);
                    }
                }
                Ok((!idx.is_empty()).then(|| VecSlice::new(idx, val)))
            }
        }
        Ok(Box::new(ColDots { y, a_rows, ring }))
    }

    fn rows(&self) -> Result<BoxOuter<C>> {
        let node = self.clone();
        let mut outer = self.a.form().rows()?;
        Ok(Box::new(FnOuter::new(move || {
            match outer.next()? {
                None => Ok(None),
                Some((r, _)) => Ok(Some((r, node.row(r)?))),
            }
        })))
    }

    fn cols(&self) -> Result<BoxOuter<C>> {
        let node = self.clone();
        let mut outer = self.b.form().cols()?;
        Ok(Box::new(FnOuter::new(move || {
            match outer.next()? {
                None => Ok(None),
                Some((c, _)) => Ok(Some((c, node.col(c)?))),
            }
        })))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<C>>> {
        resize_collect(self.stream()?, nr, nc)
    }
}

/* ===================== matrix × vector ===================== */

/// `w = A · u` under a semiring, deferred.
pub(crate) struct MxVVec<A: Element, B: Element, C: Element> {
    size: Ix,
    a: MatRef<A>,
    u: VecRef<B>,
    ring: Semiring<A, B, C>,
}

impl<A: Element, B: Element, C: Element> MxVVec<A, B, C> {
    pub(crate) fn new(a: MatRef<A>, u: VecRef<B>, ring: Semiring<A, B, C>) -> Self {
        MxVVec {
            size: a.nrows(),
            a,
            u,
            ring,
        }
    }
}

impl<A: Element, B: Element, C: Element> VectorForm<C> for MxVVec<A, B, C> {
    fn size(&self) -> Ix {
        self.size
    }

    fn get(&self, i: Ix) -> Result<Option<C>> {
        let x = materialize_vec(self.a.form().row(i)?)?;
        dot_mem_stream(&x, self.u.stream()?, &self.ring)
    }

    fn stream(&self) -> Result<VecSource<C>> {
        let y = materialize_vec(self.u.stream()?)?;
        let a_rows = self.a.form().rows()?;
        let ring = self.ring.clone();
        struct RowFold<A: Element, B: Element, C: Element> {
            y: Vec<(Ix, B)>,
            a_rows: BoxOuter<A>,
            ring: Semiring<A, B, C>,
        }
        impl<A: Element, B: Element, C: Element> Source for RowFold<A, B, C> {
            type Batch = VecSlice<C>;

            fn fetch(&mut self, size: usize) -> Result<Option<VecSlice<C>>> {
                let mut idx = Vec::new();
                let mut val = Vec::new();
                while val.len() < size.max(1) {
                    let Some((r, src)) = self.a_rows.next()? else {
                        break;
                    };
                    if let Some(v) = dot_stream_mem(src, &self.y, &self.ring)? {
                        idx.push(r);
                        val.push(v);
                    }
                }
                Ok((!idx.is_empty()).then(|| VecSlice::new(idx, val)))
            }
        }
        Ok(Box::new(RowFold { y, a_rows, ring }))
    }

    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<C>>> {
        SparseVector::collect(self.size, self.stream()?)?.resized(n)
    }
}

/* ===================== vector × matrix ===================== */

/// `w = u · A` under a semiring, deferred.
pub(crate) struct VxMVec<A: Element, B: Element, C: Element> {
    size: Ix,
    u: VecRef<A>,
    a: MatRef<B>,
    ring: Semiring<A, B, C>,
}

impl<A: Element, B: Element, C: Element> VxMVec<A, B, C> {
    pub(crate) fn new(u: VecRef<A>, a: MatRef<B>, ring: Semiring<A, B, C>) -> Self {
        VxMVec {
            size: a.ncols(),
            u,
            a,
            ring,
        }
    }
}

impl<A: Element, B: Element, C: Element> VectorForm<C> for VxMVec<A, B, C> {
    fn size(&self) -> Ix {
        self.size
    }

    fn get(&self, j: Ix) -> Result<Option<C>> {
        let x = materialize_vec(self.u.stream()?)?;
        dot_mem_stream(&x, self.a.form().col(j)?, &self.ring)
    }

    fn stream(&self) -> Result<VecSource<C>> {
        let x = materialize_vec(self.u.stream()?)?;
        let a_cols = self.a.form().cols()?;
        let ring = self.ring.clone();
        struct ColFold<A: Element, B: Element, C: Element> {
            x: Vec<(Ix, A)>,
            a_cols: BoxOuter<B>,
            ring: Semiring<A, B, C>,
        }
        impl<A: Element, B: Element, C: Element> Source for ColFold<A, B, C> {
            type Batch = VecSlice<C>;

            fn fetch(&mut self, size: usize) -> Result<Option<VecSlice<C>>> {
                let mut idx = Vec::new();
                let mut val = Vec::new();
                while val.len() < size.max(1) {
                    let Some((c, src)) = self.a_cols.next()? else {
                        break;
                    };
                    if let Some(v) = dot_mem_stream(&self.x, src, &self.ring)? {
                        idx.push(c);
                        val.push(v);
                    }
                }
                Ok((!idx.is_empty()).then(|| VecSlice::new(idx, val)))
            }
        }
        Ok(Box::new(ColFold { x, a_cols, ring }))
    }

    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<C>>> {
        SparseVector::collect(self.size, self.stream()?)?.resized(n)
    }
}
