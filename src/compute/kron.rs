//! Kronecker product nodes.
//!
//! Entry (r, c) of A with entry (r′, c′) of B lands at
//! `(r · Bnrows + r′, c · Bncols + c′)` carrying `op(Aval, Bval)`. The
//! stream is a fused two-level row walk: for each non-empty row of A, the
//! non-empty rows of B are replayed; within one block row, A's ascending
//! columns span disjoint ascending column blocks, so output order is
//! row-major without sorting.

use crate::compute::materialize_vec;
use crate::error::Result;
use crate::form::matrix::resize_collect;
use crate::form::{BoxOuter, FnOuter, MatSource, MatrixForm, OuterSource, VecSource, VectorForm};
use crate::index::Ix;
use crate::ops::BinaryOp;
use crate::pipeline::{BatchVecSource, Source};
use crate::reference::MatRef;
use crate::slice::{MatSlice, VecSlice};
use crate::types::Element;
use std::sync::Arc;

/// `C = A ⊗ B` under `op`, deferred.
pub(crate) struct KronMat<A: Element, B: Element, C: Element> {
    a: MatRef<A>,
    b: MatRef<B>,
    op: BinaryOp<A, B, C>,
}

impl<A: Element, B: Element, C: Element> Clone for KronMat<A, B, C> {
    fn clone(&self) -> Self {
        KronMat {
            a: self.a.clone(),
            b: self.b.clone(),
            op: self.op.clone(),
        }
    }
}

impl<A: Element, B: Element, C: Element> KronMat<A, B, C> {
    pub(crate) fn new(a: MatRef<A>, b: MatRef<B>, op: BinaryOp<A, B, C>) -> Self {
        KronMat { a, b, op }
    }

    fn block(&self) -> (Ix, Ix) {
        (self.b.nrows(), self.b.ncols())
    }
}

struct KronStream<A: Element, B: Element, C: Element> {
    a_rows: BoxOuter<A>,
    b_form: Arc<dyn MatrixForm<B>>,
    op: BinaryOp<A, B, C>,
    bnr: Ix,
    bnc: Ix,
    cur_a: Option<(Ix, Vec<(Ix, A)>)>,
    b_rows: Option<BoxOuter<B>>,
}

impl<A: Element, B: Element, C: Element> Source for KronStream<A, B, C> {
    type Batch = MatSlice<C>;

    fn fetch(&mut self, _size: usize) -> Result<Option<MatSlice<C>>> {
        loop {
            if self.cur_a.is_none() {
                match self.a_rows.next()? {
                    None => return Ok(None),
                    Some((ra, src)) => {
                        self.cur_a = Some((ra, materialize_vec(src)?));
                        self.b_rows = Some(self.b_form.rows()?);
                    }
                }
            }
            let (ra, a_row) = self.cur_a.as_ref().expect("current A row");
            match self.b_rows.as_mut().expect("B row replay").next()? {
                None => {
                    self.cur_a = None;
                    self.b_rows = None;
                }
                Some((rb, src)) => {
                    let b_row = materialize_vec(src)?;
                    if a_row.is_empty() || b_row.is_empty() {
                        continue;
                    }
                    let out_row = ra * self.bnr + rb;
                    let mut row = Vec::with_capacity(a_row.len() * b_row.len());
                    let mut col = Vec::with_capacity(a_row.len() * b_row.len());
                    let mut val = Vec::with_capacity(a_row.len() * b_row.len());
                    for (ca, av) in a_row {
                        for (cb, bv) in &b_row {
                            row.push(out_row);
                            col.push(ca * self.bnc + cb);
                            val.push(self.op.apply(av, bv));
                        }
                    }
                    return Ok(Some(MatSlice::new(row, col, val)));
                }
            }
        }
    }
}

impl<A: Element, B: Element, C: Element> MatrixForm<C> for KronMat<A, B, C> {
    fn nrows(&self) -> Ix {
        self.a.nrows() * self.b.nrows()
    }

    fn ncols(&self) -> Ix {
        self.a.ncols() * self.b.ncols()
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<C>> {
        let (bnr, bnc) = self.block();
        if r < 0 || c < 0 || bnr == 0 || bnc == 0 {
            return Ok(None);
        }
        let (ra, rb) = (r / bnr, r % bnr);
        let (ca, cb) = (c / bnc, c % bnc);
        Ok(match (self.a.get(ra, ca)?, self.b.get(rb, cb)?) {
            (Some(av), Some(bv)) => Some(self.op.apply(&av, &bv)),
            _ => None,
        })
    }

    fn stream(&self) -> Result<MatSource<C>> {
        let (bnr, bnc) = self.block();
        Ok(Box::new(KronStream {
            a_rows: self.a.form().rows()?,
            b_form: self.b.form(),
            op: self.op.clone(),
            bnr,
            bnc,
            cur_a: None,
            b_rows: None,
        }))
    }

    fn row(&self, r: Ix) -> Result<VecSource<C>> {
        let (bnr, bnc) = self.block();
        if r < 0 || bnr == 0 {
            return Ok(Box::new(crate::pipeline::EmptySource::new()));
        }
        let (ra, rb) = (r / bnr, r % bnr);
        let a_row = materialize_vec(self.a.form().row(ra)?)?;
        let b_row = materialize_vec(self.b.form().row(rb)?)?;
        let mut idx = Vec::with_capacity(a_row.len() * b_row.len());
        let mut val = Vec::with_capacity(a_row.len() * b_row.len());
        for (ca, av) in &a_row {
            for (cb, bv) in &b_row {
                idx.push(ca * bnc + cb);
                val.push(self.op.apply(av, bv));
            }
        }
        Ok(Box::new(BatchVecSource::new(vec![VecSlice::new(idx, val)])))
    }

    fn col(&self, c: Ix) -> Result<VecSource<C>> {
        let (bnr, bnc) = self.block();
        if c < 0 || bnc == 0 {
            return Ok(Box::new(crate::pipeline::EmptySource::new()));
        }
        let (ca, cb) = (c / bnc, c % bnc);
        let a_col = materialize_vec(self.a.form().col(ca)?)?;
        let b_col = materialize_vec(self.b.form().col(cb)?)?;
        let mut idx = Vec::with_capacity(a_col.len() * b_col.len());
        let mut val = Vec::with_capacity(a_col.len() * b_col.len());
        for (ra, av) in &a_col {
            for (rb, bv) in &b_col {
                idx.push(ra * bnr + rb);
                val.push(self.op.apply(av, bv));
            }
        }
        Ok(Box::new(BatchVecSource::new(vec![VecSlice::new(idx, val)])))
    }

    fn rows(&self) -> Result<BoxOuter<C>> {
        let node = self.clone();
        let bnr = self.b.nrows();
        let mut a_rows = self.a.form().rows()?;
        let mut cur_a: Option<Ix> = None;
        let mut b_rows: Option<BoxOuter<B>> = None;
        Ok(Box::new(FnOuter::new(move || {
            loop {
                if cur_a.is_none() {
                    match a_rows.next()? {
                        None => return Ok(None),
                        Some((ra, _)) => {
                            cur_a = Some(ra);
                            b_rows = Some(node.b.form().rows()?);
                        }
                    }
                }
                match b_rows.as_mut().expect("B row replay").next()? {
                    None => {
                        cur_a = None;
                        b_rows = None;
                    }
                    Some((rb, _)) => {
                        let key = cur_a.expect("current A row") * bnr + rb;
                        return Ok(Some((key, node.row(key)?)));
                    }
                }
            }
        })))
    }

    fn cols(&self) -> Result<BoxOuter<C>> {
        let node = self.clone();
        let bnc = self.b.ncols();
        let mut a_cols = self.a.form().cols()?;
        let mut cur_a: Option<Ix> = None;
        let mut b_cols: Option<BoxOuter<B>> = None;
        Ok(Box::new(FnOuter::new(move || {
            loop {
                if cur_a.is_none() {
                    match a_cols.next()? {
                        None => return Ok(None),
                        Some((ca, _)) => {
                            cur_a = Some(ca);
                            b_cols = Some(node.b.form().cols()?);
                        }
                    }
                }
                match b_cols.as_mut().expect("B col replay").next()? {
                    None => {
                        cur_a = None;
                        b_cols = None;
                    }
                    Some((cb, _)) => {
                        let key = cur_a.expect("current A col") * bnc + cb;
                        return Ok(Some((key, node.col(key)?)));
                    }
                }
            }
        })))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<C>>> {
        resize_collect(self.stream()?, nr, nc)
    }
}
