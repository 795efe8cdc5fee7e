//! Select nodes: keep entries where the index-unary predicate holds.

use crate::error::Result;
use crate::form::matrix::resize_collect;
use crate::form::vector::SparseVector;
use crate::form::{BoxOuter, FnOuter, MatSource, MatrixForm, OuterSource, VecSource, VectorForm};
use crate::index::Ix;
use crate::ops::IndexUnaryOp;
use crate::pipeline::Source;
use crate::reference::{MatRef, VecRef};
use crate::slice::{MatSlice, VecSlice};
use crate::types::Element;
use std::sync::Arc;

struct FilterVec<T: Element, F>
where
    F: Fn(Ix, &T) -> bool + Send,
{
    src: VecSource<T>,
    pred: F,
}

impl<T: Element, F> Source for FilterVec<T, F>
where
    F: Fn(Ix, &T) -> bool + Send,
{
    type Batch = VecSlice<T>;

    fn fetch(&mut self, size: usize) -> Result<Option<VecSlice<T>>> {
        loop {
            let Some(b) = self.src.fetch(size)? else {
                return Ok(None);
            };
            let kept = b.retain(&self.pred);
            if !kept.is_empty() {
                return Ok(Some(kept));
            }
        }
    }
}

struct FilterMat<T: Element, F>
where
    F: Fn(Ix, Ix, &T) -> bool + Send,
{
    src: MatSource<T>,
    pred: F,
}

impl<T: Element, F> Source for FilterMat<T, F>
where
    F: Fn(Ix, Ix, &T) -> bool + Send,
{
    type Batch = MatSlice<T>;

    fn fetch(&mut self, size: usize) -> Result<Option<MatSlice<T>>> {
        loop {
            let Some(b) = self.src.fetch(size)? else {
                return Ok(None);
            };
            let kept = b.retain(&self.pred);
            if !kept.is_empty() {
                return Ok(Some(kept));
            }
        }
    }
}

/// `w = u where op(u, i, 0, s)` deferred.
pub(crate) struct SelectVec<T: Element, S: Element> {
    size: Ix,
    op: IndexUnaryOp<T, S, bool>,
    s: S,
    input: VecRef<T>,
}

impl<T: Element, S: Element> SelectVec<T, S> {
    pub(crate) fn new(op: IndexUnaryOp<T, S, bool>, s: S, input: VecRef<T>) -> Self {
        SelectVec {
            size: input.size(),
            op,
            s,
            input,
        }
    }
}

impl<T: Element, S: Element> VectorForm<T> for SelectVec<T, S> {
    fn size(&self) -> Ix {
        self.size
    }

    fn get(&self, i: Ix) -> Result<Option<T>> {
        Ok(self
            .input
            .get(i)?
            .filter(|v| self.op.apply(v, i, 0, &self.s)))
    }

    fn stream(&self) -> Result<VecSource<T>> {
        let op = self.op.clone();
        let s = self.s.clone();
        Ok(Box::new(FilterVec {
            src: self.input.stream()?,
            pred: move |i, v: &T| op.apply(v, i, 0, &s),
        }))
    }

    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<T>>> {
        SparseVector::collect(self.size, self.stream()?)?.resized(n)
    }
}

/// `C = A where op(A, r, c, s)` deferred.
pub(crate) struct SelectMat<T: Element, S: Element> {
    op: IndexUnaryOp<T, S, bool>,
    s: S,
    input: MatRef<T>,
}

impl<T: Element, S: Element> SelectMat<T, S> {
    pub(crate) fn new(op: IndexUnaryOp<T, S, bool>, s: S, input: MatRef<T>) -> Self {
        SelectMat { op, s, input }
    }
}

impl<T: Element, S: Element> MatrixForm<T> for SelectMat<T, S> {
    fn nrows(&self) -> Ix {
        self.input.nrows()
    }

    fn ncols(&self) -> Ix {
        self.input.ncols()
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<T>> {
        Ok(self
            .input
            .get(r, c)?
            .filter(|v| self.op.apply(v, r, c, &self.s)))
    }

    fn stream(&self) -> Result<MatSource<T>> {
        let op = self.op.clone();
        let s = self.s.clone();
        Ok(Box::new(FilterMat {
            src: self.input.form().stream()?,
            pred: move |r, c, v: &T| op.apply(v, r, c, &s),
        }))
    }

    fn row(&self, r: Ix) -> Result<VecSource<T>> {
        let op = self.op.clone();
        let s = self.s.clone();
        Ok(Box::new(FilterVec {
            src: self.input.form().row(r)?,
            pred: move |c, v: &T| op.apply(v, r, c, &s),
        }))
    }

    fn col(&self, c: Ix) -> Result<VecSource<T>> {
        let op = self.op.clone();
        let s = self.s.clone();
        Ok(Box::new(FilterVec {
            src: self.input.form().col(c)?,
            pred: move |r, v: &T| op.apply(v, r, c, &s),
        }))
    }

    fn rows(&self) -> Result<BoxOuter<T>> {
        let op = self.op.clone();
        let s = self.s.clone();
        let mut outer = self.input.form().rows()?;
        Ok(Box::new(FnOuter::new(move || {
            Ok(outer.next()?.map(|(r, src)| {
                let op = op.clone();
                let s = s.clone();
                let filtered: VecSource<T> = Box::new(FilterVec {
                    src,
                    pred: move |c, v: &T| op.apply(v, r, c, &s),
                });
                (r, filtered)
            }))
        })))
    }

    fn cols(&self) -> Result<BoxOuter<T>> {
        let op = self.op.clone();
        let s = self.s.clone();
        let mut outer = self.input.form().cols()?;
        Ok(Box::new(FnOuter::new(move || {
            Ok(outer.next()?.map(|(c, src)| {
                let op = op.clone();
                let s = s.clone();
                let filtered: VecSource<T> = Box::new(FilterVec {
                    src,
                    pred: move |r, v: &T| op.apply(v, r, c, &s),
                });
                (c, filtered)
            }))
        })))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<T>>> {
        resize_collect(self.stream()?, nr, nc)
    }
}
