//! Apply nodes: element-wise operator application, scalar binding, and
//! index-aware application.
//!
//! All apply streams reuse the upstream coordinate buffers (the map only
//! touches values). A bound scalar is read once per stream construction;
//! an empty scalar surfaces as [`Error::EmptyObject`] at that point, not at
//! node construction.

use crate::error::{Error, Result};
use crate::form::matrix::resize_collect;
use crate::form::vector::SparseVector;
use crate::form::{BoxOuter, FnOuter, MatSource, MatrixForm, OuterSource, VecSource, VectorForm};
use crate::index::Ix;
use crate::ops::{BinaryOp, IndexUnaryOp, UnaryOp};
use crate::pipeline::Source;
use crate::reference::{MatRef, ScalarRef, VecRef};
use crate::slice::{MatSlice, VecSlice};
use crate::types::Element;
use std::sync::Arc;

/// Lazily map values of a vector stream; coordinates pass through.
pub(crate) struct MapVec<U: Element, T: Element, F>
where
    F: Fn(Ix, &U) -> T + Send,
{
    src: VecSource<U>,
    f: F,
}

impl<U: Element, T: Element, F> MapVec<U, T, F>
where
    F: Fn(Ix, &U) -> T + Send,
{
    pub(crate) fn new(src: VecSource<U>, f: F) -> Self {
        MapVec { src, f }
    }
}

impl<U: Element, T: Element, F> Source for MapVec<U, T, F>
where
    F: Fn(Ix, &U) -> T + Send,
{
    type Batch = VecSlice<T>;

    fn fetch(&mut self, size: usize) -> Result<Option<VecSlice<T>>> {
        Ok(self.src.fetch(size)?.map(|b| b.map(&self.f)))
    }
}

/// Lazily map values of a matrix stream.
pub(crate) struct MapMat<U: Element, T: Element, F>
where
    F: Fn(Ix, Ix, &U) -> T + Send,
{
    src: MatSource<U>,
    f: F,
}

impl<U: Element, T: Element, F> MapMat<U, T, F>
where
    F: Fn(Ix, Ix, &U) -> T + Send,
{
    pub(crate) fn new(src: MatSource<U>, f: F) -> Self {
        MapMat { src, f }
    }
}

impl<U: Element, T: Element, F> Source for MapMat<U, T, F>
where
    F: Fn(Ix, Ix, &U) -> T + Send,
{
    type Batch = MatSlice<T>;

    fn fetch(&mut self, size: usize) -> Result<Option<MatSlice<T>>> {
        Ok(self.src.fetch(size)?.map(|b| b.map(&self.f)))
    }
}

/// Map an outer stream's inner pipelines. The closure receives
/// (outer key, inner key, value).
pub(crate) fn map_outer<U: Element, T: Element>(
    outer: BoxOuter<U>,
    f: impl Fn(Ix, Ix, &U) -> T + Clone + Send + 'static,
) -> BoxOuter<T> {
    let mut outer = outer;
    Box::new(FnOuter::new(move || {
        Ok(outer.next()?.map(|(k, src)| {
            let f = f.clone();
            let mapped: VecSource<T> = Box::new(MapVec::new(src, move |inner, v| f(k, inner, v)));
            (k, mapped)
        }))
    }))
}

/* ===================== vector nodes ===================== */

/// `w = op(u)` deferred.
pub(crate) struct ApplyVec<U: Element, T: Element> {
    size: Ix,
    op: UnaryOp<U, T>,
    input: VecRef<U>,
}

impl<U: Element, T: Element> ApplyVec<U, T> {
    pub(crate) fn new(op: UnaryOp<U, T>, input: VecRef<U>) -> Self {
        ApplyVec {
            size: input.size(),
            op,
            input,
        }
    }
}

impl<U: Element, T: Element> VectorForm<T> for ApplyVec<U, T> {
    fn size(&self) -> Ix {
        self.size
    }

    fn nvals_hint(&self) -> Option<Ix> {
        self.input.form().nvals_hint()
    }

    fn get(&self, i: Ix) -> Result<Option<T>> {
        Ok(self.input.get(i)?.map(|v| self.op.apply(&v)))
    }

    fn stream(&self) -> Result<VecSource<T>> {
        let op = self.op.clone();
        Ok(Box::new(MapVec::new(self.input.stream()?, move |_, v| {
            op.apply(v)
        })))
    }

    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<T>>> {
        SparseVector::collect(self.size, self.stream()?)?.resized(n)
    }
}

/// `w = op(s, u)` with a scalar reference bound on the left; `first` flips
/// the binding side.
pub(crate) struct BindVec<S: Element, U: Element, T: Element> {
    size: Ix,
    op: Arc<dyn Fn(&S, &U) -> T + Send + Sync>,
    scalar: ScalarRef<S>,
    input: VecRef<U>,
}

impl<S: Element, U: Element, T: Element> BindVec<S, U, T> {
    /// Bind the scalar as the first operand of `op`.
    pub(crate) fn first(op: BinaryOp<S, U, T>, scalar: ScalarRef<S>, input: VecRef<U>) -> Self {
        BindVec {
            size: input.size(),
            op: Arc::new(move |s, u| op.apply(s, u)),
            scalar,
            input,
        }
    }

    /// Bind the scalar as the second operand of `op`.
    pub(crate) fn second(op: BinaryOp<U, S, T>, scalar: ScalarRef<S>, input: VecRef<U>) -> Self {
        BindVec {
            size: input.size(),
            op: Arc::new(move |s, u| op.apply(u, s)),
            scalar,
            input,
        }
    }

    fn bound(&self) -> Result<S> {
        self.scalar.get()?.ok_or(Error::EmptyObject)
    }
}

impl<S: Element, U: Element, T: Element> VectorForm<T> for BindVec<S, U, T> {
    fn size(&self) -> Ix {
        self.size
    }

    fn get(&self, i: Ix) -> Result<Option<T>> {
        match self.input.get(i)? {
            None => Ok(None),
            Some(v) => {
                let s = self.bound()?;
                Ok(Some((self.op)(&s, &v)))
            }
        }
    }

    fn stream(&self) -> Result<VecSource<T>> {
        let s = self.bound()?;
        let op = Arc::clone(&self.op);
        Ok(Box::new(MapVec::new(self.input.stream()?, move |_, v| {
            op(&s, v)
        })))
    }

    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<T>>> {
        SparseVector::collect(self.size, self.stream()?)?.resized(n)
    }
}

/// `w = op(u, i, 0, s)` deferred.
pub(crate) struct ApplyIndexVec<U: Element, S: Element, T: Element> {
    size: Ix,
    op: IndexUnaryOp<U, S, T>,
    s: S,
    input: VecRef<U>,
}

impl<U: Element, S: Element, T: Element> ApplyIndexVec<U, S, T> {
    pub(crate) fn new(op: IndexUnaryOp<U, S, T>, s: S, input: VecRef<U>) -> Self {
        ApplyIndexVec {
            size: input.size(),
            op,
            s,
            input,
        }
    }
}

impl<U: Element, S: Element, T: Element> VectorForm<T> for ApplyIndexVec<U, S, T> {
    fn size(&self) -> Ix {
        self.size
    }

    fn get(&self, i: Ix) -> Result<Option<T>> {
        Ok(self
            .input
            .get(i)?
            .map(|v| self.op.apply(&v, i, 0, &self.s)))
    }

    fn stream(&self) -> Result<VecSource<T>> {
        let op = self.op.clone();
        let s = self.s.clone();
        Ok(Box::new(MapVec::new(self.input.stream()?, move |i, v| {
            op.apply(v, i, 0, &s)
        })))
    }

    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<T>>> {
        SparseVector::collect(self.size, self.stream()?)?.resized(n)
    }
}

/* ===================== matrix nodes ===================== */

/// `C = op(A)` deferred.
pub(crate) struct ApplyMat<U: Element, T: Element> {
    op: UnaryOp<U, T>,
    input: MatRef<U>,
}

impl<U: Element, T: Element> ApplyMat<U, T> {
    pub(crate) fn new(op: UnaryOp<U, T>, input: MatRef<U>) -> Self {
        ApplyMat { op, input }
    }
}

impl<U: Element, T: Element> MatrixForm<T> for ApplyMat<U, T> {
    fn nrows(&self) -> Ix {
        self.input.nrows()
    }

    fn ncols(&self) -> Ix {
        self.input.ncols()
    }

    fn nvals_hint(&self) -> Option<Ix> {
        self.input.form().nvals_hint()
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<T>> {
        Ok(self.input.get(r, c)?.map(|v| self.op.apply(&v)))
    }

    fn stream(&self) -> Result<MatSource<T>> {
        let op = self.op.clone();
        Ok(Box::new(MapMat::new(
            self.input.form().stream()?,
            move |_, _, v| op.apply(v),
        )))
    }

    fn row(&self, r: Ix) -> Result<VecSource<T>> {
        let op = self.op.clone();
        Ok(Box::new(MapVec::new(
            self.input.form().row(r)?,
            move |_, v| op.apply(v),
        )))
    }

    fn col(&self, c: Ix) -> Result<VecSource<T>> {
        let op = self.op.clone();
        Ok(Box::new(MapVec::new(
            self.input.form().col(c)?,
            move |_, v| op.apply(v),
        )))
    }

    fn rows(&self) -> Result<BoxOuter<T>> {
        let op = self.op.clone();
        Ok(map_outer(self.input.form().rows()?, move |_, _, v| {
            op.apply(v)
        }))
    }

    fn cols(&self) -> Result<BoxOuter<T>> {
        let op = self.op.clone();
        Ok(map_outer(self.input.form().cols()?, move |_, _, v| {
            op.apply(v)
        }))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<T>>> {
        resize_collect(self.stream()?, nr, nc)
    }
}

/// `C = op(s, A)` / `C = op(A, s)` with a bound scalar reference.
pub(crate) struct BindMat<S: Element, U: Element, T: Element> {
    op: Arc<dyn Fn(&S, &U) -> T + Send + Sync>,
    scalar: ScalarRef<S>,
    input: MatRef<U>,
}

impl<S: Element, U: Element, T: Element> BindMat<S, U, T> {
    /// Bind the scalar as the first operand of `op`.
    pub(crate) fn first(op: BinaryOp<S, U, T>, scalar: ScalarRef<S>, input: MatRef<U>) -> Self {
        BindMat {
            op: Arc::new(move |s, u| op.apply(s, u)),
            scalar,
            input,
        }
    }

    /// Bind the scalar as the second operand of `op`.
    pub(crate) fn second(op: BinaryOp<U, S, T>, scalar: ScalarRef<S>, input: MatRef<U>) -> Self {
        BindMat {
            op: Arc::new(move |s, u| op.apply(u, s)),
            scalar,
            input,
        }
    }

    fn bound(&self) -> Result<S> {
        self.scalar.get()?.ok_or(Error::EmptyObject)
    }
}

impl<S: Element, U: Element, T: Element> MatrixForm<T> for BindMat<S, U, T> {
    fn nrows(&self) -> Ix {
        self.input.nrows()
    }

    fn ncols(&self) -> Ix {
        self.input.ncols()
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<T>> {
        match self.input.get(r, c)? {
            None => Ok(None),
            Some(v) => {
                let s = self.bound()?;
                Ok(Some((self.op)(&s, &v)))
            }
        }
    }

    fn stream(&self) -> Result<MatSource<T>> {
        let s = self.bound()?;
        let op = Arc::clone(&self.op);
        Ok(Box::new(MapMat::new(
            self.input.form().stream()?,
            move |_, _, v| op(&s, v),
        )))
    }

    fn row(&self, r: Ix) -> Result<VecSource<T>> {
        let s = self.bound()?;
        let op = Arc::clone(&self.op);
        Ok(Box::new(MapVec::new(
            self.input.form().row(r)?,
            move |_, v| op(&s, v),
        )))
    }

    fn col(&self, c: Ix) -> Result<VecSource<T>> {
        let s = self.bound()?;
        let op = Arc::clone(&self.op);
        Ok(Box::new(MapVec::new(
            self.input.form().col(c)?,
            move |_, v| op(&s, v),
        )))
    }

    fn rows(&self) -> Result<BoxOuter<T>> {
        let s = self.bound()?;
        let op = Arc::clone(&self.op);
        Ok(map_outer(self.input.form().rows()?, move |_, _, v| {
            op(&s, v)
        }))
    }

    fn cols(&self) -> Result<BoxOuter<T>> {
        let s = self.bound()?;
        let op = Arc::clone(&self.op);
        Ok(map_outer(self.input.form().cols()?, move |_, _, v| {
            op(&s, v)
        }))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<T>>> {
        resize_collect(self.stream()?, nr, nc)
    }
}

/// `C = op(A, r, c, s)` deferred.
pub(crate) struct ApplyIndexMat<U: Element, S: Element, T: Element> {
    op: IndexUnaryOp<U, S, T>,
    s: S,
    input: MatRef<U>,
}

impl<U: Element, S: Element, T: Element> ApplyIndexMat<U, S, T> {
    pub(crate) fn new(op: IndexUnaryOp<U, S, T>, s: S, input: MatRef<U>) -> Self {
        ApplyIndexMat { op, s, input }
    }
}

impl<U: Element, S: Element, T: Element> MatrixForm<T> for ApplyIndexMat<U, S, T> {
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
            .map(|v| self.op.apply(&v, r, c, &self.s)))
    }

    fn stream(&self) -> Result<MatSource<T>> {
        let op = self.op.clone();
        let s = self.s.clone();
        Ok(Box::new(MapMat::new(
            self.input.form().stream()?,
            move |r, c, v| op.apply(v, r, c, &s),
        )))
    }

    fn row(&self, r: Ix) -> Result<VecSource<T>> {
        let op = self.op.clone();
        let s = self.s.clone();
        Ok(Box::new(MapVec::new(
            self.input.form().row(r)?,
            move |c, v| op.apply(v, r, c, &s),
        )))
    }

    fn col(&self, c: Ix) -> Result<VecSource<T>> {
        let op = self.op.clone();
        let s = self.s.clone();
        Ok(Box::new(MapVec::new(
            self.input.form().col(c)?,
            move |r, v| op.apply(v, r, c, &s),
        )))
    }

    fn rows(&self) -> Result<BoxOuter<T>> {
        let op = self.op.clone();
        let s = self.s.clone();
        Ok(map_outer(self.input.form().rows()?, move |r, c, v| {
            op.apply(v, r, c, &s)
        }))
    }

    fn cols(&self) -> Result<BoxOuter<T>> {
        let op = self.op.clone();
        let s = self.s.clone();
        Ok(map_outer(self.input.form().cols()?, move |c, r, v| {
            op.apply(v, r, c, &s)
        }))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<T>>> {
        resize_collect(self.stream()?, nr, nc)
    }
}
