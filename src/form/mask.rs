//! Mask views: Boolean projections of an arbitrary representation.
//!
//! A *value mask* projects through [`MaskValue::to_mask`] (non-zero test for
//! numeric types); a *structural mask* reports `true` for every stored entry
//! regardless of value. Streamed mask slices reuse the upstream index
//! buffers — the copy-on-write state passes through — while the Boolean
//! value buffer is always freshly owned.

use crate::error::Result;
use crate::form::{BoxOuter, FnOuter, MatSource, MatrixForm, OuterSource, VecSource, VectorForm};
use crate::index::Ix;
use crate::pipeline::Source;
use crate::slice::{MatSlice, VecSlice};
use crate::types::{Element, MaskValue};
use std::sync::Arc;

struct BoolVecSource<U, F>
where
    F: Fn(&U) -> bool + Send,
{
    src: VecSource<U>,
    f: F,
}

impl<U: Element, F> Source for BoolVecSource<U, F>
where
    F: Fn(&U) -> bool + Send,
{
    type Batch = VecSlice<bool>;

    fn fetch(&mut self, size: usize) -> Result<Option<VecSlice<bool>>> {
        Ok(self.src.fetch(size)?.map(|b| b.map(|_, v| (self.f)(v))))
    }
}

struct BoolMatSource<U, F>
where
    F: Fn(&U) -> bool + Send,
{
    src: MatSource<U>,
    f: F,
}

impl<U: Element, F> Source for BoolMatSource<U, F>
where
    F: Fn(&U) -> bool + Send,
{
    type Batch = MatSlice<bool>;

    fn fetch(&mut self, size: usize) -> Result<Option<MatSlice<bool>>> {
        Ok(self.src.fetch(size)?.map(|b| b.map(|_, _, v| (self.f)(v))))
    }
}

fn bool_outer<U: Element>(
    outer: BoxOuter<U>,
    f: impl Fn(&U) -> bool + Send + Clone + 'static,
) -> BoxOuter<bool> {
    let mut outer = outer;
    Box::new(FnOuter::new(move || {
        Ok(outer.next()?.map(|(k, src)| {
            let mapped: VecSource<bool> = Box::new(BoolVecSource { src, f: f.clone() });
            (k, mapped)
        }))
    }))
}

/* ===================== vector masks ===================== */

/// Value mask over a vector: `true` iff the stored value is non-zero.
pub struct VecValueMask<U: MaskValue> {
    inner: Arc<dyn VectorForm<U>>,
}

impl<U: MaskValue> VecValueMask<U> {
    /// Project `inner` through the non-zero test.
    pub fn new(inner: Arc<dyn VectorForm<U>>) -> Self {
        VecValueMask { inner }
    }
}

impl<U: MaskValue> VectorForm<bool> for VecValueMask<U> {
    fn size(&self) -> Ix {
        self.inner.size()
    }

    fn nvals_hint(&self) -> Option<Ix> {
        self.inner.nvals_hint()
    }

    fn get(&self, i: Ix) -> Result<Option<bool>> {
        Ok(self.inner.get(i)?.map(|v| v.to_mask()))
    }

    fn stream(&self) -> Result<VecSource<bool>> {
        Ok(Box::new(BoolVecSource {
            src: self.inner.stream()?,
            f: |v: &U| v.to_mask(),
        }))
    }

    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<bool>>> {
        Ok(Arc::new(VecValueMask {
            inner: self.inner.resized(n)?,
        }))
    }
}

/// Structural mask over a vector: `true` wherever an entry exists.
pub struct VecStructMask<U: Element> {
    inner: Arc<dyn VectorForm<U>>,
}

impl<U: Element> VecStructMask<U> {
    /// Project `inner` through the presence test.
    pub fn new(inner: Arc<dyn VectorForm<U>>) -> Self {
        VecStructMask { inner }
    }
}

impl<U: Element> VectorForm<bool> for VecStructMask<U> {
    fn size(&self) -> Ix {
        self.inner.size()
    }

    fn nvals_hint(&self) -> Option<Ix> {
        self.inner.nvals_hint()
    }

    fn get(&self, i: Ix) -> Result<Option<bool>> {
        Ok(self.inner.get(i)?.map(|_| true))
    }

    fn stream(&self) -> Result<VecSource<bool>> {
        Ok(Box::new(BoolVecSource {
            src: self.inner.stream()?,
            f: |_: &U| true,
        }))
    }

    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<bool>>> {
        Ok(Arc::new(VecStructMask {
            inner: self.inner.resized(n)?,
        }))
    }
}

/* ===================== matrix masks ===================== */

/// Value mask over a matrix.
pub struct MatValueMask<U: MaskValue> {
    inner: Arc<dyn MatrixForm<U>>,
}

impl<U: MaskValue> MatValueMask<U> {
    /// Project `inner` through the non-zero test.
    pub fn new(inner: Arc<dyn MatrixForm<U>>) -> Self {
        MatValueMask { inner }
    }
}

impl<U: MaskValue> MatrixForm<bool> for MatValueMask<U> {
    fn nrows(&self) -> Ix {
        self.inner.nrows()
    }

    fn ncols(&self) -> Ix {
        self.inner.ncols()
    }

    fn nvals_hint(&self) -> Option<Ix> {
        self.inner.nvals_hint()
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<bool>> {
        Ok(self.inner.get(r, c)?.map(|v| v.to_mask()))
    }

    fn stream(&self) -> Result<MatSource<bool>> {
        Ok(Box::new(BoolMatSource {
            src: self.inner.stream()?,
            f: |v: &U| v.to_mask(),
        }))
    }

    fn row(&self, r: Ix) -> Result<VecSource<bool>> {
        Ok(Box::new(BoolVecSource {
            src: self.inner.row(r)?,
            f: |v: &U| v.to_mask(),
        }))
    }

    fn col(&self, c: Ix) -> Result<VecSource<bool>> {
        Ok(Box::new(BoolVecSource {
            src: self.inner.col(c)?,
            f: |v: &U| v.to_mask(),
        }))
    }

    fn rows(&self) -> Result<BoxOuter<bool>> {
        Ok(bool_outer(self.inner.rows()?, |v: &U| v.to_mask()))
    }

    fn cols(&self) -> Result<BoxOuter<bool>> {
        Ok(bool_outer(self.inner.cols()?, |v: &U| v.to_mask()))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<bool>>> {
        Ok(Arc::new(MatValueMask {
            inner: self.inner.resized(nr, nc)?,
        }))
    }
}

/// Structural mask over a matrix.
pub struct MatStructMask<U: Element> {
    inner: Arc<dyn MatrixForm<U>>,
}

impl<U: Element> MatStructMask<U> {
    /// Project `inner` through the presence test.
    pub fn new(inner: Arc<dyn MatrixForm<U>>) -> Self {
        MatStructMask { inner }
    }
}

impl<U: Element> MatrixForm<bool> for MatStructMask<U> {
    fn nrows(&self) -> Ix {
        self.inner.nrows()
    }

    fn ncols(&self) -> Ix {
        self.inner.ncols()
    }

    fn nvals_hint(&self) -> Option<Ix> {
        self.inner.nvals_hint()
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<bool>> {
        Ok(self.inner.get(r, c)?.map(|_| true))
    }

    fn stream(&self) -> Result<MatSource<bool>> {
        Ok(Box::new(BoolMatSource {
            src: self.inner.stream()?,
            f: |_: &U| true,
        }))
    }

    fn row(&self, r: Ix) -> Result<VecSource<bool>> {
        Ok(Box::new(BoolVecSource {
            src: self.inner.row(r)?,
            f: |_: &U| true,
        }))
    }

    fn col(&self, c: Ix) -> Result<VecSource<bool>> {
        Ok(Box::new(BoolVecSource {
            src: self.inner.col(c)?,
            f: |_: &U| true,
        }))
    }

    fn rows(&self) -> Result<BoxOuter<bool>> {
        Ok(bool_outer(self.inner.rows()?, |_: &U| true))
    }

    fn cols(&self) -> Result<BoxOuter<bool>> {
        Ok(bool_outer(self.inner.cols()?, |_: &U| true))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<bool>>> {
        Ok(Arc::new(MatStructMask {
            inner: self.inner.resized(nr, nc)?,
        }))
    }
}
