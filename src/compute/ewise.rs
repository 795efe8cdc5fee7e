//! Element-wise nodes: multiply (intersection) and add (union).

use crate::compute::OuterPair;
use crate::error::Result;
use crate::form::matrix::resize_collect;
use crate::form::vector::SparseVector;
use crate::form::{BoxOuter, FnOuter, MatSource, MatrixForm, VecSource, VectorForm};
use crate::index::Ix;
use crate::ops::BinaryOp;
use crate::pipeline::zip::{MatZip, VecZip};
use crate::pipeline::{BoxSource, EmptySource};
use crate::reference::{MatRef, VecRef};
use crate::slice::{MatSlice, VecSlice};
use crate::types::Element;
use std::sync::Arc;

fn mul_zip<A: Element, B: Element, C: Element>(
    a: VecSource<A>,
    b: VecSource<B>,
    op: BinaryOp<A, B, C>,
) -> VecSource<C> {
    Box::new(VecZip::new(
        None::<BoxSource<VecSlice<bool>>>,
        Some(a),
        Some(b),
        move |_, _m: Option<&bool>, x: Option<&A>, y: Option<&B>| {
            Ok(match (x, y) {
                (Some(x), Some(y)) => Some(op.apply(x, y)),
                _ => None,
            })
        },
    ))
}

fn add_zip<T: Element>(a: VecSource<T>, b: VecSource<T>, op: BinaryOp<T, T, T>) -> VecSource<T> {
    Box::new(VecZip::new(
        None::<BoxSource<VecSlice<bool>>>,
        Some(a),
        Some(b),
        move |_, _m: Option<&bool>, x: Option<&T>, y: Option<&T>| {
            Ok(match (x, y) {
                (Some(x), Some(y)) => Some(op.apply(x, y)),
                (Some(x), None) => Some(x.clone()),
                (None, Some(y)) => Some(y.clone()),
                (None, None) => None,
            })
        },
    ))
}

/* ===================== vector nodes ===================== */

/// `w = u .* v` under `op`, keeping coordinates present in both.
pub(crate) struct EWiseMulVec<A: Element, B: Element, C: Element> {
    size: Ix,
    op: BinaryOp<A, B, C>,
    a: VecRef<A>,
    b: VecRef<B>,
}

impl<A: Element, B: Element, C: Element> EWiseMulVec<A, B, C> {
    pub(crate) fn new(op: BinaryOp<A, B, C>, a: VecRef<A>, b: VecRef<B>) -> Self {
        EWiseMulVec {
            size: a.size(),
            op,
            a,
            b,
        }
    }
}

impl<A: Element, B: Element, C: Element> VectorForm<C> for EWiseMulVec<A, B, C> {
    fn size(&self) -> Ix {
        self.size
    }

    fn get(&self, i: Ix) -> Result<Option<C>> {
        Ok(match (self.a.get(i)?, self.b.get(i)?) {
            (Some(x), Some(y)) => Some(self.op.apply(&x, &y)),
            _ => None,
        })
    }

    fn stream(&self) -> Result<VecSource<C>> {
        Ok(mul_zip(self.a.stream()?, self.b.stream()?, self.op.clone()))
    }

    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<C>>> {
        SparseVector::collect(self.size, self.stream()?)?.resized(n)
    }
}

/// `w = u + v` under `op`, keeping coordinates present in either.
pub(crate) struct EWiseAddVec<T: Element> {
    size: Ix,
    op: BinaryOp<T, T, T>,
    a: VecRef<T>,
    b: VecRef<T>,
}

impl<T: Element> EWiseAddVec<T> {
    pub(crate) fn new(op: BinaryOp<T, T, T>, a: VecRef<T>, b: VecRef<T>) -> Self {
        EWiseAddVec {
            size: a.size(),
            op,
            a,
            b,
        }
    }
}

impl<T: Element> VectorForm<T> for EWiseAddVec<T> {
    fn size(&self) -> Ix {
        self.size
    }

    fn get(&self, i: Ix) -> Result<Option<T>> {
        Ok(match (self.a.get(i)?, self.b.get(i)?) {
            (Some(x), Some(y)) => Some(self.op.apply(&x, &y)),
            (Some(x), None) => Some(x),
            (None, Some(y)) => Some(y),
            (None, None) => None,
        })
    }

    fn stream(&self) -> Result<VecSource<T>> {
        Ok(add_zip(self.a.stream()?, self.b.stream()?, self.op.clone()))
    }

    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<T>>> {
        SparseVector::collect(self.size, self.stream()?)?.resized(n)
    }
}

/* ===================== matrix nodes ===================== */

/// `C = A .* B` under `op`.
pub(crate) struct EWiseMulMat<A: Element, B: Element, C: Element> {
    op: BinaryOp<A, B, C>,
    a: MatRef<A>,
    b: MatRef<B>,
}

impl<A: Element, B: Element, C: Element> EWiseMulMat<A, B, C> {
    pub(crate) fn new(op: BinaryOp<A, B, C>, a: MatRef<A>, b: MatRef<B>) -> Self {
        EWiseMulMat { op, a, b }
    }
}

impl<A: Element, B: Element, C: Element> MatrixForm<C> for EWiseMulMat<A, B, C> {
    fn nrows(&self) -> Ix {
        self.a.nrows()
    }

    fn ncols(&self) -> Ix {
        self.a.ncols()
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<C>> {
        Ok(match (self.a.get(r, c)?, self.b.get(r, c)?) {
            (Some(x), Some(y)) => Some(self.op.apply(&x, &y)),
            _ => None,
        })
    }

    fn stream(&self) -> Result<MatSource<C>> {
        let op = self.op.clone();
        Ok(Box::new(MatZip::new(
            None::<BoxSource<MatSlice<bool>>>,
            Some(self.a.form().stream()?),
            Some(self.b.form().stream()?),
            move |_, _, _m: Option<&bool>, x: Option<&A>, y: Option<&B>| {
                Ok(match (x, y) {
                    (Some(x), Some(y)) => Some(op.apply(x, y)),
                    _ => None,
                })
            },
        )))
    }

    fn row(&self, r: Ix) -> Result<VecSource<C>> {
        Ok(mul_zip(
            self.a.form().row(r)?,
            self.b.form().row(r)?,
            self.op.clone(),
        ))
    }

    fn col(&self, c: Ix) -> Result<VecSource<C>> {
        Ok(mul_zip(
            self.a.form().col(c)?,
            self.b.form().col(c)?,
            self.op.clone(),
        ))
    }

    fn rows(&self) -> Result<BoxOuter<C>> {
        let mut pair = OuterPair::new(self.a.form().rows()?, self.b.form().rows()?);
        let op = self.op.clone();
        Ok(Box::new(FnOuter::new(move || {
            loop {
                let Some((k, sa, sb)) = pair.next()? else {
                    return Ok(None);
                };
                // Multiply keeps only rows present on both sides.
                if let (Some(sa), Some(sb)) = (sa, sb) {
                    return Ok(Some((k, mul_zip(sa, sb, op.clone()))));
                }
            }
        })))
    }

    fn cols(&self) -> Result<BoxOuter<C>> {
        let mut pair = OuterPair::new(self.a.form().cols()?, self.b.form().cols()?);
        let op = self.op.clone();
        Ok(Box::new(FnOuter::new(move || {
            loop {
                let Some((k, sa, sb)) = pair.next()? else {
                    return Ok(None);
                };
                if let (Some(sa), Some(sb)) = (sa, sb) {
                    return Ok(Some((k, mul_zip(sa, sb, op.clone()))));
                }
            }
        })))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<C>>> {
        resize_collect(self.stream()?, nr, nc)
    }
}

/// `C = A + B` under `op`.
pub(crate) struct EWiseAddMat<T: Element> {
    op: BinaryOp<T, T, T>,
    a: MatRef<T>,
    b: MatRef<T>,
}

impl<T: Element> EWiseAddMat<T> {
    pub(crate) fn new(op: BinaryOp<T, T, T>, a: MatRef<T>, b: MatRef<T>) -> Self {
        EWiseAddMat { op, a, b }
    }
}

impl<T: Element> MatrixForm<T> for EWiseAddMat<T> {
    fn nrows(&self) -> Ix {
        self.a.nrows()
    }

    fn ncols(&self) -> Ix {
        self.a.ncols()
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<T>> {
        Ok(match (self.a.get(r, c)?, self.b.get(r, c)?) {
            (Some(x), Some(y)) => Some(self.op.apply(&x, &y)),
            (Some(x), None) => Some(x),
            (None, Some(y)) => Some(y),
            (None, None) => None,
        })
    }

    fn stream(&self) -> Result<MatSource<T>> {
        let op = self.op.clone();
        Ok(Box::new(MatZip::new(
            None::<BoxSource<MatSlice<bool>>>,
            Some(self.a.form().stream()?),
            Some(self.b.form().stream()?),
            move |_, _, _m: Option<&bool>, x: Option<&T>, y: Option<&T>| {
                Ok(match (x, y) {
                    (Some(x), Some(y)) => Some(op.apply(x, y)),
                    (Some(x), None) => Some(x.clone()),
                    (None, Some(y)) => Some(y.clone()),
                    (None, None) => None,
                })
            },
        )))
    }

    fn row(&self, r: Ix) -> Result<VecSource<T>> {
        Ok(add_zip(
            self.a.form().row(r)?,
            self.b.form().row(r)?,
            self.op.clone(),
        ))
    }

    fn col(&self, c: Ix) -> Result<VecSource<T>> {
        Ok(add_zip(
            self.a.form().col(c)?,
            self.b.form().col(c)?,
            self.op.clone(),
        ))
    }

    fn rows(&self) -> Result<BoxOuter<T>> {
        let mut pair = OuterPair::new(self.a.form().rows()?, self.b.form().rows()?);
        let op = self.op.clone();
        Ok(Box::new(FnOuter::new(move || {
            let Some((k, sa, sb)) = pair.next()? else {
                return Ok(None);
            };
            let sa = sa.unwrap_or_else(|| Box::new(EmptySource::new()));
            let sb = sb.unwrap_or_else(|| Box::new(EmptySource::new()));
            Ok(Some((k, add_zip(sa, sb, op.clone()))))
        })))
    }

    fn cols(&self) -> Result<BoxOuter<T>> {
        let mut pair = OuterPair::new(self.a.form().cols()?, self.b.form().cols()?);
        let op = self.op.clone();
        Ok(Box::new(FnOuter::new(move || {
            let Some((k, sa, sb)) = pair.next()? else {
                return Ok(None);
            };
            let sa = sa.unwrap_or_else(|| Box::new(EmptySource::new()));
            let sb = sb.unwrap_or_else(|| Box::new(EmptySource::new()));
            Ok(Some((k, add_zip(sa, sb, op.clone()))))
        })))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<T>>> {
        resize_collect(self.stream()?, nr, nc)
    }
}
