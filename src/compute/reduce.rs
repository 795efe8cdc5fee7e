//! Reduction nodes: row-wise reduction to a vector and deferred scalar
//! reductions.

use crate::error::Result;
use crate::form::vector::SparseVector;
use crate::form::{BoxOuter, OuterSource, ScalarForm, VecSource, VectorForm};
use crate::index::Ix;
use crate::ops::{BinaryOp, Monoid};
use crate::pipeline::collect::{reduce_mat, reduce_vec};
use crate::pipeline::{Source, DEFAULT_BATCH};
use crate::reference::{MatRef, ScalarRef, VecRef};
use crate::slice::VecSlice;
use crate::types::Element;
use std::sync::Arc;

fn fold_stream<T: Element>(mut src: VecSource<T>, monoid: &Monoid<T>) -> Result<Option<T>> {
    let mut acc: Option<T> = None;
    while let Some(b) = src.fetch(DEFAULT_BATCH)? {
        for v in b.values() {
            acc = Some(match acc {
                None => v.clone(),
                Some(a) => monoid.fold(&a, v),
            });
        }
    }
    Ok(acc)
}

/// `w[i] = ⊕ A(i, :)` deferred; rows with no entries yield no entry.
pub(crate) struct RowReduceVec<T: Element> {
    size: Ix,
    a: MatRef<T>,
    monoid: Monoid<T>,
}

impl<T: Element> RowReduceVec<T> {
    pub(crate) fn new(a: MatRef<T>, monoid: Monoid<T>) -> Self {
        RowReduceVec {
            size: a.nrows(),
            a,
            monoid,
        }
    }
}

impl<T: Element> VectorForm<T> for RowReduceVec<T> {
    fn size(&self) -> Ix {
        self.size
    }

    fn get(&self, i: Ix) -> Result<Option<T>> {
        fold_stream(self.a.form().row(i)?, &self.monoid)
    }

    fn stream(&self) -> Result<VecSource<T>> {
        struct RowFolds<T: Element> {
            outer: BoxOuter<T>,
            monoid: Monoid<T>,
        }
        impl<T: Element> Source for RowFolds<T> {
            type Batch = VecSlice<T>;

            fn fetch(&mut self, size: usize) -> Result<Option<VecSlice<T>>> {
                let mut idx = Vec::new();
                let mut val = Vec::new();
                while val.len() < size.max(1) {
                    let Some((r, src)) = self.outer.next()? else {
                        break;
                    };
                    if let Some(v) = fold_stream(src, &self.monoid)? {
                        idx.push(r);
                        val.push(v);
                    }
                }
                Ok((!idx.is_empty()).then(|| VecSlice::new(idx, val)))
            }
        }
        Ok(Box::new(RowFolds {
            outer: self.a.form().rows()?,
            monoid: self.monoid.clone(),
        }))
    }

    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<T>>> {
        SparseVector::collect(self.size, self.stream()?)?.resized(n)
    }
}

/// A scalar deferred as "reduce this vector under the monoid, then fold into
/// the prior scalar through the accumulator".
pub(crate) struct VecReduceScalar<T: Element> {
    input: VecRef<T>,
    monoid: Monoid<T>,
    accum: Option<BinaryOp<T, T, T>>,
    prior: ScalarRef<T>,
}

impl<T: Element> VecReduceScalar<T> {
    pub(crate) fn new(
        input: VecRef<T>,
        monoid: Monoid<T>,
        accum: Option<BinaryOp<T, T, T>>,
        prior: ScalarRef<T>,
    ) -> Self {
        VecReduceScalar {
            input,
            monoid,
            accum,
            prior,
        }
    }
}

impl<T: Element> ScalarForm<T> for VecReduceScalar<T> {
    fn get(&self) -> Result<Option<T>> {
        let reduced = reduce_vec(self.input.stream()?, self.monoid.op())?;
        let value = reduced.unwrap_or_else(|| self.monoid.identity());
        match (&self.accum, self.prior.get()?) {
            (Some(op), Some(prior)) => Ok(Some(op.apply(&prior, &value))),
            _ => Ok(Some(value)),
        }
    }

    fn known(&self) -> Option<Option<T>> {
        None
    }
}

/// A scalar deferred as a full-matrix reduction.
pub(crate) struct MatReduceScalar<T: Element> {
    input: MatRef<T>,
    monoid: Monoid<T>,
    accum: Option<BinaryOp<T, T, T>>,
    prior: ScalarRef<T>,
}

impl<T: Element> MatReduceScalar<T> {
    pub(crate) fn new(
        input: MatRef<T>,
        monoid: Monoid<T>,
        accum: Option<BinaryOp<T, T, T>>,
        prior: ScalarRef<T>,
    ) -> Self {
        MatReduceScalar {
            input,
            monoid,
            accum,
            prior,
        }
    }
}

impl<T: Element> ScalarForm<T> for MatReduceScalar<T> {
    fn get(&self) -> Result<Option<T>> {
        let reduced = reduce_mat(self.input.form().stream()?, self.monoid.op())?;
        let value = reduced.unwrap_or_else(|| self.monoid.identity());
        match (&self.accum, self.prior.get()?) {
            (Some(op), Some(prior)) => Ok(Some(op.apply(&prior, &value))),
            _ => Ok(Some(value)),
        }
    }

    fn known(&self) -> Option<Option<T>> {
        None
    }
}
