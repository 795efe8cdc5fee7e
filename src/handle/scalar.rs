//! The scalar handle.

use crate::error::{Error, Result};
use crate::handle::WaitMode;
use crate::index::Ix;
use crate::ops::{BinaryOp, Monoid};
use crate::reference::ScalarRef;
use crate::types::Element;
use crate::compute::reduce::{MatReduceScalar, VecReduceScalar};
use crate::{Matrix, Vector};
use std::sync::Arc;

/// A scalar holding zero or one value of `T`.
///
/// Cloning shares the current reference; rebinding one clone never affects
/// another (value semantics).
pub struct Scalar<T: Element> {
    pub(crate) r: ScalarRef<T>,
}

impl<T: Element> Clone for Scalar<T> {
    fn clone(&self) -> Self {
        Scalar { r: self.r.clone() }
    }
}

impl<T: Element> Default for Scalar<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element> Scalar<T> {
    /// An empty scalar.
    pub fn new() -> Self {
        Scalar {
            r: ScalarRef::empty(),
        }
    }

    /// A scalar holding `v`.
    pub fn from_value(v: T) -> Self {
        Scalar {
            r: ScalarRef::full(v),
        }
    }

    /// Share this scalar's current contents under a new handle.
    pub fn dup(&self) -> Self {
        self.clone()
    }

    /// Store a value.
    pub fn set_element(&mut self, v: T) {
        self.r = ScalarRef::full(v);
    }

    /// Drop the stored value.
    pub fn clear(&mut self) {
        self.r = ScalarRef::empty();
    }

    /// The stored value; [`Error::NoValue`] when empty. Evaluates a
    /// deferred reduction.
    pub fn extract_element(&self) -> Result<T> {
        self.r.get()?.ok_or(Error::NoValue)
    }

    /// Number of stored values (0 or 1). Evaluates a deferred reduction.
    pub fn nvals(&self) -> Result<Ix> {
        Ok(self.r.get()?.is_some() as Ix)
    }

    /// Complete or materialize pending work.
    pub fn wait(&self, mode: WaitMode) -> Result<()> {
        match mode {
            WaitMode::Complete => Ok(()),
            WaitMode::Materialize => self.r.optimize(),
        }
    }

    /// `s = accum(s, ⊕ u)` deferred: reduce a vector into this scalar.
    pub fn reduce_vector(
        &mut self,
        accum: Option<&BinaryOp<T, T, T>>,
        monoid: &Monoid<T>,
        u: &Vector<T>,
    ) -> Result<()> {
        let prior = self.r.clone();
        self.r = ScalarRef::new(Arc::new(VecReduceScalar::new(
            u.r.clone(),
            monoid.clone(),
            accum.cloned(),
            prior,
        )));
        Ok(())
    }

    /// `s = accum(s, ⊕ A)` deferred: reduce a matrix into this scalar.
    pub fn reduce_matrix(
        &mut self,
        accum: Option<&BinaryOp<T, T, T>>,
        monoid: &Monoid<T>,
        a: &Matrix<T>,
    ) -> Result<()> {
        let prior = self.r.clone();
        self.r = ScalarRef::new(Arc::new(MatReduceScalar::new(
            a.r.clone(),
            monoid.clone(),
            accum.cloned(),
            prior,
        )));
        Ok(())
    }
}
