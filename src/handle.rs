//! User-facing handles: [`Scalar`], [`Vector`], [`Matrix`], and mask
//! synthesis.
//!
//! A handle holds exactly one field — a reference — and every operation
//! either reads through it or rebinds it to a new reference. Validation
//! (dimensions, index bounds, sentinel parsing) happens eagerly at the
//! handle boundary and never mutates the reference on failure; deferred
//! execution errors surface at the first materializing read instead.

pub mod matrix;
pub mod scalar;
pub mod vector;

use crate::error::{Error, Result};
use crate::form::{MatrixForm, VectorForm};
use crate::index::Ix;
use crate::types::Element;
use std::sync::Arc;

/// What `wait` should guarantee.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitMode {
    /// Pending work may stay pending; a no-op in this engine.
    Complete,
    /// Collapse deferred representations to their canonical sparse form.
    Materialize,
}

/// A Boolean mask over vector coordinates, produced by
/// [`Vector::as_mask`](crate::Vector::as_mask) or
/// [`Vector::as_structure`](crate::Vector::as_structure).
#[derive(Clone)]
pub struct VecMask {
    pub(crate) form: Arc<dyn VectorForm<bool>>,
    pub(crate) size: Ix,
}

/// A Boolean mask over matrix coordinates.
#[derive(Clone)]
pub struct MatMask {
    pub(crate) form: Arc<dyn MatrixForm<bool>>,
    pub(crate) nr: Ix,
    pub(crate) nc: Ix,
}

pub(crate) fn check_size(n: Ix) -> Result<()> {
    if n < 0 {
        return Err(Error::InvalidValue);
    }
    Ok(())
}

pub(crate) fn check_index(i: Ix, bound: Ix) -> Result<()> {
    if i < 0 || i >= bound {
        return Err(Error::IndexOutOfBounds { index: i, bound });
    }
    Ok(())
}

pub(crate) fn check_dim(actual: Ix, expected: Ix) -> Result<()> {
    if actual != expected {
        return Err(Error::dims(actual, expected));
    }
    Ok(())
}

pub(crate) fn check_shape(ar: Ix, ac: Ix, er: Ix, ec: Ix) -> Result<()> {
    if ar != er || ac != ec {
        return Err(Error::dims(format!("{ar}x{ac}"), format!("{er}x{ec}")));
    }
    Ok(())
}

pub(crate) fn check_vec_mask(mask: Option<&VecMask>, size: Ix) -> Result<()> {
    if let Some(m) = mask {
        check_dim(m.size, size)?;
    }
    Ok(())
}

pub(crate) fn check_mat_mask(mask: Option<&MatMask>, nr: Ix, nc: Ix) -> Result<()> {
    if let Some(m) = mask {
        check_shape(m.nr, m.nc, nr, nc)?;
    }
    Ok(())
}
