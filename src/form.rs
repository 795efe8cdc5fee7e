//! Functional representations: the immutable shapes a reference can hold.
//!
//! Every representation conforms to a single access protocol — the
//! `*Form` traits below — and is immutable after construction. Mutation at
//! the object level is expressed by building a *new* representation (usually
//! a delta chain layered on the old reference) and rebinding the handle.
//!
//! The protocol is deliberately stream-first: `stream` produces ordered
//! sparse slices lazily from the representation's own storage, `get` is the
//! variant-specific point lookup, and `optimized` rebuilds the canonical
//! sparse shape for the variants that are not already canonical (delta
//! chains and computed nodes).
//!
//! Concrete variants live in the sub-modules:
//!
//! - [`scalar`] — empty / full scalars;
//! - [`vector`] — sparse, homogeneous-constant, homogeneous-scalar;
//! - [`matrix`] — empty, singleton, CSR-like, constant, homogeneous-scalar,
//!   diagonal-view, transposed-view;
//! - [`mask`] — Boolean value/structural projections of either kind;
//! - [`delta`] — list-delta chains for both kinds.

pub mod delta;
pub mod mask;
pub mod matrix;
pub mod scalar;
pub mod vector;

use crate::error::Result;
use crate::index::Ix;
use crate::pipeline::{BoxSource, Source};
use crate::slice::{MatSlice, VecSlice};
use crate::types::Element;
use std::sync::Arc;

use matrix::CsrMatrix;
use vector::SparseVector;

/// A boxed stream of vector slices.
pub type VecSource<T> = BoxSource<VecSlice<T>>;
/// A boxed stream of matrix slices.
pub type MatSource<T> = BoxSource<MatSlice<T>>;

/// A scalar representation.
pub trait ScalarForm<T: Element>: Send + Sync {
    /// Evaluate to the stored value (computing a deferred reduction when the
    /// variant is computed). `None` is the empty scalar.
    fn get(&self) -> Result<Option<T>>;

    /// The value, when it is available without running a computation.
    ///
    /// `None` means "not known yet"; `Some(None)` means "known empty".
    fn known(&self) -> Option<Option<T>>;
}

/// A vector representation.
pub trait VectorForm<T: Element>: Send + Sync {
    /// Logical length.
    fn size(&self) -> Ix;

    /// Entry count when the variant stores it; the reference caches a
    /// streamed count otherwise.
    fn nvals_hint(&self) -> Option<Ix> {
        None
    }

    /// Point lookup.
    fn get(&self, i: Ix) -> Result<Option<T>>;

    /// Stream all entries in index order.
    fn stream(&self) -> Result<VecSource<T>>;

    /// A copy with the new logical length: equal lengths are handled by the
    /// reference layer, smaller lengths filter, larger lengths extend the
    /// logical shape.
    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<T>>>;

    /// Rebuild as a canonical sparse vector; `None` when the variant is
    /// already optimal.
    fn optimized(&self) -> Result<Option<SparseVector<T>>> {
        Ok(Some(SparseVector::collect(self.size(), self.stream()?)?))
    }

    /// Delta variants expose their (base, chain) so a further edit extends
    /// the chain instead of nesting.
    fn delta_parts(&self) -> Option<(crate::reference::VecRef<T>, Arc<delta::DeltaNode<T>>)> {
        None
    }
}

/// A matrix representation.
pub trait MatrixForm<T: Element>: Send + Sync {
    /// Row count.
    fn nrows(&self) -> Ix;

    /// Column count.
    fn ncols(&self) -> Ix;

    /// Entry count when the variant stores it.
    fn nvals_hint(&self) -> Option<Ix> {
        None
    }

    /// Point lookup.
    fn get(&self, r: Ix, c: Ix) -> Result<Option<T>>;

    /// Stream all entries in row-major order.
    fn stream(&self) -> Result<MatSource<T>>;

    /// Stream one row, keyed by column.
    fn row(&self, r: Ix) -> Result<VecSource<T>>;

    /// Stream one column, keyed by row.
    fn col(&self, c: Ix) -> Result<VecSource<T>>;

    /// All non-empty rows as (row key, row stream) pairs, ascending.
    fn rows(&self) -> Result<BoxOuter<T>>;

    /// All non-empty columns as (col key, col stream) pairs, ascending.
    fn cols(&self) -> Result<BoxOuter<T>>;

    /// A copy with the new logical shape.
    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<T>>>;

    /// Rebuild as a canonical CSR matrix; `None` when already optimal.
    fn optimized(&self) -> Result<Option<CsrMatrix<T>>> {
        Ok(Some(CsrMatrix::collect(
            self.nrows(),
            self.ncols(),
            self.stream()?,
        )?))
    }

    /// Delta variants expose their (base, chain) so a further edit extends
    /// the chain instead of nesting.
    fn delta_parts(&self) -> Option<(crate::reference::MatRef<T>, Arc<delta::MatDeltaNode<T>>)> {
        None
    }
}

/// A key-ordered sequence of 1-D pipelines (the row/col stream families).
pub trait OuterSource<T: Element>: Send {
    /// The next (key, stream) pair, ascending by key.
    fn next(&mut self) -> Result<Option<(Ix, VecSource<T>)>>;
}

/// A boxed outer stream.
pub type BoxOuter<T> = Box<dyn OuterSource<T>>;

/// An outer stream driven by a closure.
pub struct FnOuter<T, F>
where
    F: FnMut() -> Result<Option<(Ix, VecSource<T>)>> + Send,
{
    f: F,
    _t: std::marker::PhantomData<fn() -> T>,
}

impl<T: Element, F> FnOuter<T, F>
where
    F: FnMut() -> Result<Option<(Ix, VecSource<T>)>> + Send,
{
    /// Wrap a closure yielding (key, stream) pairs.
    pub fn new(f: F) -> Self {
        FnOuter {
            f,
            _t: std::marker::PhantomData,
        }
    }
}

impl<T: Element, F> OuterSource<T> for FnOuter<T, F>
where
    F: FnMut() -> Result<Option<(Ix, VecSource<T>)>> + Send,
{
    fn next(&mut self) -> Result<Option<(Ix, VecSource<T>)>> {
        (self.f)()
    }
}

/* ===================== stream-derived fallbacks ===================== */

/// Group a row-major matrix stream into per-row streams.
///
/// Each call to `next` gathers one row's entries (across batch boundaries)
/// and hands them back as an in-memory stream; usable wherever a variant has
/// no better row family than its own full stream.
pub struct StreamRows<T: Element> {
    src: MatSource<T>,
    cur: Option<MatSlice<T>>,
    pos: usize,
    done: bool,
}

impl<T: Element> StreamRows<T> {
    /// Group `src` by row key.
    pub fn new(src: MatSource<T>) -> Self {
        StreamRows {
            src,
            cur: None,
            pos: 0,
            done: false,
        }
    }

    fn peek(&mut self) -> Result<Option<(Ix, Ix, T)>> {
        loop {
            if let Some(b) = &self.cur {
                if self.pos < b.len() {
                    let (r, c) = b.key(self.pos);
                    return Ok(Some((r, c, b.values()[self.pos].clone())));
                }
            }
            if self.done {
                return Ok(None);
            }
            match self.src.fetch(crate::pipeline::DEFAULT_BATCH)? {
                Some(b) => {
                    self.cur = Some(b);
                    self.pos = 0;
                }
                None => {
                    self.done = true;
                    self.cur = None;
                }
            }
        }
    }
}

impl<T: Element> OuterSource<T> for StreamRows<T> {
    fn next(&mut self) -> Result<Option<(Ix, VecSource<T>)>> {
        let Some((key, _, _)) = self.peek()? else {
            return Ok(None);
        };
        let mut idx = Vec::new();
        let mut val = Vec::new();
        while let Some((r, c, v)) = self.peek()? {
            if r != key {
                break;
            }
            idx.push(c);
            val.push(v);
            self.pos += 1;
        }
        let slice = VecSlice::new(idx, val);
        Ok(Some((
            key,
            Box::new(crate::pipeline::BatchVecSource::new(vec![slice])) as VecSource<T>,
        )))
    }
}
