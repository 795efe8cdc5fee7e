//! Vector representations: sparse, homogeneous-constant, homogeneous-scalar.

use crate::error::Result;
use crate::form::{VecSource, VectorForm};
use crate::index::Ix;
use crate::pipeline::collect::collect_vec;
use crate::pipeline::{EmptySource, IntervalSource, Source};
use crate::reference::ScalarRef;
use crate::slice::VecSlice;
use crate::types::Element;
use std::sync::Arc;

/// The canonical sparse vector: strictly increasing indices with aligned
/// values.
pub struct SparseVector<T> {
    size: Ix,
    idx: Arc<Vec<Ix>>,
    val: Arc<Vec<T>>,
}

impl<T: Element> SparseVector<T> {
    /// Wrap sorted, duplicate-free parallel arrays.
    pub fn new(size: Ix, idx: Vec<Ix>, val: Vec<T>) -> Self {
        debug_assert_eq!(idx.len(), val.len());
        debug_assert!(idx.windows(2).all(|w| w[0] < w[1]));
        SparseVector {
            size,
            idx: Arc::new(idx),
            val: Arc::new(val),
        }
    }

    /// The empty vector of the given length.
    pub fn empty(size: Ix) -> Self {
        SparseVector::new(size, Vec::new(), Vec::new())
    }

    /// Drain a stream (already in index order) into a sparse vector.
    pub fn collect(size: Ix, src: VecSource<T>) -> Result<Self> {
        let (idx, val) = collect_vec(src)?;
        Ok(SparseVector::new(size, idx, val))
    }

    /// Entry count.
    pub fn len(&self) -> usize {
        self.idx.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.idx.is_empty()
    }

    /// The index array.
    pub fn indices(&self) -> &[Ix] {
        &self.idx
    }

    /// The value array.
    pub fn values(&self) -> &[T] {
        &self.val
    }
}

struct SparseVecStream<T> {
    idx: Arc<Vec<Ix>>,
    val: Arc<Vec<T>>,
    at: usize,
}

impl<T: Element> Source for SparseVecStream<T> {
    type Batch = VecSlice<T>;

    fn prepare(&mut self) -> Option<usize> {
        Some(self.idx.len())
    }

    fn fetch(&mut self, size: usize) -> Result<Option<VecSlice<T>>> {
        if self.at >= self.idx.len() {
            return Ok(None);
        }
        let hi = (self.at + size.max(1)).min(self.idx.len());
        let out = VecSlice::shared(Arc::clone(&self.idx), Arc::clone(&self.val), self.at, hi);
        self.at = hi;
        Ok(Some(out))
    }
}

impl<T: Element> VectorForm<T> for SparseVector<T> {
    fn size(&self) -> Ix {
        self.size
    }

    fn nvals_hint(&self) -> Option<Ix> {
        Some(self.idx.len() as Ix)
    }

    fn get(&self, i: Ix) -> Result<Option<T>> {
        Ok(self
            .idx
            .binary_search(&i)
            .ok()
            .map(|p| self.val[p].clone()))
    }

    fn stream(&self) -> Result<VecSource<T>> {
        Ok(Box::new(SparseVecStream {
            idx: Arc::clone(&self.idx),
            val: Arc::clone(&self.val),
            at: 0,
        }))
    }

    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<T>>> {
        if n >= self.size {
            return Ok(Arc::new(SparseVector {
                size: n,
                idx: Arc::clone(&self.idx),
                val: Arc::clone(&self.val),
            }));
        }
        let keep = self.idx.partition_point(|&i| i < n);
        Ok(Arc::new(SparseVector::new(
            n,
            self.idx[..keep].to_vec(),
            self.val[..keep].to_vec(),
        )))
    }

    fn optimized(&self) -> Result<Option<SparseVector<T>>> {
        Ok(None)
    }
}

/// Every index holds the same value.
pub struct ConstantVector<T> {
    size: Ix,
    value: T,
}

impl<T: Element> ConstantVector<T> {
    /// A dense constant vector.
    pub fn new(size: Ix, value: T) -> Self {
        ConstantVector { size, value }
    }
}

struct ConstVecStream<T> {
    ranges: IntervalSource,
    value: T,
}

impl<T: Element> Source for ConstVecStream<T> {
    type Batch = VecSlice<T>;

    fn fetch(&mut self, size: usize) -> Result<Option<VecSlice<T>>> {
        let Some((lo, hi)) = self.ranges.fetch(size)? else {
            return Ok(None);
        };
        let n = (hi - lo) as usize;
        Ok(Some(VecSlice::new(
            (lo..hi).collect(),
            vec![self.value.clone(); n],
        )))
    }
}

impl<T: Element> VectorForm<T> for ConstantVector<T> {
    fn size(&self) -> Ix {
        self.size
    }

    fn nvals_hint(&self) -> Option<Ix> {
        Some(self.size)
    }

    fn get(&self, i: Ix) -> Result<Option<T>> {
        Ok((i >= 0 && i < self.size).then(|| self.value.clone()))
    }

    fn stream(&self) -> Result<VecSource<T>> {
        Ok(Box::new(ConstVecStream {
            ranges: IntervalSource::new(self.size),
            value: self.value.clone(),
        }))
    }

    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<T>>> {
        Ok(Arc::new(ConstantVector::new(n, self.value.clone())))
    }

    fn optimized(&self) -> Result<Option<SparseVector<T>>> {
        Ok(None)
    }
}

/// Homogeneous vector over a possibly-unevaluated scalar.
///
/// Constructed through [`scalar_vector`], which collapses to a constant or
/// empty form when the scalar is already materialized; otherwise evaluation
/// is deferred and re-checked at stream time.
pub struct ScalarVector<T: Element> {
    size: Ix,
    scalar: ScalarRef<T>,
}

/// Build the homogeneous-scalar form, collapsing when the scalar is known.
pub fn scalar_vector<T: Element>(size: Ix, scalar: ScalarRef<T>) -> Arc<dyn VectorForm<T>> {
    match scalar.known() {
        Some(Some(v)) => Arc::new(ConstantVector::new(size, v)),
        Some(None) => Arc::new(SparseVector::empty(size)),
        None => Arc::new(ScalarVector { size, scalar }),
    }
}

impl<T: Element> VectorForm<T> for ScalarVector<T> {
    fn size(&self) -> Ix {
        self.size
    }

    fn get(&self, i: Ix) -> Result<Option<T>> {
        if i < 0 || i >= self.size {
            return Ok(None);
        }
        self.scalar.get()
    }

    fn stream(&self) -> Result<VecSource<T>> {
        match self.scalar.get()? {
            None => Ok(Box::new(EmptySource::new())),
            Some(v) => Ok(Box::new(ConstVecStream {
                ranges: IntervalSource::new(self.size),
                value: v,
            })),
        }
    }

    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<T>>> {
        Ok(scalar_vector(n, self.scalar.clone()))
    }
}
