//! References: concurrency-safe indirection between handles and
//! representations.
//!
//! A reference holds the current representation behind a read/write lock, a
//! cached element count (−1 = unknown), and a one-way *optimized* flag. The
//! representation a reference exposes at any moment is immutable; `optimize`
//! is the only operation that swaps it, and it swaps in a canonical form
//! with identical observable content. Readers take the read lock, clone the
//! `Arc`, and release — they are never blocked by each other.
//!
//! Edits (`with_set` / `with_remove`) never mutate: they build a delta form
//! over the current reference and hand back a *new* reference for the handle
//! to rebind.

use crate::error::Result;
use crate::form::delta::{DeltaMatrix, DeltaVector};
use crate::form::matrix::{CsrMatrix, EmptyMatrix, SingletonMatrix};
use crate::form::scalar::{EmptyScalar, FullScalar};
use crate::form::vector::SparseVector;
use crate::form::{MatrixForm, ScalarForm, VecSource, VectorForm};
use crate::index::Ix;
use crate::pipeline::collect::{count_mat, count_vec};
use crate::types::Element;
use log::debug;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

/* ===================== scalar ===================== */

struct ScalarRefInner<T: Element> {
    form: RwLock<Arc<dyn ScalarForm<T>>>,
    optimized: AtomicBool,
}

/// Shared indirection to a scalar representation.
pub struct ScalarRef<T: Element> {
    inner: Arc<ScalarRefInner<T>>,
}

impl<T: Element> Clone for ScalarRef<T> {
    fn clone(&self) -> Self {
        ScalarRef {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Element> ScalarRef<T> {
    /// Wrap a representation.
    pub fn new(form: Arc<dyn ScalarForm<T>>) -> Self {
        ScalarRef {
            inner: Arc::new(ScalarRefInner {
                form: RwLock::new(form),
                optimized: AtomicBool::new(false),
            }),
        }
    }

    /// The empty scalar.
    pub fn empty() -> Self {
        ScalarRef::new(Arc::new(EmptyScalar))
    }

    /// A full scalar.
    pub fn full(v: T) -> Self {
        ScalarRef::new(Arc::new(FullScalar::new(v)))
    }

    /// Snapshot the current representation.
    pub fn form(&self) -> Arc<dyn ScalarForm<T>> {
        Arc::clone(&self.inner.form.read().expect("scalar ref lock"))
    }

    /// Evaluate to the stored value.
    pub fn get(&self) -> Result<Option<T>> {
        self.form().get()
    }

    /// The value when known without computation.
    pub fn known(&self) -> Option<Option<T>> {
        self.form().known()
    }

    /// Collapse a computed scalar to its materialized form.
    pub fn optimize(&self) -> Result<()> {
        if self.inner.optimized.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut g = self.inner.form.write().expect("scalar ref lock");
        if self.inner.optimized.load(Ordering::Acquire) {
            return Ok(());
        }
        if g.known().is_none() {
            let v = g.get()?;
            *g = match v {
                Some(v) => Arc::new(FullScalar::new(v)),
                None => Arc::new(EmptyScalar),
            };
        }
        self.inner.optimized.store(true, Ordering::Release);
        Ok(())
    }
}

/* ===================== vector ===================== */

struct VecRefInner<T: Element> {
    form: RwLock<Arc<dyn VectorForm<T>>>,
    nvals: AtomicI64,
    optimized: AtomicBool,
}

/// Shared indirection to a vector representation plus a cached entry count.
pub struct VecRef<T: Element> {
    inner: Arc<VecRefInner<T>>,
}

impl<T: Element> Clone for VecRef<T> {
    fn clone(&self) -> Self {
        VecRef {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Element> VecRef<T> {
    /// Wrap a representation; the count cache starts from its hint.
    pub fn new(form: Arc<dyn VectorForm<T>>) -> Self {
        let nvals = form.nvals_hint().unwrap_or(-1);
        VecRef {
            inner: Arc::new(VecRefInner {
                form: RwLock::new(form),
                nvals: AtomicI64::new(nvals),
                optimized: AtomicBool::new(false),
            }),
        }
    }

    /// An empty vector of the given length.
    pub fn empty(size: Ix) -> Self {
        VecRef::new(Arc::new(SparseVector::empty(size)))
    }

    /// Snapshot the current representation.
    pub fn form(&self) -> Arc<dyn VectorForm<T>> {
        Arc::clone(&self.inner.form.read().expect("vector ref lock"))
    }

    /// Logical length.
    pub fn size(&self) -> Ix {
        self.form().size()
    }

    /// Point lookup through the current representation.
    pub fn get(&self, i: Ix) -> Result<Option<T>> {
        self.form().get(i)
    }

    /// Stream the current representation.
    pub fn stream(&self) -> Result<VecSource<T>> {
        self.form().stream()
    }

    /// Entry count; streams a full count once when unknown, then caches it.
    pub fn nvals(&self) -> Result<Ix> {
        let cached = self.inner.nvals.load(Ordering::Acquire);
        if cached >= 0 {
            return Ok(cached);
        }
        let form = self.form();
        let n = match form.nvals_hint() {
            Some(h) => h,
            None => count_vec(form.stream()?)?,
        };
        self.inner.nvals.store(n, Ordering::Release);
        Ok(n)
    }

    /// Collapse delta chains and computed nodes to the canonical sparse
    /// vector. Idempotent; double-checks the one-way flag under the write
    /// lock.
    pub fn optimize(&self) -> Result<()> {
        if self.inner.optimized.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut g = self.inner.form.write().expect("vector ref lock");
        if self.inner.optimized.load(Ordering::Acquire) {
            return Ok(());
        }
        if let Some(sv) = g.optimized()? {
            debug!("optimize: vector rebuilt with {} entries", sv.len());
            self.inner.nvals.store(sv.len() as i64, Ordering::Release);
            *g = Arc::new(sv);
        } else if let Some(h) = g.nvals_hint() {
            self.inner.nvals.store(h, Ordering::Release);
        }
        self.inner.optimized.store(true, Ordering::Release);
        Ok(())
    }

    /// A reference with the new length; equal lengths return this reference.
    pub fn resized(&self, n: Ix) -> Result<VecRef<T>> {
        if n == self.size() {
            return Ok(self.clone());
        }
        Ok(VecRef::new(self.form().resized(n)?))
    }

    /// A new reference layering a set of `v` at `i` over this one.
    ///
    /// A representation known to be empty yields a sparse singleton instead
    /// of a chain.
    pub fn with_set(&self, i: Ix, v: T) -> VecRef<T> {
        let form = self.form();
        if form.nvals_hint() == Some(0) {
            return VecRef::new(Arc::new(SparseVector::new(form.size(), vec![i], vec![v])));
        }
        VecRef::new(Arc::new(DeltaVector::set(self.clone(), i, v)))
    }

    /// A new reference layering a removal of `i`; a no-op on an empty
    /// representation.
    pub fn with_remove(&self, i: Ix) -> VecRef<T> {
        if self.form().nvals_hint() == Some(0) {
            return self.clone();
        }
        VecRef::new(Arc::new(DeltaVector::remove(self.clone(), i)))
    }

    /// A reference over a freshly built sparse vector.
    pub fn from_sparse(sv: SparseVector<T>) -> VecRef<T> {
        VecRef::new(Arc::new(sv))
    }
}

/* ===================== matrix ===================== */

struct MatRefInner<T: Element> {
    form: RwLock<Arc<dyn MatrixForm<T>>>,
    nvals: AtomicI64,
    optimized: AtomicBool,
}

/// Shared indirection to a matrix representation plus a cached entry count.
pub struct MatRef<T: Element> {
    inner: Arc<MatRefInner<T>>,
}

impl<T: Element> Clone for MatRef<T> {
    fn clone(&self) -> Self {
        MatRef {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Element> MatRef<T> {
    /// Wrap a representation; the count cache starts from its hint.
    pub fn new(form: Arc<dyn MatrixForm<T>>) -> Self {
        let nvals = form.nvals_hint().unwrap_or(-1);
        MatRef {
            inner: Arc::new(MatRefInner {
                form: RwLock::new(form),
                nvals: AtomicI64::new(nvals),
                optimized: AtomicBool::new(false),
            }),
        }
    }

    /// An empty matrix of the given shape.
    pub fn empty(nr: Ix, nc: Ix) -> Self {
        MatRef::new(Arc::new(EmptyMatrix::new(nr, nc)))
    }

    /// Snapshot the current representation.
    pub fn form(&self) -> Arc<dyn MatrixForm<T>> {
        Arc::clone(&self.inner.form.read().expect("matrix ref lock"))
    }

    /// Row count.
    pub fn nrows(&self) -> Ix {
        self.form().nrows()
    }

    /// Column count.
    pub fn ncols(&self) -> Ix {
        self.form().ncols()
    }

    /// Point lookup through the current representation.
    pub fn get(&self, r: Ix, c: Ix) -> Result<Option<T>> {
        self.form().get(r, c)
    }

    /// Entry count; streams a full count once when unknown, then caches it.
    pub fn nvals(&self) -> Result<Ix> {
        let cached = self.inner.nvals.load(Ordering::Acquire);
        if cached >= 0 {
            return Ok(cached);
        }
        let form = self.form();
        let n = match form.nvals_hint() {
            Some(h) => h,
            None => count_mat(form.stream()?)?,
        };
        self.inner.nvals.store(n, Ordering::Release);
        Ok(n)
    }

    /// Collapse delta chains and computed nodes to canonical CSR.
    pub fn optimize(&self) -> Result<()> {
        if self.inner.optimized.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut g = self.inner.form.write().expect("matrix ref lock");
        if self.inner.optimized.load(Ordering::Acquire) {
            return Ok(());
        }
        if let Some(csr) = g.optimized()? {
            debug!("optimize: matrix rebuilt with {} entries", csr.len());
            self.inner.nvals.store(csr.len() as i64, Ordering::Release);
            *g = Arc::new(csr);
        } else if let Some(h) = g.nvals_hint() {
            self.inner.nvals.store(h, Ordering::Release);
        }
        self.inner.optimized.store(true, Ordering::Release);
        Ok(())
    }

    /// A reference with the new shape; an unchanged shape returns this
    /// reference.
    pub fn resized(&self, nr: Ix, nc: Ix) -> Result<MatRef<T>> {
        if nr == self.nrows() && nc == self.ncols() {
            return Ok(self.clone());
        }
        Ok(MatRef::new(self.form().resized(nr, nc)?))
    }

    /// A new reference layering a set of `v` at `(r, c)` over this one; a
    /// representation known to be empty yields the singleton variant.
    pub fn with_set(&self, r: Ix, c: Ix, v: T) -> MatRef<T> {
        let form = self.form();
        if form.nvals_hint() == Some(0) {
            return MatRef::new(Arc::new(SingletonMatrix::new(
                form.nrows(),
                form.ncols(),
                r,
                c,
                v,
            )));
        }
        MatRef::new(Arc::new(DeltaMatrix::set(self.clone(), r, c, v)))
    }

    /// A new reference layering a removal of `(r, c)`; a no-op on an empty
    /// representation.
    pub fn with_remove(&self, r: Ix, c: Ix) -> MatRef<T> {
        if self.form().nvals_hint() == Some(0) {
            return self.clone();
        }
        MatRef::new(Arc::new(DeltaMatrix::remove(self.clone(), r, c)))
    }

    /// A reference over a freshly built CSR matrix.
    pub fn from_csr(csr: CsrMatrix<T>) -> MatRef<T> {
        MatRef::new(Arc::new(csr))
    }
}
