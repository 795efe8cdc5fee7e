//! The matrix handle and its operations.

use crate::compute::apply::{ApplyIndexMat, ApplyMat, BindMat};
use crate::compute::assign::{
    AssignColMat, AssignConstMat, AssignMat, AssignRowMat, AssignScalarMat,
};
use crate::compute::ewise::{EWiseAddMat, EWiseMulMat};
use crate::compute::extract::ExtractMat;
use crate::compute::kron::KronMat;
use crate::compute::mxm::MxMMat;
use crate::compute::{masked_matrix, materialize_vec, MatMemberFn, Member};
use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::form::mask::{MatStructMask, MatValueMask};
use crate::form::matrix::{CsrMatrix, DiagMatrix, TransposeMatrix};
use crate::form::{BoxOuter, FnOuter, MatSource, MatrixForm, VecSource, VectorForm};
use crate::handle::scalar::Scalar;
use crate::handle::vector::Vector;
use crate::handle::{
    check_dim, check_index, check_mat_mask, check_shape, check_size, MatMask, VecMask, WaitMode,
};
use crate::index::{Ix, Region};
use crate::ops::{BinaryOp, IndexUnaryOp, Monoid, Semiring, UnaryOp};
use crate::pipeline::collect::{collect_mat, reduce_mat};
use crate::pipeline::{BatchVecSource, EmptySource, Source};
use crate::reference::MatRef;
use crate::slice::{CowBuf, MatSlice, VecSlice};
use crate::types::{Element, MaskValue};
use rayon::prelude::*;
use std::sync::Arc;

/// A sparse matrix of `T`.
///
/// Cloning shares the current reference; every operation rebinds the clone
/// it is called on without touching the others (value semantics).
pub struct Matrix<T: Element> {
    pub(crate) r: MatRef<T>,
}

impl<T: Element> Clone for Matrix<T> {
    fn clone(&self) -> Self {
        Matrix { r: self.r.clone() }
    }
}

/// The input reference an operation actually reads: the matrix itself, or
/// its transposed view when the descriptor says so.
pub(crate) fn resolve_mat<T: Element>(a: &Matrix<T>, transpose: bool) -> MatRef<T> {
    if transpose {
        MatRef::new(Arc::new(TransposeMatrix::new(a.r.clone())))
    } else {
        a.r.clone()
    }
}

impl<T: Element> Matrix<T> {
    /// An empty matrix of the given shape.
    pub fn new(nrows: Ix, ncols: Ix) -> Result<Self> {
        check_size(nrows)?;
        check_size(ncols)?;
        Ok(Matrix {
            r: MatRef::empty(nrows, ncols),
        })
    }

    /// View a vector as the k-th diagonal of a square matrix of dimension
    /// `v.size() + |k|`; the view shares the vector's storage.
    pub fn diag(v: &Vector<T>, k: Ix) -> Self {
        Matrix {
            r: MatRef::new(Arc::new(DiagMatrix::new(v.r.clone(), k))),
        }
    }

    /// Share this matrix's current contents under a new handle.
    pub fn dup(&self) -> Self {
        self.clone()
    }

    /// Drop all entries, keeping the shape.
    pub fn clear(&mut self) {
        self.r = MatRef::empty(self.nrows(), self.ncols());
    }

    /// Change the logical shape; shrinking drops out-of-range entries.
    pub fn resize(&mut self, nrows: Ix, ncols: Ix) -> Result<()> {
        check_size(nrows)?;
        check_size(ncols)?;
        self.r = self.r.resized(nrows, ncols)?;
        Ok(())
    }

    /// Row count.
    pub fn nrows(&self) -> Ix {
        self.r.nrows()
    }

    /// Column count.
    pub fn ncols(&self) -> Ix {
        self.r.ncols()
    }

    /// Number of stored entries. May stream a deferred representation.
    pub fn nvals(&self) -> Result<Ix> {
        self.r.nvals()
    }

    /// Complete or materialize pending work.
    pub fn wait(&self, mode: WaitMode) -> Result<()> {
        match mode {
            WaitMode::Complete => Ok(()),
            WaitMode::Materialize => self.r.optimize(),
        }
    }

    /// Store `v` at `(r, c)`.
    pub fn set_element(&mut self, r: Ix, c: Ix, v: T) -> Result<()> {
        check_index(r, self.nrows())?;
        check_index(c, self.ncols())?;
        self.r = self.r.with_set(r, c, v);
        Ok(())
    }

    /// Remove the entry at `(r, c)`, if any.
    pub fn remove_element(&mut self, r: Ix, c: Ix) -> Result<()> {
        check_index(r, self.nrows())?;
        check_index(c, self.ncols())?;
        self.r = self.r.with_remove(r, c);
        Ok(())
    }

    /// The value at `(r, c)`; [`Error::NoValue`] when no entry exists.
    pub fn extract_element(&self, r: Ix, c: Ix) -> Result<T> {
        check_index(r, self.nrows())?;
        check_index(c, self.ncols())?;
        self.r.get(r, c)?.ok_or(Error::NoValue)
    }

    /// All entries in row-major order.
    pub fn extract_tuples(&self) -> Result<(Vec<Ix>, Vec<Ix>, Vec<T>)> {
        collect_mat(self.r.form().stream()?)
    }

    /// Populate an empty matrix from coordinate/value arrays.
    pub fn build(
        &mut self,
        rows: &[Ix],
        cols: &[Ix],
        values: &[T],
        dup: Option<&BinaryOp<T, T, T>>,
    ) -> Result<()> {
        if rows.len() != cols.len() || rows.len() != values.len() {
            return Err(Error::InvalidValue);
        }
        if self.nvals()? != 0 {
            return Err(Error::OutputNotEmpty);
        }
        let (nr, nc) = (self.nrows(), self.ncols());
        for (&r, &c) in rows.iter().zip(cols) {
            check_index(r, nr)?;
            check_index(c, nc)?;
        }
        let mut triples: Vec<(Ix, Ix, T)> = rows
            .iter()
            .copied()
            .zip(cols.iter().copied())
            .zip(values.iter().cloned())
            .map(|((r, c), v)| (r, c, v))
            .collect();
        triples.par_sort_by_key(|&(r, c, _)| (r, c));
        let mut row: Vec<Ix> = Vec::with_capacity(triples.len());
        let mut col: Vec<Ix> = Vec::with_capacity(triples.len());
        let mut val: Vec<T> = Vec::with_capacity(triples.len());
        for (r, c, v) in triples {
            if row.last() == Some(&r) && col.last() == Some(&c) {
                let Some(dup) = dup else {
                    return Err(Error::InvalidValue);
                };
                let last = val.last_mut().expect("value for duplicate coordinate");
                *last = dup.apply(last, &v);
            } else {
                row.push(r);
                col.push(c);
                val.push(v);
            }
        }
        self.r = MatRef::from_csr(CsrMatrix::from_triples(nr, nc, row, col, val));
        Ok(())
    }

    /// A value mask: positions admit where the stored value is non-zero.
    pub fn as_mask(&self) -> MatMask
    where
        T: MaskValue,
    {
        MatMask {
            form: Arc::new(MatValueMask::new(self.r.form())),
            nr: self.nrows(),
            nc: self.ncols(),
        }
    }

    /// A structural mask: positions admit where an entry exists.
    pub fn as_structure(&self) -> MatMask {
        MatMask {
            form: Arc::new(MatStructMask::new(self.r.form())),
            nr: self.nrows(),
            nc: self.ncols(),
        }
    }

    /// Reduce all values under a monoid; the identity when empty.
    pub fn reduce(&self, monoid: &Monoid<T>) -> Result<T> {
        Ok(reduce_mat(self.r.form().stream()?, monoid.op())?.unwrap_or_else(|| monoid.identity()))
    }

    fn install(
        &mut self,
        producer: Arc<dyn MatrixForm<T>>,
        mask: Option<Arc<dyn MatrixForm<bool>>>,
        accum: Option<&BinaryOp<T, T, T>>,
        desc: Descriptor,
        member: Option<MatMemberFn>,
    ) -> Result<()> {
        let (nr, nc) = (self.nrows(), self.ncols());
        let prior = self.r.clone();
        let form = masked_matrix(nr, nc, producer, prior, mask, accum.cloned(), desc, member);
        self.r = MatRef::new(form);
        Ok(())
    }

    fn checked_mask(&self, mask: Option<&MatMask>) -> Result<Option<Arc<dyn MatrixForm<bool>>>> {
        check_mat_mask(mask, self.nrows(), self.ncols())?;
        Ok(mask.map(|m| Arc::clone(&m.form)))
    }

    /// `C<mask> = accum(C, op(A))`.
    pub fn apply<U: Element>(
        &mut self,
        mask: Option<&MatMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        op: &UnaryOp<U, T>,
        a: &Matrix<U>,
        desc: Descriptor,
    ) -> Result<()> {
        let a_ref = resolve_mat(a, desc.transpose0);
        check_shape(a_ref.nrows(), a_ref.ncols(), self.nrows(), self.ncols())?;
        let mask = self.checked_mask(mask)?;
        self.install(
            Arc::new(ApplyMat::new(op.clone(), a_ref)),
            mask,
            accum,
            desc,
            None,
        )
    }

    /// `C<mask> = accum(C, op(s, A))`.
    pub fn apply_bind_first<S: Element, U: Element>(
        &mut self,
        mask: Option<&MatMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        op: &BinaryOp<S, U, T>,
        s: &Scalar<S>,
        a: &Matrix<U>,
        desc: Descriptor,
    ) -> Result<()> {
        let a_ref = resolve_mat(a, desc.transpose0);
        check_shape(a_ref.nrows(), a_ref.ncols(), self.nrows(), self.ncols())?;
        let mask = self.checked_mask(mask)?;
        self.install(
            Arc::new(BindMat::first(op.clone(), s.r.clone(), a_ref)),
            mask,
            accum,
            desc,
            None,
        )
    }

    /// `C<mask> = accum(C, op(A, s))`.
    pub fn apply_bind_second<U: Element, S: Element>(
        &mut self,
        mask: Option<&MatMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        op: &BinaryOp<U, S, T>,
        a: &Matrix<U>,
        s: &Scalar<S>,
        desc: Descriptor,
    ) -> Result<()> {
        let a_ref = resolve_mat(a, desc.transpose0);
        check_shape(a_ref.nrows(), a_ref.ncols(), self.nrows(), self.ncols())?;
        let mask = self.checked_mask(mask)?;
        self.install(
            Arc::new(BindMat::second(op.clone(), s.r.clone(), a_ref)),
            mask,
            accum,
            desc,
            None,
        )
    }

    /// `C<mask> = accum(C, op(A, r, c, s))`.
    pub fn apply_index<U: Element, S: Element>(
        &mut self,
        mask: Option<&MatMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        op: &IndexUnaryOp<U, S, T>,
        a: &Matrix<U>,
        s: S,
        desc: Descriptor,
    ) -> Result<()> {
        let a_ref = resolve_mat(a, desc.transpose0);
        check_shape(a_ref.nrows(), a_ref.ncols(), self.nrows(), self.ncols())?;
        let mask = self.checked_mask(mask)?;
        self.install(
            Arc::new(ApplyIndexMat::new(op.clone(), s, a_ref)),
            mask,
            accum,
            desc,
            None,
        )
    }

    /// `C<mask> = accum(C, A where op(A, r, c, s))`.
    pub fn select<S: Element>(
        &mut self,
        mask: Option<&MatMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        op: &IndexUnaryOp<T, S, bool>,
        a: &Matrix<T>,
        s: S,
        desc: Descriptor,
    ) -> Result<()> {
        let a_ref = resolve_mat(a, desc.transpose0);
        check_shape(a_ref.nrows(), a_ref.ncols(), self.nrows(), self.ncols())?;
        let mask = self.checked_mask(mask)?;
        self.install(
            Arc::new(crate::compute::select::SelectMat::new(
                op.clone(),
                s,
                a_ref,
            )),
            mask,
            accum,
            desc,
            None,
        )
    }

    /// `C<mask>(I, J) = accum(C(I, J), A)`.
    pub fn assign(
        &mut self,
        mask: Option<&MatMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        a: &Matrix<T>,
        rows: &[Ix],
        cols: &[Ix],
        desc: Descriptor,
    ) -> Result<()> {
        let (nr, nc) = (self.nrows(), self.ncols());
        let row_region = Region::parse(rows, nr)?;
        let col_region = Region::parse(cols, nc)?;
        let a_ref = resolve_mat(a, desc.transpose0);
        check_shape(
            a_ref.nrows(),
            a_ref.ncols(),
            row_region.len(),
            col_region.len(),
        )?;
        check_mat_mask(mask, nr, nc)?;
        // A full-cover unmasked non-accumulating assign adopts the source.
        if mask.is_none()
            && accum.is_none()
            && row_region.is_all()
            && col_region.is_all()
            && row_region.len() == nr
            && col_region.len() == nc
        {
            self.r = a_ref;
            return Ok(());
        }
        let mask = mask.map(|m| Arc::clone(&m.form));
        let member = full_member(&row_region, &col_region);
        self.install(
            Arc::new(AssignMat::new(nr, nc, a_ref, row_region, col_region)),
            mask,
            accum,
            desc,
            Some(member),
        )
    }

    /// `C<m>(row, J) = accum(C(row, J), u)`; the mask is a length-ncols
    /// vector over the row, and no other row is touched.
    pub fn assign_row(
        &mut self,
        mask: Option<&VecMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        u: &Vector<T>,
        row: Ix,
        cols: &[Ix],
        desc: Descriptor,
    ) -> Result<()> {
        let (nr, nc) = (self.nrows(), self.ncols());
        check_index(row, nr)?;
        let col_region = Region::parse(cols, nc)?;
        check_dim(u.size(), col_region.len())?;
        if let Some(m) = mask {
            check_dim(m.size, nc)?;
        }
        let mask: Option<Arc<dyn MatrixForm<bool>>> = mask.map(|m| {
            Arc::new(RowMaskMat {
                nr,
                nc,
                row,
                inner: Arc::clone(&m.form),
            }) as Arc<dyn MatrixForm<bool>>
        });
        let region = col_region.clone();
        let member: MatMemberFn = Arc::new(move |r, c| {
            if r != row {
                Member::Outside
            } else if region.contains(c) {
                Member::Region
            } else {
                Member::Scope
            }
        });
        self.install(
            Arc::new(AssignRowMat::new(nr, nc, row, col_region, u.r.clone())),
            mask,
            accum,
            desc,
            Some(member),
        )
    }

    /// `C<m>(I, col) = accum(C(I, col), u)`; the mask is a length-nrows
    /// vector over the column, and no other column is touched.
    pub fn assign_col(
        &mut self,
        mask: Option<&VecMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        u: &Vector<T>,
        rows: &[Ix],
        col: Ix,
        desc: Descriptor,
    ) -> Result<()> {
        let (nr, nc) = (self.nrows(), self.ncols());
        check_index(col, nc)?;
        let row_region = Region::parse(rows, nr)?;
        check_dim(u.size(), row_region.len())?;
        if let Some(m) = mask {
            check_dim(m.size, nr)?;
        }
        let mask: Option<Arc<dyn MatrixForm<bool>>> = mask.map(|m| {
            Arc::new(ColMaskMat {
                nr,
                nc,
                col,
                inner: Arc::clone(&m.form),
            }) as Arc<dyn MatrixForm<bool>>
        });
        let region = row_region.clone();
        let member: MatMemberFn = Arc::new(move |r, c| {
            if c != col {
                Member::Outside
            } else if region.contains(r) {
                Member::Region
            } else {
                Member::Scope
            }
        });
        self.install(
            Arc::new(AssignColMat::new(nr, nc, col, row_region, u.r.clone())),
            mask,
            accum,
            desc,
            Some(member),
        )
    }

    /// `C<mask>(I, J) = accum(C(I, J), value)`.
    pub fn assign_constant(
        &mut self,
        mask: Option<&MatMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        value: T,
        rows: &[Ix],
        cols: &[Ix],
        desc: Descriptor,
    ) -> Result<()> {
        let (nr, nc) = (self.nrows(), self.ncols());
        let row_region = Region::parse(rows, nr)?;
        let col_region = Region::parse(cols, nc)?;
        let mask = self.checked_mask(mask)?;
        let member = full_member(&row_region, &col_region);
        self.install(
            Arc::new(AssignConstMat::new(
                nr,
                nc,
                row_region,
                col_region,
                Some(value),
            )),
            mask,
            accum,
            desc,
            Some(member),
        )
    }

    /// `C<mask>(I, J) = accum(C(I, J), s)`; an empty scalar deletes the
    /// region.
    pub fn assign_scalar(
        &mut self,
        mask: Option<&MatMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        s: &Scalar<T>,
        rows: &[Ix],
        cols: &[Ix],
        desc: Descriptor,
    ) -> Result<()> {
        let (nr, nc) = (self.nrows(), self.ncols());
        let row_region = Region::parse(rows, nr)?;
        let col_region = Region::parse(cols, nc)?;
        let mask = self.checked_mask(mask)?;
        let member = full_member(&row_region, &col_region);
        self.install(
            Arc::new(AssignScalarMat::new(
                nr,
                nc,
                row_region,
                col_region,
                s.r.clone(),
            )),
            mask,
            accum,
            desc,
            Some(member),
        )
    }

    /// `C<mask> = accum(C, A(I, J))`.
    pub fn extract(
        &mut self,
        mask: Option<&MatMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        a: &Matrix<T>,
        rows: &[Ix],
        cols: &[Ix],
        desc: Descriptor,
    ) -> Result<()> {
        let a_ref = resolve_mat(a, desc.transpose0);
        let row_region = Region::parse(rows, a_ref.nrows())?;
        let col_region = Region::parse(cols, a_ref.ncols())?;
        check_shape(
            row_region.len(),
            col_region.len(),
            self.nrows(),
            self.ncols(),
        )?;
        let mask = self.checked_mask(mask)?;
        self.install(
            Arc::new(ExtractMat::new(a_ref, row_region, col_region)),
            mask,
            accum,
            desc,
            None,
        )
    }

    /// `C<mask> = accum(C, A ⊕ B)`: union element-wise add.
    pub fn ewise_add(
        &mut self,
        mask: Option<&MatMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        op: &BinaryOp<T, T, T>,
        a: &Matrix<T>,
        b: &Matrix<T>,
        desc: Descriptor,
    ) -> Result<()> {
        let a_ref = resolve_mat(a, desc.transpose0);
        let b_ref = resolve_mat(b, desc.transpose1);
        check_shape(a_ref.nrows(), a_ref.ncols(), self.nrows(), self.ncols())?;
        check_shape(b_ref.nrows(), b_ref.ncols(), self.nrows(), self.ncols())?;
        let mask = self.checked_mask(mask)?;
        self.install(
            Arc::new(EWiseAddMat::new(op.clone(), a_ref, b_ref)),
            mask,
            accum,
            desc,
            None,
        )
    }

    /// `C<mask> = accum(C, A ⊗ B)`: intersection element-wise multiply.
    pub fn ewise_mult<A: Element, B: Element>(
        &mut self,
        mask: Option<&MatMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        op: &BinaryOp<A, B, T>,
        a: &Matrix<A>,
        b: &Matrix<B>,
        desc: Descriptor,
    ) -> Result<()> {
        let a_ref = resolve_mat(a, desc.transpose0);
        let b_ref = resolve_mat(b, desc.transpose1);
        check_shape(a_ref.nrows(), a_ref.ncols(), self.nrows(), self.ncols())?;
        check_shape(b_ref.nrows(), b_ref.ncols(), self.nrows(), self.ncols())?;
        let mask = self.checked_mask(mask)?;
        self.install(
            Arc::new(EWiseMulMat::new(op.clone(), a_ref, b_ref)),
            mask,
            accum,
            desc,
            None,
        )
    }

    /// `C<mask> = accum(C, A · B)` under a semiring.
    pub fn mxm<A: Element, B: Element>(
        &mut self,
        mask: Option<&MatMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        ring: &Semiring<A, B, T>,
        a: &Matrix<A>,
        b: &Matrix<B>,
        desc: Descriptor,
    ) -> Result<()> {
        let a_ref = resolve_mat(a, desc.transpose0);
        let b_ref = resolve_mat(b, desc.transpose1);
        check_dim(a_ref.ncols(), b_ref.nrows())?;
        check_shape(a_ref.nrows(), b_ref.ncols(), self.nrows(), self.ncols())?;
        let mask = self.checked_mask(mask)?;
        self.install(
            Arc::new(MxMMat::new(a_ref, b_ref, ring.clone())),
            mask,
            accum,
            desc,
            None,
        )
    }

    /// `C<mask> = accum(C, A ⊗ B)` Kronecker product.
    pub fn kronecker<A: Element, B: Element>(
        &mut self,
        mask: Option<&MatMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        op: &BinaryOp<A, B, T>,
        a: &Matrix<A>,
        b: &Matrix<B>,
        desc: Descriptor,
    ) -> Result<()> {
        let a_ref = resolve_mat(a, desc.transpose0);
        let b_ref = resolve_mat(b, desc.transpose1);
        check_shape(
            a_ref.nrows() * b_ref.nrows(),
            a_ref.ncols() * b_ref.ncols(),
            self.nrows(),
            self.ncols(),
        )?;
        let mask = self.checked_mask(mask)?;
        self.install(
            Arc::new(KronMat::new(a_ref, b_ref, op.clone())),
            mask,
            accum,
            desc,
            None,
        )
    }

    /// `C<mask> = accum(C, Aᵀ)`.
    ///
    /// With no mask and no accumulator the output becomes a transposed view
    /// sharing the source's storage (and a transposed descriptor input
    /// cancels the operation into the source itself).
    pub fn transpose(
        &mut self,
        mask: Option<&MatMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        a: &Matrix<T>,
        desc: Descriptor,
    ) -> Result<()> {
        let (er, ec) = if desc.transpose0 {
            (a.nrows(), a.ncols())
        } else {
            (a.ncols(), a.nrows())
        };
        check_shape(er, ec, self.nrows(), self.ncols())?;
        check_mat_mask(mask, self.nrows(), self.ncols())?;
        if mask.is_none() && accum.is_none() {
            self.r = if desc.transpose0 {
                a.r.clone()
            } else {
                MatRef::new(Arc::new(TransposeMatrix::new(a.r.clone())))
            };
            return Ok(());
        }
        let producer: Arc<dyn MatrixForm<T>> = if desc.transpose0 {
            a.r.form()
        } else {
            Arc::new(TransposeMatrix::new(a.r.clone()))
        };
        let mask = mask.map(|m| Arc::clone(&m.form));
        self.install(producer, mask, accum, desc, None)
    }
}

/* ===================== row/col vector masks ===================== */

/// A vector mask viewed as a one-row matrix mask band.
struct RowMaskMat {
    nr: Ix,
    nc: Ix,
    row: Ix,
    inner: Arc<dyn VectorForm<bool>>,
}

impl MatrixForm<bool> for RowMaskMat {
    fn nrows(&self) -> Ix {
        self.nr
    }

    fn ncols(&self) -> Ix {
        self.nc
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<bool>> {
        if r != self.row {
            return Ok(None);
        }
        self.inner.get(c)
    }

    fn stream(&self) -> Result<MatSource<bool>> {
        struct Band {
            src: VecSource<bool>,
            row: Ix,
        }
        impl Source for Band {
            type Batch = MatSlice<bool>;

            fn fetch(&mut self, size: usize) -> Result<Option<MatSlice<bool>>> {
                let Some(b) = self.src.fetch(size)? else {
                    return Ok(None);
                };
                Ok(Some(MatSlice {
                    row: CowBuf::new(vec![self.row; b.len()]),
                    col: b.idx,
                    val: b.val,
                }))
            }
        }
        Ok(Box::new(Band {
            src: self.inner.stream()?,
            row: self.row,
        }))
    }

    fn row(&self, r: Ix) -> Result<VecSource<bool>> {
        if r == self.row {
            self.inner.stream()
        } else {
            Ok(Box::new(EmptySource::new()))
        }
    }

    fn col(&self, c: Ix) -> Result<VecSource<bool>> {
        match self.inner.get(c)? {
            None => Ok(Box::new(EmptySource::new())),
            Some(v) => Ok(Box::new(BatchVecSource::new(vec![VecSlice::new(
                vec![self.row],
                vec![v],
            )]))),
        }
    }

    fn rows(&self) -> Result<BoxOuter<bool>> {
        let mut pending = Some((self.row, self.inner.clone()));
        Ok(Box::new(FnOuter::new(move || {
            let Some((row, inner)) = pending.take() else {
                return Ok(None);
            };
            Ok(Some((row, inner.stream()?)))
        })))
    }

    fn cols(&self) -> Result<BoxOuter<bool>> {
        let entries = materialize_vec(self.inner.stream()?)?;
        let row = self.row;
        let mut at = 0usize;
        Ok(Box::new(FnOuter::new(move || {
            if at >= entries.len() {
                return Ok(None);
            }
            let (c, v) = entries[at].clone();
            at += 1;
            let src: VecSource<bool> =
                Box::new(BatchVecSource::new(vec![VecSlice::new(vec![row], vec![v])]));
            Ok(Some((c, src)))
        })))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<bool>>> {
        if self.row >= nr {
            return Ok(Arc::new(crate::form::matrix::EmptyMatrix::new(nr, nc)));
        }
        Ok(Arc::new(RowMaskMat {
            nr,
            nc,
            row: self.row,
            inner: self.inner.resized(nc)?,
        }))
    }
}

/// A vector mask viewed as a one-column matrix mask band.
struct ColMaskMat {
    nr: Ix,
    nc: Ix,
    col: Ix,
    inner: Arc<dyn VectorForm<bool>>,
}

impl MatrixForm<bool> for ColMaskMat {
    fn nrows(&self) -> Ix {
        self.nr
    }

    fn ncols(&self) -> Ix {
        self.nc
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<bool>> {
        if c != self.col {
            return Ok(None);
        }
        self.inner.get(r)
    }

    fn stream(&self) -> Result<MatSource<bool>> {
        struct Band {
            src: VecSource<bool>,
            col: Ix,
        }
        impl Source for Band {
            type Batch = MatSlice<bool>;

            fn fetch(&mut self, size: usize) -> Result<Option<MatSlice<bool>>> {
                let Some(b) = self.src.fetch(size)? else {
                    return Ok(None);
                };
                let n = b.len();
                Ok(Some(MatSlice {
                    row: b.idx,
                    col: CowBuf::new(vec![self.col; n]),
                    val: b.val,
                }))
            }
        }
        Ok(Box::new(Band {
            src: self.inner.stream()?,
            col: self.col,
        }))
    }

    fn row(&self, r: Ix) -> Result<VecSource<bool>> {
        match self.inner.get(r)? {
            None => Ok(Box::new(EmptySource::new())),
            Some(v) => Ok(Box::new(BatchVecSource::new(vec![VecSlice::new(
                vec![self.col],
                vec![v],
            )]))),
        }
    }

    fn col(&self, c: Ix) -> Result<VecSource<bool>> {
        if c == self.col {
            self.inner.stream()
        } else {
            Ok(Box::new(EmptySource::new()))
        }
    }

    fn rows(&self) -> Result<BoxOuter<bool>> {
        let entries = materialize_vec(self.inner.stream()?)?;
        let col = self.col;
        let mut at = 0usize;
        Ok(Box::new(FnOuter::new(move || {
            if at >= entries.len() {
                return Ok(None);
            }
            let (r, v) = entries[at].clone();
            at += 1;
            let src: VecSource<bool> =
                Box::new(BatchVecSource::new(vec![VecSlice::new(vec![col], vec![v])]));
            Ok(Some((r, src)))
        })))
    }

    fn cols(&self) -> Result<BoxOuter<bool>> {
        let mut pending = Some((self.col, self.inner.clone()));
        Ok(Box::new(FnOuter::new(move || {
            let Some((col, inner)) = pending.take() else {
                return Ok(None);
            };
            Ok(Some((col, inner.stream()?)))
        })))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<bool>>> {
        if self.col >= nc {
            return Ok(Arc::new(crate::form::matrix::EmptyMatrix::new(nr, nc)));
        }
        Ok(Arc::new(ColMaskMat {
            nr,
            nc,
            col: self.col,
            inner: self.inner.resized(nr)?,
        }))
    }
}

fn full_member(rows: &Region, cols: &Region) -> MatMemberFn {
    let rows = rows.clone();
    let cols = cols.clone();
    Arc::new(move |r, c| {
        if rows.contains(r) && cols.contains(c) {
            Member::Region
        } else {
            Member::Scope
        }
    })
}
