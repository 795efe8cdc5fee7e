//! The vector handle and its operations.

use crate::compute::apply::{ApplyIndexVec, ApplyVec, BindVec};
use crate::compute::assign::{AssignConstVec, AssignScalarVec, AssignVec};
use crate::compute::ewise::{EWiseAddVec, EWiseMulVec};
use crate::compute::extract::{ExtractColVec, ExtractVec};
use crate::compute::mxm::{MxVVec, VxMVec};
use crate::compute::reduce::RowReduceVec;
use crate::compute::select::SelectVec;
use crate::compute::{masked_vector, Member, VecMemberFn};
use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::form::mask::{VecStructMask, VecValueMask};
use crate::form::vector::SparseVector;
use crate::form::VectorForm;
use crate::handle::matrix::{resolve_mat, Matrix};
use crate::handle::scalar::Scalar;
use crate::handle::{check_dim, check_index, check_size, check_vec_mask, VecMask, WaitMode};
use crate::index::{Ix, Region};
use crate::ops::{BinaryOp, IndexUnaryOp, Monoid, Semiring, UnaryOp};
use crate::pipeline::collect::{collect_vec, reduce_vec};
use crate::reference::VecRef;
use crate::types::{Element, MaskValue};
use rayon::prelude::*;
use std::sync::Arc;

/// A sparse vector of `T`.
///
/// Cloning shares the current reference; every operation rebinds the clone
/// it is called on without touching the others (value semantics).
pub struct Vector<T: Element> {
    pub(crate) r: VecRef<T>,
}

impl<T: Element> Clone for Vector<T> {
    fn clone(&self) -> Self {
        Vector { r: self.r.clone() }
    }
}

impl<T: Element> Vector<T> {
    /// An empty vector of length `size`.
    pub fn new(size: Ix) -> Result<Self> {
        check_size(size)?;
        Ok(Vector {
            r: VecRef::empty(size),
        })
    }

    /// Share this vector's current contents under a new handle.
    pub fn dup(&self) -> Self {
        self.clone()
    }

    /// Drop all entries, keeping the length.
    pub fn clear(&mut self) {
        self.r = VecRef::empty(self.size());
    }

    /// Change the logical length; shrinking drops out-of-range entries.
    pub fn resize(&mut self, n: Ix) -> Result<()> {
        check_size(n)?;
        self.r = self.r.resized(n)?;
        Ok(())
    }

    /// Logical length.
    pub fn size(&self) -> Ix {
        self.r.size()
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

    /// Store `v` at `i`.
    pub fn set_element(&mut self, i: Ix, v: T) -> Result<()> {
        check_index(i, self.size())?;
        self.r = self.r.with_set(i, v);
        Ok(())
    }

    /// Remove the entry at `i`, if any.
    pub fn remove_element(&mut self, i: Ix) -> Result<()> {
        check_index(i, self.size())?;
        self.r = self.r.with_remove(i);
        Ok(())
    }

    /// The value at `i`; [`Error::NoValue`] when no entry exists.
    pub fn extract_element(&self, i: Ix) -> Result<T> {
        check_index(i, self.size())?;
        self.r.get(i)?.ok_or(Error::NoValue)
    }

    /// All entries in ascending index order.
    pub fn extract_tuples(&self) -> Result<(Vec<Ix>, Vec<T>)> {
        collect_vec(self.r.stream()?)
    }

    /// Populate an empty vector from index/value arrays.
    ///
    /// Input triples are sorted; duplicate coordinates are an error unless
    /// `dup` folds them pairwise in input order.
    pub fn build(
        &mut self,
        indices: &[Ix],
        values: &[T],
        dup: Option<&BinaryOp<T, T, T>>,
    ) -> Result<()> {
        if indices.len() != values.len() {
            return Err(Error::InvalidValue);
        }
        if self.nvals()? != 0 {
            return Err(Error::OutputNotEmpty);
        }
        let size = self.size();
        for &i in indices {
            check_index(i, size)?;
        }
        let mut pairs: Vec<(Ix, T)> = indices.iter().copied().zip(values.iter().cloned()).collect();
        pairs.par_sort_by_key(|&(i, _)| i);
        let mut idx: Vec<Ix> = Vec::with_capacity(pairs.len());
        let mut val: Vec<T> = Vec::with_capacity(pairs.len());
        for (i, v) in pairs {
            if idx.last() == Some(&i) {
                let Some(dup) = dup else {
                    return Err(Error::InvalidValue);
                };
                let last = val.last_mut().expect("value for duplicate index");
                *last = dup.apply(last, &v);
            } else {
                idx.push(i);
                val.push(v);
            }
        }
        self.r = VecRef::from_sparse(SparseVector::new(size, idx, val));
        Ok(())
    }

    /// A value mask: positions admit where the stored value is non-zero.
    pub fn as_mask(&self) -> VecMask
    where
        T: MaskValue,
    {
        VecMask {
            form: Arc::new(VecValueMask::new(self.r.form())),
            size: self.size(),
        }
    }

    /// A structural mask: positions admit where an entry exists.
    pub fn as_structure(&self) -> VecMask {
        VecMask {
            form: Arc::new(VecStructMask::new(self.r.form())),
            size: self.size(),
        }
    }

    /// Reduce all values under a monoid; the identity when empty.
    pub fn reduce(&self, monoid: &Monoid<T>) -> Result<T> {
        Ok(reduce_vec(self.r.stream()?, monoid.op())?.unwrap_or_else(|| monoid.identity()))
    }

    fn install(
        &mut self,
        producer: Arc<dyn VectorForm<T>>,
        mask: Option<&VecMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        desc: Descriptor,
        member: Option<VecMemberFn>,
    ) -> Result<()> {
        let size = self.size();
        check_vec_mask(mask, size)?;
        let prior = self.r.clone();
        let form = masked_vector(
            size,
            producer,
            prior,
            mask.map(|m| Arc::clone(&m.form)),
            accum.cloned(),
            desc,
            member,
        );
        self.r = VecRef::new(form);
        Ok(())
    }

    /// `w<mask> = accum(w, op(u))`.
    pub fn apply<U: Element>(
        &mut self,
        mask: Option<&VecMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        op: &UnaryOp<U, T>,
        u: &Vector<U>,
        desc: Descriptor,
    ) -> Result<()> {
        check_dim(u.size(), self.size())?;
        self.install(
            Arc::new(ApplyVec::new(op.clone(), u.r.clone())),
            mask,
            accum,
            desc,
            None,
        )
    }

    /// `w<mask> = accum(w, op(s, u))` with the scalar bound on the left.
    pub fn apply_bind_first<S: Element, U: Element>(
        &mut self,
        mask: Option<&VecMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        op: &BinaryOp<S, U, T>,
        s: &Scalar<S>,
        u: &Vector<U>,
        desc: Descriptor,
    ) -> Result<()> {
        check_dim(u.size(), self.size())?;
        self.install(
            Arc::new(BindVec::first(op.clone(), s.r.clone(), u.r.clone())),
            mask,
            accum,
            desc,
            None,
        )
    }

    /// `w<mask> = accum(w, op(u, s))` with the scalar bound on the right.
    pub fn apply_bind_second<U: Element, S: Element>(
        &mut self,
        mask: Option<&VecMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        op: &BinaryOp<U, S, T>,
        u: &Vector<U>,
        s: &Scalar<S>,
        desc: Descriptor,
    ) -> Result<()> {
        check_dim(u.size(), self.size())?;
        self.install(
            Arc::new(BindVec::second(op.clone(), s.r.clone(), u.r.clone())),
            mask,
            accum,
            desc,
            None,
        )
    }

    /// `w<mask> = accum(w, op(u, i, 0, s))`.
    pub fn apply_index<U: Element, S: Element>(
        &mut self,
        mask: Option<&VecMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        op: &IndexUnaryOp<U, S, T>,
        u: &Vector<U>,
        s: S,
        desc: Descriptor,
    ) -> Result<()> {
        check_dim(u.size(), self.size())?;
        self.install(
            Arc::new(ApplyIndexVec::new(op.clone(), s, u.r.clone())),
            mask,
            accum,
            desc,
            None,
        )
    }

    /// `w<mask> = accum(w, u where op(u, i, 0, s))`.
    pub fn select<S: Element>(
        &mut self,
        mask: Option<&VecMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        op: &IndexUnaryOp<T, S, bool>,
        u: &Vector<T>,
        s: S,
        desc: Descriptor,
    ) -> Result<()> {
        check_dim(u.size(), self.size())?;
        self.install(
            Arc::new(SelectVec::new(op.clone(), s, u.r.clone())),
            mask,
            accum,
            desc,
            None,
        )
    }

    /// `w<mask>(I) = accum(w(I), u)`.
    pub fn assign(
        &mut self,
        mask: Option<&VecMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        u: &Vector<T>,
        indices: &[Ix],
        desc: Descriptor,
    ) -> Result<()> {
        let size = self.size();
        let region = Region::parse(indices, size)?;
        check_dim(u.size(), region.len())?;
        check_vec_mask(mask, size)?;
        // A full-cover unmasked non-accumulating assign is the identity on
        // the source: adopt its reference outright.
        if mask.is_none() && accum.is_none() && region.is_all() && region.len() == size {
            self.r = u.r.clone();
            return Ok(());
        }
        let member = region_member(&region);
        self.install(
            Arc::new(AssignVec::new(size, u.r.clone(), region)),
            mask,
            accum,
            desc,
            Some(member),
        )
    }

    /// `w<mask>(I) = accum(w(I), value)`.
    pub fn assign_constant(
        &mut self,
        mask: Option<&VecMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        value: T,
        indices: &[Ix],
        desc: Descriptor,
    ) -> Result<()> {
        let size = self.size();
        let region = Region::parse(indices, size)?;
        let member = region_member(&region);
        self.install(
            Arc::new(AssignConstVec::new(size, region, Some(value))),
            mask,
            accum,
            desc,
            Some(member),
        )
    }

    /// `w<mask>(I) = accum(w(I), s)`; an empty scalar deletes the region.
    pub fn assign_scalar(
        &mut self,
        mask: Option<&VecMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        s: &Scalar<T>,
        indices: &[Ix],
        desc: Descriptor,
    ) -> Result<()> {
        let size = self.size();
        let region = Region::parse(indices, size)?;
        let member = region_member(&region);
        self.install(
            Arc::new(AssignScalarVec::new(size, region, s.r.clone())),
            mask,
            accum,
            desc,
            Some(member),
        )
    }

    /// `w<mask> = accum(w, u(I))`.
    pub fn extract(
        &mut self,
        mask: Option<&VecMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        u: &Vector<T>,
        indices: &[Ix],
        desc: Descriptor,
    ) -> Result<()> {
        let region = Region::parse(indices, u.size())?;
        check_dim(region.len(), self.size())?;
        self.install(
            Arc::new(ExtractVec::new(u.r.clone(), region)),
            mask,
            accum,
            desc,
            None,
        )
    }

    /// `w<mask> = accum(w, A(I, col))`.
    pub fn extract_col(
        &mut self,
        mask: Option<&VecMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        a: &Matrix<T>,
        rows: &[Ix],
        col: Ix,
        desc: Descriptor,
    ) -> Result<()> {
        let a_ref = resolve_mat(a, desc.transpose0);
        check_index(col, a_ref.ncols())?;
        let region = Region::parse(rows, a_ref.nrows())?;
        check_dim(region.len(), self.size())?;
        self.install(
            Arc::new(ExtractColVec::new(a_ref, region, col)),
            mask,
            accum,
            desc,
            None,
        )
    }

    /// `w<mask> = accum(w, u ⊕ v)`: union element-wise add.
    pub fn ewise_add(
        &mut self,
        mask: Option<&VecMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        op: &BinaryOp<T, T, T>,
        u: &Vector<T>,
        v: &Vector<T>,
        desc: Descriptor,
    ) -> Result<()> {
        check_dim(u.size(), self.size())?;
        check_dim(v.size(), self.size())?;
        self.install(
            Arc::new(EWiseAddVec::new(op.clone(), u.r.clone(), v.r.clone())),
            mask,
            accum,
            desc,
            None,
        )
    }

    /// `w<mask> = accum(w, u ⊗ v)`: intersection element-wise multiply.
    pub fn ewise_mult<A: Element, B: Element>(
        &mut self,
        mask: Option<&VecMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        op: &BinaryOp<A, B, T>,
        u: &Vector<A>,
        v: &Vector<B>,
        desc: Descriptor,
    ) -> Result<()> {
        check_dim(u.size(), self.size())?;
        check_dim(v.size(), self.size())?;
        self.install(
            Arc::new(EWiseMulVec::new(op.clone(), u.r.clone(), v.r.clone())),
            mask,
            accum,
            desc,
            None,
        )
    }

    /// `w<mask> = accum(w, A · u)` under a semiring.
    pub fn mxv<A: Element, B: Element>(
        &mut self,
        mask: Option<&VecMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        ring: &Semiring<A, B, T>,
        a: &Matrix<A>,
        u: &Vector<B>,
        desc: Descriptor,
    ) -> Result<()> {
        let a_ref = resolve_mat(a, desc.transpose0);
        check_dim(a_ref.ncols(), u.size())?;
        check_dim(a_ref.nrows(), self.size())?;
        self.install(
            Arc::new(MxVVec::new(a_ref, u.r.clone(), ring.clone())),
            mask,
            accum,
            desc,
            None,
        )
    }

    /// `w<mask> = accum(w, u · A)` under a semiring.
    pub fn vxm<A: Element, B: Element>(
        &mut self,
        mask: Option<&VecMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        ring: &Semiring<A, B, T>,
        u: &Vector<A>,
        a: &Matrix<B>,
        desc: Descriptor,
    ) -> Result<()> {
        let a_ref = resolve_mat(a, desc.transpose1);
        check_dim(a_ref.nrows(), u.size())?;
        check_dim(a_ref.ncols(), self.size())?;
        self.install(
            Arc::new(VxMVec::new(u.r.clone(), a_ref, ring.clone())),
            mask,
            accum,
            desc,
            None,
        )
    }

    /// `w<mask> = accum(w, ⊕ A(i, :))`: row-wise reduction of a matrix
    /// (column-wise under `transpose0`).
    pub fn reduce_rows(
        &mut self,
        mask: Option<&VecMask>,
        accum: Option<&BinaryOp<T, T, T>>,
        monoid: &Monoid<T>,
        a: &Matrix<T>,
        desc: Descriptor,
    ) -> Result<()> {
        let a_ref = resolve_mat(a, desc.transpose0);
        check_dim(a_ref.nrows(), self.size())?;
        self.install(
            Arc::new(RowReduceVec::new(a_ref, monoid.clone())),
            mask,
            accum,
            desc,
            None,
        )
    }
}

fn region_member(region: &Region) -> VecMemberFn {
    let region = region.clone();
    Arc::new(move |i| {
        if region.contains(i) {
            Member::Region
        } else {
            Member::Scope
        }
    })
}
