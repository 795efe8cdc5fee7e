//! Computed (deferred) representations and the mask/accum/descriptor
//! dispatch layer.
//!
//! Every operation builds a small *producer* — an unmasked, unaccumulated
//! representation of its raw result (one struct per operation family, in the
//! sub-modules) — and wraps it in [`MaskedVector`] / [`MaskedMatrix`]
//! together with the prior output reference, the mask, the accumulator, the
//! descriptor flags, and (for assigns) a membership classifier for the
//! target region. The wrapper builds its entry dispatcher once, at
//! construction: the mask predicate is chosen from the (present, structure,
//! complement) combination and the merge closure from the (accumulator,
//! assign, replace) combination, so the per-element path does no further
//! flag testing.
//!
//! Assign membership is three-valued. `Region` positions take the source
//! value under the usual mask rules; `Scope` positions (inside the updated
//! row/column/output but outside the index region) keep the prior value
//! unless `replace` is set and the mask does not admit them; `Outside`
//! positions (rows or columns a row/col-assign never names) keep the prior
//! value unconditionally.
//!
//! Streaming the wrapper runs the multi-source zipper merge: mask, prior
//! output, and producer streams aligned by key, with the mask driven as a
//! background pipeline behind a channel so that cancelling the consumer
//! cancels the mask pipeline explicitly.

pub mod apply;
pub mod assign;
pub mod ewise;
pub mod extract;
pub mod kron;
pub mod mxm;
pub mod reduce;
pub mod select;

use crate::descriptor::Descriptor;
use crate::error::Result;
use crate::form::matrix::resize_collect;
use crate::form::vector::SparseVector;
use crate::form::{BoxOuter, FnOuter, MatSource, MatrixForm, OuterSource, VecSource, VectorForm};
use crate::index::Ix;
use crate::ops::BinaryOp;
use crate::pipeline::zip::{MatZip, VecZip};
use crate::pipeline::{Pipeline, Source};
use crate::types::Element;
use std::sync::Arc;

/// Capacity of the background mask channel.
const MASK_CHANNEL: usize = 4;

/// Where an output position stands relative to an assign's target region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Member {
    /// Never named by the operation (other rows of a row-assign).
    Outside,
    /// Inside the updated surface but outside the index region.
    Scope,
    /// Inside the index region (and everywhere, for non-assign ops).
    Region,
}

pub(crate) type VecMemberFn = Arc<dyn Fn(Ix) -> Member + Send + Sync>;
pub(crate) type MatMemberFn = Arc<dyn Fn(Ix, Ix) -> Member + Send + Sync>;

type MaskFn = Arc<dyn Fn(bool, bool) -> bool + Send + Sync>;
type EntryFn<T> = Arc<dyn Fn(bool, bool, Option<T>, Option<T>, Member) -> Option<T> + Send + Sync>;

/// The flag combination a computed node was built under.
#[derive(Clone, Copy, Debug)]
struct Rule {
    replace: bool,
    has_mask: bool,
    has_accum: bool,
    is_assign: bool,
}

/// Choose the mask predicate for the given descriptor, once.
fn mask_fn(has_mask: bool, structure: bool, complement: bool) -> MaskFn {
    match (has_mask, structure, complement) {
        (false, _, _) => Arc::new(|_, _| true),
        (true, true, false) => Arc::new(|present, _| present),
        (true, true, true) => Arc::new(|present, _| !present),
        (true, false, false) => Arc::new(|present, value| present && value),
        (true, false, true) => Arc::new(|present, value| !(present && value)),
    }
}

/// Compose the per-entry merge function, once.
fn entry_fn<T: Element>(
    rule: Rule,
    allows: MaskFn,
    accum: Option<BinaryOp<T, T, T>>,
) -> EntryFn<T> {
    Arc::new(move |mp, mv, prior, t, member| {
        match member {
            Member::Outside => return prior,
            Member::Scope => {
                // Partial update: the prior value survives here unless
                // replace clears unmasked positions.
                return if rule.replace && !allows(mp, mv) {
                    None
                } else {
                    prior
                };
            }
            Member::Region => {}
        }
        if !allows(mp, mv) {
            return if rule.replace { None } else { prior };
        }
        match (&accum, prior, t) {
            (Some(op), Some(c), Some(t)) => Some(op.apply(&c, &t)),
            (Some(_), Some(c), None) => Some(c),
            (Some(_), None, t) => t,
            (None, _, t) => t,
        }
    })
}

fn mask_source<B: Send + 'static>(
    src: crate::pipeline::BoxSource<B>,
) -> crate::pipeline::BoxSource<B> {
    Box::new(Pipeline::from_boxed(src).into_source(MASK_CHANNEL))
}

/* ===================== vector wrapper ===================== */

/// A deferred vector operation with its mask/accum/descriptor semantics
/// baked in.
pub(crate) struct MaskedVector<T: Element> {
    size: Ix,
    producer: Arc<dyn VectorForm<T>>,
    prior: crate::reference::VecRef<T>,
    mask: Option<Arc<dyn VectorForm<bool>>>,
    rule: Rule,
    entry: EntryFn<T>,
    member: Option<VecMemberFn>,
}

/// Wrap `producer` with the full output semantics; collapses to the bare
/// producer when no mask, accumulator, or assign region is in play.
pub(crate) fn masked_vector<T: Element>(
    size: Ix,
    producer: Arc<dyn VectorForm<T>>,
    prior: crate::reference::VecRef<T>,
    mask: Option<Arc<dyn VectorForm<bool>>>,
    accum: Option<BinaryOp<T, T, T>>,
    desc: Descriptor,
    member: Option<VecMemberFn>,
) -> Arc<dyn VectorForm<T>> {
    if mask.is_none() && accum.is_none() && member.is_none() {
        return producer;
    }
    let rule = Rule {
        replace: desc.replace,
        has_mask: mask.is_some(),
        has_accum: accum.is_some(),
        is_assign: member.is_some(),
    };
    let allows = mask_fn(rule.has_mask, desc.structure, desc.complement);
    let entry = entry_fn(rule, allows, accum);
    Arc::new(MaskedVector {
        size,
        producer,
        prior,
        mask,
        rule,
        entry,
        member,
    })
}

impl<T: Element> MaskedVector<T> {
    fn prior_needed(&self) -> bool {
        self.rule.is_assign || !self.rule.replace || self.rule.has_accum
    }

    fn member_at(&self, i: Ix) -> Member {
        self.member.as_ref().map_or(Member::Region, |f| f(i))
    }
}

impl<T: Element> VectorForm<T> for MaskedVector<T> {
    fn size(&self) -> Ix {
        self.size
    }

    fn get(&self, i: Ix) -> Result<Option<T>> {
        let (mp, mv) = match &self.mask {
            None => (false, false),
            Some(m) => match m.get(i)? {
                None => (false, false),
                Some(v) => (true, v),
            },
        };
        let prior = if self.prior_needed() {
            self.prior.get(i)?
        } else {
            None
        };
        let t = self.producer.get(i)?;
        Ok((self.entry)(mp, mv, prior, t, self.member_at(i)))
    }

    fn stream(&self) -> Result<VecSource<T>> {
        let mask_src = match &self.mask {
            None => None,
            Some(m) => Some(mask_source(m.stream()?)),
        };
        let prior_src = if self.prior_needed() {
            Some(self.prior.stream()?)
        } else {
            None
        };
        let entry = Arc::clone(&self.entry);
        let member = self.member.clone();
        let zip = VecZip::new(
            mask_src,
            prior_src,
            Some(self.producer.stream()?),
            move |i, m: Option<&bool>, p: Option<&T>, t: Option<&T>| {
                let at = member.as_ref().map_or(Member::Region, |f| f(i));
                Ok(entry(
                    m.is_some(),
                    m.copied().unwrap_or(false),
                    p.cloned(),
                    t.cloned(),
                    at,
                ))
            },
        );
        Ok(Box::new(zip))
    }

    fn resized(&self, n: Ix) -> Result<Arc<dyn VectorForm<T>>> {
        // Computed nodes materialize before resizing.
        let sv = SparseVector::collect(self.size, self.stream()?)?;
        sv.resized(n)
    }
}

/* ===================== matrix wrapper ===================== */

/// A deferred matrix operation with its output semantics baked in.
pub(crate) struct MaskedMatrix<T: Element> {
    nr: Ix,
    nc: Ix,
    producer: Arc<dyn MatrixForm<T>>,
    prior: crate::reference::MatRef<T>,
    mask: Option<Arc<dyn MatrixForm<bool>>>,
    rule: Rule,
    entry: EntryFn<T>,
    member: Option<MatMemberFn>,
}

impl<T: Element> Clone for MaskedMatrix<T> {
    fn clone(&self) -> Self {
        MaskedMatrix {
            nr: self.nr,
            nc: self.nc,
            producer: Arc::clone(&self.producer),
            prior: self.prior.clone(),
            mask: self.mask.clone(),
            rule: self.rule,
            entry: Arc::clone(&self.entry),
            member: self.member.clone(),
        }
    }
}

/// Wrap `producer` with the full output semantics; collapses to the bare
/// producer when nothing modifies it.
pub(crate) fn masked_matrix<T: Element>(
    nr: Ix,
    nc: Ix,
    producer: Arc<dyn MatrixForm<T>>,
    prior: crate::reference::MatRef<T>,
    mask: Option<Arc<dyn MatrixForm<bool>>>,
    accum: Option<BinaryOp<T, T, T>>,
    desc: Descriptor,
    member: Option<MatMemberFn>,
) -> Arc<dyn MatrixForm<T>> {
    if mask.is_none() && accum.is_none() && member.is_none() {
        return producer;
    }
    let rule = Rule {
        replace: desc.replace,
        has_mask: mask.is_some(),
        has_accum: accum.is_some(),
        is_assign: member.is_some(),
    };
    let allows = mask_fn(rule.has_mask, desc.structure, desc.complement);
    let entry = entry_fn(rule, allows, accum);
    Arc::new(MaskedMatrix {
        nr,
        nc,
        producer,
        prior,
        mask,
        rule,
        entry,
        member,
    })
}

impl<T: Element> MaskedMatrix<T> {
    fn prior_needed(&self) -> bool {
        self.rule.is_assign || !self.rule.replace || self.rule.has_accum
    }

    fn member_at(&self, r: Ix, c: Ix) -> Member {
        self.member.as_ref().map_or(Member::Region, |f| f(r, c))
    }

    fn zip_row(&self, r: Ix) -> Result<VecSource<T>> {
        let mask_src = match &self.mask {
            None => None,
            Some(m) => Some(m.row(r)?),
        };
        let prior_src = if self.prior_needed() {
            Some(self.prior.form().row(r)?)
        } else {
            None
        };
        let entry = Arc::clone(&self.entry);
        let member = self.member.clone();
        let zip = VecZip::new(
            mask_src,
            prior_src,
            Some(self.producer.row(r)?),
            move |c, m: Option<&bool>, p: Option<&T>, t: Option<&T>| {
                let at = member.as_ref().map_or(Member::Region, |f| f(r, c));
                Ok(entry(
                    m.is_some(),
                    m.copied().unwrap_or(false),
                    p.cloned(),
                    t.cloned(),
                    at,
                ))
            },
        );
        Ok(Box::new(zip))
    }

    fn zip_col(&self, c: Ix) -> Result<VecSource<T>> {
        let mask_src = match &self.mask {
            None => None,
            Some(m) => Some(m.col(c)?),
        };
        let prior_src = if self.prior_needed() {
            Some(self.prior.form().col(c)?)
        } else {
            None
        };
        let entry = Arc::clone(&self.entry);
        let member = self.member.clone();
        let zip = VecZip::new(
            mask_src,
            prior_src,
            Some(self.producer.col(c)?),
            move |r, m: Option<&bool>, p: Option<&T>, t: Option<&T>| {
                let at = member.as_ref().map_or(Member::Region, |f| f(r, c));
                Ok(entry(
                    m.is_some(),
                    m.copied().unwrap_or(false),
                    p.cloned(),
                    t.cloned(),
                    at,
                ))
            },
        );
        Ok(Box::new(zip))
    }
}

impl<T: Element> MatrixForm<T> for MaskedMatrix<T> {
    fn nrows(&self) -> Ix {
        self.nr
    }

    fn ncols(&self) -> Ix {
        self.nc
    }

    fn get(&self, r: Ix, c: Ix) -> Result<Option<T>> {
        let (mp, mv) = match &self.mask {
            None => (false, false),
            Some(m) => match m.get(r, c)? {
                None => (false, false),
                Some(v) => (true, v),
            },
        };
        let prior = if self.prior_needed() {
            self.prior.get(r, c)?
        } else {
            None
        };
        let t = self.producer.get(r, c)?;
        Ok((self.entry)(mp, mv, prior, t, self.member_at(r, c)))
    }

    fn stream(&self) -> Result<MatSource<T>> {
        let mask_src = match &self.mask {
            None => None,
            Some(m) => Some(mask_source(m.stream()?)),
        };
        let prior_src = if self.prior_needed() {
            Some(self.prior.form().stream()?)
        } else {
            None
        };
        let entry = Arc::clone(&self.entry);
        let member = self.member.clone();
        let zip = MatZip::new(
            mask_src,
            prior_src,
            Some(self.producer.stream()?),
            move |r, c, m: Option<&bool>, p: Option<&T>, t: Option<&T>| {
                let at = member.as_ref().map_or(Member::Region, |f| f(r, c));
                Ok(entry(
                    m.is_some(),
                    m.copied().unwrap_or(false),
                    p.cloned(),
                    t.cloned(),
                    at,
                ))
            },
        );
        Ok(Box::new(zip))
    }

    fn row(&self, r: Ix) -> Result<VecSource<T>> {
        self.zip_row(r)
    }

    fn col(&self, c: Ix) -> Result<VecSource<T>> {
        self.zip_col(c)
    }

    fn rows(&self) -> Result<BoxOuter<T>> {
        // Output rows can only appear where the producer or a surviving
        // prior row has entries; the mask is consulted per key.
        let producer_rows = self.producer.rows()?;
        let prior_rows = if self.prior_needed() {
            Some(self.prior.form().rows()?)
        } else {
            None
        };
        let node = self.clone();
        Ok(merged_keys(producer_rows, prior_rows, move |k| {
            node.zip_row(k)
        }))
    }

    fn cols(&self) -> Result<BoxOuter<T>> {
        let producer_cols = self.producer.cols()?;
        let prior_cols = if self.prior_needed() {
            Some(self.prior.form().cols()?)
        } else {
            None
        };
        let node = self.clone();
        Ok(merged_keys(producer_cols, prior_cols, move |k| {
            node.zip_col(k)
        }))
    }

    fn resized(&self, nr: Ix, nc: Ix) -> Result<Arc<dyn MatrixForm<T>>> {
        resize_collect(self.stream()?, nr, nc)
    }
}

/// Merge the key sets of up to two outer streams, rebuilding each merged
/// 1-D pipeline through `make`.
pub(crate) fn merged_keys<T: Element>(
    a: BoxOuter<T>,
    b: Option<BoxOuter<T>>,
    make: impl Fn(Ix) -> Result<VecSource<T>> + Send + 'static,
) -> BoxOuter<T> {
    let mut a = a;
    let mut b = b;
    let mut held_a: Option<Ix> = None;
    let mut held_b: Option<Ix> = None;
    let mut a_done = false;
    let mut b_done = b.is_none();
    Box::new(FnOuter::new(move || {
        if held_a.is_none() && !a_done {
            match a.next()? {
                Some((k, _)) => held_a = Some(k),
                None => a_done = true,
            }
        }
        if held_b.is_none() && !b_done {
            match b.as_mut().expect("outer present").next()? {
                Some((k, _)) => held_b = Some(k),
                None => b_done = true,
            }
        }
        let k = match (held_a, held_b) {
            (None, None) => return Ok(None),
            (Some(ka), None) => {
                held_a = None;
                ka
            }
            (None, Some(kb)) => {
                held_b = None;
                kb
            }
            (Some(ka), Some(kb)) => {
                if ka <= kb {
                    held_a = None;
                    if ka == kb {
                        held_b = None;
                    }
                    ka
                } else {
                    held_b = None;
                    kb
                }
            }
        };
        Ok(Some((k, make(k)?)))
    }))
}

/// Drain a 1-D stream into memory (dot products replay one side repeatedly).
pub(crate) fn materialize_vec<T: Element>(mut src: VecSource<T>) -> Result<Vec<(Ix, T)>> {
    let mut out = Vec::new();
    while let Some(b) = src.fetch(crate::pipeline::DEFAULT_BATCH)? {
        for (p, &i) in b.indices().iter().enumerate() {
            out.push((i, b.values()[p].clone()));
        }
    }
    Ok(out)
}

/// A pair of outer streams walked in key order, yielding per key whichever
/// sides have that key.
pub(crate) struct OuterPair<A: Element, B: Element> {
    a: BoxOuter<A>,
    b: BoxOuter<B>,
    held_a: Option<(Ix, VecSource<A>)>,
    held_b: Option<(Ix, VecSource<B>)>,
    a_done: bool,
    b_done: bool,
}

impl<A: Element, B: Element> OuterPair<A, B> {
    /// Walk two outer streams together.
    pub fn new(a: BoxOuter<A>, b: BoxOuter<B>) -> Self {
        OuterPair {
            a,
            b,
            held_a: None,
            held_b: None,
            a_done: false,
            b_done: false,
        }
    }

    /// The next key present on either side, with the sides that carry it.
    #[allow(clippy::type_complexity)]
    pub fn next(&mut self) -> Result<Option<(Ix, Option<VecSource<A>>, Option<VecSource<B>>)>> {
        if self.held_a.is_none() && !self.a_done {
            match self.a.next()? {
                Some(p) => self.held_a = Some(p),
                None => self.a_done = true,
            }
        }
        if self.held_b.is_none() && !self.b_done {
            match self.b.next()? {
                Some(p) => self.held_b = Some(p),
                None => self.b_done = true,
            }
        }
        let ka = self.held_a.as_ref().map(|(k, _)| *k);
        let kb = self.held_b.as_ref().map(|(k, _)| *k);
        match (ka, kb) {
            (None, None) => Ok(None),
            (Some(k), None) => {
                let (_, src) = self.held_a.take().expect("held");
                Ok(Some((k, Some(src), None)))
            }
            (None, Some(k)) => {
                let (_, src) = self.held_b.take().expect("held");
                Ok(Some((k, None, Some(src))))
            }
            (Some(ka), Some(kb)) => {
                if ka < kb {
                    let (_, src) = self.held_a.take().expect("held");
                    Ok(Some((ka, Some(src), None)))
                } else if kb < ka {
                    let (_, src) = self.held_b.take().expect("held");
                    Ok(Some((kb, None, Some(src))))
                } else {
                    let (_, sa) = self.held_a.take().expect("held");
                    let (_, sb) = self.held_b.take().expect("held");
                    Ok(Some((ka, Some(sa), Some(sb))))
                }
            }
        }
    }
}
