//! Collect and reduce terminals over slice pipelines.
//!
//! `collect_*` concurrently writes each staged batch into a slot of a
//! growable [`ParallelArray`], then sums the lengths, allocates one
//! contiguous destination, and consumes the slots in sequence order. The
//! `*_sorted` variants re-order by key afterwards with a stable parallel
//! sort; remapping producers (assign/extract with unsorted index lists) rely
//! on them.
//!
//! `reduce_*` folds each batch's values under an associative operator in a
//! parallel stage, parking the per-batch residual in its slot, then folds
//! the residuals in batch order. An empty stream reduces to `None`.

use crate::bitset::ParallelArray;
use crate::error::Result;
use crate::index::Ix;
use crate::ops::BinaryOp;
use crate::pipeline::{BoxSource, Pipeline};
use crate::slice::{MatSlice, VecSlice};
use crate::types::Element;
use log::debug;
use rayon::prelude::*;
use std::sync::Arc;

/// Collect a vector stream into contiguous index/value arrays.
pub(crate) fn collect_vec<T: Element>(src: BoxSource<VecSlice<T>>) -> Result<(Vec<Ix>, Vec<T>)> {
    let slots = Arc::new(ParallelArray::<VecSlice<T>>::new());
    let store = Arc::clone(&slots);
    Pipeline::from_boxed(src)
        .stage(move |seq, b: VecSlice<T>| {
            store.set(seq as usize, b);
            Ok(VecSlice::empty())
        })
        .run()?;
    let slots = Arc::try_unwrap(slots)
        .ok()
        .expect("collect scratch uniquely owned after run");
    let batches: Vec<VecSlice<T>> = slots.drain().collect();
    let total: usize = batches.iter().map(VecSlice::len).sum();
    debug!("collect: {} entries in {} batches", total, batches.len());
    let mut idx = Vec::with_capacity(total);
    let mut val = Vec::with_capacity(total);
    for b in batches {
        idx.extend_from_slice(b.indices());
        val.extend_from_slice(b.values());
    }
    Ok((idx, val))
}

/// Collect and then re-sort by index (stable), for producers whose remap is
/// not monotone.
pub(crate) fn collect_vec_sorted<T: Element>(
    src: BoxSource<VecSlice<T>>,
) -> Result<(Vec<Ix>, Vec<T>)> {
    let (idx, val) = collect_vec(src)?;
    let mut pairs: Vec<(Ix, T)> = idx.into_iter().zip(val).collect();
    pairs.par_sort_by_key(|&(i, _)| i);
    Ok(pairs.into_iter().unzip())
}

/// Collect a matrix stream into contiguous row/col/value arrays.
pub(crate) fn collect_mat<T: Element>(
    src: BoxSource<MatSlice<T>>,
) -> Result<(Vec<Ix>, Vec<Ix>, Vec<T>)> {
    let slots = Arc::new(ParallelArray::<MatSlice<T>>::new());
    let store = Arc::clone(&slots);
    Pipeline::from_boxed(src)
        .stage(move |seq, b: MatSlice<T>| {
            store.set(seq as usize, b);
            Ok(MatSlice::empty())
        })
        .run()?;
    let slots = Arc::try_unwrap(slots)
        .ok()
        .expect("collect scratch uniquely owned after run");
    let batches: Vec<MatSlice<T>> = slots.drain().collect();
    let total: usize = batches.iter().map(MatSlice::len).sum();
    debug!("collect: {} entries in {} batches", total, batches.len());
    let mut row = Vec::with_capacity(total);
    let mut col = Vec::with_capacity(total);
    let mut val = Vec::with_capacity(total);
    for b in batches {
        row.extend_from_slice(b.rows());
        col.extend_from_slice(b.cols());
        val.extend_from_slice(b.values());
    }
    Ok((row, col, val))
}

/// Collect and re-sort lexicographically by (row, col).
pub(crate) fn collect_mat_sorted<T: Element>(
    src: BoxSource<MatSlice<T>>,
) -> Result<(Vec<Ix>, Vec<Ix>, Vec<T>)> {
    let (row, col, val) = collect_mat(src)?;
    let mut triples: Vec<(Ix, Ix, T)> = row
        .into_iter()
        .zip(col)
        .zip(val)
        .map(|((r, c), v)| (r, c, v))
        .collect();
    triples.par_sort_by_key(|&(r, c, _)| (r, c));
    let mut row = Vec::with_capacity(triples.len());
    let mut col = Vec::with_capacity(triples.len());
    let mut val = Vec::with_capacity(triples.len());
    for (r, c, v) in triples {
        row.push(r);
        col.push(c);
        val.push(v);
    }
    Ok((row, col, val))
}

fn fold_residuals<T: Element>(parts: impl Iterator<Item = T>, op: &BinaryOp<T, T, T>) -> Option<T> {
    let mut acc: Option<T> = None;
    for part in parts {
        acc = Some(match acc {
            None => part,
            Some(a) => op.apply(&a, &part),
        });
    }
    acc
}

/// Reduce a vector stream's values under an associative operator.
///
/// `None` means the stream had no entries.
pub(crate) fn reduce_vec<T: Element>(
    src: BoxSource<VecSlice<T>>,
    op: &BinaryOp<T, T, T>,
) -> Result<Option<T>> {
    let slots = Arc::new(ParallelArray::<T>::new());
    let store = Arc::clone(&slots);
    let batch_op = op.clone();
    Pipeline::from_boxed(src)
        .stage(move |seq, b: VecSlice<T>| {
            if let Some(part) = fold_residuals(b.values().iter().cloned(), &batch_op) {
                store.set(seq as usize, part);
            }
            Ok(VecSlice::empty())
        })
        .run()?;
    let slots = Arc::try_unwrap(slots)
        .ok()
        .expect("reduce scratch uniquely owned after run");
    Ok(fold_residuals(slots.drain(), op))
}

/// Reduce a matrix stream's values under an associative operator.
pub(crate) fn reduce_mat<T: Element>(
    src: BoxSource<MatSlice<T>>,
    op: &BinaryOp<T, T, T>,
) -> Result<Option<T>> {
    let slots = Arc::new(ParallelArray::<T>::new());
    let store = Arc::clone(&slots);
    let batch_op = op.clone();
    Pipeline::from_boxed(src)
        .stage(move |seq, b: MatSlice<T>| {
            if let Some(part) = fold_residuals(b.values().iter().cloned(), &batch_op) {
                store.set(seq as usize, part);
            }
            Ok(MatSlice::empty())
        })
        .run()?;
    let slots = Arc::try_unwrap(slots)
        .ok()
        .expect("reduce scratch uniquely owned after run");
    Ok(fold_residuals(slots.drain(), op))
}

/// Count the entries of a vector stream.
pub(crate) fn count_vec<T: Element>(src: BoxSource<VecSlice<T>>) -> Result<Ix> {
    let slots = Arc::new(ParallelArray::<usize>::new());
    let store = Arc::clone(&slots);
    Pipeline::from_boxed(src)
        .stage(move |seq, b: VecSlice<T>| {
            store.set(seq as usize, b.len());
            Ok(VecSlice::empty())
        })
        .run()?;
    let slots = Arc::try_unwrap(slots)
        .ok()
        .expect("count scratch uniquely owned after run");
    Ok(slots.drain().sum::<usize>() as Ix)
}

/// Count the entries of a matrix stream.
pub(crate) fn count_mat<T: Element>(src: BoxSource<MatSlice<T>>) -> Result<Ix> {
    let slots = Arc::new(ParallelArray::<usize>::new());
    let store = Arc::clone(&slots);
    Pipeline::from_boxed(src)
        .stage(move |seq, b: MatSlice<T>| {
            store.set(seq as usize, b.len());
            Ok(MatSlice::empty())
        })
        .run()?;
    let slots = Arc::try_unwrap(slots)
        .ok()
        .expect("count scratch uniquely owned after run");
    Ok(slots.drain().sum::<usize>() as Ix)
}
