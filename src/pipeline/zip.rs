//! Zipper-style multi-source merges driven by key ordering.
//!
//! A zip holds up to three input streams (mask, left, right), keeps a current
//! batch per input, and on each demand computes the common *stop key* — the
//! minimum over the inputs' last keys, plus one — splits each current batch
//! into an aligned head and a retained tail, and walks the heads with one
//! cursor per input, calling the entry processor at each distinct key with
//! the contributions present there. Tails stay current for the next demand,
//! so no input ever runs ahead of the window.
//!
//! The vector zip keys on the entry index; the matrix zip keys on the
//! lexicographic (row, col) pair and finds split points by binary search over
//! the parallel coordinate arrays.
//!
//! Mask inputs are typically [`ChannelSource`](crate::pipeline::ChannelSource)s
//! running the mask's own pipeline in the background; dropping the zip drops
//! that source, which cancels the mask pipeline explicitly.

use crate::error::Result;
use crate::index::Ix;
use crate::pipeline::{BoxSource, Source};
use crate::slice::{MatSlice, VecSlice};
use crate::types::Element;

struct Feed<T> {
    src: BoxSource<VecSlice<T>>,
    cur: Option<VecSlice<T>>,
    done: bool,
}

impl<T: Element> Feed<T> {
    fn new(src: BoxSource<VecSlice<T>>) -> Self {
        Feed {
            src,
            cur: None,
            done: false,
        }
    }

    fn refill(&mut self, size: usize) -> Result<()> {
        while !self.done && self.cur.as_ref().is_none_or(|c| c.is_empty()) {
            match self.src.fetch(size)? {
                Some(b) => self.cur = Some(b),
                None => {
                    self.done = true;
                    self.cur = None;
                }
            }
        }
        Ok(())
    }

    fn last_key(&self) -> Option<Ix> {
        self.cur.as_ref().and_then(VecSlice::last_key)
    }

    fn take_head(&mut self, stop: Ix) -> VecSlice<T> {
        match self.cur.take() {
            None => VecSlice::empty(),
            Some(c) => {
                let (head, tail) = c.split_key(stop);
                self.cur = (!tail.is_empty()).then_some(tail);
                head
            }
        }
    }
}

/// Three-way vector merge; the entry processor sees, per distinct key, which
/// of {mask, left, right} contributed and with what value.
pub struct VecZip<M, A, B, C, F>
where
    M: Element,
    A: Element,
    B: Element,
    C: Element,
    F: FnMut(Ix, Option<&M>, Option<&A>, Option<&B>) -> Result<Option<C>> + Send,
{
    mask: Option<Feed<M>>,
    left: Option<Feed<A>>,
    right: Option<Feed<B>>,
    f: F,
}

impl<M, A, B, C, F> VecZip<M, A, B, C, F>
where
    M: Element,
    A: Element,
    B: Element,
    C: Element,
    F: FnMut(Ix, Option<&M>, Option<&A>, Option<&B>) -> Result<Option<C>> + Send,
{
    /// Build a merge over up to three inputs.
    pub fn new(
        mask: Option<BoxSource<VecSlice<M>>>,
        left: Option<BoxSource<VecSlice<A>>>,
        right: Option<BoxSource<VecSlice<B>>>,
        f: F,
    ) -> Self {
        VecZip {
            mask: mask.map(Feed::new),
            left: left.map(Feed::new),
            right: right.map(Feed::new),
            f,
        }
    }
}

impl<M, A, B, C, F> Source for VecZip<M, A, B, C, F>
where
    M: Element,
    A: Element,
    B: Element,
    C: Element,
    F: FnMut(Ix, Option<&M>, Option<&A>, Option<&B>) -> Result<Option<C>> + Send,
{
    type Batch = VecSlice<C>;

    fn fetch(&mut self, size: usize) -> Result<Option<VecSlice<C>>> {
        loop {
            if let Some(m) = self.mask.as_mut() {
                m.refill(size)?;
            }
            if let Some(a) = self.left.as_mut() {
                a.refill(size)?;
            }
            if let Some(b) = self.right.as_mut() {
                b.refill(size)?;
            }

            let stop = [
                self.mask.as_ref().and_then(Feed::last_key),
                self.left.as_ref().and_then(Feed::last_key),
                self.right.as_ref().and_then(Feed::last_key),
            ]
            .into_iter()
            .flatten()
            .min();
            let Some(stop) = stop else {
                return Ok(None); // every input exhausted
            };
            let stop = stop + 1;

            let hm = self.mask.as_mut().map(|m| m.take_head(stop));
            let ha = self.left.as_mut().map(|a| a.take_head(stop));
            let hb = self.right.as_mut().map(|b| b.take_head(stop));
            let empty_m = VecSlice::<M>::empty();
            let empty_a = VecSlice::<A>::empty();
            let empty_b = VecSlice::<B>::empty();
            let hm = hm.as_ref().unwrap_or(&empty_m);
            let ha = ha.as_ref().unwrap_or(&empty_a);
            let hb = hb.as_ref().unwrap_or(&empty_b);

            let mut out_idx = Vec::new();
            let mut out_val = Vec::new();
            let (mut pm, mut pa, mut pb) = (0usize, 0usize, 0usize);
            loop {
                let km = hm.indices().get(pm).copied();
                let ka = ha.indices().get(pa).copied();
                let kb = hb.indices().get(pb).copied();
                let Some(k) = [km, ka, kb].into_iter().flatten().min() else {
                    break;
                };
                let vm = (km == Some(k)).then(|| {
                    pm += 1;
                    &hm.values()[pm - 1]
                });
                let va = (ka == Some(k)).then(|| {
                    pa += 1;
                    &ha.values()[pa - 1]
                });
                let vb = (kb == Some(k)).then(|| {
                    pb += 1;
                    &hb.values()[pb - 1]
                });
                if let Some(v) = (self.f)(k, vm, va, vb)? {
                    out_idx.push(k);
                    out_val.push(v);
                }
            }

            if !out_idx.is_empty() {
                return Ok(Some(VecSlice::new(out_idx, out_val)));
            }
            // Window produced nothing; advance to the next one.
        }
    }
}

/* ===================== matrix merge ===================== */

struct MatFeed<T> {
    src: BoxSource<MatSlice<T>>,
    cur: Option<MatSlice<T>>,
    done: bool,
}

impl<T: Element> MatFeed<T> {
    fn new(src: BoxSource<MatSlice<T>>) -> Self {
        MatFeed {
            src,
            cur: None,
            done: false,
        }
    }

    fn refill(&mut self, size: usize) -> Result<()> {
        while !self.done && self.cur.as_ref().is_none_or(|c| c.is_empty()) {
            match self.src.fetch(size)? {
                Some(b) => self.cur = Some(b),
                None => {
                    self.done = true;
                    self.cur = None;
                }
            }
        }
        Ok(())
    }

    fn last_key(&self) -> Option<(Ix, Ix)> {
        self.cur.as_ref().and_then(MatSlice::last_key)
    }

    fn take_head(&mut self, stop: (Ix, Ix)) -> MatSlice<T> {
        match self.cur.take() {
            None => MatSlice::empty(),
            Some(c) => {
                let (head, tail) = c.split_key(stop);
                self.cur = (!tail.is_empty()).then_some(tail);
                head
            }
        }
    }
}

/// Three-way matrix merge keyed on lexicographic (row, col).
pub struct MatZip<M, A, B, C, F>
where
    M: Element,
    A: Element,
    B: Element,
    C: Element,
    F: FnMut(Ix, Ix, Option<&M>, Option<&A>, Option<&B>) -> Result<Option<C>> + Send,
{
    mask: Option<MatFeed<M>>,
    left: Option<MatFeed<A>>,
    right: Option<MatFeed<B>>,
    f: F,
}

impl<M, A, B, C, F> MatZip<M, A, B, C, F>
where
    M: Element,
    A: Element,
    B: Element,
    C: Element,
    F: FnMut(Ix, Ix, Option<&M>, Option<&A>, Option<&B>) -> Result<Option<C>> + Send,
{
    /// Build a merge over up to three inputs.
    pub fn new(
        mask: Option<BoxSource<MatSlice<M>>>,
        left: Option<BoxSource<MatSlice<A>>>,
        right: Option<BoxSource<MatSlice<B>>>,
        f: F,
    ) -> Self {
        MatZip {
            mask: mask.map(MatFeed::new),
            left: left.map(MatFeed::new),
            right: right.map(MatFeed::new),
            f,
        }
    }
}

impl<M, A, B, C, F> Source for MatZip<M, A, B, C, F>
where
    M: Element,
    A: Element,
    B: Element,
    C: Element,
    F: FnMut(Ix, Ix, Option<&M>, Option<&A>, Option<&B>) -> Result<Option<C>> + Send,
{
    type Batch = MatSlice<C>;

    fn fetch(&mut self, size: usize) -> Result<Option<MatSlice<C>>> {
        loop {
            if let Some(m) = self.mask.as_mut() {
                m.refill(size)?;
            }
            if let Some(a) = self.left.as_mut() {
                a.refill(size)?;
            }
            if let Some(b) = self.right.as_mut() {
                b.refill(size)?;
            }

            let stop = [
                self.mask.as_ref().and_then(MatFeed::last_key),
                self.left.as_ref().and_then(MatFeed::last_key),
                self.right.as_ref().and_then(MatFeed::last_key),
            ]
            .into_iter()
            .flatten()
            .min();
            let Some((sr, sc)) = stop else {
                return Ok(None);
            };
            let stop = (sr, sc + 1); // lexicographic successor

            let hm = self.mask.as_mut().map(|m| m.take_head(stop));
            let ha = self.left.as_mut().map(|a| a.take_head(stop));
            let hb = self.right.as_mut().map(|b| b.take_head(stop));
            let empty_m = MatSlice::<M>::empty();
            let empty_a = MatSlice::<A>::empty();
            let empty_b = MatSlice::<B>::empty();
            let hm = hm.as_ref().unwrap_or(&empty_m);
            let ha = ha.as_ref().unwrap_or(&empty_a);
            let hb = hb.as_ref().unwrap_or(&empty_b);

            let mut out_row = Vec::new();
            let mut out_col = Vec::new();
            let mut out_val = Vec::new();
            let (mut pm, mut pa, mut pb) = (0usize, 0usize, 0usize);
            loop {
                let km = (pm < hm.len()).then(|| hm.key(pm));
                let ka = (pa < ha.len()).then(|| ha.key(pa));
                let kb = (pb < hb.len()).then(|| hb.key(pb));
                let Some(k) = [km, ka, kb].into_iter().flatten().min() else {
                    break;
                };
                let vm = (km == Some(k)).then(|| {
                    pm += 1;
                    &hm.values()[pm - 1]
                });
                let va = (ka == Some(k)).then(|| {
                    pa += 1;
                    &ha.values()[pa - 1]
                });
                let vb = (kb == Some(k)).then(|| {
                    pb += 1;
                    &hb.values()[pb - 1]
                });
                if let Some(v) = (self.f)(k.0, k.1, vm, va, vb)? {
                    out_row.push(k.0);
                    out_col.push(k.1);
                    out_val.push(v);
                }
            }

            if !out_row.is_empty() {
                return Ok(Some(MatSlice::new(out_row, out_col, out_val)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::BatchVecSource;

    fn vsrc(entries: Vec<(Ix, i64)>) -> BoxSource<VecSlice<i64>> {
        let (idx, val): (Vec<_>, Vec<_>) = entries.into_iter().unzip();
        Box::new(BatchVecSource::new(vec![VecSlice::new(idx, val)]))
    }

    #[test]
    fn two_way_union_merge() -> Result<()> {
        let a = vsrc(vec![(0, 1), (2, 2), (5, 3)]);
        let b = vsrc(vec![(2, 10), (3, 20)]);
        let mut zip = VecZip::new(
            None::<BoxSource<VecSlice<bool>>>,
            Some(a),
            Some(b),
            |_, _m: Option<&bool>, x: Option<&i64>, y: Option<&i64>| {
                Ok(Some(x.copied().unwrap_or(0) + y.copied().unwrap_or(0)))
            },
        );
        let mut got = Vec::new();
        while let Some(s) = zip.fetch(4)? {
            got.extend(s.indices().iter().copied().zip(s.values().iter().copied()));
        }
        assert_eq!(got, vec![(0, 1), (2, 12), (3, 20), (5, 3)]);
        Ok(())
    }

    #[test]
    fn windows_align_across_batches() -> Result<()> {
        let a: BoxSource<VecSlice<i64>> = Box::new(BatchVecSource::new(vec![
            VecSlice::new(vec![0, 1], vec![1, 1]),
            VecSlice::new(vec![8, 9], vec![1, 1]),
        ]));
        let b: BoxSource<VecSlice<i64>> = Box::new(BatchVecSource::new(vec![VecSlice::new(
            vec![1, 8],
            vec![5, 5],
        )]));
        let mut zip = VecZip::new(
            None::<BoxSource<VecSlice<bool>>>,
            Some(a),
            Some(b),
            |_, _m: Option<&bool>, x: Option<&i64>, y: Option<&i64>| {
                Ok((x.is_some() && y.is_some()).then(|| x.unwrap() + y.unwrap()))
            },
        );
        let mut got = Vec::new();
        while let Some(s) = zip.fetch(16)? {
            got.extend(s.indices().iter().copied().zip(s.values().iter().copied()));
        }
        assert_eq!(got, vec![(1, 6), (8, 6)]);
        Ok(())
    }

    #[test]
    fn matrix_merge_is_lexicographic() -> Result<()> {
        let a: BoxSource<MatSlice<i64>> = Box::new(BatchVecSource::new(vec![MatSlice::new(
            vec![0, 1, 1],
            vec![3, 0, 4],
            vec![1, 2, 3],
        )]));
        let b: BoxSource<MatSlice<i64>> = Box::new(BatchVecSource::new(vec![MatSlice::new(
            vec![0, 1],
            vec![3, 4],
            vec![10, 10],
        )]));
        let mut zip = MatZip::new(
            None::<BoxSource<MatSlice<bool>>>,
            Some(a),
            Some(b),
            |_, _, _m: Option<&bool>, x: Option<&i64>, y: Option<&i64>| {
                Ok(Some(
                    x.copied().unwrap_or(0) + y.copied().unwrap_or(0),
                ))
            },
        );
        let mut got = Vec::new();
        while let Some(s) = zip.fetch(16)? {
            for p in 0..s.len() {
                let (r, c) = s.key(p);
                got.push((r, c, s.values()[p]));
            }
        }
        assert_eq!(got, vec![(0, 3, 11), (1, 0, 2), (1, 4, 13)]);
        Ok(())
    }
}
