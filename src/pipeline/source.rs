//! Pipeline sources: the fetch protocol and the stock implementations.

use crate::error::Result;
use crate::index::Ix;
use crate::pipeline::cancel::CancelToken;
use crossbeam_channel::Receiver;
use std::marker::PhantomData;

/// The producing end of a pipeline.
///
/// The runner calls `prepare` once, then `fetch(size)` repeatedly; `size` is
/// a hint for how large a batch the runner would like. `Ok(None)` is
/// end-of-stream. Batches must be key-ordered internally and across calls
/// when the batch type carries keys.
pub trait Source: Send {
    /// The batch type this source yields.
    type Batch: Send;

    /// Called once before fetching; returns a total-size hint if known.
    fn prepare(&mut self) -> Option<usize> {
        None
    }

    /// Produce the next batch, or `Ok(None)` at end-of-stream.
    fn fetch(&mut self, size: usize) -> Result<Option<Self::Batch>>;
}

/// A boxed source.
pub type BoxSource<B> = Box<dyn Source<Batch = B>>;

impl<S: Source + ?Sized> Source for Box<S> {
    type Batch = S::Batch;

    fn prepare(&mut self) -> Option<usize> {
        (**self).prepare()
    }

    fn fetch(&mut self, size: usize) -> Result<Option<Self::Batch>> {
        (**self).fetch(size)
    }
}

/// A source that wraps a bounded channel of batches produced elsewhere
/// (typically by [`Pipeline::into_source`](crate::pipeline::Pipeline::into_source)).
///
/// Dropping the source cancels the producing pipeline's token, so an
/// abandoned consumer stops its upstream explicitly.
pub struct ChannelSource<B> {
    rx: Receiver<Result<B>>,
    token: CancelToken,
}

impl<B: Send> ChannelSource<B> {
    /// Wrap a receiver plus the producer's token.
    pub fn new(rx: Receiver<Result<B>>, token: CancelToken) -> Self {
        ChannelSource { rx, token }
    }

    /// The producer's cancellation token.
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }
}

impl<B: Send> Source for ChannelSource<B> {
    type Batch = B;

    fn fetch(&mut self, _size: usize) -> Result<Option<B>> {
        if self.token.is_cancelled() {
            return Ok(None);
        }
        match self.rx.recv() {
            Ok(Ok(b)) => Ok(Some(b)),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None), // producer finished and dropped its sender
        }
    }
}

impl<B> Drop for ChannelSource<B> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Yields consecutive half-open index ranges covering `0..len`.
pub struct IntervalSource {
    len: Ix,
    at: Ix,
}

impl IntervalSource {
    /// Ranges covering `0..len`.
    pub fn new(len: Ix) -> Self {
        IntervalSource { len, at: 0 }
    }
}

impl Source for IntervalSource {
    type Batch = (Ix, Ix);

    fn prepare(&mut self) -> Option<usize> {
        Some(self.len.max(0) as usize)
    }

    fn fetch(&mut self, size: usize) -> Result<Option<(Ix, Ix)>> {
        if self.at >= self.len {
            return Ok(None);
        }
        let hi = (self.at + size.max(1) as Ix).min(self.len);
        let out = (self.at, hi);
        self.at = hi;
        Ok(Some(out))
    }
}

/// An in-memory source over pre-built batches.
pub struct BatchVecSource<B> {
    batches: std::vec::IntoIter<B>,
    total: usize,
}

impl<B: Send> BatchVecSource<B> {
    /// Yield the given batches in order.
    pub fn new(batches: Vec<B>) -> Self {
        let total = batches.len();
        BatchVecSource {
            batches: batches.into_iter(),
            total,
        }
    }
}

impl<B: Send> Source for BatchVecSource<B> {
    type Batch = B;

    fn prepare(&mut self) -> Option<usize> {
        Some(self.total)
    }

    fn fetch(&mut self, _size: usize) -> Result<Option<B>> {
        Ok(self.batches.next())
    }
}

/// The empty stream.
pub struct EmptySource<B>(PhantomData<fn() -> B>);

impl<B> EmptySource<B> {
    /// An empty source.
    pub fn new() -> Self {
        EmptySource(PhantomData)
    }
}

impl<B> Default for EmptySource<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Send> Source for EmptySource<B> {
    type Batch = B;

    fn prepare(&mut self) -> Option<usize> {
        Some(0)
    }

    fn fetch(&mut self, _size: usize) -> Result<Option<B>> {
        Ok(None)
    }
}
