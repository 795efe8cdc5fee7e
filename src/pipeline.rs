//! Bounded-concurrency staged pipelines over batched sparse slices.
//!
//! A [`Pipeline`] is a linear sequence of stages fed by a [`Source`]. The
//! source is asked to `prepare` (returning a size hint) and then repeatedly
//! `fetch(size)`, producing one batch per call until end-of-stream. Stages
//! are either *parallel* — applied per batch in any order by a bounded pool
//! of workers — or *ordered* — fed batches in strictly monotonic sequence
//! order on a single sequencer, with an optional finalize callback.
//!
//! The runner drives the source on the calling thread, dispatches batches to
//! `num_cpus` workers over bounded channels, and re-sequences completed
//! batches through a reorder buffer before the ordered tail. Every send and
//! receive point consults the pipeline's [`CancelToken`]; cancellation is a
//! local signal, not an error. Panics inside stages are caught and surface
//! from [`Pipeline::run`] as [`Error::Panic`].
//!
//! Sub-modules provide the framework helpers:
//!
//! - [`cancel`] — the shared cancellation token;
//! - [`source`] — the source trait plus channel/interval/in-memory sources;
//! - [`collect`] — collect-into-contiguous and reduce terminals;
//! - [`zip`] — zipper-style multi-source merges keyed by index order.

pub mod cancel;
pub mod collect;
pub mod source;
pub mod zip;

pub use cancel::CancelToken;
pub use source::{BatchVecSource, BoxSource, ChannelSource, EmptySource, IntervalSource, Source};

use crate::error::{Error, Result};
use crossbeam_channel::{SendTimeoutError, bounded};
use log::trace;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default batch size hint handed to sources.
pub const DEFAULT_BATCH: usize = 512;

enum Stage<B> {
    Parallel(Arc<dyn Fn(u64, B) -> Result<B> + Send + Sync>),
    Ordered {
        f: Box<dyn FnMut(u64, B) -> Result<B> + Send>,
        finalize: Option<Box<dyn FnMut() -> Result<()> + Send>>,
    },
}

/// A staged batch pipeline.
pub struct Pipeline<B: Send + 'static> {
    source: BoxSource<B>,
    stages: Vec<Stage<B>>,
    token: CancelToken,
    batch: usize,
    threads: usize,
}

impl<B: Send + 'static> Pipeline<B> {
    /// Wrap a source; stage and run later.
    pub fn new(source: impl Source<Batch = B> + 'static) -> Self {
        Pipeline {
            source: Box::new(source),
            stages: Vec::new(),
            token: CancelToken::new(),
            batch: DEFAULT_BATCH,
            threads: num_cpus::get().max(1),
        }
    }

    /// Wrap an already-boxed source.
    pub fn from_boxed(source: BoxSource<B>) -> Self {
        Pipeline {
            source,
            stages: Vec::new(),
            token: CancelToken::new(),
            batch: DEFAULT_BATCH,
            threads: num_cpus::get().max(1),
        }
    }

    /// Override the fetch size hint.
    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch = n.max(1);
        self
    }

    /// Override the worker count (defaults to the ambient thread count).
    pub fn threads(mut self, n: usize) -> Self {
        self.threads = n.max(1);
        self
    }

    /// Append a parallel stage: applied per batch, in any order.
    pub fn stage(mut self, f: impl Fn(u64, B) -> Result<B> + Send + Sync + 'static) -> Self {
        self.stages.push(Stage::Parallel(Arc::new(f)));
        self
    }

    /// Append an ordered stage: fed in strictly monotonic batch order.
    pub fn ordered(mut self, f: impl FnMut(u64, B) -> Result<B> + Send + 'static) -> Self {
        self.stages.push(Stage::Ordered {
            f: Box::new(f),
            finalize: None,
        });
        self
    }

    /// Append an ordered stage with a finalize callback run after the last
    /// batch.
    pub fn ordered_finalize(
        mut self,
        f: impl FnMut(u64, B) -> Result<B> + Send + 'static,
        fin: impl FnMut() -> Result<()> + Send + 'static,
    ) -> Self {
        self.stages.push(Stage::Ordered {
            f: Box::new(f),
            finalize: Some(Box::new(fin)),
        });
        self
    }

    /// The pipeline's cancellation token; cancel it to stop the run early.
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Drive the pipeline to completion, discarding final batches.
    pub fn run(self) -> Result<()> {
        self.run_with_sink(|_, _| Ok(()))
    }

    /// Drive the pipeline, handing each fully-staged batch to `sink` in
    /// sequence order.
    pub fn run_with_sink(
        mut self,
        mut sink: impl FnMut(u64, B) -> Result<()> + Send,
    ) -> Result<()> {
        let hint = self.source.prepare();
        trace!("pipeline start (hint {hint:?}, batch {})", self.batch);

        // Maximal parallel prefix runs on the workers; everything from the
        // first ordered stage on runs on the sequencer, in order.
        let mut prefix: Vec<Arc<dyn Fn(u64, B) -> Result<B> + Send + Sync>> = Vec::new();
        let mut tail: Vec<Stage<B>> = Vec::new();
        for st in self.stages.drain(..) {
            match st {
                Stage::Parallel(f) if tail.is_empty() => prefix.push(f),
                other => tail.push(other),
            }
        }

        if prefix.is_empty() || self.threads <= 1 {
            return run_seq(
                self.source,
                prefix,
                tail,
                &mut sink,
                &self.token,
                self.batch,
            );
        }
        run_par(
            self.source,
            prefix,
            tail,
            &mut sink,
            &self.token,
            self.batch,
            self.threads,
        )
    }

    /// Run the pipeline on a background thread and expose its output as a
    /// [`ChannelSource`] over a bounded channel.
    ///
    /// Dropping the returned source cancels the producing pipeline.
    pub fn into_source(self, cap: usize) -> ChannelSource<B> {
        let (tx, rx) = bounded::<Result<B>>(cap.max(1));
        let token = self.token();
        let producer_token = token.clone();
        std::thread::spawn(move || {
            let err_tx = tx.clone();
            let sink_token = producer_token.clone();
            let res = self.run_with_sink(move |_, b| {
                if tx.send(Ok(b)).is_err() {
                    // receiver gone; stop producing
                    sink_token.cancel();
                }
                Ok(())
            });
            if let Err(e) = res {
                let _ = err_tx.send(Err(e));
            }
        });
        ChannelSource::new(rx, token)
    }
}

fn guard<B>(f: impl FnOnce() -> Result<B>) -> Result<B> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => r,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "stage panicked".to_string());
            Err(Error::Panic(msg))
        }
    }
}

fn apply_tail<B>(
    tail: &mut [Stage<B>],
    seq: u64,
    mut b: B,
    sink: &mut impl FnMut(u64, B) -> Result<()>,
) -> Result<()> {
    for st in tail.iter_mut() {
        b = match st {
            Stage::Parallel(f) => guard(|| f(seq, b))?,
            Stage::Ordered { f, .. } => guard(|| f(seq, b))?,
        };
    }
    sink(seq, b)
}

fn finalize_tail<B>(tail: &mut [Stage<B>]) -> Result<()> {
    for st in tail.iter_mut() {
        if let Stage::Ordered {
            finalize: Some(fin),
            ..
        } = st
        {
            guard(fin)?;
        }
    }
    Ok(())
}

fn run_seq<B: Send>(
    mut source: BoxSource<B>,
    prefix: Vec<Arc<dyn Fn(u64, B) -> Result<B> + Send + Sync>>,
    mut tail: Vec<Stage<B>>,
    sink: &mut impl FnMut(u64, B) -> Result<()>,
    token: &CancelToken,
    batch: usize,
) -> Result<()> {
    let mut seq = 0u64;
    loop {
        if token.is_cancelled() {
            trace!("pipeline cancelled at batch {seq}");
            return Ok(());
        }
        let Some(mut b) = source.fetch(batch)? else {
            break;
        };
        for f in &prefix {
            b = guard(|| f(seq, b))?;
        }
        apply_tail(&mut tail, seq, b, sink)?;
        seq += 1;
    }
    finalize_tail(&mut tail)
}

#[allow(clippy::too_many_arguments)]
fn run_par<B: Send>(
    mut source: BoxSource<B>,
    prefix: Vec<Arc<dyn Fn(u64, B) -> Result<B> + Send + Sync>>,
    mut tail: Vec<Stage<B>>,
    sink: &mut (impl FnMut(u64, B) -> Result<()> + Send),
    token: &CancelToken,
    batch: usize,
    threads: usize,
) -> Result<()> {
    let first_err: Mutex<Option<Error>> = Mutex::new(None);
    let store = |e: Error| {
        let mut g = first_err.lock().expect("error slot lock");
        if g.is_none() {
            *g = Some(e);
        }
    };

    std::thread::scope(|scope| {
        let (work_tx, work_rx) = bounded::<(u64, B)>(threads);
        let (done_tx, done_rx) = bounded::<(u64, B)>(threads * 2);

        for _ in 0..threads {
            let work_rx = work_rx.clone();
            let done_tx = done_tx.clone();
            let prefix = &prefix;
            let token = token.clone();
            let store = &store;
            scope.spawn(move || {
                while let Ok((seq, b)) = work_rx.recv() {
                    if token.is_cancelled() {
                        continue; // keep draining so the feeder never blocks
                    }
                    let mut staged = Ok(b);
                    for f in prefix {
                        staged = match staged {
                            Ok(v) => guard(|| f(seq, v)),
                            Err(e) => Err(e),
                        };
                    }
                    match staged {
                        Ok(out) => {
                            if done_tx.send((seq, out)).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            store(e);
                            token.cancel();
                        }
                    }
                }
            });
        }
        drop(done_tx);
        drop(work_rx);

        // Sequencer: reorder buffer feeding the ordered tail and the sink.
        let seq_token = token.clone();
        let store_ref = &store;
        let tail_ref = &mut tail;
        let sequencer = scope.spawn(move || {
            let mut pending: BTreeMap<u64, B> = BTreeMap::new();
            let mut next = 0u64;
            while let Ok((seq, b)) = done_rx.recv() {
                if seq_token.is_cancelled() {
                    continue; // drain without processing
                }
                pending.insert(seq, b);
                while let Some(b) = pending.remove(&next) {
                    if let Err(e) = apply_tail(tail_ref, next, b, sink) {
                        store_ref(e);
                        seq_token.cancel();
                        break;
                    }
                    next += 1;
                }
            }
            if !seq_token.is_cancelled() {
                if let Err(e) = finalize_tail(tail_ref) {
                    store_ref(e);
                }
            }
        });

        // Feeder: the calling thread drives the source.
        let mut seq = 0u64;
        'feed: loop {
            if token.is_cancelled() {
                break;
            }
            match source.fetch(batch) {
                Err(e) => {
                    store(e);
                    token.cancel();
                    break;
                }
                Ok(None) => break,
                Ok(Some(b)) => {
                    let mut item = (seq, b);
                    loop {
                        match work_tx.send_timeout(item, Duration::from_millis(20)) {
                            Ok(()) => break,
                            Err(SendTimeoutError::Timeout(it)) => {
                                if token.is_cancelled() {
                                    break 'feed;
                                }
                                item = it;
                            }
                            Err(SendTimeoutError::Disconnected(_)) => break 'feed,
                        }
                    }
                    seq += 1;
                }
            }
        }
        drop(work_tx);
        let _ = sequencer.join();
    });

    match first_err.into_inner().expect("error slot lock") {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
