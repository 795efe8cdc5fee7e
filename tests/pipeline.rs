use ferroblas::pipeline::{
    BatchVecSource, CancelToken, EmptySource, IntervalSource, Pipeline, Source,
};
use ferroblas::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[test]
fn interval_source_covers_the_range() -> anyhow::Result<()> {
    let mut src = IntervalSource::new(1000);
    assert_eq!(src.prepare(), Some(1000));
    let mut total = 0;
    let mut last_hi = 0;
    while let Some((lo, hi)) = src.fetch(64)? {
        assert_eq!(lo, last_hi);
        assert!(hi - lo <= 64);
        total += hi - lo;
        last_hi = hi;
    }
    assert_eq!(total, 1000);
    Ok(())
}

#[test]
fn ordered_stages_see_batches_in_sequence_order() -> anyhow::Result<()> {
    let batches: Vec<u64> = (0..200).collect();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    Pipeline::new(BatchVecSource::new(batches))
        .stage(|_, b| Ok(b * 2)) // parallel, any order
        .ordered(move |seq, b| {
            sink.lock().unwrap().push((seq, b));
            Ok(b)
        })
        .run()?;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 200);
    for (i, &(seq, b)) in seen.iter().enumerate() {
        assert_eq!(seq, i as u64);
        assert_eq!(b, (i as u64) * 2);
    }
    Ok(())
}

#[test]
fn finalize_runs_after_the_last_batch() -> anyhow::Result<()> {
    let count = Arc::new(AtomicUsize::new(0));
    let c1 = Arc::clone(&count);
    let c2 = Arc::clone(&count);

    Pipeline::new(BatchVecSource::new(vec![1u64, 2, 3]))
        .ordered_finalize(
            move |_, b| {
                c1.fetch_add(1, Ordering::SeqCst);
                Ok(b)
            },
            move || {
                // All batches processed by the time finalize fires.
                assert_eq!(c2.load(Ordering::SeqCst), 3);
                Ok(())
            },
        )
        .run()?;
    assert_eq!(count.load(Ordering::SeqCst), 3);
    Ok(())
}

#[test]
fn stage_panic_surfaces_as_error() -> anyhow::Result<()> {
    let res = Pipeline::new(BatchVecSource::new(vec![1u64, 2, 3]))
        .stage(|_, b| {
            if b == 2 {
                panic!("boom at batch {b}");
            }
            Ok(b)
        })
        .run();
    assert!(matches!(res, Err(Error::Panic(msg)) if msg.contains("boom")));
    Ok(())
}

#[test]
fn stage_error_stops_the_run() -> anyhow::Result<()> {
    let res = Pipeline::new(BatchVecSource::new((0..1000u64).collect()))
        .stage(|_, b| {
            if b == 17 {
                return Err(Error::InvalidValue);
            }
            Ok(b)
        })
        .run();
    assert!(matches!(res, Err(Error::InvalidValue)));
    Ok(())
}

#[test]
fn cancellation_is_quiet() -> anyhow::Result<()> {
    let p = Pipeline::new(BatchVecSource::new((0..10_000u64).collect()));
    let token = p.token();
    let hit = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hit);
    let res = p
        .ordered(move |_, b| {
            if h.fetch_add(1, Ordering::SeqCst) == 5 {
                token.cancel();
            }
            Ok(b)
        })
        .run();
    // Cancellation is a local signal, not an error.
    assert!(res.is_ok());
    assert!(hit.load(Ordering::SeqCst) < 10_000);
    Ok(())
}

#[test]
fn into_source_bridges_through_a_channel() -> anyhow::Result<()> {
    let producer =
        Pipeline::new(BatchVecSource::new((0..100u64).collect())).stage(|_, b| Ok(b + 1));
    let mut bridged = producer.into_source(4);

    let mut got = Vec::new();
    while let Some(b) = bridged.fetch(16)? {
        got.push(b);
    }
    got.sort_unstable();
    assert_eq!(got, (1..=100u64).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn dropping_a_channel_source_cancels_the_producer() -> anyhow::Result<()> {
    let produced = Arc::new(AtomicUsize::new(0));
    let p = Arc::clone(&produced);
    let producer = Pipeline::new(BatchVecSource::new((0..100_000u64).collect())).stage(move |_, b| {
        p.fetch_add(1, Ordering::SeqCst);
        Ok(b)
    });
    let token = producer.token();
    let mut bridged = producer.into_source(2);
    let _ = bridged.fetch(1)?;
    drop(bridged);

    // The producer's token is cancelled; give its thread a moment to see it.
    for _ in 0..200 {
        if token.is_cancelled() {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    assert!(token.is_cancelled());
    Ok(())
}

#[test]
fn empty_source_runs_cleanly() -> anyhow::Result<()> {
    let fin = Arc::new(AtomicUsize::new(0));
    let f = Arc::clone(&fin);
    Pipeline::new(EmptySource::<u64>::new())
        .ordered_finalize(|_, b| Ok(b), move || {
            f.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .run()?;
    assert_eq!(fin.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn cancel_token_is_shared() {
    let t = CancelToken::new();
    let t2 = t.clone();
    assert!(!t2.is_cancelled());
    t.cancel();
    assert!(t2.is_cancelled());
}

#[test]
fn parallel_stages_use_bounded_workers() -> anyhow::Result<()> {
    // A wide input with a single-threaded override still completes and
    // preserves order at the sink.
    let order = Arc::new(Mutex::new(Vec::new()));
    let o = Arc::clone(&order);
    Pipeline::new(BatchVecSource::new((0..50u64).collect()))
        .threads(1)
        .stage(|_, b| Ok(b))
        .ordered(move |seq, b| {
            o.lock().unwrap().push((seq, b));
            Ok(b)
        })
        .run()?;
    let order = order.lock().unwrap();
    assert_eq!(order.len(), 50);
    assert!(order.windows(2).all(|w| w[0].0 + 1 == w[1].0));
    Ok(())
}
