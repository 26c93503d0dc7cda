mod common;

use common::{init_tracing, trace, wait_until, GatedSink, ScriptedSink};
use observ_observability::{DispatchError, Dispatcher, DispatcherConfig, OverflowPolicy};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio_test::assert_ok;

fn fast_config() -> DispatcherConfig {
    DispatcherConfig {
        queue_size: 100,
        workers: 2,
        overflow: OverflowPolicy::DropNewest,
        max_retries: 3,
        retry_backoff: Duration::from_millis(5),
        max_retry_backoff: Duration::from_millis(20),
    }
}

fn single_worker(queue_size: usize, overflow: OverflowPolicy) -> DispatcherConfig {
    DispatcherConfig {
        queue_size,
        workers: 1,
        overflow,
        ..fast_config()
    }
}

#[tokio::test]
async fn test_delivers_submitted_traces() {
    let sink = Arc::new(ScriptedSink::accepting());
    let dispatcher = Dispatcher::start(fast_config(), sink.clone(), &Handle::current());

    for i in 0..5 {
        assert!(dispatcher.submit(trace(&format!("m{}", i))));
    }

    assert!(wait_until(Duration::from_secs(1), || sink.received_count() == 5).await);
    let stats = dispatcher.stats();
    assert_eq!(stats.submitted, 5);
    assert_eq!(stats.delivered, 5);
    assert_eq!(stats.queued, 0);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let sink = Arc::new(ScriptedSink::failing(vec![
        DispatchError::Transient("503".into()),
        DispatchError::Transient("connection reset".into()),
    ]));
    let dispatcher = Dispatcher::start(single_worker(10, OverflowPolicy::DropNewest), sink.clone(), &Handle::current());

    dispatcher.submit(trace("m"));

    assert!(wait_until(Duration::from_secs(1), || sink.received_count() == 1).await);
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(dispatcher.stats().dropped_failed, 0);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    init_tracing();
    let sink = Arc::new(ScriptedSink::failing(vec![DispatchError::Permanent("401".into())]));
    let dispatcher = Dispatcher::start(single_worker(10, OverflowPolicy::DropNewest), sink.clone(), &Handle::current());

    dispatcher.submit(trace("m"));

    assert!(wait_until(Duration::from_secs(1), || dispatcher.stats().dropped_failed == 1).await);
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(sink.received_count(), 0);
}

#[tokio::test]
async fn test_retry_budget_is_bounded() {
    let failures = (0..10)
        .map(|_| DispatchError::Transient("timeout".into()))
        .collect();
    let sink = Arc::new(ScriptedSink::failing(failures));
    let config = DispatcherConfig {
        max_retries: 2,
        ..single_worker(10, OverflowPolicy::DropNewest)
    };
    let dispatcher = Dispatcher::start(config, sink.clone(), &Handle::current());

    dispatcher.submit(trace("m"));

    assert!(wait_until(Duration::from_secs(1), || dispatcher.stats().dropped_failed == 1).await);
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_queue_full_drops_newest() {
    init_tracing();
    let sink = Arc::new(GatedSink::new());
    let dispatcher = Dispatcher::start(single_worker(2, OverflowPolicy::DropNewest), sink.clone(), &Handle::current());

    dispatcher.submit(trace("t0"));
    assert!(wait_until(Duration::from_secs(1), || sink.started.load(Ordering::SeqCst) == 1).await);

    // t0 is in flight; the queue holds two more
    assert!(dispatcher.submit(trace("t1")));
    assert!(dispatcher.submit(trace("t2")));
    assert!(!dispatcher.submit(trace("t3")));
    assert!(!dispatcher.submit(trace("t4")));
    assert_eq!(dispatcher.stats().dropped_overflow, 2);

    sink.release(10);
    assert!(wait_until(Duration::from_secs(1), || dispatcher.stats().delivered == 3).await);
    assert_eq!(sink.received_models(), vec!["t0", "t1", "t2"]);
}

#[tokio::test]
async fn test_queue_full_drops_oldest() {
    init_tracing();
    let sink = Arc::new(GatedSink::new());
    let dispatcher = Dispatcher::start(single_worker(2, OverflowPolicy::DropOldest), sink.clone(), &Handle::current());

    dispatcher.submit(trace("t0"));
    assert!(wait_until(Duration::from_secs(1), || sink.started.load(Ordering::SeqCst) == 1).await);

    for name in ["t1", "t2", "t3", "t4"] {
        assert!(dispatcher.submit(trace(name)));
    }
    assert_eq!(dispatcher.stats().dropped_overflow, 2);

    sink.release(10);
    assert!(wait_until(Duration::from_secs(1), || dispatcher.stats().delivered == 3).await);
    assert_eq!(sink.received_models(), vec!["t0", "t3", "t4"]);
}

#[tokio::test]
async fn test_submit_does_not_block_on_stalled_backend() {
    let sink = Arc::new(GatedSink::new());
    let dispatcher = Dispatcher::start(single_worker(100, OverflowPolicy::DropNewest), sink.clone(), &Handle::current());

    let started = Instant::now();
    for i in 0..1_000 {
        dispatcher.submit(trace(&format!("m{}", i)));
    }

    assert!(started.elapsed() < Duration::from_millis(200));
    assert!(dispatcher.stats().dropped_overflow >= 900);
}

#[tokio::test]
async fn test_shutdown_flushes_queue() {
    let sink = Arc::new(ScriptedSink::accepting());
    let dispatcher = Dispatcher::start(fast_config(), sink.clone(), &Handle::current());

    for i in 0..20 {
        dispatcher.submit(trace(&format!("m{}", i)));
    }
    let report = dispatcher.shutdown(Duration::from_secs(2)).await;

    assert!(!report.timed_out);
    assert_eq!(report.abandoned, 0);
    assert_eq!(report.delivered, 20);

    // Each trace was delivered exactly once
    let unique: HashSet<String> = sink.received_models().into_iter().collect();
    assert_eq!(unique.len(), 20);
    assert_eq!(sink.received_count(), 20);
}

#[tokio::test]
async fn test_shutdown_abandons_after_grace_period() {
    init_tracing();
    let sink = Arc::new(GatedSink::new());
    let dispatcher = Dispatcher::start(single_worker(10, OverflowPolicy::DropNewest), sink.clone(), &Handle::current());

    dispatcher.submit(trace("t0"));
    assert!(wait_until(Duration::from_secs(1), || sink.started.load(Ordering::SeqCst) == 1).await);
    dispatcher.submit(trace("t1"));
    dispatcher.submit(trace("t2"));

    let started = Instant::now();
    let report = dispatcher.shutdown(Duration::from_millis(100)).await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(report.timed_out);
    assert_eq!(report.abandoned, 3);
    assert_eq!(report.delivered, 0);

    // Late submissions are dropped, not queued
    assert!(!dispatcher.submit(trace("late")));
    assert!(dispatcher.is_closed());
    assert_eq!(dispatcher.stats().abandoned, 4);
}

#[tokio::test]
async fn test_second_shutdown_is_noop() {
    let sink = Arc::new(ScriptedSink::accepting());
    let dispatcher = Dispatcher::start(fast_config(), sink.clone(), &Handle::current());

    dispatcher.submit(trace("m"));
    let first = dispatcher.shutdown(Duration::from_secs(1)).await;
    let second = dispatcher.shutdown(Duration::from_secs(1)).await;

    assert_eq!(first.delivered, 1);
    assert_eq!(second.delivered, 1);
    assert!(!second.timed_out);
    assert_eq!(sink.received_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_submit_racing_shutdown_is_accounted_for() {
    init_tracing();
    let sink = Arc::new(ScriptedSink::accepting());
    let dispatcher = Arc::new(Dispatcher::start(fast_config(), sink.clone(), &Handle::current()));

    let submitters: Vec<_> = (0..4)
        .map(|n| {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::task::spawn_blocking(move || {
                for i in 0..200 {
                    dispatcher.submit(trace(&format!("w{}-{}", n, i)));
                }
            })
        })
        .collect();

    let report = dispatcher.shutdown(Duration::from_secs(2)).await;
    for submitter in submitters {
        assert_ok!(submitter.await);
    }

    // Every submission ends up delivered, dropped or abandoned; none linger
    let stats = dispatcher.stats();
    assert!(!report.timed_out);
    assert_eq!(stats.queued, 0);
    assert_eq!(
        stats.submitted,
        stats.delivered + stats.dropped_overflow + stats.dropped_failed + stats.abandoned
    );
    assert_eq!(sink.received_count() as u64, stats.delivered);
}
