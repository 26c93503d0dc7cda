//! Non-blocking trace delivery.
//!
//! Producers (interceptors on the caller's task) push finished traces into a
//! single bounded queue and return immediately. A small pool of tokio worker
//! tasks drains the queue and is the only place that talks to the telemetry
//! backend.
//!
//! - Full queue: the [`OverflowPolicy`] decides which trace is dropped.
//! - Transient delivery failure: retried with capped exponential backoff.
//! - Out of retries or permanent failure: the trace is dropped and logged.
//! - Shutdown: workers drain what they can within the grace period; the rest
//!   is abandoned and counted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::sink::TraceSink;
use crate::types::Trace;

/// Which trace to give up when the queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Reject the incoming trace, keeping older ones
    #[default]
    DropNewest,
    /// Evict the oldest queued trace to make room
    DropOldest,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub queue_size: usize,
    pub workers: usize,
    pub overflow: OverflowPolicy,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub max_retry_backoff: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_size: 1000,
            workers: 2,
            overflow: OverflowPolicy::DropNewest,
            max_retries: 3,
            retry_backoff: Duration::from_millis(200),
            max_retry_backoff: Duration::from_secs(2),
        }
    }
}

impl DispatcherConfig {
    /// Delay before retry number `attempt + 1`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.retry_backoff
            .saturating_mul(factor)
            .min(self.max_retry_backoff)
    }
}

/// Snapshot of dispatcher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub submitted: u64,
    pub delivered: u64,
    pub dropped_overflow: u64,
    pub dropped_failed: u64,
    pub abandoned: u64,
    pub queued: usize,
}

/// Result of a shutdown flush
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// Traces delivered over the dispatcher's lifetime
    pub delivered: u64,
    /// Traces still queued or in flight when the grace period ran out
    pub abandoned: u64,
    pub timed_out: bool,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    delivered: AtomicU64,
    dropped_overflow: AtomicU64,
    dropped_failed: AtomicU64,
    abandoned: AtomicU64,
}

struct Shared {
    queue: Mutex<VecDeque<Trace>>,
    notify: Notify,
    closed: AtomicBool,
    in_flight: AtomicUsize,
    config: DispatcherConfig,
    sink: Arc<dyn TraceSink>,
    counters: Counters,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, VecDeque<Trace>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pop(&self) -> Option<Trace> {
        let mut queue = self.queue();
        let trace = queue.pop_front();
        if trace.is_some() {
            self.in_flight.fetch_add(1, Ordering::AcqRel);
        }
        trace
    }

    fn reject_closed(&self, trace: &Trace) -> bool {
        self.counters.abandoned.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(trace_id = %trace.trace_id, "dispatcher is shut down; dropping trace");
        false
    }

    fn release_in_flight(&self) {
        // Shutdown may already have zeroed the counter for an aborted worker
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    async fn deliver(&self, trace: Trace, worker: usize) {
        let mut attempt = 0u32;

        loop {
            match self.sink.send(&trace).await {
                Ok(()) => {
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(worker, trace_id = %trace.trace_id, attempt, "trace delivered");
                    break;
                }
                Err(err) if err.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.config.backoff(attempt);
                    attempt += 1;
                    tracing::debug!(
                        worker,
                        trace_id = %trace.trace_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying trace delivery"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    self.counters.dropped_failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        worker,
                        trace_id = %trace.trace_id,
                        attempts = attempt + 1,
                        error = %err,
                        "dropping undeliverable trace"
                    );
                    break;
                }
            }
        }

        self.release_in_flight();
    }
}

async fn run_worker(shared: Arc<Shared>, worker: usize) {
    loop {
        // Register interest before checking the queue so a submit or close
        // between the check and the await is never missed.
        let notified = shared.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if let Some(trace) = shared.pop() {
            shared.deliver(trace, worker).await;
            continue;
        }
        if shared.closed.load(Ordering::Acquire) {
            break;
        }
        notified.await;
    }

    tracing::debug!(worker, "trace dispatcher worker stopped");
}

/// Process-wide delivery queue shared by every wrapped client of one `Observ`.
pub struct Dispatcher {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawn the worker pool on `runtime`
    pub fn start(config: DispatcherConfig, sink: Arc<dyn TraceSink>, runtime: &Handle) -> Self {
        let workers = config.workers.max(1);
        let queue_size = config.queue_size.max(1);

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(queue_size.min(1024))),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            config: DispatcherConfig {
                queue_size,
                workers,
                ..config
            },
            sink,
            counters: Counters::default(),
        });

        let handles = (0..workers)
            .map(|worker| runtime.spawn(run_worker(Arc::clone(&shared), worker)))
            .collect();

        tracing::debug!(workers, queue_size, "trace dispatcher started");

        Self {
            shared,
            workers: Mutex::new(handles),
        }
    }

    /// Enqueue a finished trace.
    ///
    /// Never blocks on I/O and never fails; returns `false` when the trace was
    /// dropped (queue full under `DropNewest`, or dispatcher shut down).
    pub fn submit(&self, trace: Trace) -> bool {
        let shared = &self.shared;
        shared.counters.submitted.fetch_add(1, Ordering::Relaxed);

        if shared.closed.load(Ordering::Acquire) {
            return shared.reject_closed(&trace);
        }

        let policy = shared.config.overflow;
        let (accepted, evicted) = {
            let mut queue = shared.queue();
            // `shutdown` flips `closed` under this lock
            if shared.closed.load(Ordering::Acquire) {
                drop(queue);
                return shared.reject_closed(&trace);
            }
            if queue.len() < shared.config.queue_size {
                queue.push_back(trace);
                (true, None)
            } else {
                match policy {
                    OverflowPolicy::DropNewest => (false, Some(trace)),
                    OverflowPolicy::DropOldest => {
                        let oldest = queue.pop_front();
                        queue.push_back(trace);
                        (true, oldest)
                    }
                }
            }
        };

        if let Some(dropped) = evicted {
            shared.counters.dropped_overflow.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                trace_id = %dropped.trace_id,
                policy = ?policy,
                queue_size = shared.config.queue_size,
                "trace queue full; dropping trace"
            );
        }
        if accepted {
            shared.notify.notify_one();
        }
        accepted
    }

    pub fn stats(&self) -> DispatchStats {
        let counters = &self.shared.counters;
        DispatchStats {
            submitted: counters.submitted.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            dropped_overflow: counters.dropped_overflow.load(Ordering::Relaxed),
            dropped_failed: counters.dropped_failed.load(Ordering::Relaxed),
            abandoned: counters.abandoned.load(Ordering::Relaxed),
            queued: self.pending(),
        }
    }

    /// Traces waiting in the queue (not counting ones being delivered)
    pub fn pending(&self) -> usize {
        self.shared.queue().len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.shared.config
    }

    /// Stop accepting traces and flush what is queued within `grace`.
    ///
    /// Whatever is still queued or in flight when `grace` elapses is abandoned
    /// and counted; this never fails. Calling it again is a no-op.
    pub async fn shutdown(&self, grace: Duration) -> FlushReport {
        let shared = &self.shared;
        {
            let _queue = shared.queue();
            shared.closed.store(true, Ordering::Release);
        }
        shared.notify.notify_waiters();

        let handles: Vec<JoinHandle<()>> = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        let timed_out = tokio::time::timeout(grace, futures::future::join_all(handles))
            .await
            .is_err();

        if timed_out {
            for handle in &aborts {
                handle.abort();
            }
        }

        // Anything the workers did not take is abandoned, timed out or not
        let queued = shared.queue().drain(..).count();
        let in_flight = if timed_out {
            shared.in_flight.swap(0, Ordering::AcqRel)
        } else {
            0
        };
        let abandoned = (queued + in_flight) as u64;
        shared.counters.abandoned.fetch_add(abandoned, Ordering::Relaxed);

        if abandoned > 0 {
            tracing::warn!(
                abandoned,
                timed_out,
                grace_ms = grace.as_millis() as u64,
                "abandoning undelivered traces"
            );
        }

        let delivered = shared.counters.delivered.load(Ordering::Relaxed);
        tracing::info!(delivered, abandoned, timed_out, "trace dispatcher shut down");

        FlushReport {
            delivered,
            abandoned,
            timed_out,
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Let idle workers drain and exit instead of parking forever
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = DispatcherConfig {
            retry_backoff: Duration::from_millis(100),
            max_retry_backoff: Duration::from_millis(500),
            ..DispatcherConfig::default()
        };

        assert_eq!(config.backoff(0), Duration::from_millis(100));
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(2), Duration::from_millis(400));
        assert_eq!(config.backoff(3), Duration::from_millis(500));
        assert_eq!(config.backoff(40), Duration::from_millis(500));
    }

    #[test]
    fn test_default_policy_is_drop_newest() {
        assert_eq!(OverflowPolicy::default(), OverflowPolicy::DropNewest);
        assert_eq!(
            serde_json::to_value(OverflowPolicy::DropOldest).unwrap(),
            "drop_oldest"
        );
    }
}
