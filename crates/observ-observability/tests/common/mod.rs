#![allow(dead_code)]

use async_trait::async_trait;
use observ_observability::{
    Completion, DispatchError, Metadata, OutputSummary, Trace, TraceRecorder, TraceSink,
    TraceStart,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Route the dispatcher's logs through the test harness output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn trace(model: &str) -> Trace {
    TraceRecorder::start(TraceStart {
        provider: "openai".to_string(),
        method: "chat.completions.create".to_string(),
        model: model.to_string(),
        project_id: "default".to_string(),
        environment: "test".to_string(),
        session_id: None,
        metadata: Metadata::new(),
        input: vec![],
        streamed: false,
    })
    .finish(Completion::Success(OutputSummary::default()))
}

/// Poll `condition` every 5ms until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Sink that fails a configurable number of times before accepting.
pub struct ScriptedSink {
    failures: Mutex<Vec<DispatchError>>,
    pub attempts: AtomicUsize,
    pub received: Mutex<Vec<Trace>>,
}

impl ScriptedSink {
    pub fn accepting() -> Self {
        Self::failing(vec![])
    }

    /// Errors are returned in order, then every call succeeds
    pub fn failing(failures: Vec<DispatchError>) -> Self {
        let mut failures = failures;
        failures.reverse();
        Self {
            failures: Mutex::new(failures),
            attempts: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn received_models(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.model.clone())
            .collect()
    }

    pub fn received_count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait]
impl TraceSink for ScriptedSink {
    async fn send(&self, trace: &Trace) -> Result<(), DispatchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failures.lock().unwrap().pop() {
            return Err(err);
        }
        self.received.lock().unwrap().push(trace.clone());
        Ok(())
    }
}

/// Sink that holds every delivery until the test releases it.
pub struct GatedSink {
    gate: Semaphore,
    pub started: AtomicUsize,
    pub received: Mutex<Vec<Trace>>,
}

impl GatedSink {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            started: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn release(&self, deliveries: usize) {
        self.gate.add_permits(deliveries);
    }

    pub fn received_models(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.model.clone())
            .collect()
    }
}

#[async_trait]
impl TraceSink for GatedSink {
    async fn send(&self, trace: &Trace) -> Result<(), DispatchError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| DispatchError::Permanent(e.to_string()))?;
        permit.forget();
        self.received.lock().unwrap().push(trace.clone());
        Ok(())
    }
}
