use std::time::Instant;

use observ_llm::ChatMessage;

use crate::types::{ErrorDetail, Metadata, Outcome, OutputSummary, Trace};

/// Everything known about a call when it begins
#[derive(Debug, Clone)]
pub struct TraceStart {
    pub provider: String,
    pub method: String,
    pub model: String,
    pub project_id: String,
    pub environment: String,
    pub session_id: Option<String>,
    pub metadata: Metadata,
    pub input: Vec<ChatMessage>,
    pub streamed: bool,
}

/// How a call finished
#[derive(Debug, Clone)]
pub enum Completion {
    Success(OutputSummary),
    CacheHit(OutputSummary),
    Error(ErrorDetail),
}

/// Captures timing for a single call and turns it into a [`Trace`].
///
/// The wall-clock `started_at` is taken from `chrono`, while the duration is
/// measured on a monotonic clock so it can never be negative.
#[derive(Debug)]
pub struct TraceRecorder {
    trace_id: String,
    start: TraceStart,
    started_at: chrono::DateTime<chrono::Utc>,
    clock: Instant,
}

impl TraceRecorder {
    /// Start timing a call. Generates the trace id.
    pub fn start(start: TraceStart) -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            start,
            started_at: chrono::Utc::now(),
            clock: Instant::now(),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn model(&self) -> &str {
        &self.start.model
    }

    pub fn provider(&self) -> &str {
        &self.start.provider
    }

    /// Finalize the record. Consumes the recorder so a trace is built at
    /// most once per call.
    pub fn finish(self, completion: Completion) -> Trace {
        let elapsed = self.clock.elapsed();
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let ended_at = chrono::Duration::from_std(elapsed)
            .ok()
            .and_then(|d| self.started_at.checked_add_signed(d))
            .unwrap_or(self.started_at);

        let (outcome, error_detail, summary) = match completion {
            Completion::Success(summary) => (Outcome::Success, None, summary),
            Completion::CacheHit(summary) => (Outcome::CacheHit, None, summary),
            Completion::Error(detail) => (Outcome::Error, Some(detail), OutputSummary::default()),
        };

        let TraceStart {
            provider,
            method,
            model,
            project_id,
            environment,
            session_id,
            metadata,
            input,
            streamed,
        } = self.start;

        Trace {
            trace_id: self.trace_id,
            provider,
            model,
            method,
            project_id,
            environment,
            session_id,
            started_at: self.started_at,
            ended_at,
            duration_ms,
            outcome,
            error_detail,
            metadata,
            input,
            output: summary.output,
            usage: summary.usage,
            streamed,
        }
    }
}
