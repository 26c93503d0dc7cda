use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// Re-export TokenUsage from observ-llm to avoid duplication
pub use observ_llm::TokenUsage;
use observ_llm::ChatMessage;

/// Caller-supplied annotations attached to a trace.
///
/// Values are scalars or strings. A `BTreeMap` keeps serialization order
/// stable, which recall keys rely on.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// How an instrumented call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Error,
    CacheHit,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Error => write!(f, "error"),
            Outcome::CacheHit => write!(f, "cache_hit"),
        }
    }
}

/// Provider-agnostic summary of a failed call: the error's type name and its
/// display message. Never carries backtraces or request payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
}

impl ErrorDetail {
    pub const CANCELLED: &'static str = "cancelled";

    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Summarize a provider error by its (unqualified) type name and message
    pub fn from_error<E: fmt::Display + ?Sized>(err: &E) -> Self {
        Self::new(short_type_name::<E>(), err.to_string())
    }

    /// Call abandoned before it produced a result
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Self::CANCELLED, message)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == Self::CANCELLED
    }
}

/// `my_crate::errors::ApiError<T>` -> `ApiError<T>`
fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base_end = full.find('<').unwrap_or(full.len());
    let start = full[..base_end].rfind("::").map(|i| i + 2).unwrap_or(0);
    full[start..].to_string()
}

/// What the interceptor could extract from a response (or a stream chunk).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl OutputSummary {
    pub fn new(output: Option<String>, usage: Option<TokenUsage>) -> Self {
        Self { output, usage }
    }

    /// Fold a streamed chunk into the running summary
    pub fn absorb(&mut self, chunk: OutputSummary) {
        if let Some(text) = chunk.output {
            self.output.get_or_insert_with(String::new).push_str(&text);
        }
        if let Some(usage) = chunk.usage {
            self.usage.get_or_insert_with(TokenUsage::default).merge(&usage);
        }
    }
}

/// One record per instrumented call.
///
/// Built only through [`crate::TraceRecorder`], which guarantees that
/// `error_detail` is present exactly when `outcome` is `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: String,
    pub provider: String,
    pub model: String,
    /// Traceable method path, e.g. "messages.create"
    pub method: String,
    pub project_id: String,
    pub environment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: chrono::DateTime<chrono::Utc>,
    pub duration_ms: u64,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,
    pub metadata: Metadata,
    pub input: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    pub streamed: bool,
}
