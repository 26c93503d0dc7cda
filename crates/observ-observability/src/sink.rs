use async_trait::async_trait;
use thiserror::Error;

use crate::types::Trace;

/// Why a trace could not be delivered
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// Worth retrying: timeouts, connection failures, 408/429/5xx
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// Retrying will not help: rejected payload, bad credentials
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

impl DispatchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DispatchError::Transient(_))
    }
}

/// Core trait for telemetry backends
///
/// Only the dispatcher's background workers call `send`, so implementations
/// may block on network I/O freely. They must be safe to call concurrently
/// from several workers.
#[async_trait]
pub trait TraceSink: Send + Sync {
    /// Deliver a single finalized trace
    async fn send(&self, trace: &Trace) -> Result<(), DispatchError>;
}
