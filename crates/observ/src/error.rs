use thiserror::Error;

/// Errors surfaced to the caller at setup time.
///
/// Nothing in this enum is ever produced by a wrapped provider call: once a
/// client is wrapped, its calls return exactly what the real client returns.
#[derive(Debug, Error)]
pub enum ObservError {
    /// `wrap` was given a provider identifier with no registered descriptor
    #[error("unsupported provider '{0}' (expected one of: anthropic, openai, gemini, mistral, xai, openrouter)")]
    UnsupportedProvider(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// `Observ` spawns its delivery workers on the current tokio runtime
    #[error("no tokio runtime available; construct Observ from within a runtime")]
    NoRuntime,

    #[error("failed to initialise trace sink: {0}")]
    Sink(String),
}

pub type Result<T> = std::result::Result<T, ObservError>;
