pub mod dispatcher;
pub mod recorder;
pub mod sink;
pub mod types;

#[cfg(feature = "http")]
pub mod http;

// Re-export main types
pub use dispatcher::{DispatchStats, Dispatcher, DispatcherConfig, FlushReport, OverflowPolicy};
pub use recorder::{Completion, TraceRecorder, TraceStart};
pub use sink::{DispatchError, TraceSink};
pub use types::{ErrorDetail, Metadata, Outcome, OutputSummary, TokenUsage, Trace};

#[cfg(feature = "http")]
pub use http::HttpSink;
