//! # Observ
//!
//! Transparent tracing for LLM provider clients.
//!
//! Wrap an existing client once and keep using it exactly as before: every
//! call is timed, summarized into a [`Trace`] and shipped to the Observ
//! backend in the background. Return values and errors are passed through
//! untouched, and a slow or unreachable backend never slows the call down.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use observ::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let observ = Observ::builder(std::env::var("OBSERV_API_KEY")?)
//!         .environment("staging")
//!         .build()?;
//!
//!     let client = observ.openai(my_openai_client());
//!     let reply = client
//!         .with_metadata([("user_id", "u-42")])
//!         .create(ChatCompletionRequest::new(
//!             "gpt-4o",
//!             vec![ChatCompletionMessage::user("Hello!")],
//!         ))
//!         .await?;
//!
//!     println!("{}", reply.content().unwrap_or_default());
//!     observ.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Crates
//!
//! - [`observ_llm`]: provider client traits and wire types
//! - [`observ_observability`]: trace model, dispatcher and HTTP sink
//! - this crate: registry, interceptor, metadata and recall

pub mod config;
pub mod descriptor;
pub mod error;
pub mod interceptor;
pub mod metadata;
pub mod observ;
pub mod prelude;
pub mod providers;
pub mod recall;
pub mod traced;

pub use config::ObservConfig;
pub use descriptor::{lookup, CallDescriptor, ProviderDescriptor, ProviderId, Surface, PROVIDERS};
pub use error::{ObservError, Result};
pub use interceptor::{CallSite, Interceptor};
pub use metadata::MetadataContext;
pub use observ::{Observ, ObservBuilder};
pub use recall::{CachedResult, MemoryRecall, RecallGate, RecallKey, RecallStore};
pub use traced::Traced;

pub use observ_llm;
pub use observ_observability;
pub use observ_observability::{
    DispatchError, DispatchStats, ErrorDetail, FlushReport, Metadata, Outcome, OverflowPolicy, Trace, TraceSink,
};
