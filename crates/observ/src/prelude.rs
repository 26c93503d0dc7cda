//! Convenient re-exports for common use cases
//!
//! ```rust,ignore
//! use observ::prelude::*;
//! ```

pub use crate::{MemoryRecall, MetadataContext, Observ, ObservConfig, ObservError, RecallStore, Traced};

pub use observ_llm::anthropic::{MessageParam, MessageParams, MessageStreamEvent};
pub use observ_llm::gemini::GenerateContentRequest;
pub use observ_llm::openai::{ChatCompletionChunk, ChatCompletionMessage, ChatCompletionRequest};
pub use observ_llm::{AnthropicMessages, ChatCompletions, ChatMessage, GenerativeModel, MistralChat, TokenUsage};

pub use observ_observability::{FlushReport, Outcome, OverflowPolicy, Trace};
