//! Provider call surfaces.
//!
//! Each module mirrors the shape of one provider SDK: its request and response
//! types plus a client trait with the SDK's method names. A real SDK client (or
//! a thin adapter over one) implements the trait; Observ wraps any implementor
//! and reports every call without changing its result or error.
//!
//! | Provider            | Trait                          | Methods                                    |
//! |---------------------|--------------------------------|--------------------------------------------|
//! | Anthropic           | [`AnthropicMessages`]          | `create`, `stream`                         |
//! | OpenAI / xAI / OpenRouter | [`ChatCompletions`]      | `create`, `create_stream`                  |
//! | Gemini              | [`GenerativeModel`]            | `generate_content`, `generate_content_stream` |
//! | Mistral             | [`MistralChat`]                | `complete`, `stream`                       |

pub mod anthropic;
pub mod gemini;
pub mod mistral;
pub mod openai;
pub mod types;

pub use anthropic::AnthropicMessages;
pub use gemini::GenerativeModel;
pub use mistral::MistralChat;
pub use openai::ChatCompletions;
pub use types::{ChatMessage, ProviderStream, TokenUsage};
