//! `Traced<C>` implementations of each provider client trait.
//!
//! | Surface | Trait | Traced methods |
//! |---------|-------|----------------|
//! | Anthropic | [`AnthropicMessages`](observ_llm::AnthropicMessages) | `messages.create`, `messages.stream` |
//! | OpenAI, xAI, OpenRouter | [`ChatCompletions`](observ_llm::ChatCompletions) | `chat.completions.create`, `chat.completions.stream` |
//! | Gemini | [`GenerativeModel`](observ_llm::GenerativeModel) | `generate_content`, `generate_content_stream` |
//! | Mistral | [`MistralChat`](observ_llm::MistralChat) | `chat.complete`, `chat.stream` |

pub mod anthropic;
pub mod gemini;
pub mod mistral;
pub mod openai;
