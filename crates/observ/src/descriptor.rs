//! Provider registry and per-surface call descriptors.
//!
//! Adding a provider means adding a [`ProviderDescriptor`] row and, when it
//! brings a new SDK shape, one [`CallDescriptor`] static. The interceptor has
//! no per-provider branches.

use std::fmt;
use std::str::FromStr;

use observ_llm::ChatMessage;
use observ_observability::OutputSummary;
use serde::Serialize;

use crate::error::{ObservError, Result};
use crate::recall::CachedResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Anthropic,
    OpenAI,
    Gemini,
    Mistral,
    XAI,
    OpenRouter,
}

impl ProviderId {
    pub const ALL: [ProviderId; 6] = [
        ProviderId::Anthropic,
        ProviderId::OpenAI,
        ProviderId::Gemini,
        ProviderId::Mistral,
        ProviderId::XAI,
        ProviderId::OpenRouter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Anthropic => "anthropic",
            ProviderId::OpenAI => "openai",
            ProviderId::Gemini => "gemini",
            ProviderId::Mistral => "mistral",
            ProviderId::XAI => "xai",
            ProviderId::OpenRouter => "openrouter",
        }
    }

    pub fn descriptor(self) -> &'static ProviderDescriptor {
        match self {
            ProviderId::Anthropic => &PROVIDERS[0],
            ProviderId::OpenAI => &PROVIDERS[1],
            ProviderId::Gemini => &PROVIDERS[2],
            ProviderId::Mistral => &PROVIDERS[3],
            ProviderId::XAI => &PROVIDERS[4],
            ProviderId::OpenRouter => &PROVIDERS[5],
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ObservError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        ProviderId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ObservError::UnsupportedProvider(wanted.to_string()))
    }
}

/// Which client trait a provider's SDK exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Messages,
    ChatCompletions,
    GenerativeModel,
    MistralChat,
}

impl Surface {
    /// The provider whose SDK defines this surface
    pub fn home(self) -> ProviderId {
        match self {
            Surface::Messages => ProviderId::Anthropic,
            Surface::ChatCompletions => ProviderId::OpenAI,
            Surface::GenerativeModel => ProviderId::Gemini,
            Surface::MistralChat => ProviderId::Mistral,
        }
    }
}

/// Static registry row
#[derive(Debug, Serialize)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub display_name: &'static str,
    /// Recorded when a request does not name its model
    pub default_model: &'static str,
    pub surface: Surface,
    /// Traceable method paths
    pub methods: &'static [&'static str],
}

impl ProviderDescriptor {
    pub fn name(&self) -> &'static str {
        self.id.as_str()
    }

    pub fn traces(&self, method: &str) -> bool {
        self.methods.contains(&method)
    }

    /// Whether calls described by `call` belong to this provider
    pub fn accepts<Req, Resp, Chunk>(&self, call: &CallDescriptor<Req, Resp, Chunk>, streamed: bool) -> bool {
        self.surface == call.surface && self.traces(call.method(streamed))
    }
}

const MESSAGES_METHODS: &[&str] = &["messages.create", "messages.stream"];
const CHAT_COMPLETIONS_METHODS: &[&str] = &["chat.completions.create", "chat.completions.stream"];
const GENERATIVE_MODEL_METHODS: &[&str] = &["generate_content", "generate_content_stream"];
const MISTRAL_METHODS: &[&str] = &["chat.complete", "chat.stream"];

pub static PROVIDERS: [ProviderDescriptor; 6] = [
    ProviderDescriptor {
        id: ProviderId::Anthropic,
        display_name: "Anthropic",
        default_model: "claude-3-5-sonnet-20241022",
        surface: Surface::Messages,
        methods: MESSAGES_METHODS,
    },
    ProviderDescriptor {
        id: ProviderId::OpenAI,
        display_name: "OpenAI",
        default_model: "gpt-4o",
        surface: Surface::ChatCompletions,
        methods: CHAT_COMPLETIONS_METHODS,
    },
    ProviderDescriptor {
        id: ProviderId::Gemini,
        display_name: "Google Gemini",
        default_model: "gemini-pro",
        surface: Surface::GenerativeModel,
        methods: GENERATIVE_MODEL_METHODS,
    },
    ProviderDescriptor {
        id: ProviderId::Mistral,
        display_name: "Mistral",
        default_model: "mistral-large-latest",
        surface: Surface::MistralChat,
        methods: MISTRAL_METHODS,
    },
    ProviderDescriptor {
        id: ProviderId::XAI,
        display_name: "xAI",
        default_model: "grok-beta",
        surface: Surface::ChatCompletions,
        methods: CHAT_COMPLETIONS_METHODS,
    },
    ProviderDescriptor {
        id: ProviderId::OpenRouter,
        display_name: "OpenRouter",
        default_model: "openrouter/auto",
        surface: Surface::ChatCompletions,
        methods: CHAT_COMPLETIONS_METHODS,
    },
];

/// Resolve a user-supplied identifier, ignoring case and surrounding spaces
pub fn lookup(provider: &str) -> Result<&'static ProviderDescriptor> {
    provider.parse::<ProviderId>().map(ProviderId::descriptor)
}

/// How to instrument one client surface, as plain function pointers.
///
/// `Resp` is the whole-response type and `Chunk` the streamed item type.
/// Extractors must not panic, but if one does the call continues untraced.
pub struct CallDescriptor<Req, Resp, Chunk> {
    pub surface: Surface,
    pub method: &'static str,
    pub stream_method: &'static str,
    pub model: fn(&Req) -> Option<String>,
    pub input: fn(&Req) -> Vec<ChatMessage>,
    pub response: fn(&Resp) -> OutputSummary,
    pub chunk: fn(&Chunk) -> OutputSummary,
    /// Rebuild a response from a recall hit; the second argument is the model
    pub response_from_cache: fn(&CachedResult, &str) -> Resp,
    /// Events replayed as the stream of a recall hit
    pub chunks_from_cache: fn(&CachedResult, &str) -> Vec<Chunk>,
}

impl<Req, Resp, Chunk> CallDescriptor<Req, Resp, Chunk> {
    pub fn method(&self, streamed: bool) -> &'static str {
        if streamed {
            self.stream_method
        } else {
            self.method
        }
    }
}

impl<Req, Resp, Chunk> fmt::Debug for CallDescriptor<Req, Resp, Chunk> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallDescriptor")
            .field("surface", &self.surface)
            .field("method", &self.method)
            .field("stream_method", &self.stream_method)
            .finish_non_exhaustive()
    }
}
