use async_trait::async_trait;
use observ_llm::openai::{
    ChatCompletion, ChatCompletionChunk, ChatCompletionMessage, ChatCompletionRequest, ChatCompletions, Choice,
    ChunkChoice, CompletionUsage, Delta,
};
use observ_llm::{ChatMessage, ProviderStream, TokenUsage};
use observ_observability::OutputSummary;

use crate::descriptor::{CallDescriptor, Surface};
use crate::recall::CachedResult;
use crate::traced::Traced;

pub(crate) static CHAT_COMPLETIONS: CallDescriptor<ChatCompletionRequest, ChatCompletion, ChatCompletionChunk> =
    CallDescriptor {
        surface: Surface::ChatCompletions,
        method: "chat.completions.create",
        stream_method: "chat.completions.stream",
        model: request_model,
        input: request_input,
        response: completion_summary,
        chunk: chunk_summary,
        response_from_cache: completion_from_cache,
        chunks_from_cache: chunks_from_cache,
    };

// The extractors below are shared with Mistral, whose wire format is the same.

pub(crate) fn request_model(request: &ChatCompletionRequest) -> Option<String> {
    Some(request.model.clone())
}

pub(crate) fn request_input(request: &ChatCompletionRequest) -> Vec<ChatMessage> {
    request
        .messages
        .iter()
        .map(|m| ChatMessage::new(m.role.as_str(), m.content.clone().unwrap_or_default()))
        .collect()
}

fn usage(usage: &CompletionUsage) -> TokenUsage {
    TokenUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    }
}

fn cached_usage(cached: &CachedResult) -> Option<CompletionUsage> {
    cached.usage.map(|u| CompletionUsage {
        prompt_tokens: u.input_tokens,
        completion_tokens: u.output_tokens,
        total_tokens: u.total_tokens,
    })
}

pub(crate) fn completion_summary(completion: &ChatCompletion) -> OutputSummary {
    OutputSummary::new(
        completion.content().map(str::to_string),
        completion.usage.as_ref().map(usage),
    )
}

pub(crate) fn chunk_summary(chunk: &ChatCompletionChunk) -> OutputSummary {
    OutputSummary::new(
        chunk.content().map(str::to_string),
        chunk.usage.as_ref().map(usage),
    )
}

pub(crate) fn completion_from_cache(cached: &CachedResult, model: &str) -> ChatCompletion {
    ChatCompletion {
        id: "chatcmpl-recall".to_string(),
        object: "chat.completion".to_string(),
        created: 0,
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: ChatCompletionMessage::assistant(cached.content.clone()),
            finish_reason: Some("stop".to_string()),
        }],
        usage: cached_usage(cached),
    }
}

pub(crate) fn chunks_from_cache(cached: &CachedResult, model: &str) -> Vec<ChatCompletionChunk> {
    vec![ChatCompletionChunk {
        id: "chatcmpl-recall".to_string(),
        object: "chat.completion.chunk".to_string(),
        created: 0,
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: Delta {
                role: Some("assistant".to_string()),
                content: Some(cached.content.clone()),
            },
            finish_reason: Some("stop".to_string()),
        }],
        usage: cached_usage(cached),
    }]
}

/// Serves OpenAI, xAI and OpenRouter clients alike
#[async_trait]
impl<C: ChatCompletions> ChatCompletions for Traced<C> {
    type Error = C::Error;

    async fn create(&self, request: ChatCompletionRequest) -> Result<ChatCompletion, Self::Error> {
        let inner = self.inner();
        self.interceptor()
            .intercept(self.site(None), &CHAT_COMPLETIONS, request, |request| inner.create(request))
            .await
    }

    async fn create_stream(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ProviderStream<ChatCompletionChunk, Self::Error>, Self::Error> {
        let inner = self.inner();
        self.interceptor()
            .intercept_stream(self.site(None), &CHAT_COMPLETIONS, request, |request| {
                inner.create_stream(request)
            })
            .await
    }
}
