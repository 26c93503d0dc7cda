#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use observ::{DispatchError, Observ, ObservBuilder, Trace, TraceSink};
use observ_llm::anthropic::{
    AnthropicMessages, ContentBlock, ContentDelta, Message, MessageParams, MessageStreamEvent, Role, Usage,
};
use observ_llm::gemini::{Candidate, Content, GenerateContentRequest, GenerateContentResponse, GenerativeModel};
use observ_llm::mistral::MistralChat;
use observ_llm::openai::{
    ChatCompletion, ChatCompletionChunk, ChatCompletionMessage, ChatCompletionRequest, ChatCompletions, Choice,
    ChunkChoice, CompletionUsage, Delta,
};
use observ_llm::ProviderStream;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StubError {
    #[error("rate limited: retry after {0}s")]
    RateLimited(u32),
    #[error("stream interrupted")]
    Interrupted,
}

/// Collects every delivered trace in memory
#[derive(Default)]
pub struct RecordingSink {
    traces: Mutex<Vec<Trace>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn traces(&self) -> Vec<Trace> {
        self.traces.lock().unwrap().clone()
    }

    /// Wait until `count` traces arrived, then return them
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<Trace> {
        let deadline = Instant::now() + timeout;
        loop {
            let traces = self.traces();
            if traces.len() >= count || Instant::now() >= deadline {
                return traces;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl TraceSink for RecordingSink {
    async fn send(&self, trace: &Trace) -> Result<(), DispatchError> {
        self.traces.lock().unwrap().push(trace.clone());
        Ok(())
    }
}

pub fn builder(sink: Arc<RecordingSink>) -> ObservBuilder {
    Observ::builder("test-key")
        .environment("test")
        .project_id("proj-1")
        .sink(sink)
}

pub fn observ(sink: Arc<RecordingSink>) -> Observ {
    builder(sink).build().unwrap()
}

pub fn chat_request(model: &str, prompt: &str) -> ChatCompletionRequest {
    ChatCompletionRequest::new(model, vec![ChatCompletionMessage::user(prompt)])
}

/// OpenAI-shaped client answering every prompt with `reply` after `delay`
pub struct StubChat {
    pub reply: String,
    pub delay: Duration,
    pub fail: Option<StubError>,
    pub calls: AtomicUsize,
}

impl StubChat {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            delay: Duration::ZERO,
            fail: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(error: StubError) -> Self {
        Self {
            fail: Some(error),
            ..Self::replying("")
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn completion(&self, model: &str) -> ChatCompletion {
        ChatCompletion {
            id: "chatcmpl-1".to_string(),
            object: "chat.completion".to_string(),
            created: 1_700_000_000,
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: ChatCompletionMessage::assistant(self.reply.clone()),
                finish_reason: Some("stop".to_string()),
            }],
            usage: Some(CompletionUsage {
                prompt_tokens: 5,
                completion_tokens: 2,
                total_tokens: 7,
            }),
        }
    }

    fn chunks(&self, model: &str) -> Vec<ChatCompletionChunk> {
        let words: Vec<String> = self.reply.split_inclusive(' ').map(str::to_string).collect();
        let last = words.len().saturating_sub(1);
        words
            .into_iter()
            .enumerate()
            .map(|(i, word)| ChatCompletionChunk {
                id: "chatcmpl-1".to_string(),
                object: "chat.completion.chunk".to_string(),
                created: 1_700_000_000,
                model: model.to_string(),
                choices: vec![ChunkChoice {
                    index: 0,
                    delta: Delta {
                        role: None,
                        content: Some(word),
                    },
                    finish_reason: (i == last).then(|| "stop".to_string()),
                }],
                usage: None,
            })
            .collect()
    }

    async fn respond(&self, request: &ChatCompletionRequest) -> Result<ChatCompletion, StubError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // No timer when undelayed, so the stub also runs outside tokio
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.fail {
            Some(err) => Err(err.clone()),
            None => Ok(self.completion(&request.model)),
        }
    }

    /// Chunks separated by `delay`; `fail` turns the last chunk into an error
    fn respond_stream(&self, request: &ChatCompletionRequest) -> ProviderStream<ChatCompletionChunk, StubError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let chunks = self.chunks(&request.model);
        let delay = self.delay;
        let fail = self.fail.clone();

        Box::pin(async_stream::stream! {
            let count = chunks.len();
            for (i, chunk) in chunks.into_iter().enumerate() {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                match (&fail, i + 1 == count) {
                    (Some(err), true) => {
                        yield Err(err.clone());
                    }
                    _ => {
                        yield Ok(chunk);
                    }
                }
            }
        })
    }
}

#[async_trait]
impl ChatCompletions for StubChat {
    type Error = StubError;

    async fn create(&self, request: ChatCompletionRequest) -> Result<ChatCompletion, StubError> {
        self.respond(&request).await
    }

    async fn create_stream(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ProviderStream<ChatCompletionChunk, StubError>, StubError> {
        Ok(self.respond_stream(&request))
    }
}

#[async_trait]
impl MistralChat for StubChat {
    type Error = StubError;

    async fn complete(&self, request: ChatCompletionRequest) -> Result<ChatCompletion, StubError> {
        self.respond(&request).await
    }

    async fn stream(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ProviderStream<ChatCompletionChunk, StubError>, StubError> {
        Ok(self.respond_stream(&request))
    }
}

/// Anthropic-shaped client
pub struct StubAnthropic {
    pub reply: String,
    pub calls: AtomicUsize,
}

impl StubAnthropic {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    fn message(&self, model: &str) -> Message {
        Message {
            id: "msg_1".to_string(),
            model: model.to_string(),
            role: Role::Assistant,
            content: vec![ContentBlock::Text {
                text: self.reply.clone(),
            }],
            stop_reason: Some("end_turn".to_string()),
            usage: Usage {
                input_tokens: 12,
                output_tokens: 3,
            },
        }
    }
}

#[async_trait]
impl AnthropicMessages for StubAnthropic {
    type Error = StubError;

    async fn create(&self, params: MessageParams) -> Result<Message, StubError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.message(&params.model))
    }

    async fn stream(
        &self,
        params: MessageParams,
    ) -> Result<ProviderStream<MessageStreamEvent, StubError>, StubError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut start = self.message(&params.model);
        start.content.clear();
        let reply = self.reply.clone();

        let events = vec![
            Ok(MessageStreamEvent::MessageStart { message: start }),
            Ok(MessageStreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentDelta::TextDelta { text: reply },
            }),
            Ok(MessageStreamEvent::MessageStop),
        ];
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

/// Gemini-shaped client bound to one model
pub struct StubGemini {
    pub model: String,
    pub reply: String,
}

impl StubGemini {
    pub fn new(model: &str, reply: &str) -> Self {
        Self {
            model: model.to_string(),
            reply: reply.to_string(),
        }
    }

    fn response(&self) -> GenerateContentResponse {
        GenerateContentResponse {
            candidates: vec![Candidate {
                content: Content::model(self.reply.clone()),
                finish_reason: Some("STOP".to_string()),
            }],
            usage_metadata: None,
        }
    }
}

#[async_trait]
impl GenerativeModel for StubGemini {
    type Error = StubError;

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate_content(&self, _request: GenerateContentRequest) -> Result<GenerateContentResponse, StubError> {
        Ok(self.response())
    }

    async fn generate_content_stream(
        &self,
        _request: GenerateContentRequest,
    ) -> Result<ProviderStream<GenerateContentResponse, StubError>, StubError> {
        Ok(Box::pin(futures::stream::iter(vec![Ok(self.response())])))
    }
}
