use async_trait::async_trait;
use observ_llm::anthropic::{
    AnthropicMessages, ContentBlock, ContentDelta, DeltaUsage, Message, MessageDeltaBody, MessageParams,
    MessageStreamEvent, Role, Usage,
};
use observ_llm::{ChatMessage, ProviderStream, TokenUsage};
use observ_observability::OutputSummary;

use crate::descriptor::{CallDescriptor, Surface};
use crate::recall::CachedResult;
use crate::traced::Traced;

pub(crate) static MESSAGES: CallDescriptor<MessageParams, Message, MessageStreamEvent> = CallDescriptor {
    surface: Surface::Messages,
    method: "messages.create",
    stream_method: "messages.stream",
    model: request_model,
    input: request_input,
    response: message_summary,
    chunk: event_summary,
    response_from_cache: message_from_cache,
    chunks_from_cache: events_from_cache,
};

fn request_model(params: &MessageParams) -> Option<String> {
    Some(params.model.clone())
}

/// The top-level system prompt becomes a leading "system" message
fn request_input(params: &MessageParams) -> Vec<ChatMessage> {
    params
        .system
        .iter()
        .map(|system| ChatMessage::system(system.as_str()))
        .chain(
            params
                .messages
                .iter()
                .map(|m| ChatMessage::new(m.role.as_str(), m.content.text())),
        )
        .collect()
}

fn usage(usage: &Usage) -> TokenUsage {
    TokenUsage::new(usage.input_tokens, usage.output_tokens)
}

fn message_summary(message: &Message) -> OutputSummary {
    OutputSummary::new(Some(message.text()), Some(usage(&message.usage)))
}

fn event_summary(event: &MessageStreamEvent) -> OutputSummary {
    match event {
        MessageStreamEvent::MessageStart { message } => OutputSummary::new(None, Some(usage(&message.usage))),
        MessageStreamEvent::ContentBlockDelta {
            delta: ContentDelta::TextDelta { text },
            ..
        } => OutputSummary::new(Some(text.clone()), None),
        MessageStreamEvent::MessageDelta { usage, .. } => {
            OutputSummary::new(None, Some(TokenUsage::new(0, usage.output_tokens)))
        }
        _ => OutputSummary::default(),
    }
}

fn message_from_cache(cached: &CachedResult, model: &str) -> Message {
    let usage = cached.usage.unwrap_or_default();
    Message {
        id: "msg_recall".to_string(),
        model: model.to_string(),
        role: Role::Assistant,
        content: vec![ContentBlock::Text {
            text: cached.content.clone(),
        }],
        stop_reason: Some("end_turn".to_string()),
        usage: Usage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        },
    }
}

/// Replays a complete event sequence so consumers see a well-formed stream
fn events_from_cache(cached: &CachedResult, model: &str) -> Vec<MessageStreamEvent> {
    let mut start = message_from_cache(cached, model);
    let output_tokens = start.usage.output_tokens;
    start.content.clear();
    start.stop_reason = None;

    vec![
        MessageStreamEvent::MessageStart { message: start },
        MessageStreamEvent::ContentBlockStart {
            index: 0,
            content_block: ContentBlock::Text { text: String::new() },
        },
        MessageStreamEvent::ContentBlockDelta {
            index: 0,
            delta: ContentDelta::TextDelta {
                text: cached.content.clone(),
            },
        },
        MessageStreamEvent::ContentBlockStop { index: 0 },
        MessageStreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some("end_turn".to_string()),
            },
            usage: DeltaUsage { output_tokens },
        },
        MessageStreamEvent::MessageStop,
    ]
}

#[async_trait]
impl<C: AnthropicMessages> AnthropicMessages for Traced<C> {
    type Error = C::Error;

    async fn create(&self, params: MessageParams) -> Result<Message, Self::Error> {
        let inner = self.inner();
        self.interceptor()
            .intercept(self.site(None), &MESSAGES, params, |params| inner.create(params))
            .await
    }

    async fn stream(
        &self,
        params: MessageParams,
    ) -> Result<ProviderStream<MessageStreamEvent, Self::Error>, Self::Error> {
        let inner = self.inner();
        self.interceptor()
            .intercept_stream(self.site(None), &MESSAGES, params, |params| inner.stream(params))
            .await
    }
}
