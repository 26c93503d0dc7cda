use async_trait::async_trait;
use observ_llm::gemini::{
    Candidate, Content, GenerateContentRequest, GenerateContentResponse, GenerativeModel, UsageMetadata,
};
use observ_llm::{ChatMessage, ProviderStream, TokenUsage};
use observ_observability::OutputSummary;

use crate::descriptor::{CallDescriptor, Surface};
use crate::recall::CachedResult;
use crate::traced::Traced;

pub(crate) static GENERATIVE_MODEL: CallDescriptor<
    GenerateContentRequest,
    GenerateContentResponse,
    GenerateContentResponse,
> = CallDescriptor {
    surface: Surface::GenerativeModel,
    method: "generate_content",
    stream_method: "generate_content_stream",
    model: request_model,
    input: request_input,
    response: response_summary,
    chunk: response_summary,
    response_from_cache: response_from_cache,
    chunks_from_cache: chunks_from_cache,
};

/// The model lives on the client; see the `site` override in the impl below
fn request_model(_request: &GenerateContentRequest) -> Option<String> {
    None
}

fn role(content: &Content) -> &str {
    match content.role.as_deref() {
        Some("model") => "assistant",
        Some(role) => role,
        None => "user",
    }
}

fn request_input(request: &GenerateContentRequest) -> Vec<ChatMessage> {
    request
        .system_instruction
        .iter()
        .map(|system| ChatMessage::system(system.text()))
        .chain(
            request
                .contents
                .iter()
                .map(|content| ChatMessage::new(role(content), content.text())),
        )
        .collect()
}

fn response_summary(response: &GenerateContentResponse) -> OutputSummary {
    OutputSummary::new(
        response.text(),
        response.usage_metadata.map(|u| TokenUsage {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        }),
    )
}

fn response_from_cache(cached: &CachedResult, _model: &str) -> GenerateContentResponse {
    GenerateContentResponse {
        candidates: vec![Candidate {
            content: Content::model(cached.content.clone()),
            finish_reason: Some("STOP".to_string()),
        }],
        usage_metadata: cached.usage.map(|u| UsageMetadata {
            prompt_token_count: u.input_tokens,
            candidates_token_count: u.output_tokens,
            total_token_count: u.total_tokens,
        }),
    }
}

fn chunks_from_cache(cached: &CachedResult, model: &str) -> Vec<GenerateContentResponse> {
    vec![response_from_cache(cached, model)]
}

#[async_trait]
impl<C: GenerativeModel> GenerativeModel for Traced<C> {
    type Error = C::Error;

    fn model_name(&self) -> &str {
        self.inner().model_name()
    }

    async fn generate_content(&self, request: GenerateContentRequest) -> Result<GenerateContentResponse, Self::Error> {
        let inner = self.inner();
        self.interceptor()
            .intercept(self.site(Some(inner.model_name())), &GENERATIVE_MODEL, request, |request| {
                inner.generate_content(request)
            })
            .await
    }

    async fn generate_content_stream(
        &self,
        request: GenerateContentRequest,
    ) -> Result<ProviderStream<GenerateContentResponse, Self::Error>, Self::Error> {
        let inner = self.inner();
        self.interceptor()
            .intercept_stream(self.site(Some(inner.model_name())), &GENERATIVE_MODEL, request, |request| {
                inner.generate_content_stream(request)
            })
            .await
    }
}
