// Mistral chat surface (`client.chat.complete` / `client.chat.stream`)
//
// Mistral's wire format is OpenAI-compatible, so request and response types
// are shared with the `openai` module; only the client surface differs.

use crate::openai::{ChatCompletion, ChatCompletionChunk, ChatCompletionRequest};
use crate::types::ProviderStream;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait MistralChat: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn complete(&self, request: ChatCompletionRequest) -> Result<ChatCompletion, Self::Error>;

    async fn stream(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ProviderStream<ChatCompletionChunk, Self::Error>, Self::Error>;
}

#[async_trait]
impl<T: MistralChat + ?Sized> MistralChat for Arc<T> {
    type Error = T::Error;

    async fn complete(&self, request: ChatCompletionRequest) -> Result<ChatCompletion, Self::Error> {
        (**self).complete(request).await
    }

    async fn stream(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ProviderStream<ChatCompletionChunk, Self::Error>, Self::Error> {
        (**self).stream(request).await
    }
}
