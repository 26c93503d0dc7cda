use async_trait::async_trait;
use observ_llm::mistral::MistralChat;
use observ_llm::openai::{ChatCompletion, ChatCompletionChunk, ChatCompletionRequest};
use observ_llm::ProviderStream;

use super::openai::{
    chunk_summary, chunks_from_cache, completion_from_cache, completion_summary, request_input, request_model,
};
use crate::descriptor::{CallDescriptor, Surface};
use crate::traced::Traced;

pub(crate) static MISTRAL_CHAT: CallDescriptor<ChatCompletionRequest, ChatCompletion, ChatCompletionChunk> =
    CallDescriptor {
        surface: Surface::MistralChat,
        method: "chat.complete",
        stream_method: "chat.stream",
        model: request_model,
        input: request_input,
        response: completion_summary,
        chunk: chunk_summary,
        response_from_cache: completion_from_cache,
        chunks_from_cache: chunks_from_cache,
    };

#[async_trait]
impl<C: MistralChat> MistralChat for Traced<C> {
    type Error = C::Error;

    async fn complete(&self, request: ChatCompletionRequest) -> Result<ChatCompletion, Self::Error> {
        let inner = self.inner();
        self.interceptor()
            .intercept(self.site(None), &MISTRAL_CHAT, request, |request| inner.complete(request))
            .await
    }

    async fn stream(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ProviderStream<ChatCompletionChunk, Self::Error>, Self::Error> {
        let inner = self.inner();
        self.interceptor()
            .intercept_stream(self.site(None), &MISTRAL_CHAT, request, |request| inner.stream(request))
            .await
    }
}
