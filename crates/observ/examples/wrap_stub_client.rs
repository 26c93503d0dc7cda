use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use observ::prelude::*;
use observ_llm::openai::{ChatCompletion, Choice, ChunkChoice, Delta};
use observ_llm::ProviderStream;

/// Stand-in for a real OpenAI client so the example runs offline
struct EchoClient;

#[derive(Debug, thiserror::Error)]
#[error("echo client failure")]
struct EchoError;

fn last_prompt(request: &ChatCompletionRequest) -> String {
    request
        .messages
        .last()
        .and_then(|m| m.content.clone())
        .unwrap_or_default()
}

#[async_trait]
impl ChatCompletions for EchoClient {
    type Error = EchoError;

    async fn create(&self, request: ChatCompletionRequest) -> Result<ChatCompletion, EchoError> {
        Ok(ChatCompletion {
            id: "echo-1".to_string(),
            object: "chat.completion".to_string(),
            created: 0,
            model: request.model.clone(),
            choices: vec![Choice {
                index: 0,
                message: ChatCompletionMessage::assistant(format!("You said: {}", last_prompt(&request))),
                finish_reason: Some("stop".to_string()),
            }],
            usage: None,
        })
    }

    async fn create_stream(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ProviderStream<ChatCompletionChunk, EchoError>, EchoError> {
        let model = request.model.clone();
        let chunks: Vec<Result<ChatCompletionChunk, EchoError>> = last_prompt(&request)
            .split_inclusive(' ')
            .map(|word| {
                Ok(ChatCompletionChunk {
                    id: "echo-1".to_string(),
                    object: "chat.completion.chunk".to_string(),
                    created: 0,
                    model: model.clone(),
                    choices: vec![ChunkChoice {
                        index: 0,
                        delta: Delta {
                            role: None,
                            content: Some(word.to_string()),
                        },
                        finish_reason: None,
                    }],
                    usage: None,
                })
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    // OBSERV_API_KEY / OBSERV_BACKEND_URL override the defaults below
    let mut config = ObservConfig::from_env()?;
    if config.api_key.is_empty() {
        config.api_key = "demo-key".to_string();
    }
    config.environment = "development".to_string();

    let observ = Observ::new(config)?;
    let client = observ.openai(EchoClient);

    let reply = client
        .with_metadata([("user_id", "u-42"), ("feature", "demo")])
        .with_session_id("session-1")
        .create(ChatCompletionRequest::new(
            "gpt-4o",
            vec![ChatCompletionMessage::user("What is the capital of France?")],
        ))
        .await?;
    println!("Response: {}", reply.content().unwrap_or_default());

    let mut stream = client
        .create_stream(ChatCompletionRequest::new(
            "gpt-4o",
            vec![ChatCompletionMessage::user("streaming works too")],
        ))
        .await?;
    print!("Streamed:");
    while let Some(chunk) = stream.next().await {
        print!(" {}", chunk?.content().unwrap_or_default().trim());
    }
    println!();

    let report = observ.shutdown().await;
    println!(
        "Delivered {} traces ({} abandoned, timed out: {})",
        report.delivered, report.abandoned, report.timed_out
    );

    Ok(())
}
