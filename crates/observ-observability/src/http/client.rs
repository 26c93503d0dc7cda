use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::sink::{DispatchError, TraceSink};
use crate::types::Trace;

/// HTTP client for the Observ ingestion API
///
/// Posts each trace as JSON to `{backend_url}/api/v1/traces`, authenticated
/// with the SDK API key as a bearer token.
pub struct HttpSink {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpSink {
    /// Create a new sink
    ///
    /// # Arguments
    /// * `backend_url` - Base URL of the telemetry backend (e.g., "http://localhost:8080")
    /// * `api_key` - Observ API key
    /// * `timeout` - Per-request timeout
    pub fn new(backend_url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/v1/traces", backend_url.trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Map a non-success response onto the retry taxonomy
    async fn handle_response(&self, response: reqwest::Response) -> Result<(), DispatchError> {
        let status = response.status();

        if status.is_success() {
            tracing::debug!(%status, "trace accepted by backend");
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read response body".to_string());
        let message = format!("{} - {}", status, body);

        if is_retryable(status) {
            Err(DispatchError::Transient(message))
        } else {
            Err(DispatchError::Permanent(message))
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

#[async_trait]
impl TraceSink for HttpSink {
    async fn send(&self, trace: &Trace) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(trace)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    DispatchError::Permanent(format!("invalid request: {}", e))
                } else {
                    DispatchError::Transient(format!("request failed: {}", e))
                }
            })?;

        self.handle_response(response).await
    }
}
