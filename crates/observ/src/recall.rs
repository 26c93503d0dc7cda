//! Response recall: an optional cache consulted before calling the provider.
//!
//! The store itself lives outside this crate behind [`RecallStore`]. Every
//! interaction with it is best-effort: errors, panics and slow lookups all
//! count as a miss and are only logged.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures::FutureExt;
use observ_llm::{ChatMessage, TokenUsage};
use observ_observability::{Metadata, OutputSummary};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::duration_ms;

/// Deterministic cache key: SHA-256 hex over a canonical JSON encoding of
/// provider, model, normalized input and the allow-listed metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecallKey(String);

#[derive(Serialize)]
struct KeyMaterial<'a> {
    provider: &'a str,
    model: &'a str,
    input: &'a [ChatMessage],
    metadata: Metadata,
}

impl RecallKey {
    pub fn derive(
        provider: &str,
        model: &str,
        input: &[ChatMessage],
        metadata: &Metadata,
        allow_list: &[String],
    ) -> anyhow::Result<Self> {
        let metadata = metadata
            .iter()
            .filter(|(key, _)| allow_list.iter().any(|allowed| allowed == *key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let material = KeyMaterial {
            provider,
            model,
            input,
            metadata,
        };
        let canonical = serde_json::to_vec(&material).context("Failed to encode recall key material")?;

        Ok(Self(format!("{:x}", Sha256::digest(&canonical))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What gets remembered for a successful call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResult {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl CachedResult {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Only calls that produced text are worth remembering
    pub fn from_summary(summary: &OutputSummary) -> Option<Self> {
        summary.output.as_ref().map(|content| Self {
            content: content.clone(),
            usage: summary.usage,
        })
    }

    pub fn summary(&self) -> OutputSummary {
        OutputSummary::new(Some(self.content.clone()), self.usage)
    }
}

/// Backing store for recall. Must tolerate concurrent lookups and stores.
#[async_trait]
pub trait RecallStore: Send + Sync {
    async fn lookup(&self, key: &RecallKey) -> anyhow::Result<Option<CachedResult>>;

    async fn store(&self, key: &RecallKey, value: CachedResult) -> anyhow::Result<()>;
}

/// In-process store, mostly for tests and local development
#[derive(Debug, Default)]
pub struct MemoryRecall {
    entries: Mutex<HashMap<RecallKey, CachedResult>>,
}

impl MemoryRecall {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert(&self, key: RecallKey, value: CachedResult) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }
}

#[async_trait]
impl RecallStore for MemoryRecall {
    async fn lookup(&self, key: &RecallKey) -> anyhow::Result<Option<CachedResult>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn store(&self, key: &RecallKey, value: CachedResult) -> anyhow::Result<()> {
        self.insert(key.clone(), value);
        Ok(())
    }
}

/// The interceptor's view of a [`RecallStore`]: bounded, infallible.
#[derive(Clone)]
pub struct RecallGate {
    store: Arc<dyn RecallStore>,
    timeout: Duration,
    metadata_keys: Arc<[String]>,
}

impl RecallGate {
    pub fn new(store: Arc<dyn RecallStore>, timeout: Duration, metadata_keys: Vec<String>) -> Self {
        Self {
            store,
            timeout,
            metadata_keys: metadata_keys.into(),
        }
    }

    pub fn key(
        &self,
        provider: &str,
        model: &str,
        input: &[ChatMessage],
        metadata: &Metadata,
    ) -> anyhow::Result<RecallKey> {
        RecallKey::derive(provider, model, input, metadata, &self.metadata_keys)
    }

    /// `None` on a miss, on a store failure, or when the store is too slow.
    /// Outside a tokio runtime the timer is unavailable, so every lookup misses.
    pub async fn lookup(&self, key: &RecallKey) -> Option<CachedResult> {
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!(key = %key, "no runtime available; treating recall lookup as miss");
            return None;
        }

        let lookup = AssertUnwindSafe(self.store.lookup(key)).catch_unwind();

        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(Ok(hit))) => {
                tracing::debug!(key = %key, hit = hit.is_some(), "recall lookup");
                hit
            }
            Ok(Ok(Err(err))) => {
                tracing::warn!(key = %key, error = %err, "recall lookup failed; treating as miss");
                None
            }
            Ok(Err(_)) => {
                tracing::warn!(key = %key, "recall store panicked during lookup; treating as miss");
                None
            }
            Err(_) => {
                tracing::warn!(
                    key = %key,
                    timeout_ms = duration_ms(self.timeout),
                    "recall lookup timed out; treating as miss"
                );
                None
            }
        }
    }

    /// Fire-and-forget store on the current runtime
    pub fn store_in_background(&self, key: RecallKey, value: CachedResult) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(key = %key, "no runtime available; skipping recall store");
            return;
        };

        let store = Arc::clone(&self.store);
        runtime.spawn(async move {
            if let Err(err) = store.store(&key, value).await {
                tracing::warn!(key = %key, error = %err, "failed to store recall entry");
            }
        });
    }
}

impl fmt::Debug for RecallGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecallGate")
            .field("timeout", &self.timeout)
            .field("metadata_keys", &self.metadata_keys)
            .finish_non_exhaustive()
    }
}
