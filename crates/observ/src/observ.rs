use std::sync::Arc;
use std::time::Duration;

use observ_llm::{AnthropicMessages, ChatCompletions, GenerativeModel, MistralChat};
use observ_observability::{DispatchStats, Dispatcher, FlushReport, HttpSink, OverflowPolicy, TraceSink};
use tokio::runtime::Handle;

use crate::config::{duration_ms, ObservConfig};
use crate::descriptor::{self, ProviderDescriptor, ProviderId, PROVIDERS};
use crate::error::{ObservError, Result};
use crate::interceptor::Interceptor;
use crate::recall::{RecallGate, RecallStore};
use crate::traced::Traced;

/// Entry point: owns the trace dispatcher and wraps provider clients.
///
/// Every client wrapped by one `Observ` shares its delivery queue and
/// workers. Call [`Observ::shutdown`] before exiting to flush pending traces.
pub struct Observ {
    config: ObservConfig,
    interceptor: Arc<Interceptor>,
}

impl Observ {
    pub fn builder(api_key: impl Into<String>) -> ObservBuilder {
        ObservBuilder::new(ObservConfig::new(api_key))
    }

    /// Build with the HTTP sink and no recall store
    pub fn new(config: ObservConfig) -> Result<Self> {
        ObservBuilder::new(config).build()
    }

    /// Wrap `client` for the provider named `provider` (case-insensitive).
    ///
    /// The returned handle implements whichever provider traits `C` does.
    /// Calls through a trait that `provider` does not expose (an OpenAI-style
    /// client wrapped as `"gemini"`, say) are recorded under the provider
    /// that owns that trait, with a warning. Prefer the typed constructors.
    pub fn wrap<C>(&self, provider: &str, client: C) -> Result<Traced<C>> {
        self.wrap_shared(provider, Arc::new(client))
    }

    /// Like [`Observ::wrap`] for a client that is already shared
    pub fn wrap_shared<C>(&self, provider: &str, client: Arc<C>) -> Result<Traced<C>> {
        let descriptor = descriptor::lookup(provider)?;
        Ok(self.traced(descriptor, client))
    }

    fn traced<C>(&self, provider: &'static ProviderDescriptor, client: Arc<C>) -> Traced<C> {
        tracing::debug!(provider = provider.name(), "wrapping provider client");
        Traced::new(client, provider, Arc::clone(&self.interceptor))
    }

    pub fn anthropic<C: AnthropicMessages>(&self, client: C) -> Traced<C> {
        self.traced(ProviderId::Anthropic.descriptor(), Arc::new(client))
    }

    pub fn openai<C: ChatCompletions>(&self, client: C) -> Traced<C> {
        self.traced(ProviderId::OpenAI.descriptor(), Arc::new(client))
    }

    pub fn gemini<C: GenerativeModel>(&self, client: C) -> Traced<C> {
        self.traced(ProviderId::Gemini.descriptor(), Arc::new(client))
    }

    pub fn mistral<C: MistralChat>(&self, client: C) -> Traced<C> {
        self.traced(ProviderId::Mistral.descriptor(), Arc::new(client))
    }

    /// xAI speaks the OpenAI chat-completions protocol
    pub fn xai<C: ChatCompletions>(&self, client: C) -> Traced<C> {
        self.traced(ProviderId::XAI.descriptor(), Arc::new(client))
    }

    pub fn openrouter<C: ChatCompletions>(&self, client: C) -> Traced<C> {
        self.traced(ProviderId::OpenRouter.descriptor(), Arc::new(client))
    }

    /// Registered provider identifiers
    pub fn providers() -> impl Iterator<Item = &'static str> {
        PROVIDERS.iter().map(ProviderDescriptor::name)
    }

    pub fn config(&self) -> &ObservConfig {
        &self.config
    }

    pub fn recall_enabled(&self) -> bool {
        self.interceptor.recall_enabled()
    }

    pub fn stats(&self) -> DispatchStats {
        self.interceptor.dispatcher().stats()
    }

    /// Flush queued traces, waiting at most `flush_timeout`
    pub async fn shutdown(&self) -> FlushReport {
        self.shutdown_within(self.config.flush_timeout()).await
    }

    pub async fn shutdown_within(&self, grace: Duration) -> FlushReport {
        self.interceptor.dispatcher().shutdown(grace).await
    }
}

impl std::fmt::Debug for Observ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observ")
            .field("backend_url", &self.config.backend_url)
            .field("project_id", &self.config.project_id)
            .field("environment", &self.config.environment)
            .field("interceptor", &self.interceptor)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Observ`]
pub struct ObservBuilder {
    config: ObservConfig,
    recall_store: Option<Arc<dyn RecallStore>>,
    sink: Option<Arc<dyn TraceSink>>,
}

impl ObservBuilder {
    pub fn new(config: ObservConfig) -> Self {
        Self {
            config,
            recall_store: None,
            sink: None,
        }
    }

    pub fn recall(mut self, enabled: bool) -> Self {
        self.config.recall = enabled;
        self
    }

    pub fn backend_url(mut self, url: impl Into<String>) -> Self {
        self.config.backend_url = url.into();
        self
    }

    pub fn queue_size(mut self, size: usize) -> Self {
        self.config.queue_size = size;
        self
    }

    pub fn flush_timeout(mut self, timeout: Duration) -> Self {
        self.config.flush_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.config.project_id = project_id.into();
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.config.environment = environment.into();
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow = policy;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn retry_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.config.retry_backoff_ms = duration_ms(base);
        self.config.max_retry_backoff_ms = duration_ms(max);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn recall_timeout(mut self, timeout: Duration) -> Self {
        self.config.recall_timeout_ms = duration_ms(timeout);
        self
    }

    /// Metadata keys that take part in the recall key
    pub fn recall_metadata_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.recall_metadata_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn recall_store(mut self, store: Arc<dyn RecallStore>) -> Self {
        self.recall_store = Some(store);
        self
    }

    /// Deliver traces somewhere other than the HTTP backend
    pub fn sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validate the configuration and start the dispatcher on the current
    /// tokio runtime.
    pub fn build(self) -> Result<Observ> {
        let config = self.config;
        config.validate()?;

        let runtime = Handle::try_current().map_err(|_| ObservError::NoRuntime)?;

        let sink: Arc<dyn TraceSink> = match self.sink {
            Some(sink) => sink,
            None => Arc::new(
                HttpSink::new(&config.backend_url, config.api_key.clone(), config.request_timeout())
                    .map_err(|e| ObservError::Sink(format!("{:#}", e)))?,
            ),
        };

        let recall = match (config.recall, self.recall_store) {
            (true, Some(store)) => Some(RecallGate::new(
                store,
                config.recall_timeout(),
                config.recall_metadata_keys.clone(),
            )),
            (true, None) => {
                tracing::warn!("recall is enabled but no recall store was provided; recall disabled");
                None
            }
            (false, _) => None,
        };

        let dispatcher = Arc::new(Dispatcher::start(config.dispatcher_config(), sink, &runtime));
        let interceptor = Arc::new(Interceptor::new(
            dispatcher,
            recall,
            config.project_id.clone(),
            config.environment.clone(),
        ));

        tracing::info!(
            backend_url = %config.backend_url,
            project_id = %config.project_id,
            environment = %config.environment,
            recall = interceptor.recall_enabled(),
            "observ initialized"
        );

        Ok(Observ { config, interceptor })
    }
}
