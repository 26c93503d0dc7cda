//! The single code path every traced call goes through.
//!
//! For each call the interceptor starts a [`TraceRecorder`], optionally asks
//! the recall gate for a cached answer, runs the real call, and hands the
//! finished trace to the dispatcher. Whatever the real call returned is
//! returned untouched. Failures in the bookkeeping itself (including panics in
//! extractors) are logged and the call proceeds as if it were not wrapped.

use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use futures::StreamExt;
use observ_llm::ProviderStream;
use observ_observability::{Completion, Dispatcher, ErrorDetail, OutputSummary, TraceRecorder, TraceStart};

use crate::descriptor::{CallDescriptor, ProviderDescriptor};
use crate::metadata::MetadataContext;
use crate::recall::{CachedResult, RecallGate, RecallKey};

/// Where a call came from: provider, per-call metadata, and an optional model
/// override for clients that carry their model outside the request.
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a> {
    pub provider: &'static ProviderDescriptor,
    pub context: &'a MetadataContext,
    pub model: Option<&'a str>,
}

/// Run `f`, turning a panic into `None` with a warning
fn guarded<T>(step: &'static str, f: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(step, "instrumentation panicked; continuing without it");
            None
        }
    }
}

/// The provider a call is recorded under. A client wrapped under a provider
/// whose SDK does not have this call is recorded under the surface's own one.
fn resolve_provider<Req, Resp, Chunk>(
    wrapped: &'static ProviderDescriptor,
    descriptor: &CallDescriptor<Req, Resp, Chunk>,
    streamed: bool,
) -> &'static ProviderDescriptor {
    if wrapped.accepts(descriptor, streamed) {
        return wrapped;
    }

    let home = descriptor.surface.home().descriptor();
    tracing::warn!(
        wrapped = wrapped.display_name,
        method = descriptor.method(streamed),
        recorded_as = home.display_name,
        "client does not match the provider it was wrapped as"
    );
    home
}

/// A trace that has been started but not yet submitted.
///
/// Dropping it unfinished (the caller dropped the call future or the stream)
/// submits a `cancelled` error trace.
struct PendingCall {
    recorder: Option<TraceRecorder>,
    dispatcher: Arc<Dispatcher>,
}

impl PendingCall {
    fn finish(&mut self, completion: Completion) {
        let Some(recorder) = self.recorder.take() else {
            return;
        };

        if let Some(trace) = guarded("finish", || recorder.finish(completion)) {
            tracing::debug!(
                trace_id = %trace.trace_id,
                provider = %trace.provider,
                outcome = %trace.outcome,
                duration_ms = trace.duration_ms,
                "call traced"
            );
            self.dispatcher.submit(trace);
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if self.recorder.is_some() {
            self.finish(Completion::Error(ErrorDetail::cancelled(
                "call dropped before completion",
            )));
        }
    }
}

struct Prepared {
    pending: PendingCall,
    model: String,
    recall_key: Option<RecallKey>,
}

pub struct Interceptor {
    dispatcher: Arc<Dispatcher>,
    recall: Option<RecallGate>,
    project_id: String,
    environment: String,
}

impl Interceptor {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        recall: Option<RecallGate>,
        project_id: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            recall,
            project_id: project_id.into(),
            environment: environment.into(),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn recall_enabled(&self) -> bool {
        self.recall.is_some()
    }

    fn prepare<Req, Resp, Chunk>(
        &self,
        site: &CallSite<'_>,
        descriptor: &CallDescriptor<Req, Resp, Chunk>,
        request: &Req,
        streamed: bool,
    ) -> Option<Prepared> {
        guarded("prepare", || {
            let registered = resolve_provider(site.provider, descriptor, streamed);
            let provider = registered.name();
            let model = site
                .model
                .map(str::to_string)
                .or_else(|| (descriptor.model)(request))
                .filter(|model| !model.is_empty())
                .unwrap_or_else(|| registered.default_model.to_string());
            let input = (descriptor.input)(request);
            let metadata = site.context.metadata().clone();

            let recall_key = self.recall.as_ref().and_then(|gate| {
                gate.key(provider, &model, &input, &metadata)
                    .map_err(|err| tracing::warn!(error = %err, "failed to derive recall key"))
                    .ok()
            });

            let recorder = TraceRecorder::start(TraceStart {
                provider: provider.to_string(),
                method: descriptor.method(streamed).to_string(),
                model: model.clone(),
                project_id: self.project_id.clone(),
                environment: self.environment.clone(),
                session_id: site.context.session_id().map(str::to_string),
                metadata,
                input,
                streamed,
            });

            Prepared {
                pending: PendingCall {
                    recorder: Some(recorder),
                    dispatcher: Arc::clone(&self.dispatcher),
                },
                model,
                recall_key,
            }
        })
    }

    async fn recall_hit(&self, prepared: &Prepared) -> Option<CachedResult> {
        let gate = self.recall.as_ref()?;
        let key = prepared.recall_key.as_ref()?;
        gate.lookup(key).await
    }

    fn remember(&self, key: Option<RecallKey>, summary: &OutputSummary) {
        if let (Some(gate), Some(key), Some(value)) =
            (self.recall.as_ref(), key, CachedResult::from_summary(summary))
        {
            gate.store_in_background(key, value);
        }
    }

    /// Trace a request/response call
    pub async fn intercept<Req, Resp, Chunk, E, F, Fut>(
        &self,
        site: CallSite<'_>,
        descriptor: &'static CallDescriptor<Req, Resp, Chunk>,
        request: Req,
        call: F,
    ) -> Result<Resp, E>
    where
        F: FnOnce(Req) -> Fut,
        Fut: Future<Output = Result<Resp, E>>,
        E: fmt::Display,
    {
        let Some(mut prepared) = self.prepare(&site, descriptor, &request, false) else {
            return call(request).await;
        };

        if let Some(hit) = self.recall_hit(&prepared).await {
            let model = prepared.model.as_str();
            if let Some(response) = guarded("from_cache", || (descriptor.response_from_cache)(&hit, model)) {
                prepared.pending.finish(Completion::CacheHit(hit.summary()));
                return Ok(response);
            }
        }

        let result = call(request).await;

        match &result {
            Ok(response) => {
                let summary = guarded("response", || (descriptor.response)(response)).unwrap_or_default();
                self.remember(prepared.recall_key.take(), &summary);
                prepared.pending.finish(Completion::Success(summary));
            }
            Err(err) => {
                prepared.pending.finish(Completion::Error(ErrorDetail::from_error(err)));
            }
        }

        result
    }

    /// Trace a streaming call. The trace is finished when the stream ends,
    /// fails, or is dropped.
    pub async fn intercept_stream<Req, Resp, Chunk, E, F, Fut>(
        &self,
        site: CallSite<'_>,
        descriptor: &'static CallDescriptor<Req, Resp, Chunk>,
        request: Req,
        call: F,
    ) -> Result<ProviderStream<Chunk, E>, E>
    where
        F: FnOnce(Req) -> Fut,
        Fut: Future<Output = Result<ProviderStream<Chunk, E>, E>>,
        Chunk: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let Some(mut prepared) = self.prepare(&site, descriptor, &request, true) else {
            return call(request).await;
        };

        if let Some(hit) = self.recall_hit(&prepared).await {
            let model = prepared.model.as_str();
            if let Some(chunks) = guarded("from_cache", || (descriptor.chunks_from_cache)(&hit, model)) {
                prepared.pending.finish(Completion::CacheHit(hit.summary()));
                let replay: ProviderStream<Chunk, E> = Box::pin(futures::stream::iter(chunks.into_iter().map(Ok)));
                return Ok(replay);
            }
        }

        let mut inner = match call(request).await {
            Ok(stream) => stream,
            Err(err) => {
                prepared.pending.finish(Completion::Error(ErrorDetail::from_error(&err)));
                return Err(err);
            }
        };

        let extract = descriptor.chunk;
        let recall = self.recall.clone();
        let Prepared {
            mut pending,
            recall_key,
            ..
        } = prepared;

        let traced = async_stream::stream! {
            let mut summary = OutputSummary::default();
            let mut failed = false;

            while let Some(item) = inner.next().await {
                if !failed {
                    match &item {
                        Ok(chunk) => {
                            if let Some(part) = guarded("chunk", || extract(chunk)) {
                                summary.absorb(part);
                            }
                        }
                        Err(err) => {
                            failed = true;
                            pending.finish(Completion::Error(ErrorDetail::from_error(err)));
                        }
                    }
                }
                yield item;
            }

            if !failed {
                if let (Some(gate), Some(key), Some(value)) =
                    (recall.as_ref(), recall_key, CachedResult::from_summary(&summary))
                {
                    gate.store_in_background(key, value);
                }
                pending.finish(Completion::Success(summary));
            }
        };

        Ok(Box::pin(traced))
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("project_id", &self.project_id)
            .field("environment", &self.environment)
            .field("recall", &self.recall)
            .finish_non_exhaustive()
    }
}
