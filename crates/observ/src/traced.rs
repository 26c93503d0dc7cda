use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::descriptor::ProviderDescriptor;
use crate::interceptor::{CallSite, Interceptor};
use crate::metadata::MetadataContext;

/// A provider client with tracing attached.
///
/// `Traced<C>` implements the same client trait as `C` (see
/// [`crate::providers`]), so it drops in wherever the real client was used.
/// Cloning is cheap: the real client is shared, never copied.
///
/// ```rust,ignore
/// let client = observ.openai(my_openai_client);
/// let reply = client
///     .with_metadata([("user_id", "u-42")])
///     .create(request)
///     .await?;
/// ```
pub struct Traced<C> {
    inner: Arc<C>,
    provider: &'static ProviderDescriptor,
    interceptor: Arc<Interceptor>,
    context: MetadataContext,
}

impl<C> Traced<C> {
    pub(crate) fn new(inner: Arc<C>, provider: &'static ProviderDescriptor, interceptor: Arc<Interceptor>) -> Self {
        Self {
            inner,
            provider,
            interceptor,
            context: MetadataContext::new(),
        }
    }

    /// Same client, with `extra` overlaid on the metadata of calls made
    /// through the returned handle. `self` is left unchanged.
    pub fn with_metadata<I, K, V>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.with_context(self.context.with_metadata(extra))
    }

    pub fn with_session_id(&self, session_id: impl Into<String>) -> Self {
        self.with_context(self.context.with_session_id(session_id))
    }

    /// Replace the metadata context wholesale
    pub fn with_context(&self, context: MetadataContext) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            provider: self.provider,
            interceptor: Arc::clone(&self.interceptor),
            context,
        }
    }

    pub fn context(&self) -> &MetadataContext {
        &self.context
    }

    /// The unwrapped client. Calls made through it are not traced.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn provider(&self) -> &'static ProviderDescriptor {
        self.provider
    }

    pub(crate) fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    pub(crate) fn site<'a>(&'a self, model: Option<&'a str>) -> CallSite<'a> {
        CallSite {
            provider: self.provider,
            context: &self.context,
            model,
        }
    }
}

impl<C> Clone for Traced<C> {
    fn clone(&self) -> Self {
        self.with_context(self.context.clone())
    }
}

impl<C> fmt::Debug for Traced<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Traced")
            .field("provider", &self.provider.name())
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
