use std::sync::Arc;

use observ_observability::Metadata;
use serde_json::Value;

/// Immutable key/value annotations for the next call.
///
/// Every `with_*` method returns a new context and leaves `self` untouched;
/// the underlying map is shared through an `Arc` and only copied when a
/// context is extended. Contexts are cheap to clone and safe to share between
/// concurrent calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataContext {
    entries: Arc<Metadata>,
    session_id: Option<Arc<str>>,
}

impl MetadataContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlay `extra` on this context's map; keys in `extra` win.
    ///
    /// Values should be scalars or strings. Arrays and objects are stored as
    /// their JSON text.
    pub fn with_metadata<I, K, V>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut entries = (*self.entries).clone();
        for (key, value) in extra {
            entries.insert(key.into(), scalar(value.into()));
        }

        Self {
            entries: Arc::new(entries),
            session_id: self.session_id.clone(),
        }
    }

    /// Attach a session identifier grouping related calls
    pub fn with_session_id(&self, session_id: impl Into<String>) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            session_id: Some(Arc::from(session_id.into())),
        }
    }

    /// Effective merged map
    pub fn metadata(&self) -> &Metadata {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.session_id.is_none()
    }
}

fn scalar(value: Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
        other => other,
    }
}
