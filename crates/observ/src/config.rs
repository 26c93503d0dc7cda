use std::time::Duration;

use config::{Config as ConfigLoader, ConfigError, Environment, Map};
use observ_observability::{DispatcherConfig, OverflowPolicy};
use serde::{Deserialize, Serialize};

use crate::error::{ObservError, Result};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8080";
pub const MAX_WORKERS: usize = 4;

/// Settings shared by every client wrapped through one `Observ`.
///
/// Durations are stored in milliseconds so the struct round-trips through
/// plain JSON/TOML. Missing fields take their defaults when deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservConfig {
    pub api_key: String,
    pub backend_url: String,
    pub project_id: String,
    pub environment: String,

    /// Consult the recall store before calling the provider
    pub recall: bool,
    pub recall_timeout_ms: u64,
    /// Metadata keys that take part in the recall key
    pub recall_metadata_keys: Vec<String>,

    pub queue_size: usize,
    pub workers: usize,
    pub overflow: OverflowPolicy,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub max_retry_backoff_ms: u64,
    pub request_timeout_ms: u64,
    /// Shutdown grace period
    pub flush_timeout_ms: u64,
}

impl Default for ObservConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            project_id: "default".to_string(),
            environment: "production".to_string(),
            recall: false,
            recall_timeout_ms: 250,
            recall_metadata_keys: Vec::new(),
            queue_size: 1000,
            workers: 2,
            overflow: OverflowPolicy::DropNewest,
            max_retries: 3,
            retry_backoff_ms: 200,
            max_retry_backoff_ms: 2_000,
            request_timeout_ms: 5_000,
            flush_timeout_ms: 5_000,
        }
    }
}

impl ObservConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Defaults overlaid with `OBSERV_*` environment variables.
    ///
    /// Every field can be set, e.g. `OBSERV_QUEUE_SIZE=10` or
    /// `OBSERV_RECALL_METADATA_KEYS=tenant,region`. Empty variables are ignored.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// `vars` replaces the process environment when given
    pub(crate) fn load(vars: Option<Map<String, String>>) -> Result<Self> {
        let defaults = ConfigLoader::try_from(&Self::default()).map_err(invalid)?;

        ConfigLoader::builder()
            .add_source(defaults)
            .add_source(
                Environment::with_prefix("OBSERV")
                    .try_parsing(true)
                    .ignore_empty(true)
                    .list_separator(",")
                    .with_list_parse_key("recall_metadata_keys")
                    .source(vars),
            )
            .build()
            .and_then(|loaded| loaded.try_deserialize::<Self>())
            .map_err(invalid)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(ObservError::InvalidConfig("api_key must not be empty".to_string()));
        }
        if self.queue_size == 0 {
            return Err(ObservError::InvalidConfig("queue_size must be at least 1".to_string()));
        }
        if !(1..=MAX_WORKERS).contains(&self.workers) {
            return Err(ObservError::InvalidConfig(format!(
                "workers must be between 1 and {}, got {}",
                MAX_WORKERS, self.workers
            )));
        }
        if self.retry_backoff_ms > self.max_retry_backoff_ms {
            return Err(ObservError::InvalidConfig(
                "retry_backoff must not exceed max_retry_backoff".to_string(),
            ));
        }

        let url = reqwest::Url::parse(&self.backend_url).map_err(|e| {
            ObservError::InvalidConfig(format!("backend_url '{}' is not a valid URL: {}", self.backend_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ObservError::InvalidConfig(format!(
                "backend_url must use http or https, got '{}'",
                url.scheme()
            )));
        }

        Ok(())
    }

    pub fn recall_timeout(&self) -> Duration {
        Duration::from_millis(self.recall_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            queue_size: self.queue_size,
            workers: self.workers,
            overflow: self.overflow,
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            max_retry_backoff: Duration::from_millis(self.max_retry_backoff_ms),
        }
    }
}

fn invalid(err: ConfigError) -> ObservError {
    ObservError::InvalidConfig(format!("failed to load configuration: {}", err))
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ObservConfig::new("key");

        assert!(!config.recall);
        assert_eq!(config.backend_url, "http://localhost:8080");
        assert_eq!(config.queue_size, 1000);
        assert_eq!(config.flush_timeout(), Duration::from_secs(5));
        assert_eq!(config.project_id, "default");
        assert_eq!(config.environment, "production");
        assert_eq!(config.overflow, OverflowPolicy::DropNewest);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ObservConfig::default().validate().is_err());

        let config = ObservConfig { queue_size: 0, ..ObservConfig::new("k") };
        assert!(config.validate().is_err());

        let config = ObservConfig { workers: 5, ..ObservConfig::new("k") };
        assert!(config.validate().is_err());

        let config = ObservConfig { backend_url: "not a url".into(), ..ObservConfig::new("k") };
        assert!(config.validate().is_err());

        let config = ObservConfig { backend_url: "ftp://example.com".into(), ..ObservConfig::new("k") };
        assert!(config.validate().is_err());
    }

    fn vars(pairs: &[(&str, &str)]) -> Option<Map<String, String>> {
        Some(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn test_env_overrides() {
        let config = ObservConfig::load(vars(&[
            ("OBSERV_API_KEY", "env-key"),
            ("OBSERV_BACKEND_URL", "https://observ.example.com"),
            ("OBSERV_ENVIRONMENT", "staging"),
            ("OBSERV_RECALL", "true"),
            ("OBSERV_PROJECT_ID", ""),
            ("OBSERV_QUEUE_SIZE", "10"),
            ("OBSERV_WORKERS", "3"),
            ("OBSERV_OVERFLOW", "drop_oldest"),
            ("OBSERV_FLUSH_TIMEOUT_MS", "750"),
            ("OBSERV_RECALL_METADATA_KEYS", "tenant,region"),
            ("UNRELATED_QUEUE_SIZE", "99"),
        ]))
        .unwrap();

        assert_eq!(config.api_key, "env-key");
        assert_eq!(config.backend_url, "https://observ.example.com");
        assert_eq!(config.environment, "staging");
        assert_eq!(config.project_id, "default");
        assert!(config.recall);
        assert_eq!(config.queue_size, 10);
        assert_eq!(config.workers, 3);
        assert_eq!(config.overflow, OverflowPolicy::DropOldest);
        assert_eq!(config.flush_timeout(), Duration::from_millis(750));
        assert_eq!(config.recall_metadata_keys, vec!["tenant", "region"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_without_overrides_keeps_defaults() {
        let config = ObservConfig::load(vars(&[])).unwrap();
        assert_eq!(config, ObservConfig::default());
    }

    #[test]
    fn test_env_rejects_unparsable_values() {
        match ObservConfig::load(vars(&[("OBSERV_WORKERS", "many")])) {
            Err(ObservError::InvalidConfig(message)) => assert!(!message.is_empty()),
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ObservConfig = serde_json::from_str(
            r#"{"api_key": "k", "workers": 3, "overflow": "drop_oldest"}"#,
        )
        .unwrap();

        assert_eq!(config.workers, 3);
        assert_eq!(config.overflow, OverflowPolicy::DropOldest);
        assert_eq!(config.queue_size, 1000);
    }

    #[test]
    fn test_dispatcher_config_mapping() {
        let dispatcher = ObservConfig::new("k").dispatcher_config();
        assert_eq!(dispatcher.retry_backoff, Duration::from_millis(200));
        assert_eq!(dispatcher.max_retry_backoff, Duration::from_secs(2));
        assert_eq!(dispatcher.max_retries, 3);
    }
}
