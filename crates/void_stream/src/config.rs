//! Streaming configuration
//!
//! Parsed from TOML:
//!
//! ```toml
//! worker_count = 4
//! thread_name = "void-stream"
//! idle_timeout_ms = 30000
//! keep_referenced = false
//! purge_unreferenced = true
//! memory_budget_bytes = 268435456
//! ```
//!
//! Every field is optional and falls back to `StreamingConfig::default()`.

use crate::error::{ConfigError, ConfigResult};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use void_jobs::WorkerPoolConfig;

/// Streaming manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamingConfig {
    /// Worker threads for async loads
    pub worker_count: usize,
    /// Prefix for worker thread names
    pub thread_name: String,
    /// Unload entries not accessed for this long (`None` disables)
    pub idle_timeout_ms: Option<u64>,
    /// Skip idle eviction for entries that still have handles
    pub keep_referenced: bool,
    /// Remove unloaded entries nobody references on `tick`
    pub purge_unreferenced: bool,
    /// Unload least recently used assets above this many resident bytes
    pub memory_budget_bytes: Option<usize>,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            worker_count: WorkerPoolConfig::default().worker_count,
            thread_name: "void-stream".to_string(),
            idle_timeout_ms: Some(30_000),
            keep_referenced: false,
            purge_unreferenced: true,
            memory_budget_bytes: None,
        }
    }
}

impl StreamingConfig {
    /// Parse from a TOML string and validate
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check values that would prevent the pool from starting
    pub fn validate(&self) -> ConfigResult<()> {
        if self.worker_count == 0 {
            return Err(ConfigError::Invalid(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.thread_name.is_empty() {
            return Err(ConfigError::Invalid(
                "thread_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Idle eviction threshold, `None` if disabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }

    /// Set the worker thread count
    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set or disable the idle eviction threshold
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    /// Set or disable the resident byte budget
    pub fn with_memory_budget(mut self, bytes: Option<usize>) -> Self {
        self.memory_budget_bytes = bytes;
        self
    }

    /// Skip idle eviction for entries with live handles
    pub fn with_keep_referenced(mut self, keep: bool) -> Self {
        self.keep_referenced = keep;
        self
    }

    /// Remove unloaded entries nobody holds on tick
    pub fn with_purge_unreferenced(mut self, purge: bool) -> Self {
        self.purge_unreferenced = purge;
        self
    }
}

impl From<&StreamingConfig> for WorkerPoolConfig {
    fn from(config: &StreamingConfig) -> Self {
        WorkerPoolConfig {
            worker_count: config.worker_count,
            thread_name: config.thread_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StreamingConfig::default();
        assert!(config.worker_count >= 1);
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(30)));
        assert!(config.purge_unreferenced);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial() {
        let config = StreamingConfig::from_toml_str(
            r#"
            worker_count = 3
            memory_budget_bytes = 1024
            "#,
        )
        .unwrap();

        assert_eq!(config.worker_count, 3);
        assert_eq!(config.memory_budget_bytes, Some(1024));
        assert_eq!(config.thread_name, "void-stream");
        assert_eq!(config.idle_timeout_ms, Some(30_000));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = StreamingConfig::from_toml_str("worker_count = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = StreamingConfig::from_toml_str("workers = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = StreamingConfig::load("/nonexistent/void_stream.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_worker_pool_config() {
        let config = StreamingConfig::default().with_workers(5);
        let pool = WorkerPoolConfig::from(&config);
        assert_eq!(pool.worker_count, 5);
        assert_eq!(pool.thread_name, "void-stream");
    }
}
