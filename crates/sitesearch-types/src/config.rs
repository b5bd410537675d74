//! Configuration loading for sitesearch.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives in the platform config directory
//! (e.g. ~/.config/sitesearch/config.toml).

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which queue implementation carries tasks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueMode {
    /// In-process worker pools (default)
    #[default]
    Local,
    /// Named queue on a message broker, consumed by this and other processes
    Distributed,
}

/// Which sites take part in whole-collection rebuilds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Master switch. When false, triggers create no tasks.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Only index sites that carry the search tool.
    #[serde(default)]
    pub require_search_tool: bool,

    /// Skip user-personal sites.
    #[serde(default = "default_true")]
    pub exclude_user_sites: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            require_search_tool: false,
            exclude_user_sites: true,
        }
    }
}

/// Worker pools and the shared backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    #[serde(default)]
    pub mode: QueueMode,

    /// Threads serving INDEX_DOCUMENT / REMOVE_DOCUMENT
    #[serde(default = "default_indexing_workers")]
    pub indexing_workers: usize,

    /// Threads serving site, collection and purge tasks
    #[serde(default = "default_splitting_workers")]
    pub splitting_workers: usize,

    /// First freeze interval after a temporary failure
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Ceiling for the doubling freeze interval
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            mode: QueueMode::default(),
            indexing_workers: default_indexing_workers(),
            splitting_workers: default_splitting_workers(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl QueueSettings {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

/// Message broker connection for distributed mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSettings {
    #[serde(default = "default_broker_url")]
    pub url: String,

    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// Consumer threads, one broker connection each
    #[serde(default = "default_consumers")]
    pub consumers: usize,

    /// How long a failed publish is retried before the task is dropped
    #[serde(default = "default_publish_retry_secs")]
    pub publish_retry_secs: u64,

    /// Blocking poll timeout; bounds how quickly a stopped consumer exits
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            queue_name: default_queue_name(),
            consumers: default_consumers(),
            publish_retry_secs: default_publish_retry_secs(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the search index directory
    #[serde(default = "default_index_path")]
    pub index_path: String,

    /// Root directory of the filesystem content repository
    #[serde(default = "default_content_root")]
    pub content_root: String,

    /// Memory budget for the index writer in MB
    #[serde(default = "default_writer_memory_mb")]
    pub writer_memory_mb: usize,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub search: SearchSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub broker: BrokerSettings,
}

fn default_true() -> bool {
    true
}

fn default_indexing_workers() -> usize {
    4
}

fn default_splitting_workers() -> usize {
    1
}

fn default_backoff_base_ms() -> u64 {
    10_000
}

fn default_backoff_max_ms() -> u64 {
    600_000
}

fn default_broker_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_queue_name() -> String {
    "sitesearch.tasks".to_string()
}

fn default_consumers() -> usize {
    1
}

fn default_publish_retry_secs() -> u64 {
    5
}

fn default_poll_timeout_ms() -> u64 {
    1_000
}

fn default_writer_memory_mb() -> usize {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

fn data_dir(leaf: &str) -> String {
    ProjectDirs::from("", "", "sitesearch")
        .map(|p| p.data_local_dir().join(leaf))
        .unwrap_or_else(|| PathBuf::from(".").join(leaf))
        .to_string_lossy()
        .to_string()
}

fn default_index_path() -> String {
    data_dir("index")
}

fn default_content_root() -> String {
    data_dir("content")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            content_root: default_content_root(),
            writer_memory_mb: default_writer_memory_mb(),
            log_level: default_log_level(),
            search: SearchSettings::default(),
            queue: QueueSettings::default(),
            broker: BrokerSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file in the platform config dir
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (SITESEARCH_*, `__` between nested keys)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir = ProjectDirs::from("", "", "sitesearch")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("index_path", default_index_path())?
            .set_default("content_root", default_content_root())?
            .set_default("writer_memory_mb", default_writer_memory_mb() as i64)?
            .set_default("log_level", default_log_level())?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // SITESEARCH_LOG_LEVEL, SITESEARCH_QUEUE__INDEXING_WORKERS, ...
        builder = builder.add_source(
            Environment::with_prefix("SITESEARCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the queueing layer cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.indexing_workers == 0 {
            return Err(ConfigError::Invalid(
                "queue.indexing_workers must be > 0".to_string(),
            ));
        }
        if self.queue.splitting_workers == 0 {
            return Err(ConfigError::Invalid(
                "queue.splitting_workers must be > 0".to_string(),
            ));
        }
        if self.queue.backoff_base_ms == 0 || self.queue.backoff_base_ms > self.queue.backoff_max_ms
        {
            return Err(ConfigError::Invalid(format!(
                "queue.backoff_base_ms must be in 1..={}, got {}",
                self.queue.backoff_max_ms, self.queue.backoff_base_ms
            )));
        }
        if self.broker.queue_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "broker.queue_name must not be empty".to_string(),
            ));
        }
        if self.broker.consumers == 0 {
            return Err(ConfigError::Invalid(
                "broker.consumers must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Expand a leading `~/` against the home directory.
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(dirs) = directories::BaseDirs::new() {
                return dirs.home_dir().join(rest);
            }
        }
        PathBuf::from(path)
    }

    pub fn expanded_index_path(&self) -> PathBuf {
        Self::expand_path(&self.index_path)
    }

    pub fn expanded_content_root(&self) -> PathBuf {
        Self::expand_path(&self.content_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.search.enabled);
        assert!(!settings.search.require_search_tool);
        assert!(settings.search.exclude_user_sites);
        assert_eq!(settings.queue.mode, QueueMode::Local);
        assert_eq!(settings.queue.indexing_workers, 4);
        assert_eq!(settings.queue.splitting_workers, 1);
        assert_eq!(settings.queue.backoff_base(), Duration::from_secs(10));
        assert_eq!(settings.queue.backoff_max(), Duration::from_secs(600));
        assert_eq!(settings.broker.queue_name, "sitesearch.tasks");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_with_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.writer_memory_mb, 50);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("sitesearch-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("custom.toml");
        std::fs::write(
            &path,
            r#"
            content_root = "/srv/content"

            [queue]
            mode = "distributed"
            indexing_workers = 8
            backoff_base_ms = 500

            [search]
            require_search_tool = true
            "#,
        )
        .unwrap();

        let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.content_root, "/srv/content");
        assert_eq!(settings.queue.mode, QueueMode::Distributed);
        assert_eq!(settings.queue.indexing_workers, 8);
        assert_eq!(settings.queue.backoff_base_ms, 500);
        assert_eq!(settings.queue.splitting_workers, 1);
        assert!(settings.search.require_search_tool);
        assert!(settings.search.enabled);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_validation() {
        let mut settings = Settings::default();
        settings.queue.indexing_workers = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.queue.backoff_base_ms = 700_000;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.broker.queue_name = "  ".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(
            Settings::expand_path("/var/lib/index"),
            PathBuf::from("/var/lib/index")
        );
        let expanded = Settings::expand_path("~/index");
        assert!(expanded.ends_with("index"));
        assert!(!expanded.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_queue_mode_serialization() {
        let json = serde_json::to_string(&QueueMode::Distributed).unwrap();
        assert_eq!(json, "\"distributed\"");
        let mode: QueueMode = serde_json::from_str("\"local\"").unwrap();
        assert_eq!(mode, QueueMode::Local);
    }
}
