//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod alert;
mod jobs;
mod store;

#[cfg(feature = "sns")]
pub use alert::SnsAlertConfig;
pub use alert::{AlertChannelType, AlertConfig};
pub use jobs::{ArchiveConfig, FeedConfig, IngestConfig, RetryConfig};
#[cfg(feature = "s3")]
pub use store::S3StoreConfig;
pub use store::{BucketsConfig, FilesystemStoreConfig, StoreConfig, StoreType};

use serde::Deserialize;
use thiserror::Error;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "parkwatch.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "PARKWATCH_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "PARKWATCH";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "PARKWATCH_LOG";
/// Environment variable selecting log output format (`json` or `text`).
pub const LOG_FORMAT_ENV_VAR: &str = "PARKWATCH_LOG_FORMAT";
/// Legacy environment variable naming the live bucket.
pub const BUCKET_NAME_ENV_VAR: &str = "BUCKET_NAME";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote feed.
    pub feed: FeedConfig,
    /// Object store backend.
    pub store: StoreConfig,
    /// Live and archive bucket names.
    pub buckets: BucketsConfig,
    /// Ingestion job.
    pub ingest: IngestConfig,
    /// Archival job.
    pub archive: ArchiveConfig,
    /// Failure window and alerting.
    pub alert: AlertConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `parkwatch.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    /// 5. `BUCKET_NAME`, if set, names the live bucket
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("buckets.live", std::env::var(BUCKET_NAME_ENV_VAR).ok())?
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the jobs cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buckets.live.is_empty() {
            return Err(ConfigError::Invalid("buckets.live must be set".to_string()));
        }
        if self.buckets.live == self.buckets.archive {
            return Err(ConfigError::Invalid(
                "buckets.live and buckets.archive must differ".to_string(),
            ));
        }
        if self.feed.url.is_empty() {
            return Err(ConfigError::Invalid("feed.url must be set".to_string()));
        }
        if self.alert.window == 0 || self.alert.threshold == 0 {
            return Err(ConfigError::Invalid(
                "alert.window and alert.threshold must be positive".to_string(),
            ));
        }
        if self.alert.threshold > self.alert.window {
            return Err(ConfigError::Invalid(format!(
                "alert.threshold ({}) exceeds alert.window ({})",
                self.alert.threshold, self.alert.window
            )));
        }
        if self.ingest.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "ingest.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self {
            store: StoreConfig {
                store_type: StoreType::Memory,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
