//! Feed, ingestion and archival configuration types.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::archive::{ArchivePeriod, Verification};

/// Remote feed configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Feed endpoint.
    pub url: String,
    /// Static query parameters sent with every request (shared-secret token).
    pub params: BTreeMap<String, String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "https://www.jmu.edu/cgi-bin/parking_sign_data.cgi".to_string(),
            params: BTreeMap::new(),
            timeout_secs: 7,
        }
    }
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Ingestion job configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Tick cadence for the in-process scheduler.
    pub interval_secs: u64,
    /// Per-tick retry policy.
    pub retry: RetryConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

impl IngestConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Bounded retry within one tick. `max_attempts: 1` disables retry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            min_delay_ms: 200,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryConfig {
    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 1
    }

    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Archival job configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Calendar boundary used to group snapshots.
    pub period: ArchivePeriod,
    /// How a copy is checked before its source is deleted.
    pub verification: Verification,
    /// Only archive these groups (e.g. `["2021", "2022"]`). Empty means all closed groups.
    pub only: Vec<String>,
    /// How often the in-process scheduler attempts archival.
    pub check_interval_secs: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            period: ArchivePeriod::default(),
            verification: Verification::default(),
            only: Vec::new(),
            check_interval_secs: 86_400,
        }
    }
}

impl ArchiveConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }
}
