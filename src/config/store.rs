//! Object store configuration types.

use std::path::PathBuf;

use serde::Deserialize;

/// Object store type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    /// In-process store; contents vanish with the process.
    Memory,
    /// Filesystem-based storage (local or mounted).
    #[default]
    Filesystem,
    /// Amazon S3 (requires `s3` feature).
    #[cfg(feature = "s3")]
    S3,
}

/// Object store configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store type discriminator.
    #[serde(rename = "type")]
    pub store_type: StoreType,

    /// Filesystem store configuration.
    pub filesystem: FilesystemStoreConfig,

    /// S3 store configuration (requires `s3` feature).
    #[cfg(feature = "s3")]
    pub s3: S3StoreConfig,
}

/// Filesystem object store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilesystemStoreConfig {
    /// Base directory. Each bucket is a subdirectory.
    pub base_path: PathBuf,
}

impl Default for FilesystemStoreConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("/var/parkwatch/buckets"),
        }
    }
}

/// S3 object store configuration.
#[cfg(feature = "s3")]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct S3StoreConfig {
    /// AWS region.
    pub region: Option<String>,
    /// Custom endpoint URL (for S3-compatible services like MinIO).
    pub endpoint: Option<String>,
}

/// Bucket names used by the jobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BucketsConfig {
    /// Bucket receiving fresh snapshots.
    pub live: String,
    /// Cold-storage bucket for closed periods.
    pub archive: String,
}

impl Default for BucketsConfig {
    fn default() -> Self {
        Self {
            live: "parking-data".to_string(),
            archive: "parking-data-archive".to_string(),
        }
    }
}
