//! Key-addressable object storage.
//!
//! Both jobs talk to storage exclusively through the `ObjectStore` trait so
//! that the storage capability is an injected dependency, constructed once
//! per process by `init_object_store` and swapped for `MemoryObjectStore`
//! in tests.
//!
//! ## Backends
//!
//! - `MemoryObjectStore` - In-process map, with fault injection for tests
//! - `FilesystemObjectStore` - One directory per bucket on local disk
//! - `S3ObjectStore` (feature: s3) - Amazon S3 or any S3-compatible service
//!
//! Keys are opaque strings. Buckets are flat: no backend interprets `/`.

mod filesystem;
mod memory;
#[cfg(feature = "s3")]
mod s3;

pub use filesystem::FilesystemObjectStore;
pub use memory::{MemoryObjectStore, RecordedOp, StoreOp};
#[cfg(feature = "s3")]
pub use s3::S3ObjectStore;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::config::{StoreConfig, StoreType};

/// Errors that can occur during object store operations.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Storage rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Storage request failed: {0}")]
    Backend(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ObjectStoreError {
    /// Status code reported by the store, when it reported one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ObjectStoreError::NotFound { .. } => Some(404),
            ObjectStoreError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ObjectStoreError::NotFound { .. })
    }
}

/// Result type for object store operations.
pub type Result<T> = std::result::Result<T, ObjectStoreError>;

/// Status reported by a mutating store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStatus(pub u16);

impl StoreStatus {
    pub const OK: StoreStatus = StoreStatus(200);

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }
}

/// Metadata for a single stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    /// Storage-provided integrity token, when the backend has one.
    pub etag: Option<String>,
}

/// Durable, key-addressable storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `payload` under `key`, replacing any existing object.
    async fn put(&self, bucket: &str, key: &str, payload: Bytes) -> Result<StoreStatus>;

    /// Read an object's bytes.
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes>;

    /// Read an object's metadata without its body.
    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectMeta>;

    /// List keys in lexicographic order, optionally restricted to a prefix.
    async fn list(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<String>>;

    /// Server-side copy of one object, possibly across buckets.
    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<StoreStatus>;

    /// Remove an object. Deleting a missing key succeeds.
    async fn delete(&self, bucket: &str, key: &str) -> Result<StoreStatus>;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}

/// Compute SHA-256 hash of payload.
pub fn compute_hash(payload: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hasher.finalize().to_vec()
}

/// SHA-256 of payload as a lowercase hex string.
pub fn hash_hex(payload: &[u8]) -> String {
    hex::encode(compute_hash(payload))
}

/// Reject keys that could escape a bucket on path-backed stores.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key.contains('/')
        || key.contains('\\')
        || key == "."
        || key == ".."
    {
        return Err(ObjectStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

// ============================================================================
// Factory
// ============================================================================

/// Initialize an object store based on configuration.
///
/// # Errors
///
/// Returns error if the backend cannot be constructed.
pub async fn init_object_store(config: &StoreConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.store_type {
        StoreType::Memory => {
            info!("ObjectStore: memory");
            Ok(Arc::new(MemoryObjectStore::new()))
        }
        StoreType::Filesystem => {
            info!(
                path = %config.filesystem.base_path.display(),
                "ObjectStore: filesystem"
            );
            let store = FilesystemObjectStore::new(&config.filesystem.base_path).await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "s3")]
        StoreType::S3 => {
            info!(
                region = ?config.s3.region,
                endpoint = ?config.s3.endpoint,
                "ObjectStore: s3"
            );
            let store = match &config.s3.endpoint {
                Some(endpoint) => {
                    S3ObjectStore::with_endpoint(endpoint, config.s3.region.as_deref()).await
                }
                None => S3ObjectStore::new(config.s3.region.as_deref()).await,
            };
            Ok(Arc::new(store))
        }
    }
}
