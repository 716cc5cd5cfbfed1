//! Filesystem-based object storage.
//!
//! Stores objects as files, one directory per bucket:
//! ```text
//! {base_path}/
//!   {bucket}/
//!     {key}
//! ```
//!
//! Writes and copies land in a `.tmp` sibling first and are renamed into
//! place, so readers never observe a half-written object.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use super::{hash_hex, validate_key, ObjectMeta, ObjectStore, ObjectStoreError, Result, StoreStatus};

const TEMP_SUFFIX: &str = ".tmp";

/// Filesystem-based object store.
pub struct FilesystemObjectStore {
    base_path: PathBuf,
}

impl FilesystemObjectStore {
    /// Create a new filesystem object store.
    ///
    /// Creates the base directory if it doesn't exist.
    pub async fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).await?;
        Ok(Self { base_path })
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf> {
        validate_key(bucket)?;
        Ok(self.base_path.join(bucket))
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.bucket_path(bucket)?.join(key))
    }

    fn not_found(bucket: &str, key: &str) -> ObjectStoreError {
        ObjectStoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    async fn read(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Self::not_found(bucket, key)),
            Err(e) => Err(e.into()),
        }
    }

    /// Write atomically using temp file + rename.
    async fn write_atomic(&self, path: &Path, payload: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut temp = path.as_os_str().to_owned();
        temp.push(TEMP_SUFFIX);
        let temp_path = PathBuf::from(temp);
        fs::write(&temp_path, payload).await?;
        fs::rename(&temp_path, path).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put(&self, bucket: &str, key: &str, payload: Bytes) -> Result<StoreStatus> {
        let path = self.object_path(bucket, key)?;
        self.write_atomic(&path, &payload).await?;

        debug!(
            bucket = %bucket,
            key = %key,
            size = payload.len(),
            "Stored object"
        );
        Ok(StoreStatus::OK)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.read(bucket, key).await.map(Bytes::from)
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
        let data = self.read(bucket, key).await?;
        Ok(ObjectMeta {
            key: key.to_string(),
            size: data.len() as u64,
            etag: Some(hash_hex(&data)),
        })
    }

    async fn list(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<String>> {
        let dir = self.bucket_path(bucket)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            // A bucket nobody has written to yet is empty, not missing
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.ends_with(TEMP_SUFFIX) {
                continue;
            }
            if prefix.is_none_or(|p| name.starts_with(p)) {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<StoreStatus> {
        let data = self.read(src_bucket, src_key).await?;
        let dst = self.object_path(dst_bucket, dst_key)?;
        self.write_atomic(&dst, &data).await?;
        Ok(StoreStatus::OK)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<StoreStatus> {
        let path = self.object_path(bucket, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(StoreStatus(204)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StoreStatus(204)),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "filesystem"
    }
}
