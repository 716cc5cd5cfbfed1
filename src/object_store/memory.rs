//! In-memory object store.
//!
//! Holds every bucket in a process-local map. Used by tests and by dry runs
//! with `store.type: memory`. Supports fault injection so failure paths in
//! the jobs can be exercised deterministically.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::{hash_hex, ObjectMeta, ObjectStore, ObjectStoreError, Result, StoreStatus};

/// Store operation, used for fault injection and the operation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Put,
    Get,
    Head,
    List,
    Copy,
    Delete,
}

/// One recorded call against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedOp {
    pub op: StoreOp,
    pub bucket: String,
    pub key: String,
}

/// An injected failure. `key: None` matches every key.
struct Fault {
    op: StoreOp,
    key: Option<String>,
}

/// Object store that keeps objects in memory.
#[derive(Default)]
pub struct MemoryObjectStore {
    buckets: RwLock<HashMap<String, BTreeMap<String, Bytes>>>,
    faults: RwLock<Vec<Fault>>,
    corrupt_copies: RwLock<HashSet<String>>,
    log: RwLock<Vec<RecordedOp>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place an object directly, bypassing the operation log.
    pub async fn seed(&self, bucket: &str, key: &str, payload: impl Into<Bytes>) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), payload.into());
    }

    /// Fail every future `op` on `key` (or on any key when `None`).
    pub async fn fail_on(&self, op: StoreOp, key: Option<&str>) {
        self.faults.write().await.push(Fault {
            op,
            key: key.map(str::to_string),
        });
    }

    pub async fn clear_faults(&self) {
        self.faults.write().await.clear();
        self.corrupt_copies.write().await.clear();
    }

    /// Make copies of `key` land truncated so verification fails.
    pub async fn corrupt_copies_of(&self, key: &str) {
        self.corrupt_copies.write().await.insert(key.to_string());
    }

    /// Keys currently held in `bucket`, in order.
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every call made so far, oldest first.
    pub async fn operations(&self) -> Vec<RecordedOp> {
        self.log.read().await.clone()
    }

    /// Number of calls of the given kind.
    pub async fn count(&self, op: StoreOp) -> usize {
        self.log.read().await.iter().filter(|r| r.op == op).count()
    }

    async fn record(&self, op: StoreOp, bucket: &str, key: &str) -> Result<()> {
        self.log.write().await.push(RecordedOp {
            op,
            bucket: bucket.to_string(),
            key: key.to_string(),
        });

        let faults = self.faults.read().await;
        let injected = faults
            .iter()
            .any(|f| f.op == op && f.key.as_deref().is_none_or(|k| k == key));
        if injected {
            return Err(ObjectStoreError::Rejected {
                status: 500,
                message: format!("injected {:?} failure for {}/{}", op, bucket, key),
            });
        }
        Ok(())
    }

    async fn read_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, bucket: &str, key: &str, payload: Bytes) -> Result<StoreStatus> {
        self.record(StoreOp::Put, bucket, key).await?;
        self.seed(bucket, key, payload).await;
        Ok(StoreStatus::OK)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.record(StoreOp::Get, bucket, key).await?;
        self.read_object(bucket, key).await
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
        self.record(StoreOp::Head, bucket, key).await?;
        let payload = self.read_object(bucket, key).await?;
        Ok(ObjectMeta {
            key: key.to_string(),
            size: payload.len() as u64,
            etag: Some(hash_hex(&payload)),
        })
    }

    async fn list(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<String>> {
        self.record(StoreOp::List, bucket, prefix.unwrap_or_default())
            .await?;
        let keys = self
            .keys(bucket)
            .await
            .into_iter()
            .filter(|k| prefix.is_none_or(|p| k.starts_with(p)))
            .collect();
        Ok(keys)
    }

    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<StoreStatus> {
        self.record(StoreOp::Copy, src_bucket, src_key).await?;
        let mut payload = self.read_object(src_bucket, src_key).await?;
        if self.corrupt_copies.read().await.contains(src_key) {
            payload.truncate(payload.len().saturating_sub(1));
        }
        self.seed(dst_bucket, dst_key, payload).await;
        Ok(StoreStatus::OK)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<StoreStatus> {
        self.record(StoreOp::Delete, bucket, key).await?;
        if let Some(objects) = self.buckets.write().await.get_mut(bucket) {
            objects.remove(key);
        }
        Ok(StoreStatus(204))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
