//! Snapshot naming and persistence.
//!
//! A snapshot key is the tick's scheduled time rendered as
//! `YYYY-MM-DD-HH-mm-ss` plus `.xml`. Every field is fixed-width and
//! zero-padded, most significant first, so string order and time order agree.
//! The archival job relies on this to select whole periods by key prefix.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc};
use thiserror::Error;
use tracing::debug;

use crate::object_store::{ObjectStore, ObjectStoreError};

/// strftime pattern for the timestamp portion of a key.
pub const KEY_TIME_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";
/// Extension appended to every snapshot key.
pub const SNAPSHOT_EXTENSION: &str = "xml";

/// Render a time as a lexicographically sortable timestamp.
///
/// Sub-second precision is dropped, not rounded. Fixed width holds for
/// years 0 through 9999.
pub fn format_lexicographic_timestamp(time: &NaiveDateTime) -> String {
    time.format(KEY_TIME_FORMAT).to_string()
}

/// Object key for one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotKey {
    taken_at: NaiveDateTime,
}

impl SnapshotKey {
    /// Key for a tick scheduled at `scheduled`.
    pub fn for_time(scheduled: DateTime<Utc>) -> Self {
        Self::from_naive(scheduled.naive_utc())
    }

    pub fn from_naive(time: NaiveDateTime) -> Self {
        let taken_at = time.with_nanosecond(0).unwrap_or(time);
        Self { taken_at }
    }

    /// Parse a stored key. Returns `None` for anything not produced by `Display`.
    pub fn parse(key: &str) -> Option<Self> {
        let stem = key.strip_suffix(SNAPSHOT_EXTENSION)?.strip_suffix('.')?;
        // chrono accepts unpadded fields; insist on the exact width
        if stem.len() != 19 {
            return None;
        }
        let taken_at = NaiveDateTime::parse_from_str(stem, KEY_TIME_FORMAT).ok()?;
        Some(Self { taken_at })
    }

    pub fn taken_at(&self) -> NaiveDateTime {
        self.taken_at
    }

    pub fn year(&self) -> i32 {
        self.taken_at.year()
    }

    pub fn month(&self) -> u32 {
        self.taken_at.month()
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            format_lexicographic_timestamp(&self.taken_at),
            SNAPSHOT_EXTENSION
        )
    }
}

/// Errors writing a snapshot.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Storage rejected snapshot {key} with status {status}")]
    Rejected { key: String, status: u16 },

    #[error("Failed to write snapshot {key}: {source}")]
    Store {
        key: String,
        #[source]
        source: ObjectStoreError,
    },
}

impl WriteError {
    /// Key the write was attempted under.
    pub fn key(&self) -> &str {
        match self {
            WriteError::Rejected { key, .. } | WriteError::Store { key, .. } => key,
        }
    }

    /// Status reported by storage, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            WriteError::Rejected { status, .. } => Some(*status),
            WriteError::Store { source, .. } => source.status(),
        }
    }
}

/// A completed snapshot write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub key: String,
    pub size: usize,
    pub status: u16,
}

/// Writes fetched payloads into the live bucket.
#[derive(Clone)]
pub struct SnapshotWriter {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl SnapshotWriter {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Store `payload` under the key derived from `scheduled`. One attempt, no retry.
    pub async fn write(
        &self,
        scheduled: DateTime<Utc>,
        payload: Bytes,
    ) -> Result<WriteReceipt, WriteError> {
        let key = SnapshotKey::for_time(scheduled).to_string();
        let size = payload.len();

        let status = self
            .store
            .put(&self.bucket, &key, payload)
            .await
            .map_err(|source| WriteError::Store {
                key: key.clone(),
                source,
            })?;

        if !status.is_success() {
            return Err(WriteError::Rejected {
                key,
                status: status.0,
            });
        }

        debug!(bucket = %self.bucket, key = %key, size, "Snapshot written");
        Ok(WriteReceipt {
            key,
            size,
            status: status.0,
        })
    }
}
