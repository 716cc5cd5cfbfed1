//! Archival of closed periods from the live bucket to the archive bucket.
//!
//! A run lists the live bucket once, groups snapshot keys by calendar
//! period and moves every closed group:
//!
//! 1. copy each object to the archive bucket under the same key
//! 2. verify each copy against its source
//! 3. only when every copy in the group verified, delete the originals
//!
//! Any copy or verification failure abandons the group before step 3, so a
//! group is never half-deleted. Objects already present identically in the
//! archive bucket are not copied again, which makes repeated and overlapping
//! runs harmless.

mod period;
mod verify;

pub use period::{ArchivePeriod, GroupId};
pub use verify::{same_content, Fingerprint, Verification};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ArchiveConfig, BucketsConfig};
use crate::object_store::{ObjectStore, ObjectStoreError};
use crate::snapshot::SnapshotKey;

/// Errors from the archival job.
///
/// `Enumeration` aborts the run; the rest abort only the affected group.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to list bucket {bucket}: {source}")]
    Enumeration {
        bucket: String,
        #[source]
        source: ObjectStoreError,
    },

    #[error("Failed to copy {key}: {source}")]
    Copy {
        key: String,
        #[source]
        source: ObjectStoreError,
    },

    #[error("Archived copy of {key} does not match source: expected {expected}, found {actual}")]
    Verification {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to delete {} originals after archiving ({deleted} deleted), first: {first_error}", .failed.len())]
    Delete {
        failed: Vec<String>,
        deleted: usize,
        first_error: String,
    },
}

/// A group moved in full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub group: String,
    pub objects: usize,
    pub copied: usize,
    pub already_archived: usize,
    pub deleted: usize,
}

/// A group left in place for the next run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupFailure {
    pub group: String,
    pub objects: usize,
    pub error: String,
}

/// Outcome of one archival run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveReport {
    /// Groups fully archived and removed from the live bucket.
    pub completed: Vec<GroupSummary>,
    /// Groups that hit an error; their originals were kept unless the error was `Delete`.
    pub failed: Vec<GroupFailure>,
    /// Groups whose period has not ended yet.
    pub open: Vec<String>,
    /// Closed groups listed but not selected by the `only` filter.
    pub excluded: Vec<String>,
    /// Live keys that are not snapshot keys. Never touched.
    pub unrecognized: Vec<String>,
}

impl ArchiveReport {
    /// True when no group failed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn completed_groups(&self) -> Vec<&str> {
        self.completed.iter().map(|g| g.group.as_str()).collect()
    }

    pub fn failed_groups(&self) -> Vec<&str> {
        self.failed.iter().map(|g| g.group.as_str()).collect()
    }
}

/// Where one key stands after the copy phase.
enum CopyResult {
    Copied,
    AlreadyArchived,
    /// Gone from live but present in the archive: another run moved it.
    MovedElsewhere,
}

/// Moves closed periods from the live bucket to the archive bucket.
pub struct ArchivalJob {
    store: Arc<dyn ObjectStore>,
    live: String,
    archive: String,
    period: ArchivePeriod,
    verification: Verification,
    only: Vec<String>,
}

impl ArchivalJob {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        live: impl Into<String>,
        archive: impl Into<String>,
    ) -> Self {
        Self {
            store,
            live: live.into(),
            archive: archive.into(),
            period: ArchivePeriod::default(),
            verification: Verification::default(),
            only: Vec::new(),
        }
    }

    pub fn from_config(
        store: Arc<dyn ObjectStore>,
        buckets: &BucketsConfig,
        config: &ArchiveConfig,
    ) -> Self {
        Self::new(store, &buckets.live, &buckets.archive)
            .with_period(config.period)
            .with_verification(config.verification)
            .with_only(config.only.clone())
    }

    pub fn with_period(mut self, period: ArchivePeriod) -> Self {
        self.period = period;
        self
    }

    pub fn with_verification(mut self, verification: Verification) -> Self {
        self.verification = verification;
        self
    }

    /// Restrict the run to these group ids (`"2022"`, or `"2022-05"` for monthly).
    pub fn with_only(mut self, groups: Vec<String>) -> Self {
        self.only = groups;
        self
    }

    /// Archive every closed group as of `now`.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<ArchiveReport, ArchiveError> {
        let keys = self.enumerate().await?;

        let mut report = ArchiveReport::default();
        let mut groups: BTreeMap<GroupId, Vec<String>> = BTreeMap::new();
        for key in keys {
            match SnapshotKey::parse(&key) {
                Some(snapshot) => groups
                    .entry(self.period.group_of(&snapshot))
                    .or_default()
                    .push(key),
                None => report.unrecognized.push(key),
            }
        }

        info!(
            live = %self.live,
            archive = %self.archive,
            groups = groups.len(),
            unrecognized = report.unrecognized.len(),
            "Archival run started"
        );

        let now = now.naive_utc();
        for (group, keys) in groups {
            let name = group.to_string();
            if !self.period.is_closed(&group, now) {
                report.open.push(name);
                continue;
            }
            if !self.only.is_empty() && !self.only.contains(&name) {
                report.excluded.push(name);
                continue;
            }

            info!(group = %name, objects = keys.len(), "Archiving group");
            match self.archive_group(&name, &keys).await {
                Ok(summary) => {
                    info!(
                        group = %name,
                        copied = summary.copied,
                        already_archived = summary.already_archived,
                        deleted = summary.deleted,
                        "Group archived"
                    );
                    report.completed.push(summary);
                }
                Err(e) => {
                    warn!(group = %name, error = %e, "Group not archived");
                    report.failed.push(GroupFailure {
                        group: name,
                        objects: keys.len(),
                        error: e.to_string(),
                    });
                }
            }
        }

        match serde_json::to_string(&report) {
            Ok(json) => info!(report = %json, "Archival run finished"),
            Err(_) => info!(
                completed = ?report.completed_groups(),
                failed = ?report.failed_groups(),
                "Archival run finished"
            ),
        }
        Ok(report)
    }

    /// Live keys to consider: the whole bucket, or only the selected groups' prefixes.
    async fn enumerate(&self) -> Result<Vec<String>, ArchiveError> {
        let enumeration_error = |source: ObjectStoreError| ArchiveError::Enumeration {
            bucket: self.live.clone(),
            source,
        };

        if self.only.is_empty() {
            return self
                .store
                .list(&self.live, None)
                .await
                .map_err(enumeration_error);
        }

        let mut keys = BTreeSet::new();
        for group in &self.only {
            let prefix = GroupId::prefix_for(group);
            let listed = self
                .store
                .list(&self.live, Some(&prefix))
                .await
                .map_err(enumeration_error)?;
            keys.extend(listed);
        }
        Ok(keys.into_iter().collect())
    }

    async fn archive_group(&self, group: &str, keys: &[String]) -> Result<GroupSummary, ArchiveError> {
        let mut summary = GroupSummary {
            group: group.to_string(),
            objects: keys.len(),
            copied: 0,
            already_archived: 0,
            deleted: 0,
        };

        let mut to_delete = Vec::with_capacity(keys.len());
        for key in keys {
            match self.copy_verified(key).await? {
                CopyResult::Copied => {
                    summary.copied += 1;
                    to_delete.push(key);
                }
                CopyResult::AlreadyArchived => {
                    summary.already_archived += 1;
                    to_delete.push(key);
                }
                CopyResult::MovedElsewhere => summary.already_archived += 1,
            }
        }

        // Every copy verified; originals may go
        let mut failed = Vec::new();
        let mut first_error = None;
        for key in to_delete {
            match self.store.delete(&self.live, key).await {
                Ok(status) if status.is_success() => summary.deleted += 1,
                Ok(status) => {
                    first_error.get_or_insert_with(|| format!("{}: status {}", key, status.0));
                    failed.push(key.clone());
                }
                Err(e) => {
                    first_error.get_or_insert_with(|| format!("{}: {}", key, e));
                    failed.push(key.clone());
                }
            }
        }

        if let Some(first_error) = first_error {
            return Err(ArchiveError::Delete {
                failed,
                deleted: summary.deleted,
                first_error,
            });
        }
        Ok(summary)
    }

    /// Ensure `key` exists identically in the archive bucket.
    async fn copy_verified(&self, key: &str) -> Result<CopyResult, ArchiveError> {
        let store = self.store.as_ref();
        let copy_error = |source: ObjectStoreError| ArchiveError::Copy {
            key: key.to_string(),
            source,
        };

        let source = match self.verification.fingerprint(store, &self.live, key).await {
            Ok(source) => source,
            Err(e) if e.is_not_found() => {
                // Listed a moment ago; a concurrent run may have moved it
                return match self.verification.fingerprint(store, &self.archive, key).await {
                    Ok(_) => Ok(CopyResult::MovedElsewhere),
                    Err(_) => Err(copy_error(e)),
                };
            }
            Err(e) => return Err(copy_error(e)),
        };

        // Skip only on identical content, whatever the configured verification
        if same_content(store, &self.live, &self.archive, key)
            .await
            .map_err(copy_error)?
        {
            debug!(key = %key, "Already archived");
            return Ok(CopyResult::AlreadyArchived);
        }

        let status = match store.copy(&self.live, key, &self.archive, key).await {
            Ok(status) => status,
            Err(e) if e.is_not_found() => {
                // Source vanished between fingerprint and copy
                return match self.verification.fingerprint(store, &self.archive, key).await {
                    Ok(_) => Ok(CopyResult::MovedElsewhere),
                    Err(_) => Err(copy_error(e)),
                };
            }
            Err(e) => return Err(copy_error(e)),
        };
        if !status.is_success() {
            return Err(copy_error(ObjectStoreError::Rejected {
                status: status.0,
                message: "copy not acknowledged".to_string(),
            }));
        }

        let copy = self
            .verification
            .fingerprint(store, &self.archive, key)
            .await
            .map_err(|e| ArchiveError::Verification {
                key: key.to_string(),
                expected: source.to_string(),
                actual: format!("unreadable ({})", e),
            })?;
        if !self.verification.matches(&source, &copy) {
            return Err(ArchiveError::Verification {
                key: key.to_string(),
                expected: source.to_string(),
                actual: copy.to_string(),
            });
        }

        Ok(CopyResult::Copied)
    }
}
