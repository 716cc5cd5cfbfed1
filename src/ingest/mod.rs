//! Scheduled ingestion: fetch the feed once, write it under the tick's key.
//!
//! Each tick is independent. A tick moves `Fetching -> Writing -> Done`, or
//! stops in `Failed` from either stage. Nothing carries over between ticks,
//! and a failed fetch never reaches storage.
//!
//! Every tick ends with exactly one event on the `parkwatch::tick` target.
//! External failure counters key off its `outcome` field.

use std::sync::Arc;

use backon::Retryable;
use bytes::Bytes;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::RetryConfig;
use crate::feed::{FeedSource, FetchError};
use crate::snapshot::{SnapshotWriter, WriteError, WriteReceipt};
use crate::utils::retry::ingest_backoff;

/// Log target carrying the per-tick success/failure signal.
pub const TICK_TARGET: &str = "parkwatch::tick";

/// One scheduled invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Nominal schedule time. Keys derive from this, never from the clock.
    pub scheduled_at: DateTime<Utc>,
}

/// Scheduler event payload. Only `time` is read.
#[derive(Debug, Deserialize)]
struct ScheduledEvent {
    time: DateTime<Utc>,
}

impl Tick {
    pub fn new(scheduled_at: DateTime<Utc>) -> Self {
        Self { scheduled_at }
    }

    /// Tick for a manual invocation: the current second.
    pub fn now() -> Self {
        Self::new(Utc::now().trunc_subsecs(0))
    }

    /// Tick from a scheduler event such as `{"time": "2023-06-01T00:00:00Z", ...}`.
    pub fn from_event_json(event: &str) -> Result<Self, serde_json::Error> {
        let event: ScheduledEvent = serde_json::from_str(event)?;
        Ok(Self::new(event.time))
    }
}

/// Where a tick was when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStage {
    Fetching,
    Writing,
}

impl IngestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStage::Fetching => "fetching",
            IngestStage::Writing => "writing",
        }
    }
}

/// A tick failure with its cause.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl IngestError {
    pub fn stage(&self) -> IngestStage {
        match self {
            IngestError::Fetch(_) => IngestStage::Fetching,
            IngestError::Write(_) => IngestStage::Writing,
        }
    }
}

/// Result of one tick, consumed by logging and the failure monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum IngestionOutcome {
    Success {
        key: String,
        size: usize,
        status: u16,
    },
    Failure {
        stage: IngestStage,
        cause: String,
    },
}

/// A finished tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub scheduled_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: IngestionOutcome,
}

impl TickReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, IngestionOutcome::Success { .. })
    }

    /// Emit the tick signal.
    fn emit(&self) {
        match &self.outcome {
            IngestionOutcome::Success { key, size, status } => info!(
                target: TICK_TARGET,
                scheduled_at = %self.scheduled_at,
                outcome = "success",
                key = %key,
                size = *size,
                status = *status,
                "Snapshot written"
            ),
            IngestionOutcome::Failure { stage, cause } => error!(
                target: TICK_TARGET,
                scheduled_at = %self.scheduled_at,
                outcome = "failure",
                stage = stage.as_str(),
                cause = %cause,
                "Error fetching or writing data"
            ),
        }
    }
}

/// Fetch-then-write job, one instance reused across ticks.
pub struct IngestionJob {
    feed: Arc<dyn FeedSource>,
    writer: SnapshotWriter,
    retry: RetryConfig,
}

impl IngestionJob {
    pub fn new(feed: Arc<dyn FeedSource>, writer: SnapshotWriter) -> Self {
        Self {
            feed,
            writer,
            retry: RetryConfig::default(),
        }
    }

    /// Allow bounded retries within a tick. Retries reuse the tick's key.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Run one tick to completion and emit its signal.
    pub async fn run(&self, tick: Tick) -> TickReport {
        let outcome = match self.execute(tick).await {
            Ok(receipt) => IngestionOutcome::Success {
                key: receipt.key,
                size: receipt.size,
                status: receipt.status,
            },
            Err(e) => IngestionOutcome::Failure {
                stage: e.stage(),
                cause: e.to_string(),
            },
        };

        let report = TickReport {
            scheduled_at: tick.scheduled_at,
            outcome,
        };
        report.emit();
        report
    }

    async fn execute(&self, tick: Tick) -> Result<WriteReceipt, IngestError> {
        let payload = self.fetch().await?;
        let receipt = self.write(tick, payload).await?;
        Ok(receipt)
    }

    async fn fetch(&self) -> Result<Bytes, FetchError> {
        (|| async { self.feed.fetch().await })
            .retry(ingest_backoff(&self.retry))
            .when(FetchError::is_transient)
            .notify(|e, delay| {
                warn!(
                    feed = %self.feed.describe(),
                    error = %e,
                    retry_in = ?delay,
                    "Feed fetch failed, retrying"
                )
            })
            .await
    }

    async fn write(&self, tick: Tick, payload: Bytes) -> Result<WriteReceipt, WriteError> {
        (|| async { self.writer.write(tick.scheduled_at, payload.clone()).await })
            .retry(ingest_backoff(&self.retry))
            .when(|e: &WriteError| e.status().is_none_or(|s| s >= 500))
            .notify(|e, delay| {
                warn!(
                    key = %e.key(),
                    error = %e,
                    retry_in = ?delay,
                    "Snapshot write failed, retrying"
                )
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{ScriptedFeed, ScriptedResponse};
    use crate::object_store::{MemoryObjectStore, StoreOp};
    use chrono::TimeZone;

    fn job_with(feed: ScriptedFeed, store: Arc<MemoryObjectStore>) -> (IngestionJob, Arc<ScriptedFeed>) {
        let feed = Arc::new(feed);
        let writer = SnapshotWriter::new(store, "live");
        (IngestionJob::new(feed.clone(), writer), feed)
    }

    fn fast_retry(max_attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts,
            min_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    fn june_first() -> Tick {
        Tick::new(Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn test_success_writes_scheduled_key() {
        let store = Arc::new(MemoryObjectStore::new());
        let (job, _) = job_with(ScriptedFeed::always("P"), store.clone());

        let report = job.run(june_first()).await;

        assert_eq!(
            report.outcome,
            IngestionOutcome::Success {
                key: "2023-06-01-00-00-00.xml".to_string(),
                size: 1,
                status: 200,
            }
        );
        assert_eq!(store.count(StoreOp::Put).await, 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_writes_nothing() {
        let store = Arc::new(MemoryObjectStore::new());
        let (job, feed) = job_with(ScriptedFeed::failing(500), store.clone());

        let report = job.run(june_first()).await;

        assert!(!report.is_success());
        assert!(matches!(
            report.outcome,
            IngestionOutcome::Failure { stage: IngestStage::Fetching, .. }
        ));
        assert_eq!(feed.calls(), 1);
        assert_eq!(store.count(StoreOp::Put).await, 0);
    }

    #[tokio::test]
    async fn test_write_failure_not_retried_by_default() {
        let store = Arc::new(MemoryObjectStore::new());
        store.fail_on(StoreOp::Put, None).await;
        let (job, _) = job_with(ScriptedFeed::always("P"), store.clone());

        let report = job.run(june_first()).await;

        match report.outcome {
            IngestionOutcome::Failure { stage, cause } => {
                assert_eq!(stage, IngestStage::Writing);
                assert!(cause.contains("2023-06-01-00-00-00.xml"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(store.count(StoreOp::Put).await, 1);
    }

    #[tokio::test]
    async fn test_retry_recovers_transient_fetch() {
        let store = Arc::new(MemoryObjectStore::new());
        let feed = ScriptedFeed::new([
            ScriptedResponse::Status(503),
            ScriptedResponse::Body(Bytes::from_static(b"P")),
        ]);
        let (job, feed) = job_with(feed, store.clone());
        let job = job.with_retry(fast_retry(3));

        let report = job.run(june_first()).await;

        assert!(report.is_success());
        assert_eq!(feed.calls(), 2);
        assert_eq!(store.keys("live").await, vec!["2023-06-01-00-00-00.xml"]);
    }

    #[tokio::test]
    async fn test_retry_skips_permanent_fetch_errors() {
        let store = Arc::new(MemoryObjectStore::new());
        let (job, feed) = job_with(ScriptedFeed::failing(403), store);
        let job = job.with_retry(fast_retry(5));

        let report = job.run(june_first()).await;

        assert!(!report.is_success());
        assert_eq!(feed.calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_exhausts_bounded_attempts() {
        let store = Arc::new(MemoryObjectStore::new());
        store.fail_on(StoreOp::Put, None).await;
        let (job, _) = job_with(ScriptedFeed::always("P"), store.clone());
        let job = job.with_retry(fast_retry(3));

        let report = job.run(june_first()).await;

        assert!(!report.is_success());
        assert_eq!(store.count(StoreOp::Put).await, 3);
    }

    #[test]
    fn test_tick_from_event_json() {
        let event = r#"{"version":"0","detail-type":"Scheduled Event","time":"2021-12-05T01:01:01Z","detail":{}}"#;
        let tick = Tick::from_event_json(event).unwrap();
        assert_eq!(
            tick.scheduled_at,
            Utc.with_ymd_and_hms(2021, 12, 5, 1, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_tick_report_serializes_flat() {
        let report = TickReport {
            scheduled_at: june_first().scheduled_at,
            outcome: IngestionOutcome::Failure {
                stage: IngestStage::Fetching,
                cause: "timeout".to_string(),
            },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "failure");
        assert_eq!(json["stage"], "fetching");
        assert_eq!(json["cause"], "timeout");
    }
}
