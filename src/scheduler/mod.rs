//! In-process cadence driver.
//!
//! Runs both jobs from one long-lived process when no external scheduler is
//! available. Ingestion fires every `ingest.interval_secs`, archival every
//! `archive.check_interval_secs`. Missed ticks are skipped rather than
//! bunched up. Ingestion ticks sit on interval boundaries: the first is the
//! next boundary on the wall clock, later ones advance by the interval on
//! the runtime's monotonic clock, so a late wakeup or a clock step never
//! lands two ticks on one key.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::archive::{ArchivalJob, ArchiveError, ArchiveReport};
use crate::ingest::{IngestionJob, Tick, TickReport};
use crate::monitor::FailureMonitor;

/// First multiple of `interval` since the epoch at or after `now`.
pub fn next_boundary(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let step = interval.as_secs().max(1) as i64;
    let secs = now.timestamp();
    let rem = secs.rem_euclid(step);
    let aligned = if rem == 0 && now.timestamp_subsec_nanos() == 0 {
        secs
    } else {
        secs - rem + step
    };
    Utc.timestamp_opt(aligned, 0).single().unwrap_or(now)
}

/// Schedule time of a firing at `fired`, for a loop whose first firing at
/// `start` was scheduled for `first`.
fn tick_time(first: DateTime<Utc>, start: Instant, fired: Instant) -> DateTime<Utc> {
    let elapsed = chrono::Duration::from_std(fired.saturating_duration_since(start))
        .unwrap_or_else(|_| chrono::Duration::zero());
    first + elapsed
}

/// Handles to the scheduler's background tasks.
pub struct SchedulerHandle {
    ingest: JoinHandle<()>,
    archive: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop both loops. No further ticks or archival passes start; ones
    /// already started run to completion on their own tasks.
    pub fn abort(&self) {
        self.ingest.abort();
        self.archive.abort();
    }
}

/// Drives ingestion and archival on fixed intervals.
pub struct Scheduler {
    ingest: Arc<IngestionJob>,
    monitor: Arc<FailureMonitor>,
    archive: Arc<ArchivalJob>,
    ingest_interval: Duration,
    archive_interval: Duration,
    archive_running: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(ingest: IngestionJob, monitor: FailureMonitor, archive: ArchivalJob) -> Self {
        Self {
            ingest: Arc::new(ingest),
            monitor: Arc::new(monitor),
            archive: Arc::new(archive),
            ingest_interval: Duration::from_secs(60),
            archive_interval: Duration::from_secs(86_400),
            archive_running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_ingest_interval(mut self, interval: Duration) -> Self {
        self.ingest_interval = interval;
        self
    }

    pub fn with_archive_interval(mut self, interval: Duration) -> Self {
        self.archive_interval = interval;
        self
    }

    /// Run one ingestion tick and feed it to the failure monitor.
    pub async fn ingest_once(&self, tick: Tick) -> TickReport {
        let report = self.ingest.run(tick).await;
        self.monitor.observe(&report).await;
        report
    }

    /// Run one archival pass, or `None` when another pass is still running.
    pub async fn archive_once(
        &self,
        now: DateTime<Utc>,
    ) -> Option<Result<ArchiveReport, ArchiveError>> {
        run_guarded(&self.archive_running, &self.archive, now).await
    }

    /// Spawn both loops as background tasks.
    pub fn spawn(self) -> SchedulerHandle {
        info!(
            ingest_interval_secs = self.ingest_interval.as_secs(),
            archive_interval_secs = self.archive_interval.as_secs(),
            "Scheduler starting"
        );

        let ingest = {
            let job = Arc::clone(&self.ingest);
            let monitor = Arc::clone(&self.monitor);
            let period = self.ingest_interval;
            tokio::spawn(async move {
                let now = Utc::now();
                let first = next_boundary(now, period);
                let start = Instant::now() + (first - now).to_std().unwrap_or_default();
                let mut interval = tokio::time::interval_at(start, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    let fired = interval.tick().await;
                    let tick = Tick::new(tick_time(first, start, fired));

                    // Ticks may overlap a slow predecessor; keys never collide
                    let job = Arc::clone(&job);
                    let monitor = Arc::clone(&monitor);
                    tokio::spawn(async move {
                        let report = job.run(tick).await;
                        monitor.observe(&report).await;
                    });
                }
            })
        };

        let archive = {
            let job = Arc::clone(&self.archive);
            let running = Arc::clone(&self.archive_running);
            let period = self.archive_interval;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    interval.tick().await;
                    let job = Arc::clone(&job);
                    let running = Arc::clone(&running);
                    tokio::spawn(async move {
                        run_guarded(&running, &job, Utc::now()).await;
                    });
                }
            })
        };

        SchedulerHandle { ingest, archive }
    }
}

/// Clears the running flag when dropped, including on panic or abort.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn run_guarded(
    running: &AtomicBool,
    job: &ArchivalJob,
    now: DateTime<Utc>,
) -> Option<Result<ArchiveReport, ArchiveError>> {
    if running
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        warn!("Archival already running, skipping this firing");
        return None;
    }
    let _guard = RunningGuard(running);

    let result = job.run(now).await;
    match &result {
        Ok(report) if !report.is_clean() => {
            warn!(failed = ?report.failed_groups(), "Archival finished with failed groups")
        }
        Ok(_) => {}
        Err(e) => error!(error = %e, "Archival run failed"),
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::ScriptedFeed;
    use crate::monitor::{ChannelAlertChannel, FailureWindow};
    use crate::object_store::{MemoryObjectStore, StoreOp};
    use crate::snapshot::{SnapshotKey, SnapshotWriter};

    fn scheduler(
        store: Arc<MemoryObjectStore>,
        feed: ScriptedFeed,
    ) -> (Scheduler, tokio::sync::mpsc::UnboundedReceiver<crate::monitor::AlertMessage>) {
        let (channel, rx) = ChannelAlertChannel::new();
        let ingest = IngestionJob::new(Arc::new(feed), SnapshotWriter::new(store.clone(), "live"));
        let monitor = FailureMonitor::new(FailureWindow::new(3, 2), Arc::new(channel));
        let archive = ArchivalJob::new(store, "live", "archive");
        (Scheduler::new(ingest, monitor, archive), rx)
    }

    #[test]
    fn test_next_boundary_rounds_up_to_interval() {
        let minute = Duration::from_secs(60);
        let now = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 42).unwrap();
        assert_eq!(
            next_boundary(now, minute),
            Utc.with_ymd_and_hms(2023, 6, 1, 0, 1, 0).unwrap()
        );

        let on_boundary = Utc.with_ymd_and_hms(2023, 6, 1, 0, 1, 0).unwrap();
        assert_eq!(next_boundary(on_boundary, minute), on_boundary);

        let just_after = on_boundary + chrono::Duration::milliseconds(1);
        assert_eq!(
            next_boundary(just_after, minute),
            Utc.with_ymd_and_hms(2023, 6, 1, 0, 2, 0).unwrap()
        );
        assert_eq!(next_boundary(now, Duration::from_secs(1)), now);
    }

    #[test]
    fn test_tick_time_follows_monotonic_clock() {
        let first = Utc.with_ymd_and_hms(2023, 6, 1, 0, 1, 0).unwrap();
        let start = Instant::now();

        assert_eq!(tick_time(first, start, start), first);
        assert_eq!(
            tick_time(first, start, start + Duration::from_secs(180)),
            Utc.with_ymd_and_hms(2023, 6, 1, 0, 4, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_ingest_once_feeds_monitor() {
        let store = Arc::new(MemoryObjectStore::new());
        let (scheduler, mut rx) = scheduler(store.clone(), ScriptedFeed::failing(502));

        for minute in 0..2 {
            let at = Utc.with_ymd_and_hms(2023, 6, 1, 0, minute, 0).unwrap();
            assert!(!scheduler.ingest_once(Tick::new(at)).await.is_success());
        }

        assert!(rx.try_recv().is_ok());
        assert_eq!(store.count(StoreOp::Put).await, 0);
    }

    #[tokio::test]
    async fn test_archive_once_skips_when_running() {
        let store = Arc::new(MemoryObjectStore::new());
        store.seed("live", "2020-01-01-00-00-00.xml", "x").await;
        let (scheduler, _rx) = scheduler(store.clone(), ScriptedFeed::always("P"));

        scheduler.archive_running.store(true, Ordering::Release);
        assert!(scheduler.archive_once(Utc::now()).await.is_none());
        assert_eq!(store.count(StoreOp::List).await, 0);

        scheduler.archive_running.store(false, Ordering::Release);
        let report = scheduler.archive_once(Utc::now()).await.unwrap().unwrap();
        assert_eq!(report.completed_groups(), vec!["2020"]);
        assert!(!scheduler.archive_running.load(Ordering::Acquire));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_writes_snapshots() {
        let store = Arc::new(MemoryObjectStore::new());
        let (scheduler, _rx) = scheduler(store.clone(), ScriptedFeed::always("P"));
        let handle = scheduler
            .with_ingest_interval(Duration::from_secs(60))
            .with_archive_interval(Duration::from_secs(3600))
            .spawn();

        tokio::time::sleep(Duration::from_secs(150)).await;
        handle.abort();

        assert!(store.count(StoreOp::Put).await >= 2);
    }

    /// Keys of every live put, in write order.
    async fn put_times(store: &MemoryObjectStore) -> Vec<chrono::NaiveDateTime> {
        store
            .operations()
            .await
            .into_iter()
            .filter(|op| op.op == StoreOp::Put)
            .map(|op| SnapshotKey::parse(&op.key).unwrap().taken_at())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_ticks_get_distinct_aligned_keys() {
        let store = Arc::new(MemoryObjectStore::new());
        let (scheduler, _rx) = scheduler(store.clone(), ScriptedFeed::always("P"));
        let handle = scheduler
            .with_ingest_interval(Duration::from_secs(60))
            .with_archive_interval(Duration::from_secs(3600))
            .spawn();

        // The wall clock stands still while the runtime clock is paused
        tokio::time::sleep(Duration::from_secs(200)).await;
        handle.abort();

        let times = put_times(&store).await;
        assert!(times.len() >= 3, "{times:?}");
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], chrono::Duration::seconds(60), "{times:?}");
        }
        for time in &times {
            assert_eq!(time.and_utc().timestamp() % 60, 0, "{time}");
        }
        assert_eq!(store.keys("live").await.len(), times.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_stops_new_ticks() {
        let store = Arc::new(MemoryObjectStore::new());
        let (scheduler, _rx) = scheduler(store.clone(), ScriptedFeed::always("P"));
        let handle = scheduler
            .with_ingest_interval(Duration::from_secs(60))
            .with_archive_interval(Duration::from_secs(3600))
            .spawn();

        tokio::time::sleep(Duration::from_secs(150)).await;
        handle.abort();
        // Let any tick that already started finish
        tokio::time::sleep(Duration::from_secs(1)).await;
        let puts = store.count(StoreOp::Put).await;
        assert!(puts >= 2);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(store.count(StoreOp::Put).await, puts);
    }
}
