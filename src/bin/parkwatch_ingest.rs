//! parkwatch-ingest: one ingestion tick
//!
//! Fetches the feed once and writes the payload under the key derived from
//! the scheduled time. Meant to be invoked by an external scheduler once per
//! tick; exits non-zero when the tick fails so the scheduler counts it.
//!
//! ## Scheduled time
//! - `--scheduled-time 2023-06-01T00:00:00Z`
//! - `--event '{"time": "2023-06-01T00:00:00Z", ...}'` (scheduler event payload)
//! - neither: the current second
//!
//! ## Configuration
//! - PARKWATCH_CONFIG / --config: YAML configuration file
//! - BUCKET_NAME: live bucket
//! - PARKWATCH_LOG: log filter (default: info)

use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::info;

use parkwatch::config::Config;
use parkwatch::feed::HttpFeed;
use parkwatch::ingest::{IngestionJob, IngestionOutcome, Tick};
use parkwatch::object_store::init_object_store;
use parkwatch::snapshot::SnapshotWriter;
use parkwatch::utils::bootstrap::init_tracing;

#[derive(Parser)]
#[command(name = "parkwatch-ingest")]
#[command(about = "Fetch the parking feed once and store the snapshot")]
struct Cli {
    /// Configuration file
    #[arg(long)]
    config: Option<String>,

    /// Nominal tick time (RFC 3339)
    #[arg(long, conflicts_with = "event")]
    scheduled_time: Option<DateTime<Utc>>,

    /// Scheduler event JSON carrying a `time` field
    #[arg(long)]
    event: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    let tick = match (cli.scheduled_time, cli.event.as_deref()) {
        (Some(at), _) => Tick::new(at),
        (None, Some(event)) => Tick::from_event_json(event)?,
        (None, None) => Tick::now(),
    };

    let store = init_object_store(&config.store).await?;
    let feed = Arc::new(HttpFeed::new(&config.feed)?);
    let writer = SnapshotWriter::new(store, &config.buckets.live);
    let job = IngestionJob::new(feed, writer).with_retry(config.ingest.retry.clone());

    info!(
        scheduled_at = %tick.scheduled_at,
        bucket = %config.buckets.live,
        "parkwatch-ingest started"
    );

    let report = job.run(tick).await;
    match report.outcome {
        IngestionOutcome::Success { .. } => Ok(()),
        IngestionOutcome::Failure { stage, cause } => {
            Err(format!("tick failed while {}: {}", stage.as_str(), cause).into())
        }
    }
}
