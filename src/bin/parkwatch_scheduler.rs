//! parkwatch-scheduler: run both jobs from one process
//!
//! Replaces an external scheduler. Ingests every `ingest.interval_secs` and
//! attempts archival every `archive.check_interval_secs`, feeding each tick
//! into the failure monitor. Runs until interrupted.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use parkwatch::archive::ArchivalJob;
use parkwatch::config::Config;
use parkwatch::feed::HttpFeed;
use parkwatch::ingest::IngestionJob;
use parkwatch::monitor::{create_alert_channel, FailureMonitor};
use parkwatch::object_store::init_object_store;
use parkwatch::scheduler::Scheduler;
use parkwatch::snapshot::SnapshotWriter;
use parkwatch::utils::bootstrap::init_tracing;

#[derive(Parser)]
#[command(name = "parkwatch-scheduler")]
#[command(about = "Run ingestion and archival on a fixed cadence")]
struct Cli {
    /// Configuration file
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    let store = init_object_store(&config.store).await?;
    let feed = Arc::new(HttpFeed::new(&config.feed)?);
    let ingest = IngestionJob::new(feed, SnapshotWriter::new(store.clone(), &config.buckets.live))
        .with_retry(config.ingest.retry.clone());
    let channel = create_alert_channel(&config.alert).await?;
    let monitor = FailureMonitor::from_config(&config.alert, channel);
    let archive = ArchivalJob::from_config(store, &config.buckets, &config.archive);

    let handle = Scheduler::new(ingest, monitor, archive)
        .with_ingest_interval(config.ingest.interval())
        .with_archive_interval(config.archive.check_interval())
        .spawn();

    info!(
        live = %config.buckets.live,
        archive = %config.buckets.archive,
        "parkwatch-scheduler started"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    handle.abort();

    Ok(())
}
