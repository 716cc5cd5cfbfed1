//! parkwatch-archive: move closed periods to the archive bucket
//!
//! Lists the live bucket, and for every closed period copies its snapshots
//! to the archive bucket, verifies the copies and deletes the originals.
//! Prints the run report as JSON on stdout and exits non-zero if any group
//! failed, so the next scheduled run retries it.
//!
//! ## Configuration
//! - PARKWATCH_CONFIG / --config: YAML configuration file
//! - PARKWATCH__ARCHIVE__PERIOD: `year` (default) or `month`
//! - PARKWATCH__ARCHIVE__VERIFICATION: `size` (default), `etag` or `sha256`

use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::info;

use parkwatch::archive::ArchivalJob;
use parkwatch::config::Config;
use parkwatch::object_store::init_object_store;
use parkwatch::utils::bootstrap::init_tracing;

#[derive(Parser)]
#[command(name = "parkwatch-archive")]
#[command(about = "Archive snapshots from closed periods")]
struct Cli {
    /// Configuration file
    #[arg(long)]
    config: Option<String>,

    /// Only archive this group (repeatable, e.g. `--only 2021 --only 2022`)
    #[arg(long, visible_alias = "year")]
    only: Vec<String>,

    /// Treat this instant as the current time (RFC 3339)
    #[arg(long)]
    now: Option<DateTime<Utc>>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if !cli.only.is_empty() {
        config.archive.only = cli.only;
    }

    let store = init_object_store(&config.store).await?;
    let job = ArchivalJob::from_config(store, &config.buckets, &config.archive);

    let now = cli.now.unwrap_or_else(Utc::now);
    info!(
        live = %config.buckets.live,
        archive = %config.buckets.archive,
        period = ?config.archive.period,
        now = %now,
        "parkwatch-archive started"
    );

    let report = job.run(now).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.is_clean() {
        Ok(())
    } else {
        Err(format!("groups not archived: {}", report.failed_groups().join(", ")).into())
    }
}
