//! Parkwatch - parking feed snapshot ingestion and archival
//!
//! Periodically fetches the parking availability feed, stores each response
//! under a timestamp-derived key in object storage, and moves snapshots from
//! closed calendar periods into an archive bucket.

pub mod archive;
pub mod config;
pub mod feed;
pub mod ingest;
pub mod monitor;
pub mod object_store;
pub mod scheduler;
pub mod snapshot;
pub mod utils;
