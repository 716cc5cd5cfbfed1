//! Retry utilities: backoff builders for in-tick retries.
//!
//! Uses `backon` for exponential backoff with jitter. Retrying is opt-in:
//! the default policy makes a single attempt per tick.

use backon::ExponentialBuilder;

use crate::config::RetryConfig;

/// Backoff for ingestion retries within one tick.
///
/// `max_attempts` counts the first try, so the builder allows
/// `max_attempts - 1` retries.
pub fn ingest_backoff(config: &RetryConfig) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(config.min_delay())
        .with_max_delay(config.max_delay())
        .with_max_times(config.max_attempts.saturating_sub(1))
        .with_jitter()
}
