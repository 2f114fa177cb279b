use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::config::settings::STALE_MARGIN_SECONDS_DEFAULT;

pub fn get_stale_margin(stale_margin_seconds_settings: Option<u64>) -> Duration {
    Duration::from_secs(stale_margin_seconds_settings.unwrap_or(STALE_MARGIN_SECONDS_DEFAULT))
}

/// Monotonic clock used for every staleness and timeout decision.
///
/// Backed by `tokio::time::Instant` so a paused test runtime drives it.
pub fn get_instant() -> Instant {
    Instant::now()
}

/// Seconds since epoch to a wall-clock instant, with millisecond precision.
pub fn seconds_to_datetime(seconds: i64) -> Option<DateTime<Utc>> {
    seconds
        .checked_mul(1000)
        .and_then(DateTime::from_timestamp_millis)
}
