//! Timestamp helpers.

use chrono::{DateTime, Utc};

/// Timestamp type used throughout execution reports.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Formats a timestamp as RFC 3339 with millisecond precision.
#[must_use]
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Milliseconds between two timestamps, zero if `finish` precedes `start`.
#[must_use]
pub fn elapsed_ms(start: &Timestamp, finish: &Timestamp) -> i64 {
    (*finish - *start).num_milliseconds().max(0)
}
