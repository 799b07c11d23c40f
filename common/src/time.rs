//! Time utilities for ValutaTrade.

use chrono::{DateTime, Duration, Utc};

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Age of a timestamp relative to `now`. Negative for future timestamps.
pub fn age(timestamp: Timestamp, now: Timestamp) -> Duration {
    now.signed_duration_since(timestamp)
}
