//! Freshness policy for cached rates.

use chrono::Duration;
use valuta_common::{time, RateEntry, Timestamp};

use crate::error::{FxError, FxResult};

/// Upper bound on a configurable TTL (100 years).
const MAX_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

/// True iff `now - entry.updated_at <= ttl_seconds`.
///
/// Entries stamped in the future count as fresh.
pub fn is_fresh(entry: &RateEntry, now: Timestamp, ttl_seconds: u64) -> bool {
    time::age(entry.updated_at, now) <= ttl_duration(ttl_seconds)
}

fn ttl_duration(ttl_seconds: u64) -> Duration {
    Duration::seconds(ttl_seconds.min(MAX_TTL_SECONDS) as i64)
}

/// TTL policy bound to a configured time-to-live.
///
/// Trades call [`TtlPolicy::require_fresh`] and treat staleness as fatal.
/// Informational lookups call [`TtlPolicy::is_fresh`] and only flag it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    ttl_seconds: u64,
}

impl TtlPolicy {
    /// Create a policy. TTL must come from configuration.
    pub fn new(ttl_seconds: u64) -> Self {
        Self { ttl_seconds }
    }

    /// Configured TTL as a duration.
    pub fn ttl(&self) -> Duration {
        ttl_duration(self.ttl_seconds)
    }

    /// Check freshness at `now`.
    pub fn is_fresh(&self, entry: &RateEntry, now: Timestamp) -> bool {
        is_fresh(entry, now, self.ttl_seconds)
    }

    /// Fail with [`FxError::StaleRate`] unless the entry is fresh at `now`.
    pub fn require_fresh(&self, entry: &RateEntry, now: Timestamp) -> FxResult<()> {
        if self.is_fresh(entry, now) {
            return Ok(());
        }
        Err(FxError::StaleRate {
            pair: entry.pair(),
            age: time::age(entry.updated_at, now),
            ttl: self.ttl(),
        })
    }
}
