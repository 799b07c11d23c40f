//! Metrics collection for hub monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

/// Hub metrics.
#[derive(Debug, Default)]
pub struct HubMetrics {
    /// Trades applied to a wallet.
    pub trades_executed: AtomicU64,
    /// Trades refused by validation, funds or rate freshness.
    pub trades_rejected: AtomicU64,
    /// Refreshes that committed rates.
    pub refreshes_total: AtomicU64,
    /// Refreshes where every source failed.
    pub refreshes_failed: AtomicU64,
    /// Individual source failures across all refreshes.
    pub source_failures: AtomicU64,
}

impl HubMetrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trade_executed(&self) {
        self.trades_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn trade_rejected(&self) {
        self.trades_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a committed refresh and how many sources failed in it.
    pub fn refresh_committed(&self, failed_sources: usize) {
        self.refreshes_total.fetch_add(1, Ordering::Relaxed);
        self.source_failures
            .fetch_add(failed_sources as u64, Ordering::Relaxed);
    }

    /// Record a refresh where every source failed.
    pub fn refresh_failed(&self, failed_sources: usize) {
        self.refreshes_failed.fetch_add(1, Ordering::Relaxed);
        self.source_failures
            .fetch_add(failed_sources as u64, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            trades_executed: self.trades_executed.load(Ordering::Relaxed),
            trades_rejected: self.trades_rejected.load(Ordering::Relaxed),
            refreshes_total: self.refreshes_total.load(Ordering::Relaxed),
            refreshes_failed: self.refreshes_failed.load(Ordering::Relaxed),
            source_failures: self.source_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub trades_executed: u64,
    pub trades_rejected: u64,
    pub refreshes_total: u64,
    pub refreshes_failed: u64,
    pub source_failures: u64,
}
