//! Fan-out over all rate sources with per-source fault isolation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};
use valuta_common::{CurrencyKind, CurrencyPair, CurrencyRegistry, RateEntry};

use crate::error::{FxError, FxResult, SourceError};
use crate::source::RateSource;

/// Timeouts applied to one refresh cycle.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Budget for a single source call.
    pub source_timeout: Duration,
    /// Budget for the whole fan-out. Sources still running are cancelled.
    pub refresh_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            source_timeout: Duration::from_secs(10),
            refresh_timeout: Duration::from_secs(30),
        }
    }
}

/// Merged outcome of a refresh where at least one source succeeded.
#[derive(Debug, Clone, Default)]
pub struct AggregationResult {
    /// One entry per pair, ordered by pair.
    pub entries: Vec<RateEntry>,
    /// Sources that answered.
    pub succeeded: BTreeSet<String>,
    /// Sources that failed, with the reason. Reported as warnings.
    pub failed: BTreeMap<String, SourceError>,
}

impl AggregationResult {
    /// True if some sources failed.
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Queries every source concurrently and merges the answers.
pub struct RateAggregator {
    registry: Arc<CurrencyRegistry>,
    config: AggregatorConfig,
}

impl RateAggregator {
    /// Create a new aggregator over the registry's currencies.
    pub fn new(registry: Arc<CurrencyRegistry>, config: AggregatorConfig) -> Self {
        Self { registry, config }
    }

    /// Every registered non-USD currency against USD.
    pub fn requested_pairs(&self) -> Vec<CurrencyPair> {
        self.registry
            .list()
            .into_iter()
            .filter(|c| !c.code.is_usd())
            .map(|c| CurrencyPair::to_usd(c.code.clone()))
            .collect()
    }

    /// Run one refresh cycle over `sources`.
    ///
    /// Fails with [`FxError::AllSourcesUnavailable`] only if no source
    /// answered; otherwise failures are returned in the result.
    #[instrument(skip(self, sources), fields(sources = sources.len()))]
    pub async fn refresh(&self, sources: &[Arc<dyn RateSource>]) -> FxResult<AggregationResult> {
        let pairs = self.requested_pairs();
        let mut outcomes = self.collect(sources, &pairs).await;

        let mut result = AggregationResult::default();
        let mut answers: Vec<(&Arc<dyn RateSource>, Vec<RateEntry>)> = Vec::new();

        for (index, source) in sources.iter().enumerate() {
            let id = source.id().to_string();
            match outcomes[index].take() {
                Some(Ok(entries)) => {
                    debug!(source = %id, entries = entries.len(), "Source answered");
                    result.succeeded.insert(id);
                    answers.push((source, entries));
                }
                Some(Err(error)) => {
                    warn!(source = %id, error = %error, "Source failed");
                    result.failed.insert(id, error);
                }
                None => {
                    warn!(source = %id, "Source cancelled at refresh deadline");
                    result.failed.insert(
                        id,
                        SourceError::Unavailable("refresh deadline exceeded".to_string()),
                    );
                }
            }
        }

        if result.succeeded.is_empty() {
            return Err(FxError::AllSourcesUnavailable(result.failed));
        }

        result.entries = self.merge(answers);

        info!(
            entries = result.entries.len(),
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            "Aggregation complete"
        );

        Ok(result)
    }

    /// Run all fetches concurrently, one slot per source in configured order.
    /// A `None` slot means the source was still running at the deadline.
    async fn collect(
        &self,
        sources: &[Arc<dyn RateSource>],
        pairs: &[CurrencyPair],
    ) -> Vec<Option<Result<Vec<RateEntry>, SourceError>>> {
        let deadline = tokio::time::Instant::now() + self.config.refresh_timeout;
        let source_timeout = self.config.source_timeout;

        let mut pending: FuturesUnordered<_> = sources
            .iter()
            .enumerate()
            .map(|(index, source)| async move {
                let outcome = match tokio::time::timeout(source_timeout, source.fetch(pairs)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(SourceError::Unavailable(format!(
                        "timed out after {} ms",
                        source_timeout.as_millis()
                    ))),
                };
                (index, outcome)
            })
            .collect();

        let mut outcomes = vec![None; sources.len()];
        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some((index, outcome))) => outcomes[index] = Some(outcome),
                Ok(None) => break,
                Err(_) => {
                    warn!(outstanding = pending.len(), "Refresh deadline reached");
                    break;
                }
            }
        }

        outcomes
    }

    /// Merge answers into one entry per pair.
    ///
    /// The source authoritative for the traded currency's kind wins a
    /// duplicate pair; otherwise the earlier configured source wins.
    fn merge(&self, answers: Vec<(&Arc<dyn RateSource>, Vec<RateEntry>)>) -> Vec<RateEntry> {
        let mut merged: BTreeMap<CurrencyPair, (bool, RateEntry)> = BTreeMap::new();

        for (source, entries) in answers {
            for entry in entries {
                if entry.rate <= Decimal::ZERO {
                    warn!(source = source.id(), pair = %entry.pair(), rate = %entry.rate, "Dropping non-positive rate");
                    continue;
                }

                let pair = entry.pair();
                let authoritative = self.is_authoritative(source.authority(), &pair);

                match merged.get(&pair) {
                    Some((existing_authoritative, _)) if *existing_authoritative || !authoritative => {
                        debug!(source = source.id(), pair = %pair, "Duplicate pair ignored");
                    }
                    _ => {
                        merged.insert(pair, (authoritative, entry));
                    }
                }
            }
        }

        merged.into_values().map(|(_, entry)| entry).collect()
    }

    fn is_authoritative(&self, authority: Option<CurrencyKind>, pair: &CurrencyPair) -> bool {
        match authority {
            Some(kind) => self.registry.kind_of(pair.traded()) == Some(kind),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockRateSource;
    use rust_decimal_macros::dec;
    use valuta_common::CurrencyCode;

    fn pair(code: &str) -> CurrencyPair {
        CurrencyPair::to_usd(CurrencyCode::new(code))
    }

    fn aggregator() -> RateAggregator {
        RateAggregator::new(
            Arc::new(CurrencyRegistry::builtin()),
            AggregatorConfig {
                source_timeout: Duration::from_millis(200),
                refresh_timeout: Duration::from_millis(500),
            },
        )
    }

    fn crypto_source() -> Arc<MockRateSource> {
        let source = MockRateSource::new("crypto", Some(CurrencyKind::Crypto));
        source.set_rate(pair("BTC"), dec!(67000));
        source.set_rate(pair("ETH"), dec!(3500));
        Arc::new(source)
    }

    fn fiat_source() -> Arc<MockRateSource> {
        let source = MockRateSource::new("fiat", Some(CurrencyKind::Fiat));
        source.set_rate(pair("EUR"), dec!(1.08));
        Arc::new(source)
    }

    #[test]
    fn test_requested_pairs_exclude_usd() {
        let pairs = aggregator().requested_pairs();
        assert_eq!(pairs.len(), 10);
        assert!(pairs.iter().all(|p| p.quote.is_usd() && !p.base.is_usd()));
    }

    #[tokio::test]
    async fn test_all_sources_succeed() {
        let sources: Vec<Arc<dyn RateSource>> = vec![crypto_source(), fiat_source()];

        let result = aggregator().refresh(&sources).await.unwrap();

        assert_eq!(result.entries.len(), 3);
        assert_eq!(result.succeeded.len(), 2);
        assert!(!result.is_partial());
    }

    #[tokio::test]
    async fn test_partial_failure_is_reported_not_fatal() {
        let crypto = crypto_source();
        crypto.set_failure(Some(SourceError::Unavailable("connection refused".to_string())));
        let sources: Vec<Arc<dyn RateSource>> = vec![crypto, fiat_source()];

        let result = aggregator().refresh(&sources).await.unwrap();

        assert!(result.is_partial());
        assert!(result.failed.contains_key("crypto"));
        assert!(result.succeeded.contains("fiat"));
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].pair(), pair("EUR"));
    }

    #[tokio::test]
    async fn test_all_sources_fail() {
        let crypto = crypto_source();
        crypto.set_failure(Some(SourceError::RateLimited("429".to_string())));
        let fiat = fiat_source();
        fiat.set_failure(Some(SourceError::MalformedResponse("bad json".to_string())));
        let sources: Vec<Arc<dyn RateSource>> = vec![crypto, fiat];

        let err = aggregator().refresh(&sources).await.unwrap_err();

        match err {
            FxError::AllSourcesUnavailable(failures) => assert_eq!(failures.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_authoritative_source_wins_duplicates() {
        // A fiat source that also (wrongly) quotes BTC, configured first.
        let fiat = fiat_source();
        fiat.set_rate(pair("BTC"), dec!(1));
        let crypto = crypto_source();
        crypto.set_rate(pair("EUR"), dec!(99));
        let sources: Vec<Arc<dyn RateSource>> = vec![fiat, crypto];

        let result = aggregator().refresh(&sources).await.unwrap();
        let by_pair: BTreeMap<CurrencyPair, RateEntry> =
            result.entries.into_iter().map(|e| (e.pair(), e)).collect();

        assert_eq!(by_pair[&pair("BTC")].rate, dec!(67000));
        assert_eq!(by_pair[&pair("BTC")].source, "crypto");
        assert_eq!(by_pair[&pair("EUR")].rate, dec!(1.08));
        assert_eq!(by_pair[&pair("EUR")].source, "fiat");
    }

    #[tokio::test]
    async fn test_first_configured_wins_without_authority() {
        let first = MockRateSource::new("first", None);
        first.set_rate(pair("BTC"), dec!(100));
        let second = MockRateSource::new("second", None);
        second.set_rate(pair("BTC"), dec!(200));
        let sources: Vec<Arc<dyn RateSource>> = vec![Arc::new(first), Arc::new(second)];

        let result = aggregator().refresh(&sources).await.unwrap();
        assert_eq!(result.entries[0].rate, dec!(100));
    }

    #[tokio::test]
    async fn test_slow_source_times_out_without_blocking_others() {
        let slow = MockRateSource::new("slow", Some(CurrencyKind::Crypto))
            .with_delay(Duration::from_secs(5));
        slow.set_rate(pair("BTC"), dec!(67000));
        let sources: Vec<Arc<dyn RateSource>> = vec![Arc::new(slow), fiat_source()];

        let started = std::time::Instant::now();
        let result = aggregator().refresh(&sources).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(matches!(result.failed.get("slow"), Some(SourceError::Unavailable(_))));
        assert!(result.succeeded.contains("fiat"));
    }

    #[tokio::test]
    async fn test_global_deadline_cancels_outstanding_sources() {
        let aggregator = RateAggregator::new(
            Arc::new(CurrencyRegistry::builtin()),
            AggregatorConfig {
                source_timeout: Duration::from_secs(10),
                refresh_timeout: Duration::from_millis(100),
            },
        );
        let slow = MockRateSource::new("slow", Some(CurrencyKind::Crypto))
            .with_delay(Duration::from_secs(5));
        let sources: Vec<Arc<dyn RateSource>> = vec![Arc::new(slow), fiat_source()];

        let result = aggregator.refresh(&sources).await.unwrap();

        assert_eq!(
            result.failed.get("slow"),
            Some(&SourceError::Unavailable("refresh deadline exceeded".to_string()))
        );
        assert_eq!(result.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_no_sources_is_all_unavailable() {
        let err = aggregator().refresh(&[]).await.unwrap_err();
        assert!(matches!(err, FxError::AllSourcesUnavailable(f) if f.is_empty()));
    }
}
