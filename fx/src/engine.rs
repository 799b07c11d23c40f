//! FX engine: refresh, lookup and trade-rate resolution over the rate store.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use valuta_common::{time, CurrencyCode, CurrencyRegistry, RateEntry, Timestamp};

use crate::aggregator::{AggregationResult, AggregatorConfig, RateAggregator};
use crate::error::FxResult;
use crate::source::RateSource;
use crate::store::RateStore;
use crate::ttl::TtlPolicy;

/// Configuration for the FX engine.
///
/// There is no default: the TTL must be configured explicitly.
#[derive(Debug, Clone)]
pub struct FxEngineConfig {
    /// Maximum age in seconds of a rate usable for trading.
    pub ttl_seconds: u64,
    /// Fan-out timeouts.
    pub aggregator: AggregatorConfig,
}

/// A looked-up rate with its freshness at lookup time.
#[derive(Debug, Clone, PartialEq)]
pub struct RateQuote {
    pub entry: RateEntry,
    pub fresh: bool,
}

impl RateQuote {
    /// Age of the underlying rate at `now`, in seconds.
    pub fn age_seconds(&self, now: Timestamp) -> i64 {
        time::age(self.entry.updated_at, now).num_seconds()
    }
}

/// The main FX engine.
pub struct FxEngine {
    store: Arc<RateStore>,
    aggregator: RateAggregator,
    sources: Vec<Arc<dyn RateSource>>,
    ttl: TtlPolicy,
}

impl FxEngine {
    /// Create a new FX engine.
    pub fn new(
        store: Arc<RateStore>,
        registry: Arc<CurrencyRegistry>,
        sources: Vec<Arc<dyn RateSource>>,
        config: FxEngineConfig,
    ) -> Self {
        Self {
            store,
            aggregator: RateAggregator::new(registry, config.aggregator),
            sources,
            ttl: TtlPolicy::new(config.ttl_seconds),
        }
    }

    /// Configured sources, in priority order.
    pub fn sources(&self) -> &[Arc<dyn RateSource>] {
        &self.sources
    }

    /// Underlying rate store.
    pub fn store(&self) -> &Arc<RateStore> {
        &self.store
    }

    /// Freshness policy.
    pub fn ttl(&self) -> TtlPolicy {
        self.ttl
    }

    /// Refresh from every configured source.
    pub async fn refresh_all(&self) -> FxResult<AggregationResult> {
        self.refresh(&self.sources).await
    }

    /// Query `sources` and commit what they returned.
    ///
    /// Nothing is committed if every source failed.
    #[instrument(skip(self, sources), fields(sources = sources.len()))]
    pub async fn refresh(&self, sources: &[Arc<dyn RateSource>]) -> FxResult<AggregationResult> {
        let result = self.aggregator.refresh(sources).await?;

        self.store.commit(&result.entries)?;

        if result.is_partial() {
            warn!(
                failed = ?result.failed.keys().collect::<Vec<_>>(),
                "Refresh committed with failed sources"
            );
        }
        info!(updated_pairs = result.entries.len(), "Refresh complete");

        Ok(result)
    }

    /// Informational lookup: the rate with a staleness flag.
    #[instrument(skip(self), fields(base = %base, quote = %quote))]
    pub fn quote(&self, base: &CurrencyCode, quote: &CurrencyCode) -> FxResult<RateQuote> {
        let entry = self.store.current_rate(base, quote)?;
        let fresh = self.ttl.is_fresh(&entry, time::now());

        debug!(rate = %entry.rate, fresh, "Rate resolved");
        Ok(RateQuote { entry, fresh })
    }

    /// Rate of `code` in USD for a trade. Stale rates are refused.
    #[instrument(skip(self), fields(currency = %code))]
    pub fn trade_rate(&self, code: &CurrencyCode) -> FxResult<RateEntry> {
        let entry = self.store.current_rate(code, &CurrencyCode::usd())?;
        self.ttl.require_fresh(&entry, time::now())?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FxError, SourceError};
    use crate::source::MockRateSource;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;
    use valuta_common::{CurrencyKind, CurrencyPair};

    fn code(c: &str) -> CurrencyCode {
        CurrencyCode::new(c)
    }

    fn engine(dir: &TempDir, sources: Vec<Arc<dyn RateSource>>, ttl_seconds: u64) -> FxEngine {
        let store = Arc::new(RateStore::open(dir.path()).unwrap());
        let config = FxEngineConfig {
            ttl_seconds,
            aggregator: AggregatorConfig::default(),
        };
        FxEngine::new(store, Arc::new(CurrencyRegistry::builtin()), sources, config)
    }

    fn crypto() -> Arc<MockRateSource> {
        let source = MockRateSource::new("crypto", Some(CurrencyKind::Crypto));
        source.set_rate(CurrencyPair::to_usd(code("BTC")), dec!(67000));
        Arc::new(source)
    }

    fn fiat() -> Arc<MockRateSource> {
        let source = MockRateSource::new("fiat", Some(CurrencyKind::Fiat));
        source.set_rate(CurrencyPair::to_usd(code("EUR")), dec!(1.25));
        Arc::new(source)
    }

    #[tokio::test]
    async fn test_refresh_commits_and_quotes() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, vec![crypto(), fiat()], 300);

        let result = engine.refresh_all().await.unwrap();
        assert_eq!(result.entries.len(), 2);

        let quote = engine.quote(&code("BTC"), &code("EUR")).unwrap();
        assert_eq!(quote.entry.rate, dec!(53600));
        assert!(quote.fresh);

        let rate = engine.trade_rate(&code("BTC")).unwrap();
        assert_eq!(rate.rate, dec!(67000));
    }

    #[tokio::test]
    async fn test_partial_refresh_commits_survivors() {
        let dir = TempDir::new().unwrap();
        let failing = crypto();
        failing.set_failure(Some(SourceError::Unavailable("down".to_string())));
        let engine = engine(&dir, vec![failing, fiat()], 300);

        let result = engine.refresh_all().await.unwrap();

        assert!(result.failed.contains_key("crypto"));
        assert!(engine.quote(&code("EUR"), &code("USD")).is_ok());
        assert!(matches!(
            engine.trade_rate(&code("BTC")),
            Err(FxError::RateNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_all_sources_failing_leaves_snapshot_untouched() {
        let dir = TempDir::new().unwrap();
        let crypto = crypto();
        let engine = engine(&dir, vec![crypto.clone()], 300);
        engine.refresh_all().await.unwrap();
        let before = engine.store().snapshot();

        crypto.set_failure(Some(SourceError::RateLimited("429".to_string())));
        let err = engine.refresh_all().await.unwrap_err();

        assert!(matches!(err, FxError::AllSourcesUnavailable(_)));
        let after = engine.store().snapshot();
        assert_eq!(after.last_refresh(), before.last_refresh());
        assert_eq!(after.len(), before.len());
    }

    #[tokio::test]
    async fn test_stale_rate_refused_for_trading_but_quoted() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, vec![], 60);
        let old = RateEntry::new(
            CurrencyPair::to_usd(code("ETH")),
            dec!(3500),
            time::now() - Duration::hours(1),
            "TEST",
        );
        engine.store().commit(&[old]).unwrap();

        let quote = engine.quote(&code("ETH"), &code("USD")).unwrap();
        assert!(!quote.fresh);
        assert!(quote.age_seconds(time::now()) >= 3600);

        let err = engine.trade_rate(&code("ETH")).unwrap_err();
        assert_eq!(err.error_code(), "STALE_RATE");
    }
}
