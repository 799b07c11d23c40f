//! Rate source capability.

use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use valuta_common::{CurrencyKind, CurrencyPair, RateEntry};

use crate::error::SourceError;

/// One external price source.
///
/// Implementations translate a provider response into [`RateEntry`] values
/// and report failures as classified [`SourceError`] values so the
/// aggregator can continue with the remaining sources.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Stable source identifier used in reports and persisted entries.
    fn id(&self) -> &str;

    /// Currency kind this source is authoritative for when sources overlap.
    fn authority(&self) -> Option<CurrencyKind>;

    /// Check if this source can quote the given pair.
    fn supports_pair(&self, pair: &CurrencyPair) -> bool;

    /// Fetch quotes for the supported subset of `pairs`.
    async fn fetch(&self, pairs: &[CurrencyPair]) -> Result<Vec<RateEntry>, SourceError>;
}

/// Map a non-success HTTP status to a source error.
pub(crate) fn classify_status(status: reqwest::StatusCode) -> Option<SourceError> {
    if status.is_success() {
        return None;
    }
    Some(match status.as_u16() {
        429 => SourceError::RateLimited(format!("HTTP {status}")),
        401 | 403 => SourceError::Unavailable(format!("authentication rejected (HTTP {status})")),
        _ => SourceError::Unavailable(format!("HTTP {status}")),
    })
}

/// Map a transport-level failure to a source error.
pub(crate) fn classify_transport(error: reqwest::Error) -> SourceError {
    if error.is_timeout() {
        SourceError::Unavailable("request timed out".to_string())
    } else if error.is_decode() {
        SourceError::MalformedResponse(error.to_string())
    } else {
        SourceError::Unavailable(error.to_string())
    }
}

/// Convert a JSON number to a decimal without a float round-trip.
pub(crate) fn decimal_from_json(number: &serde_json::Number) -> Option<Decimal> {
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Mock rate source for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateSource {
    id: String,
    authority: Option<CurrencyKind>,
    rates: dashmap::DashMap<CurrencyPair, rust_decimal::Decimal>,
    failure: parking_lot::Mutex<Option<SourceError>>,
    delay: Option<std::time::Duration>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateSource {
    /// Create a new mock source.
    pub fn new(id: impl Into<String>, authority: Option<CurrencyKind>) -> Self {
        Self {
            id: id.into(),
            authority,
            rates: dashmap::DashMap::new(),
            failure: parking_lot::Mutex::new(None),
            delay: None,
        }
    }

    /// Delay every fetch by `delay`.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set a rate for a currency pair.
    pub fn set_rate(&self, pair: CurrencyPair, rate: rust_decimal::Decimal) {
        self.rates.insert(pair, rate);
    }

    /// Make every subsequent fetch fail (or succeed again with `None`).
    pub fn set_failure(&self, failure: Option<SourceError>) {
        *self.failure.lock() = failure;
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateSource for MockRateSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn authority(&self) -> Option<CurrencyKind> {
        self.authority
    }

    fn supports_pair(&self, pair: &CurrencyPair) -> bool {
        self.rates.contains_key(pair)
    }

    async fn fetch(&self, pairs: &[CurrencyPair]) -> Result<Vec<RateEntry>, SourceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failure.lock().clone();
        if let Some(failure) = failure {
            return Err(failure);
        }

        let now = valuta_common::time::now();
        Ok(pairs
            .iter()
            .filter_map(|pair| {
                self.rates
                    .get(pair)
                    .map(|rate| RateEntry::new(pair.clone(), *rate, now, self.id.clone()))
            })
            .collect())
    }
}
