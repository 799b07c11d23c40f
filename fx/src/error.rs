//! FX error types.

use std::collections::BTreeMap;

use chrono::Duration;
use thiserror::Error;
use valuta_common::{CurrencyPair, ValutaError};

/// Classified failure of a single rate source.
///
/// These never abort a refresh on their own; the aggregator collects them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Transport failure, authentication failure, timeout or non-success status.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// Provider rejected the request with a rate limit.
    #[error("source rate limited: {0}")]
    RateLimited(String),

    /// Response could not be interpreted.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl SourceError {
    /// Get error code for reports and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            SourceError::Unavailable(_) => "SOURCE_UNAVAILABLE",
            SourceError::RateLimited(_) => "SOURCE_RATE_LIMITED",
            SourceError::MalformedResponse(_) => "SOURCE_MALFORMED_RESPONSE",
        }
    }
}

/// Errors that can occur in the FX engine.
#[derive(Debug, Error)]
pub enum FxError {
    /// No direct, inverse or triangulated path exists for the pair.
    #[error("Rate not available for {0}")]
    RateNotFound(CurrencyPair),

    /// Rate is older than the configured TTL.
    #[error(
        "Rate for {pair} is stale ({} s old, TTL {} s); run update-rates",
        .age.num_seconds(),
        .ttl.num_seconds()
    )]
    StaleRate {
        pair: CurrencyPair,
        age: Duration,
        ttl: Duration,
    },

    /// Every configured source failed; nothing was committed.
    #[error("All rate sources unavailable: {}", format_failures(.0))]
    AllSourcesUnavailable(BTreeMap<String, SourceError>),

    /// A rate to be committed is not strictly positive.
    #[error("Invalid rate {rate} for {pair}")]
    InvalidRate { pair: CurrencyPair, rate: String },

    /// Currency validation or durable write failed.
    #[error(transparent)]
    Common(#[from] ValutaError),
}

impl FxError {
    /// Get error code for user-facing messages and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::RateNotFound(_) => "RATE_NOT_FOUND",
            FxError::StaleRate { .. } => "STALE_RATE",
            FxError::AllSourcesUnavailable(_) => "ALL_SOURCES_UNAVAILABLE",
            FxError::InvalidRate { .. } => "INVALID_RATE",
            FxError::Common(e) => e.error_code(),
        }
    }
}

fn format_failures(failures: &BTreeMap<String, SourceError>) -> String {
    if failures.is_empty() {
        return "no sources configured".to_string();
    }
    failures
        .iter()
        .map(|(source, error)| format!("{source}: {error}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_sources_message_lists_failures() {
        let mut failures = BTreeMap::new();
        failures.insert(
            "coingecko".to_string(),
            SourceError::RateLimited("429".to_string()),
        );
        failures.insert(
            "exchangerate-api".to_string(),
            SourceError::Unavailable("missing API key".to_string()),
        );

        let err = FxError::AllSourcesUnavailable(failures);
        let message = err.to_string();

        assert!(message.contains("coingecko: source rate limited: 429"));
        assert!(message.contains("exchangerate-api: source unavailable"));
        assert_eq!(err.error_code(), "ALL_SOURCES_UNAVAILABLE");
    }
}
