//! Fiat rate source backed by ExchangeRate-API.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument};
use valuta_common::{time, CurrencyCode, CurrencyKind, CurrencyPair, RateEntry, Timestamp};

use crate::error::SourceError;
use crate::source::{classify_status, classify_transport, decimal_from_json, RateSource};

pub const EXCHANGE_RATE_SOURCE_ID: &str = "exchangerate-api";
pub const EXCHANGE_RATE_BASE_URL: &str = "https://v6.exchangerate-api.com/v6";

/// Configuration for the ExchangeRate-API source.
#[derive(Clone)]
pub struct ExchangeRateConfig {
    /// API root, without trailing slash.
    pub base_url: String,
    /// API key. Requests are not attempted without one.
    pub api_key: Option<String>,
    /// Fiat codes to quote against USD.
    pub codes: Vec<CurrencyCode>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl std::fmt::Debug for ExchangeRateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeRateConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("codes", &self.codes)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for ExchangeRateConfig {
    fn default() -> Self {
        Self {
            base_url: EXCHANGE_RATE_BASE_URL.to_string(),
            api_key: None,
            codes: ["EUR", "GBP", "JPY", "RUB", "CNY"]
                .into_iter()
                .map(CurrencyCode::new)
                .collect(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    result: String,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    #[serde(default)]
    conversion_rates: HashMap<String, Value>,
}

/// Quotes fiat currencies against USD. Requires an API key.
pub struct ExchangeRateSource {
    client: Client,
    config: ExchangeRateConfig,
}

impl ExchangeRateSource {
    /// Create a new source. Fails only if the HTTP client cannot be built.
    pub fn new(config: ExchangeRateConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SourceError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn api_key(&self) -> Result<&str, SourceError> {
        self.config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| SourceError::Unavailable("EXCHANGE_RATE_API_KEY is not set".to_string()))
    }
}

#[async_trait]
impl RateSource for ExchangeRateSource {
    fn id(&self) -> &str {
        EXCHANGE_RATE_SOURCE_ID
    }

    fn authority(&self) -> Option<CurrencyKind> {
        Some(CurrencyKind::Fiat)
    }

    fn supports_pair(&self, pair: &CurrencyPair) -> bool {
        pair.quote.is_usd() && !pair.base.is_usd() && self.config.codes.contains(&pair.base)
    }

    #[instrument(skip(self, pairs), fields(source = EXCHANGE_RATE_SOURCE_ID))]
    async fn fetch(&self, pairs: &[CurrencyPair]) -> Result<Vec<RateEntry>, SourceError> {
        let wanted: Vec<&CurrencyPair> = pairs.iter().filter(|p| self.supports_pair(p)).collect();
        if wanted.is_empty() {
            debug!("No supported pairs requested");
            return Ok(Vec::new());
        }
        let api_key = self.api_key()?;

        info!(pairs = wanted.len(), "Fetching fiat rates");

        // The key is part of the path; strip URLs from errors so it is never logged.
        let response = self
            .client
            .get(format!("{}/{}/latest/USD", self.config.base_url, api_key))
            .send()
            .await
            .map_err(|e| classify_transport(e.without_url()))?;

        if let Some(error) = classify_status(response.status()) {
            return Err(error);
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(e.without_url()))?;
        let entries = parse_latest(&body, &wanted, time::now())?;

        info!(rates = entries.len(), "ExchangeRate-API returned rates");
        Ok(entries)
    }
}

/// Translate a `/latest/USD` body into `CODE/USD` entries.
///
/// The provider quotes how many units of CODE one USD buys, so the stored
/// rate is its reciprocal.
pub fn parse_latest(
    body: &str,
    pairs: &[&CurrencyPair],
    fetched_at: Timestamp,
) -> Result<Vec<RateEntry>, SourceError> {
    let response: LatestResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::MalformedResponse(format!("undecodable body: {e}")))?;

    if response.result != "success" {
        let reason = response.error_type.unwrap_or_else(|| "unknown".to_string());
        return Err(match reason.as_str() {
            "invalid-key" | "inactive-account" => SourceError::Unavailable(reason),
            "quota-reached" => SourceError::RateLimited(reason),
            _ => SourceError::MalformedResponse(format!("provider reported {reason}")),
        });
    }

    let mut entries = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let Some(value) = response.conversion_rates.get(pair.base.as_str()) else {
            debug!(currency = %pair.base, "Currency missing from response");
            continue;
        };

        let per_usd = match value {
            Value::Number(n) => decimal_from_json(n),
            _ => None,
        }
        .filter(|rate| *rate > Decimal::ZERO)
        .ok_or_else(|| {
            SourceError::MalformedResponse(format!("invalid rate for {}: {value}", pair.base))
        })?;

        entries.push(RateEntry::new(
            (*pair).clone(),
            Decimal::ONE / per_usd,
            fetched_at,
            EXCHANGE_RATE_SOURCE_ID,
        ));
    }

    Ok(entries)
}
