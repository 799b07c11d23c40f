//! Crypto rate source backed by the CoinGecko `/simple/price` endpoint.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, info, instrument};
use valuta_common::{time, CurrencyCode, CurrencyKind, CurrencyPair, RateEntry, Timestamp};

use crate::error::SourceError;
use crate::source::{classify_status, classify_transport, decimal_from_json, RateSource};

pub const COINGECKO_SOURCE_ID: &str = "coingecko";
pub const COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Configuration for the CoinGecko source.
#[derive(Debug, Clone)]
pub struct CoinGeckoConfig {
    /// API root, without trailing slash.
    pub base_url: String,
    /// Internal code to CoinGecko coin id.
    pub ids: BTreeMap<CurrencyCode, String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for CoinGeckoConfig {
    fn default() -> Self {
        let ids = [
            ("BTC", "bitcoin"),
            ("ETH", "ethereum"),
            ("SOL", "solana"),
            ("DOGE", "dogecoin"),
            ("XRP", "ripple"),
        ]
        .into_iter()
        .map(|(code, id)| (CurrencyCode::new(code), id.to_string()))
        .collect();

        Self {
            base_url: COINGECKO_BASE_URL.to_string(),
            ids,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Quotes crypto currencies against USD. Needs no credential.
pub struct CoinGeckoSource {
    client: Client,
    config: CoinGeckoConfig,
}

impl CoinGeckoSource {
    /// Create a new source. Fails only if the HTTP client cannot be built.
    pub fn new(config: CoinGeckoConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SourceError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Keep only the codes in `codes`.
    pub fn restrict_to(mut self, codes: &[CurrencyCode]) -> Self {
        self.config.ids.retain(|code, _| codes.contains(code));
        self
    }
}

#[async_trait]
impl RateSource for CoinGeckoSource {
    fn id(&self) -> &str {
        COINGECKO_SOURCE_ID
    }

    fn authority(&self) -> Option<CurrencyKind> {
        Some(CurrencyKind::Crypto)
    }

    fn supports_pair(&self, pair: &CurrencyPair) -> bool {
        pair.quote.is_usd() && self.config.ids.contains_key(&pair.base)
    }

    #[instrument(skip(self, pairs), fields(source = COINGECKO_SOURCE_ID))]
    async fn fetch(&self, pairs: &[CurrencyPair]) -> Result<Vec<RateEntry>, SourceError> {
        let wanted: Vec<&CurrencyPair> = pairs.iter().filter(|p| self.supports_pair(p)).collect();
        if wanted.is_empty() {
            debug!("No supported pairs requested");
            return Ok(Vec::new());
        }

        let ids = wanted
            .iter()
            .map(|p| self.config.ids[&p.base].as_str())
            .collect::<Vec<_>>()
            .join(",");

        info!(pairs = wanted.len(), "Fetching crypto rates");

        let response = self
            .client
            .get(format!("{}/simple/price", self.config.base_url))
            .query(&[("ids", ids.as_str()), ("vs_currencies", "usd")])
            .send()
            .await
            .map_err(classify_transport)?;

        if let Some(error) = classify_status(response.status()) {
            return Err(error);
        }

        let body = response.text().await.map_err(classify_transport)?;
        let entries = parse_simple_price(&body, &wanted, &self.config.ids, time::now())?;

        info!(rates = entries.len(), "CoinGecko returned rates");
        Ok(entries)
    }
}

/// Translate a `/simple/price?vs_currencies=usd` body into entries.
///
/// Coins missing from the body are skipped. A present but non-numeric or
/// non-positive price is a malformed response.
pub fn parse_simple_price(
    body: &str,
    pairs: &[&CurrencyPair],
    ids: &BTreeMap<CurrencyCode, String>,
    fetched_at: Timestamp,
) -> Result<Vec<RateEntry>, SourceError> {
    let data: HashMap<String, HashMap<String, Value>> = serde_json::from_str(body)
        .map_err(|e| SourceError::MalformedResponse(format!("undecodable body: {e}")))?;

    let mut entries = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let Some(id) = ids.get(&pair.base) else {
            continue;
        };
        let Some(price) = data.get(id).and_then(|quotes| quotes.get("usd")) else {
            debug!(coin = %id, "Coin missing from response");
            continue;
        };

        let rate = match price {
            Value::Number(n) => decimal_from_json(n),
            _ => None,
        }
        .filter(|rate| *rate > Decimal::ZERO)
        .ok_or_else(|| {
            SourceError::MalformedResponse(format!("invalid USD price for {id}: {price}"))
        })?;

        entries.push(RateEntry::new(
            (*pair).clone(),
            rate,
            fetched_at,
            COINGECKO_SOURCE_ID,
        ));
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pair(code: &str) -> CurrencyPair {
        CurrencyPair::to_usd(CurrencyCode::new(code))
    }

    #[test]
    fn test_parse_simple_price() {
        let body = r#"{"bitcoin":{"usd":67000},"ethereum":{"usd":3500.25}}"#;
        let btc = pair("BTC");
        let eth = pair("ETH");
        let sol = pair("SOL");
        let ids = CoinGeckoConfig::default().ids;

        let entries = parse_simple_price(body, &[&btc, &eth, &sol], &ids, time::now()).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].pair(), btc);
        assert_eq!(entries[0].rate, dec!(67000));
        assert_eq!(entries[1].rate, dec!(3500.25));
        assert!(entries.iter().all(|e| e.source == COINGECKO_SOURCE_ID));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let ids = CoinGeckoConfig::default().ids;
        let btc = pair("BTC");

        let err = parse_simple_price("<html>", &[&btc], &ids, time::now()).unwrap_err();
        assert!(matches!(err, SourceError::MalformedResponse(_)));

        let err =
            parse_simple_price(r#"{"bitcoin":{"usd":"n/a"}}"#, &[&btc], &ids, time::now())
                .unwrap_err();
        assert!(matches!(err, SourceError::MalformedResponse(_)));

        let err = parse_simple_price(r#"{"bitcoin":{"usd":0}}"#, &[&btc], &ids, time::now())
            .unwrap_err();
        assert!(matches!(err, SourceError::MalformedResponse(_)));
    }

    #[test]
    fn test_supports_only_configured_crypto_against_usd() {
        let source = CoinGeckoSource::new(CoinGeckoConfig::default())
            .unwrap()
            .restrict_to(&[CurrencyCode::new("BTC")]);

        assert!(source.supports_pair(&pair("BTC")));
        assert!(!source.supports_pair(&pair("ETH")));
        assert!(!source.supports_pair(&pair("BTC").inverse()));
        assert_eq!(source.authority(), Some(CurrencyKind::Crypto));
    }

    #[tokio::test]
    async fn test_fetch_without_supported_pairs_skips_network() {
        let config = CoinGeckoConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        let source = CoinGeckoSource::new(config).unwrap();

        let entries = source.fetch(&[pair("EUR")]).await.unwrap();
        assert!(entries.is_empty());
    }
}
