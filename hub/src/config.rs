//! Hub configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use valuta_common::{CurrencyCode, CurrencyRegistry, ValutaResult};
use valuta_fx::coingecko::COINGECKO_BASE_URL;
use valuta_fx::exchangerate::EXCHANGE_RATE_BASE_URL;
use valuta_fx::{
    AggregatorConfig, CoinGeckoConfig, CoinGeckoSource, ExchangeRateConfig, ExchangeRateSource,
    FxEngineConfig, RateSource, SourceError,
};

/// File name of the JSON log inside the data directory.
pub const LOG_FILE: &str = "valuta.log";

/// Supported currency codes per kind.
#[derive(Debug, Clone)]
pub struct CurrencyConfig {
    pub fiat: Vec<CurrencyCode>,
    pub crypto: Vec<CurrencyCode>,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            fiat: codes("USD,EUR,GBP,JPY,RUB,CNY"),
            crypto: codes("BTC,ETH,SOL,DOGE,XRP"),
        }
    }
}

/// Rate source endpoints and credentials.
#[derive(Clone)]
pub struct SourceConfig {
    pub coingecko_url: String,
    pub exchange_rate_url: String,
    pub exchange_rate_api_key: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("coingecko_url", &self.coingecko_url)
            .field("exchange_rate_url", &self.exchange_rate_url)
            .field(
                "exchange_rate_api_key",
                &self.exchange_rate_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            coingecko_url: COINGECKO_BASE_URL.to_string(),
            exchange_rate_url: EXCHANGE_RATE_BASE_URL.to_string(),
            exchange_rate_api_key: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Background refresh configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Refresh interval. Zero disables the scheduler.
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
        }
    }
}

/// Main hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Directory holding every data file and the log.
    pub data_dir: PathBuf,
    /// Rate TTL in seconds. Required.
    pub rates_ttl_seconds: Option<u64>,
    /// USD credited to a newly registered user.
    pub initial_balance: Decimal,
    pub currencies: CurrencyConfig,
    pub sources: SourceConfig,
    /// Deadline for a whole refresh across sources.
    pub refresh_timeout: Duration,
    pub scheduler: SchedulerConfig,
    /// Log level when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            rates_ttl_seconds: None,
            initial_balance: Decimal::from(10_000),
            currencies: CurrencyConfig::default(),
            sources: SourceConfig::default(),
            refresh_timeout: Duration::from_secs(30),
            scheduler: SchedulerConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl HubConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from any variable source.
    ///
    /// Unset or unparsable variables keep their default.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = var("VALUTA_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        config.rates_ttl_seconds = parse(&var, "VALUTA_RATES_TTL_SECONDS");

        if let Some(balance) = parse(&var, "VALUTA_INITIAL_BALANCE") {
            config.initial_balance = balance;
        }

        if let Some(fiat) = var("VALUTA_FIAT_CURRENCIES") {
            config.currencies.fiat = codes(&fiat);
        }

        if let Some(crypto) = var("VALUTA_CRYPTO_CURRENCIES") {
            config.currencies.crypto = codes(&crypto);
        }

        config.sources.exchange_rate_api_key =
            var("EXCHANGE_RATE_API_KEY").filter(|key| !key.trim().is_empty());

        if let Some(url) = var("VALUTA_COINGECKO_URL") {
            config.sources.coingecko_url = url.trim_end_matches('/').to_string();
        }

        if let Some(url) = var("VALUTA_EXCHANGE_RATE_URL") {
            config.sources.exchange_rate_url = url.trim_end_matches('/').to_string();
        }

        if let Some(secs) = parse(&var, "VALUTA_SOURCE_TIMEOUT_SECS") {
            config.sources.request_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = parse(&var, "VALUTA_REFRESH_TIMEOUT_SECS") {
            config.refresh_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = parse(&var, "VALUTA_REFRESH_INTERVAL_SECS") {
            config.scheduler.interval = Duration::from_secs(secs);
        }

        if let Some(level) = var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        match self.rates_ttl_seconds {
            None => {
                return Err(
                    "VALUTA_RATES_TTL_SECONDS must be set to a positive number of seconds"
                        .to_string(),
                )
            }
            Some(0) => return Err("Rates TTL cannot be 0".to_string()),
            Some(_) => {}
        }

        if self.data_dir.as_os_str().is_empty() {
            return Err("Data directory cannot be empty".to_string());
        }

        if self.initial_balance <= Decimal::ZERO {
            return Err("Initial balance must be positive".to_string());
        }

        if !self.currencies.fiat.contains(&CurrencyCode::usd()) {
            return Err("USD must be among the fiat currencies".to_string());
        }

        if self.sources.request_timeout.is_zero() || self.refresh_timeout.is_zero() {
            return Err("Timeouts cannot be 0".to_string());
        }

        if self.sources.request_timeout > self.refresh_timeout {
            return Err("Source timeout cannot exceed refresh timeout".to_string());
        }

        Ok(())
    }

    /// Built-in catalog restricted to the configured codes.
    pub fn registry(&self) -> ValutaResult<CurrencyRegistry> {
        CurrencyRegistry::builtin()
            .restrict_to(self.currencies.fiat.iter().chain(&self.currencies.crypto))
    }

    /// FX engine settings. Fails if the TTL is not configured.
    pub fn fx_engine_config(&self) -> Result<FxEngineConfig, String> {
        let ttl_seconds = self
            .rates_ttl_seconds
            .ok_or_else(|| "Rates TTL is not configured".to_string())?;

        Ok(FxEngineConfig {
            ttl_seconds,
            aggregator: AggregatorConfig {
                source_timeout: self.sources.request_timeout,
                refresh_timeout: self.refresh_timeout,
            },
        })
    }

    /// Live rate sources in priority order: crypto first, then fiat.
    pub fn rate_sources(&self) -> Result<Vec<Arc<dyn RateSource>>, SourceError> {
        let coingecko = CoinGeckoSource::new(CoinGeckoConfig {
            base_url: self.sources.coingecko_url.clone(),
            timeout: self.sources.request_timeout,
            ..CoinGeckoConfig::default()
        })?
        .restrict_to(&self.currencies.crypto);

        let exchange_rate = ExchangeRateSource::new(ExchangeRateConfig {
            base_url: self.sources.exchange_rate_url.clone(),
            api_key: self.sources.exchange_rate_api_key.clone(),
            codes: self
                .currencies
                .fiat
                .iter()
                .filter(|code| !code.is_usd())
                .cloned()
                .collect(),
            timeout: self.sources.request_timeout,
        })?;

        let sources: Vec<Arc<dyn RateSource>> = vec![Arc::new(coingecko), Arc::new(exchange_rate)];
        Ok(sources)
    }

    /// Path of the JSON log file.
    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(LOG_FILE)
    }
}

fn parse<T: FromStr>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    var(name).and_then(|value| value.trim().parse().ok())
}

fn codes(list: &str) -> Vec<CurrencyCode> {
    list.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(CurrencyCode::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> HubConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        HubConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_ttl_is_required() {
        let config = config_from(&[]);
        assert!(config.rates_ttl_seconds.is_none());
        assert!(config.validate().unwrap_err().contains("VALUTA_RATES_TTL_SECONDS"));
        assert!(config.fx_engine_config().is_err());

        let config = config_from(&[("VALUTA_RATES_TTL_SECONDS", "0")]);
        assert!(config.validate().is_err());

        let config = config_from(&[("VALUTA_RATES_TTL_SECONDS", "soon")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_lookup() {
        let config = config_from(&[
            ("VALUTA_RATES_TTL_SECONDS", "300"),
            ("VALUTA_DATA_DIR", "/tmp/valuta"),
            ("VALUTA_INITIAL_BALANCE", "500.50"),
            ("VALUTA_CRYPTO_CURRENCIES", "btc, eth"),
            ("EXCHANGE_RATE_API_KEY", "key"),
            ("VALUTA_COINGECKO_URL", "http://localhost:9000/"),
            ("VALUTA_REFRESH_INTERVAL_SECS", "0"),
        ]);

        assert!(config.validate().is_ok());
        assert_eq!(config.rates_ttl_seconds, Some(300));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/valuta"));
        assert_eq!(config.initial_balance, Decimal::new(50050, 2));
        assert_eq!(config.currencies.crypto, codes("BTC,ETH"));
        assert_eq!(config.sources.exchange_rate_api_key.as_deref(), Some("key"));
        assert_eq!(config.sources.coingecko_url, "http://localhost:9000");
        assert!(config.scheduler.interval.is_zero());
        assert_eq!(config.log_path(), PathBuf::from("/tmp/valuta/valuta.log"));
    }

    #[test]
    fn test_invalid_config() {
        let mut config = config_from(&[("VALUTA_RATES_TTL_SECONDS", "60")]);
        assert!(config.validate().is_ok());

        config.currencies.fiat = codes("EUR");
        assert!(config.validate().is_err());

        let mut config = config_from(&[("VALUTA_RATES_TTL_SECONDS", "60")]);
        config.sources.request_timeout = Duration::from_secs(60);
        assert!(config.validate().is_err());

        let mut config = config_from(&[("VALUTA_RATES_TTL_SECONDS", "60")]);
        config.initial_balance = Decimal::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_registry_and_sources_follow_currency_lists() {
        let config = config_from(&[
            ("VALUTA_RATES_TTL_SECONDS", "60"),
            ("VALUTA_FIAT_CURRENCIES", "USD,EUR"),
            ("VALUTA_CRYPTO_CURRENCIES", "BTC"),
        ]);

        let registry = config.registry().unwrap();
        assert_eq!(registry.len(), 3);

        let sources = config.rate_sources().unwrap();
        let ids: Vec<&str> = sources.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["coingecko", "exchangerate-api"]);

        let config = config_from(&[("VALUTA_CRYPTO_CURRENCIES", "BTC,NOPE")]);
        assert!(config.registry().is_err());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = config_from(&[("EXCHANGE_RATE_API_KEY", "secret-key")]);
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-key"));
    }
}
