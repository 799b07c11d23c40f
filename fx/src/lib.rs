//! ValutaTrade FX
//!
//! Exchange-rate acquisition and storage for ValutaTrade Hub.
//!
//! # Features
//!
//! - Pluggable rate sources (CoinGecko for crypto, ExchangeRate-API for fiat)
//! - Concurrent aggregation with per-source fault isolation
//! - Durable rate store with atomic snapshot replacement and history
//! - Direct, inverted and USD-triangulated lookups with TTL checks
//!
//! # Example
//!
//! ```rust,ignore
//! use valuta_fx::{FxEngine, FxEngineConfig, RateStore};
//!
//! let store = Arc::new(RateStore::open("data")?);
//! let engine = FxEngine::new(store, registry, sources, config);
//!
//! engine.refresh_all().await?;
//! let quote = engine.quote(&"BTC".into(), &"EUR".into())?;
//! ```

pub mod aggregator;
pub mod coingecko;
pub mod engine;
pub mod error;
pub mod exchangerate;
pub mod source;
pub mod store;
pub mod ttl;

pub use aggregator::{AggregationResult, AggregatorConfig, RateAggregator};
pub use coingecko::{CoinGeckoConfig, CoinGeckoSource};
pub use engine::{FxEngine, FxEngineConfig, RateQuote};
pub use error::{FxError, FxResult, SourceError};
pub use exchangerate::{ExchangeRateConfig, ExchangeRateSource};
pub use source::RateSource;
pub use store::{RateSnapshot, RateStore};
pub use ttl::{is_fresh, TtlPolicy};

#[cfg(any(test, feature = "test-utils"))]
pub use source::MockRateSource;
