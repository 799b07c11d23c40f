//! Exchange rate entries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::currency::{CurrencyCode, CurrencyPair};

/// How a rate entry was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateStatus {
    /// Quoted by a source and committed as-is.
    #[default]
    Quoted,
    /// Derived as 1/rate from the reverse pair.
    Inverted,
    /// Derived through USD from two legs.
    Triangulated,
}

/// Rate of one ordered currency pair at a point in time.
///
/// `rate` is the price of one unit of `base` expressed in `quote`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateEntry {
    pub base: CurrencyCode,
    pub quote: CurrencyCode,
    pub rate: Decimal,
    pub updated_at: DateTime<Utc>,
    pub source: String,
    #[serde(default, skip_serializing)]
    pub status: RateStatus,
}

impl RateEntry {
    /// Create a quoted entry.
    pub fn new(
        pair: CurrencyPair,
        rate: Decimal,
        updated_at: DateTime<Utc>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            base: pair.base,
            quote: pair.quote,
            rate,
            updated_at,
            source: source.into(),
            status: RateStatus::Quoted,
        }
    }

    /// The pair this entry prices.
    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.base.clone(), self.quote.clone())
    }

    /// Derive the reverse-pair entry. Returns `None` for a zero rate.
    pub fn inverted(&self) -> Option<RateEntry> {
        if self.rate.is_zero() {
            return None;
        }
        Some(RateEntry {
            base: self.quote.clone(),
            quote: self.base.clone(),
            rate: Decimal::ONE / self.rate,
            updated_at: self.updated_at,
            source: self.source.clone(),
            status: RateStatus::Inverted,
        })
    }

    /// Chain `self` (A→B) with `next` (B→C) into A→C.
    ///
    /// The derived entry is as old as its oldest leg. Returns `None` if the
    /// product is out of range.
    pub fn chain(&self, next: &RateEntry) -> Option<RateEntry> {
        let rate = self.rate.checked_mul(next.rate)?;
        let source = if self.source == next.source {
            self.source.clone()
        } else {
            format!("{}+{}", self.source, next.source)
        };

        Some(RateEntry {
            base: self.base.clone(),
            quote: next.quote.clone(),
            rate,
            updated_at: self.updated_at.min(next.updated_at),
            source,
            status: RateStatus::Triangulated,
        })
    }
}

impl fmt::Display for RateEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} = {} ({}, {})",
            self.base,
            self.quote,
            self.rate,
            self.source,
            self.updated_at.to_rfc3339()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn entry(base: &str, quote: &str, rate: Decimal) -> RateEntry {
        RateEntry::new(
            CurrencyPair::new(CurrencyCode::new(base), CurrencyCode::new(quote)),
            rate,
            Utc::now(),
            "TEST",
        )
    }

    #[test]
    fn test_inverted() {
        let eur = entry("EUR", "USD", dec!(1.25));
        let inverse = eur.inverted().unwrap();

        assert_eq!(inverse.pair().to_string(), "USD/EUR");
        assert_eq!(inverse.rate, dec!(0.8));
        assert_eq!(inverse.status, RateStatus::Inverted);

        assert!(entry("EUR", "USD", Decimal::ZERO).inverted().is_none());
    }

    #[test]
    fn test_chain_keeps_oldest_timestamp() {
        let mut btc = entry("BTC", "USD", dec!(60000));
        btc.updated_at = Utc::now() - Duration::hours(2);
        let usd_eur = entry("USD", "EUR", dec!(0.9));

        let btc_eur = btc.chain(&usd_eur).unwrap();
        assert_eq!(btc_eur.rate, dec!(54000.0));
        assert_eq!(btc_eur.updated_at, btc.updated_at);
        assert_eq!(btc_eur.status, RateStatus::Triangulated);
        assert_eq!(btc_eur.source, "TEST");

        let huge = entry("BTC", "USD", Decimal::MAX);
        assert!(huge.chain(&entry("USD", "EUR", dec!(2))).is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(entry("BTC", "USD", dec!(67000))).unwrap();

        assert_eq!(json["base"], "BTC");
        assert_eq!(json["quote"], "USD");
        assert_eq!(json["rate"], "67000");
        assert!(json.get("updatedAt").is_some());
        assert!(json.get("status").is_none());
    }
}
