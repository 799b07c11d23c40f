//! Currency types for ValutaTrade Hub.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ValutaError, ValutaResult};

/// Uppercase currency code or ticker (ISO 4217 for fiat).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Create a code without validation, normalizing case and whitespace.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_uppercase())
    }

    /// Parse and validate a user-supplied code.
    ///
    /// Codes are 2-5 characters long and contain no whitespace.
    pub fn parse(code: &str) -> ValutaResult<Self> {
        let normalized = code.trim().to_uppercase();
        let len = normalized.chars().count();

        if !(2..=5).contains(&len) || normalized.chars().any(char::is_whitespace) {
            return Err(ValutaError::InvalidCurrencyCode(code.to_string()));
        }

        Ok(Self(normalized))
    }

    /// Get the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The settlement currency every trade is priced in.
    pub fn usd() -> Self {
        Self::new("USD")
    }

    /// Check whether this is the settlement currency.
    pub fn is_usd(&self) -> bool {
        self.0 == "USD"
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CurrencyCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// An ordered (base, quote) currency pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Base currency (the unit being priced).
    pub base: CurrencyCode,
    /// Quote currency (the pricing unit).
    pub quote: CurrencyCode,
}

impl CurrencyPair {
    /// Create a new currency pair.
    pub fn new(base: CurrencyCode, quote: CurrencyCode) -> Self {
        Self { base, quote }
    }

    /// Pair of a currency against USD.
    pub fn to_usd(base: CurrencyCode) -> Self {
        Self::new(base, CurrencyCode::usd())
    }

    /// Get the inverse pair.
    pub fn inverse(&self) -> Self {
        Self {
            base: self.quote.clone(),
            quote: self.base.clone(),
        }
    }

    /// The non-USD side of the pair, or the base if neither side is USD.
    pub fn traded(&self) -> &CurrencyCode {
        if self.base.is_usd() && !self.quote.is_usd() {
            &self.quote
        } else {
            &self.base
        }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Whether a currency is government-issued or a digital asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyKind {
    Fiat,
    Crypto,
}

impl fmt::Display for CurrencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrencyKind::Fiat => write!(f, "FIAT"),
            CurrencyKind::Crypto => write!(f, "CRYPTO"),
        }
    }
}

/// Kind-specific currency metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CurrencyDetails {
    Fiat {
        /// Issuing country or monetary zone.
        issuer: String,
    },
    Crypto {
        /// Consensus or hashing algorithm.
        algorithm: String,
        /// Market capitalization in USD.
        market_cap: f64,
    },
}

/// A currency in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    pub code: CurrencyCode,
    pub name: String,
    #[serde(flatten)]
    pub details: CurrencyDetails,
}

impl Currency {
    /// Create a fiat currency.
    pub fn fiat(code: &str, name: &str, issuer: &str) -> Self {
        Self {
            code: CurrencyCode::new(code),
            name: name.to_string(),
            details: CurrencyDetails::Fiat {
                issuer: issuer.to_string(),
            },
        }
    }

    /// Create a crypto currency.
    pub fn crypto(code: &str, name: &str, algorithm: &str, market_cap: f64) -> Self {
        Self {
            code: CurrencyCode::new(code),
            name: name.to_string(),
            details: CurrencyDetails::Crypto {
                algorithm: algorithm.to_string(),
                market_cap,
            },
        }
    }

    /// Get the currency kind.
    pub fn kind(&self) -> CurrencyKind {
        match self.details {
            CurrencyDetails::Fiat { .. } => CurrencyKind::Fiat,
            CurrencyDetails::Crypto { .. } => CurrencyKind::Crypto,
        }
    }

    /// One-line description for listings and logs.
    pub fn display_info(&self) -> String {
        match &self.details {
            CurrencyDetails::Fiat { issuer } => {
                format!("[FIAT] {} - {} (Issuing: {})", self.code, self.name, issuer)
            }
            CurrencyDetails::Crypto {
                algorithm,
                market_cap,
            } => format!(
                "[CRYPTO] {} - {} (Algo: {}, MCAP: {:.2e})",
                self.code, self.name, algorithm, market_cap
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_normalization() {
        assert_eq!(CurrencyCode::new(" btc ").as_str(), "BTC");
        assert_eq!(CurrencyCode::parse("eur").unwrap(), CurrencyCode::new("EUR"));
    }

    #[test]
    fn test_code_validation() {
        assert!(CurrencyCode::parse("X").is_err());
        assert!(CurrencyCode::parse("TOOLONG").is_err());
        assert!(CurrencyCode::parse("B C").is_err());
        assert!(CurrencyCode::parse("DOGE").is_ok());
    }

    #[test]
    fn test_pair_inverse_and_traded() {
        let pair = CurrencyPair::to_usd(CurrencyCode::new("BTC"));
        assert_eq!(pair.to_string(), "BTC/USD");
        assert_eq!(pair.inverse().to_string(), "USD/BTC");
        assert_eq!(pair.traded().as_str(), "BTC");
        assert_eq!(pair.inverse().traded().as_str(), "BTC");
    }

    #[test]
    fn test_display_info() {
        let usd = Currency::fiat("USD", "US Dollar", "United States");
        assert_eq!(
            usd.display_info(),
            "[FIAT] USD - US Dollar (Issuing: United States)"
        );

        let btc = Currency::crypto("BTC", "Bitcoin", "SHA-256", 1.12e12);
        assert_eq!(btc.kind(), CurrencyKind::Crypto);
        assert!(btc.display_info().starts_with("[CRYPTO] BTC - Bitcoin (Algo: SHA-256"));
    }
}
