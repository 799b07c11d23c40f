//! Catalog of supported currencies.
//!
//! The registry is the single validation gate for currency codes: every
//! other component resolves user input through [`CurrencyRegistry::lookup`]
//! before acting on it. It is built once at startup and is read-only after.

use std::collections::BTreeMap;

use crate::currency::{Currency, CurrencyCode, CurrencyKind};
use crate::error::{ValutaError, ValutaResult};

/// Read-only currency catalog keyed by code.
#[derive(Debug, Clone)]
pub struct CurrencyRegistry {
    currencies: BTreeMap<CurrencyCode, Currency>,
}

impl CurrencyRegistry {
    /// Build a registry from an explicit catalog. Later duplicates win.
    pub fn new(catalog: impl IntoIterator<Item = Currency>) -> Self {
        let currencies = catalog
            .into_iter()
            .map(|currency| (currency.code.clone(), currency))
            .collect();
        Self { currencies }
    }

    /// The built-in catalog.
    pub fn builtin() -> Self {
        Self::new([
            Currency::fiat("USD", "US Dollar", "United States"),
            Currency::fiat("EUR", "Euro", "Eurozone"),
            Currency::fiat("GBP", "British Pound", "United Kingdom"),
            Currency::fiat("JPY", "Japanese Yen", "Japan"),
            Currency::fiat("RUB", "Russian Ruble", "Russia"),
            Currency::fiat("CNY", "Chinese Yuan", "China"),
            Currency::crypto("BTC", "Bitcoin", "SHA-256", 1.12e12),
            Currency::crypto("ETH", "Ethereum", "Ethash", 4.2e11),
            Currency::crypto("SOL", "Solana", "Proof of History", 8.5e10),
            Currency::crypto("DOGE", "Dogecoin", "Scrypt", 2.3e10),
            Currency::crypto("XRP", "Ripple", "RPCA", 3.1e10),
        ])
    }

    /// Load a catalog from a JSON array of currencies.
    pub fn from_json(json: &str) -> ValutaResult<Self> {
        let catalog: Vec<Currency> = serde_json::from_str(json)?;
        Ok(Self::new(catalog))
    }

    /// Keep only the listed codes. Fails if any listed code is not cataloged.
    pub fn restrict_to<'a>(
        &self,
        codes: impl IntoIterator<Item = &'a CurrencyCode>,
    ) -> ValutaResult<Self> {
        let mut currencies = BTreeMap::new();
        for code in codes {
            let currency = self.lookup(code.as_str())?;
            currencies.insert(currency.code.clone(), currency.clone());
        }
        Ok(Self { currencies })
    }

    /// Resolve a code. Input is normalized before lookup.
    pub fn lookup(&self, code: &str) -> ValutaResult<&Currency> {
        let code = CurrencyCode::new(code);
        self.currencies
            .get(&code)
            .ok_or_else(|| ValutaError::CurrencyNotFound(code.to_string()))
    }

    /// Kind of a known currency.
    pub fn kind_of(&self, code: &CurrencyCode) -> Option<CurrencyKind> {
        self.currencies.get(code).map(Currency::kind)
    }

    /// All currencies ordered by code.
    pub fn list(&self) -> Vec<&Currency> {
        self.currencies.values().collect()
    }

    /// Number of cataloged currencies.
    pub fn len(&self) -> usize {
        self.currencies.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }
}

impl Default for CurrencyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
