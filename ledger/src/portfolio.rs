//! Portfolio valuation.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::{debug, warn};
use valuta_common::{CurrencyCode, CurrencyPair};
use valuta_fx::RateSnapshot;

use crate::wallet::Wallet;

/// One balance and its value in the valuation currency.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub balance: Decimal,
    /// Rate used, or `None` if no rate path exists.
    pub rate: Option<Decimal>,
    /// `balance * rate`, or `None` if unpriced.
    pub value: Option<Decimal>,
}

/// A wallet valued in one base currency.
#[derive(Debug, Clone, PartialEq)]
pub struct Valuation {
    pub base: CurrencyCode,
    pub holdings: BTreeMap<CurrencyCode, Holding>,
    /// Sum of every priced holding.
    pub total: Decimal,
}

impl Valuation {
    /// Currencies that could not be priced.
    pub fn unpriced(&self) -> impl Iterator<Item = &CurrencyCode> {
        self.holdings
            .iter()
            .filter(|(_, holding)| holding.value.is_none())
            .map(|(code, _)| code)
    }
}

/// Value every non-zero balance of `wallet` in `base`.
///
/// A balance with no rate path, or whose value overflows, is reported
/// without a value and left out of the total instead of failing the
/// valuation.
pub fn valuate(wallet: &Wallet, base: &CurrencyCode, rates: &RateSnapshot) -> Valuation {
    let mut holdings = BTreeMap::new();
    let mut total = Decimal::ZERO;

    for code in wallet.held_currencies() {
        let balance = wallet.balance(code);
        let rate = rates
            .resolve(&CurrencyPair::new(code.clone(), base.clone()))
            .map(|entry| entry.rate);

        let mut value = rate.and_then(|rate| balance.checked_mul(rate));
        match value.and_then(|value| total.checked_add(value)) {
            Some(next) => total = next,
            None if rate.is_none() => {
                warn!(currency = %code, base = %base, "No rate to value holding")
            }
            None => {
                warn!(currency = %code, base = %base, "Holding value out of range");
                value = None;
            }
        }

        holdings.insert(
            code.clone(),
            Holding {
                balance,
                rate,
                value,
            },
        );
    }

    debug!(user_id = %wallet.user_id, base = %base, total = %total, "Portfolio valued");

    Valuation {
        base: base.clone(),
        holdings,
        total,
    }
}
