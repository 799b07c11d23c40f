//! Per-user wallets.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use valuta_common::{CurrencyCode, UserId};

/// Currency balances owned by one user.
///
/// Balances are never negative. A currency with no entry has balance zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    balances: BTreeMap<CurrencyCode, Decimal>,
}

impl Wallet {
    /// Create a wallet holding the given balances.
    pub fn with_balances(
        user_id: UserId,
        balances: impl IntoIterator<Item = (CurrencyCode, Decimal)>,
    ) -> Self {
        Self {
            user_id,
            balances: balances.into_iter().collect(),
        }
    }

    /// Balance of `currency`, zero if never held.
    pub fn balance(&self, currency: &CurrencyCode) -> Decimal {
        self.balances.get(currency).copied().unwrap_or(Decimal::ZERO)
    }

    /// All held balances ordered by code.
    pub fn balances(&self) -> &BTreeMap<CurrencyCode, Decimal> {
        &self.balances
    }

    /// Check if the wallet can cover `amount` of `currency`.
    pub fn has_sufficient_funds(&self, currency: &CurrencyCode, amount: Decimal) -> bool {
        self.balance(currency) >= amount
    }

    /// Codes with a non-zero balance.
    pub fn held_currencies(&self) -> impl Iterator<Item = &CurrencyCode> {
        self.balances
            .iter()
            .filter(|(_, balance)| !balance.is_zero())
            .map(|(code, _)| code)
    }

    pub(crate) fn set_balance(&mut self, currency: CurrencyCode, balance: Decimal) {
        self.balances.insert(currency, balance);
    }
}
