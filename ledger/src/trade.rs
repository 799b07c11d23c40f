//! Trade records returned by the ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use valuta_common::{CurrencyCode, TradeId, UserId};

/// Direction of a trade against USD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// USD out, currency in.
    Buy,
    /// Currency out, USD in.
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "buy"),
            TradeSide::Sell => write!(f, "sell"),
        }
    }
}

/// Outcome of a committed buy or sell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Time-ordered trade ID.
    pub id: TradeId,
    pub user_id: UserId,
    pub side: TradeSide,
    /// Currency bought or sold.
    pub currency: CurrencyCode,
    /// Units of `currency` moved.
    pub amount: Decimal,
    /// USD per unit of `currency` used for the trade.
    pub rate: Decimal,
    /// USD moved in the other direction (`amount * rate`).
    pub usd_value: Decimal,
    /// Balance of `currency` after the trade.
    pub currency_balance: Decimal,
    /// USD balance after the trade.
    pub usd_balance: Decimal,
    pub executed_at: DateTime<Utc>,
}

impl fmt::Display for TradeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} at {} USD (USD value {})",
            self.side, self.amount, self.currency, self.rate, self.usd_value
        )
    }
}
