//! ValutaTrade Ledger
//!
//! Wallet balances, buy/sell transactions against USD and portfolio
//! valuation. Every trade either moves both balances or neither, and no
//! balance ever goes negative.

pub mod engine;
pub mod error;
pub mod portfolio;
pub mod store;
pub mod trade;
pub mod wallet;

pub use engine::Ledger;
pub use error::{LedgerError, LedgerResult};
pub use portfolio::{valuate, Holding, Valuation};
pub use store::WalletStore;
pub use trade::{TradeRecord, TradeSide};
pub use wallet::Wallet;
