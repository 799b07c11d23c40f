//! ValutaTrade Hub
//!
//! Use cases and the interactive shell for the currency trading simulator:
//! user accounts, buy/sell against USD, rate lookups and refreshes, and
//! portfolio valuation, all persisted under one data directory.

pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod scheduler;
pub mod service;
pub mod state;
pub mod users;

pub use cli::{Outcome, Repl};
pub use config::HubConfig;
pub use error::{HubError, HubResult};
pub use metrics::{HubMetrics, MetricsSnapshot};
pub use service::{RatesView, RefreshReport, TradingHub};
pub use state::Session;
pub use users::{User, UserStore};
