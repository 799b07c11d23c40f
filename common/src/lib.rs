//! ValutaTrade Common Types
//!
//! This crate contains shared types used across ValutaTrade Hub, including
//! the currency catalog, rate entries, identifiers and the atomic file
//! storage helpers used by every persistent store.

pub mod currency;
pub mod registry;
pub mod rate;
pub mod identifiers;
pub mod error;
pub mod time;
pub mod storage;

pub use currency::*;
pub use registry::CurrencyRegistry;
pub use rate::*;
pub use identifiers::*;
pub use error::*;
pub use time::*;
