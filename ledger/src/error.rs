//! Ledger error types.

use rust_decimal::Decimal;
use thiserror::Error;
use valuta_common::{CurrencyCode, UserId, ValutaError};

/// Errors that can occur when moving funds between balances.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Trade amount is zero or negative.
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    /// Balance does not cover the debit.
    #[error("Insufficient funds: available {available} {currency}, required {required} {currency}")]
    InsufficientFunds {
        currency: CurrencyCode,
        required: Decimal,
        available: Decimal,
    },

    /// Rate supplied for the trade is zero or negative.
    #[error("Rate must be positive, got {0}")]
    InvalidRate(Decimal),

    /// Trade value or resulting balance exceeds the decimal range.
    #[error("Amount {amount} at rate {rate} is out of range")]
    AmountOverflow { amount: Decimal, rate: Decimal },

    /// Trade the ledger cannot express, such as USD against itself.
    #[error("Unsupported trade: {0}")]
    UnsupportedTrade(String),

    /// No wallet is stored for the user.
    #[error("Wallet not found for user {0}")]
    WalletNotFound(UserId),

    /// A wallet already exists for the user.
    #[error("Wallet already exists for user {0}")]
    WalletExists(UserId),

    /// Currency validation or durable write failed.
    #[error(transparent)]
    Common(#[from] ValutaError),
}

impl LedgerError {
    /// Get error code for user-facing messages and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::InvalidRate(_) => "INVALID_RATE",
            LedgerError::AmountOverflow { .. } => "AMOUNT_OVERFLOW",
            LedgerError::UnsupportedTrade(_) => "UNSUPPORTED_TRADE",
            LedgerError::WalletNotFound(_) => "WALLET_NOT_FOUND",
            LedgerError::WalletExists(_) => "WALLET_EXISTS",
            LedgerError::Common(e) => e.error_code(),
        }
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
