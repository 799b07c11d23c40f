//! Error types shared across ValutaTrade crates.

use thiserror::Error;

/// Errors raised by the currency catalog and the storage helpers.
#[derive(Error, Debug)]
pub enum ValutaError {
    /// Currency code is not in the registry.
    #[error("Unknown currency: {0}")]
    CurrencyNotFound(String),

    /// Currency code is malformed.
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrencyCode(String),

    /// Durable write or read failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    /// Stored data could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ValutaError {
    /// Get error code for user-facing messages and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            ValutaError::CurrencyNotFound(_) => "CURRENCY_NOT_FOUND",
            ValutaError::InvalidCurrencyCode(_) => "INVALID_CURRENCY_CODE",
            ValutaError::Persistence(_) => "PERSISTENCE_ERROR",
            ValutaError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

/// Result type alias for common operations.
pub type ValutaResult<T> = std::result::Result<T, ValutaError>;
