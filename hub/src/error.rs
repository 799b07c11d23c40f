//! Hub error types.

use thiserror::Error;
use valuta_common::ValutaError;
use valuta_crypto::CryptoError;
use valuta_fx::FxError;
use valuta_ledger::LedgerError;

/// Errors surfaced by hub use cases.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Username '{0}' is already taken")]
    UserAlreadyExists(String),

    #[error("User '{0}' not found")]
    UserNotFound(String),

    #[error("Wrong password")]
    AuthenticationFailed,

    #[error("Not logged in; run login first")]
    NotLoggedIn,

    /// Rejected user input that no lower layer validates.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Fx(#[from] FxError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Common(#[from] ValutaError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl HubError {
    /// Get error code for user-facing messages and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            HubError::UserAlreadyExists(_) => "USER_ALREADY_EXISTS",
            HubError::UserNotFound(_) => "USER_NOT_FOUND",
            HubError::AuthenticationFailed => "AUTHENTICATION_FAILED",
            HubError::NotLoggedIn => "NOT_LOGGED_IN",
            HubError::InvalidInput(_) => "INVALID_INPUT",
            HubError::Configuration(_) => "CONFIGURATION_ERROR",
            HubError::Fx(e) => e.error_code(),
            HubError::Ledger(e) => e.error_code(),
            HubError::Common(e) => e.error_code(),
            HubError::Crypto(e) => e.error_code(),
        }
    }
}

/// Result type for hub operations.
pub type HubResult<T> = Result<T, HubError>;
