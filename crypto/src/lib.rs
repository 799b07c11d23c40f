//! ValutaTrade Cryptographic Primitives
//!
//! Provides hashing and salted password credentials for user accounts.

pub mod hash;
pub mod password;

pub use hash::sha256;
pub use password::{hash_password, verify_password, PasswordHash};

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),
}

impl CryptoError {
    /// Get error code for logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            CryptoError::InvalidEncoding(_) => "INVALID_ENCODING",
        }
    }
}

pub type Result<T> = std::result::Result<T, CryptoError>;
