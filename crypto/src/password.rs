//! Salted password hashing.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::hash::{from_hex, sha256, to_hex};
use crate::{CryptoError, Result};

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Stored credential: hex salt and hex SHA-256 of `salt || password`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHash {
    pub salt: String,
    pub hash: String,
}

/// Hash `password` with a fresh random salt.
pub fn hash_password(password: &str) -> PasswordHash {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);

    PasswordHash {
        salt: to_hex(&salt),
        hash: digest(&salt, password),
    }
}

/// Check `password` against a stored credential.
///
/// Fails only if the stored credential is not valid hex.
pub fn verify_password(password: &str, stored: &PasswordHash) -> Result<bool> {
    let salt = from_hex(&stored.salt)
        .ok_or_else(|| CryptoError::InvalidEncoding("salt is not hex".to_string()))?;
    let expected = from_hex(&stored.hash)
        .ok_or_else(|| CryptoError::InvalidEncoding("hash is not hex".to_string()))?;

    let actual = sha256(&[salt.as_slice(), password.as_bytes()]);
    Ok(constant_time_eq(&actual, &expected))
}

fn digest(salt: &[u8], password: &str) -> String {
    to_hex(&sha256(&[salt, password.as_bytes()]))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
