//! Registered users persisted in `users.json`.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use valuta_common::{storage, time, Timestamp, UserId};
use valuta_crypto::{hash_password, verify_password, PasswordHash};

use crate::error::{HubError, HubResult};

pub const USERS_FILE: &str = "users.json";

/// Minimum password length in characters.
pub const MIN_PASSWORD_LEN: usize = 4;

/// A registered user and their credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub username: String,
    pub salt: String,
    pub password_hash: String,
    pub created_at: Timestamp,
}

impl User {
    fn credential(&self) -> PasswordHash {
        PasswordHash {
            salt: self.salt.clone(),
            hash: self.password_hash.clone(),
        }
    }

    fn matches(&self, username: &str) -> bool {
        self.username.to_lowercase() == username.to_lowercase()
    }
}

/// User directory. Usernames are unique ignoring case.
pub struct UserStore {
    path: PathBuf,
    users: Mutex<Vec<User>>,
}

impl UserStore {
    /// Open the store in `dir`, loading existing users.
    pub fn open(dir: impl AsRef<Path>) -> HubResult<Self> {
        let path = dir.as_ref().join(USERS_FILE);
        let users: Vec<User> = storage::read_json(&path)?.unwrap_or_default();

        info!(path = %path.display(), users = users.len(), "User store opened");

        Ok(Self {
            path,
            users: Mutex::new(users),
        })
    }

    /// Register a new user.
    #[instrument(skip(self, password))]
    pub fn register(&self, username: &str, password: &str) -> HubResult<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(HubError::InvalidInput("username cannot be empty".to_string()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(HubError::InvalidInput(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let mut users = self.users.lock();
        if users.iter().any(|u| u.matches(username)) {
            return Err(HubError::UserAlreadyExists(username.to_string()));
        }

        let credential = hash_password(password);
        let user = User {
            user_id: UserId::new(),
            username: username.to_string(),
            salt: credential.salt,
            password_hash: credential.hash,
            created_at: time::now(),
        };

        let mut next = users.clone();
        next.push(user.clone());
        storage::atomic_write_json(&self.path, &next)?;
        *users = next;

        info!(user_id = %user.user_id, "User registered");
        Ok(user)
    }

    /// Verify credentials and return the user.
    #[instrument(skip(self, password))]
    pub fn authenticate(&self, username: &str, password: &str) -> HubResult<User> {
        let user = self
            .find(username)
            .ok_or_else(|| HubError::UserNotFound(username.trim().to_string()))?;

        if !verify_password(password, &user.credential())? {
            warn!(user_id = %user.user_id, "Authentication failed");
            return Err(HubError::AuthenticationFailed);
        }

        Ok(user)
    }

    /// Find a user by name, ignoring case.
    pub fn find(&self, username: &str) -> Option<User> {
        let username = username.trim();
        self.users.lock().iter().find(|u| u.matches(username)).cloned()
    }

    /// Remove a user. Removing an unknown id is a no-op.
    #[instrument(skip(self))]
    pub fn remove(&self, user_id: &UserId) -> HubResult<()> {
        let mut users = self.users.lock();
        if !users.iter().any(|u| u.user_id == *user_id) {
            return Ok(());
        }

        let next: Vec<User> = users.iter().filter(|u| u.user_id != *user_id).cloned().collect();
        storage::atomic_write_json(&self.path, &next)?;
        *users = next;

        info!("User removed");
        Ok(())
    }

    /// Number of registered users.
    pub fn count(&self) -> usize {
        self.users.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_register_and_authenticate() {
        let dir = TempDir::new().unwrap();
        let store = UserStore::open(dir.path()).unwrap();

        let user = store.register("alice", "wonderland").unwrap();
        assert_ne!(user.password_hash, "wonderland");

        let found = store.authenticate("ALICE", "wonderland").unwrap();
        assert_eq!(found.user_id, user.user_id);

        assert!(matches!(
            store.authenticate("alice", "nope"),
            Err(HubError::AuthenticationFailed)
        ));
        assert!(matches!(
            store.authenticate("bob", "wonderland"),
            Err(HubError::UserNotFound(_))
        ));
    }

    #[test]
    fn test_username_unique_ignoring_case() {
        let dir = TempDir::new().unwrap();
        let store = UserStore::open(dir.path()).unwrap();
        store.register("alice", "1234").unwrap();

        let err = store.register(" Alice ", "5678").unwrap_err();
        assert_eq!(err.error_code(), "USER_ALREADY_EXISTS");
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_rejects_bad_input() {
        let dir = TempDir::new().unwrap();
        let store = UserStore::open(dir.path()).unwrap();

        assert!(matches!(store.register("  ", "1234"), Err(HubError::InvalidInput(_))));
        assert!(matches!(store.register("bob", "123"), Err(HubError::InvalidInput(_))));
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_users_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let user = UserStore::open(dir.path())
            .unwrap()
            .register("carol", "secret")
            .unwrap();

        let reopened = UserStore::open(dir.path()).unwrap();
        assert_eq!(reopened.find("carol"), Some(user));
        assert!(reopened.authenticate("carol", "secret").is_ok());
    }

    #[test]
    fn test_remove_frees_username() {
        let dir = TempDir::new().unwrap();
        let store = UserStore::open(dir.path()).unwrap();
        let user = store.register("dave", "1234").unwrap();
        store.register("erin", "1234").unwrap();

        store.remove(&user.user_id).unwrap();
        store.remove(&user.user_id).unwrap();
        assert!(store.find("dave").is_none());

        let reopened = UserStore::open(dir.path()).unwrap();
        assert_eq!(reopened.count(), 1);
        assert!(reopened.register("dave", "5678").is_ok());
    }
}
