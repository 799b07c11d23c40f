//! Session state for the interactive shell.

use serde::{Deserialize, Serialize};
use valuta_common::{time, Timestamp, UserId};

use crate::users::User;

/// An authenticated user. Held by the shell, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub username: String,
    pub started_at: Timestamp,
}

impl Session {
    /// Start a session for `user`.
    pub fn start(user: &User) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username.clone(),
            started_at: time::now(),
        }
    }
}
