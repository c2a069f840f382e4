//! Wire types shared by the auth endpoints and the session store.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";

/// The authenticated user as reported by the backend.
///
/// The backend names the role `user_type`; both spellings are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, alias = "id", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, alias = "user_type")]
    pub role: String,
    /// Any other fields the backend includes, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    #[must_use]
    pub fn with_role(role: impl Into<String>) -> Self {
        Self { user_id: None, username: None, role: role.into(), extra: Map::new() }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == ROLE_USER
    }
}

/// Login form contents posted to `/api/login`.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Payload of `/api/login` and `/api/check-auth`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
