//! Local pseudo-identity.
//!
//! There are no user accounts: a single configured username/password pair
//! unlocks the board and maps to one fixed user id, which scopes the project
//! list.

use serde::{Deserialize, Serialize};

/// User id every session runs as unless configured otherwise.
pub const DEFAULT_USER_ID: &str = "demo_user";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
}

/// The one accepted credential pair and the user id it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    pub user_id: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Credentials {
            username: "planet".into(),
            password: "planet".into(),
            user_id: DEFAULT_USER_ID.into(),
        }
    }
}

/// A logged-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    user_id: String,
}

impl Identity {
    /// Accept only the configured pair. Usernames are compared trimmed.
    pub fn login(username: &str, password: &str, accepted: &Credentials) -> Result<Self, AuthError> {
        if username.trim() == accepted.username && password == accepted.password {
            tracing::info!("Logged in as {}", accepted.user_id);
            Ok(Identity { user_id: accepted.user_id.clone() })
        } else {
            tracing::warn!("Rejected login for {}", username.trim());
            Err(AuthError::InvalidCredentials)
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configured_pair_is_accepted() {
        let creds = Credentials::default();
        let id = Identity::login(" planet ", "planet", &creds).unwrap();
        assert_eq!(id.user_id(), DEFAULT_USER_ID);
        assert_eq!(Identity::login("planet", "wrong", &creds), Err(AuthError::InvalidCredentials));
        assert_eq!(Identity::login("admin", "planet", &creds), Err(AuthError::InvalidCredentials));
    }

    #[test]
    fn test_password_is_never_serialized() {
        let json = serde_json::to_string(&Credentials::default()).unwrap();
        assert!(!json.contains("password"));
    }
}
