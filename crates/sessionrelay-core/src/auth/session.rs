use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Account role as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "ADMIN", alias = "Admin")]
    Admin,
    #[serde(alias = "USER", alias = "User")]
    User,
    #[serde(alias = "VIEWER", alias = "Viewer")]
    Viewer,
}

impl Role {
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::User => "User",
            Role::Viewer => "Viewer",
        }
    }
}

/// Identity of the signed-in user.
///
/// Persisted with camelCase keys; the login response's `user` object is
/// accepted with the backend's own key names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(alias = "id", alias = "user_id", deserialize_with = "string_or_number")]
    pub user_id: String,
    pub email: String,
    #[serde(alias = "display_name", alias = "full_name", alias = "name")]
    pub display_name: String,
    pub role: Role,
}

/// Access/refresh credential pair issued by login and rotated by refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Authenticated state reconstructed from the session store.
///
/// The refresh token may be missing; renewal then ends the session.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub session: Session,
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl StoredSession {
    /// The full token pair, if a refresh token was stored.
    pub fn token_pair(&self) -> Option<TokenPair> {
        self.refresh_token.as_ref().map(|refresh| TokenPair {
            access_token: self.access_token.clone(),
            refresh_token: refresh.clone(),
        })
    }
}

impl fmt::Debug for StoredSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredSession")
            .field("session", &self.session)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}
