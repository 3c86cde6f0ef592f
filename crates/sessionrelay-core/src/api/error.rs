use thiserror::Error;

use crate::auth::StoreError;
use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Session ended - sign in again")]
    SessionExpired(#[source] RenewalFailure),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Why a token renewal did not produce a new token pair.
///
/// Cloneable so that every request waiting on the same renewal receives
/// the same outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenewalFailure {
    #[error("no refresh token available")]
    MissingRefreshToken,

    #[error("no stored session")]
    MissingSession,

    #[error("refresh rejected by server: {0}")]
    Rejected(String),

    #[error("refresh request failed: {0}")]
    Transport(String),

    #[error("could not persist renewed tokens: {0}")]
    Store(String),

    #[error("renewal task aborted")]
    Aborted,

    #[error("session changed while renewing")]
    Superseded,

    #[error("not signed in")]
    NotAuthenticated,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)",
                    &body[..end],
                    body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// True for failures that ended the session and require a fresh login.
    pub fn is_session_ended(&self) -> bool {
        matches!(self, ApiError::SessionExpired(_))
    }
}

impl From<&ApiError> for RenewalFailure {
    fn from(err: &ApiError) -> Self {
        match err {
            ApiError::NetworkError(e) => RenewalFailure::Transport(e.to_string()),
            ApiError::Store(e) => RenewalFailure::Store(e.to_string()),
            other => RenewalFailure::Rejected(other.to_string()),
        }
    }
}
