//! Client side of the backend's `login` / `refresh` endpoints.
//!
//! These calls never carry the stored bearer token and are never replayed.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::auth::{Session, TokenPair};

use super::http::HttpClient;
use super::request::endpoint;
use super::ApiError;

pub const LOGIN_PATH: &str = "auth/login";
pub const REFRESH_PATH: &str = "auth/refresh";

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: Session,
}

#[derive(Clone)]
pub struct SessionController {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl SessionController {
    pub fn new(client: Client, base_url: Url, timeout: Duration) -> Self {
        Self {
            client,
            base_url,
            timeout,
        }
    }

    /// Exchange email and password for a token pair and the user's identity
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let url = endpoint(&self.base_url, LOGIN_PATH)?;
        debug!(%url, "Sending login request");

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&LoginRequest { email, password })
            .send()
            .await?;
        let response = HttpClient::check_response(response).await?;

        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse login response: {}", e)))
    }

    /// Exchange a refresh token for a new (possibly rotated) token pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let url = endpoint(&self.base_url, REFRESH_PATH)?;
        debug!(%url, "Sending refresh request");

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;
        let response = HttpClient::check_response(response).await?;

        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse refresh response: {}", e)))
    }
}
