//! API client for talking to the backend on behalf of the signed-in user.
//!
//! `ApiClient` owns the whole authenticated call path: the bearer-decorating
//! transport, the login/refresh endpoint client and the renewal coordinator.
//! Build it once at startup and hand clones to every call site.

use std::sync::Arc;

use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::auth::{Session, SessionStore};
use crate::config::Config;

use super::controller::SessionController;
use super::coordinator::{AuthState, RefreshCoordinator, SessionEvent};
use super::http::HttpClient;
use super::{ApiError, ApiRequest};

/// Clone is cheap - all parts share their state through Arc.
#[derive(Clone)]
pub struct ApiClient {
    http: HttpClient,
    controller: SessionController,
    coordinator: RefreshCoordinator,
    store: Arc<SessionStore>,
}

impl ApiClient {
    /// Create the client and its renewal coordinator around an injected store
    pub fn new(config: &Config, store: Arc<SessionStore>) -> Result<Self, ApiError> {
        let base_url = config.base_url()?;
        let timeout = config.request_timeout();
        let client = Client::builder().timeout(timeout).build()?;

        let http = HttpClient::new(client.clone(), base_url.clone(), timeout, Arc::clone(&store));
        let controller = SessionController::new(client, base_url, timeout);
        let coordinator = RefreshCoordinator::new(
            controller.clone(),
            Arc::clone(&store),
            config.login_entry_point.clone(),
        );

        Ok(Self {
            http,
            controller,
            coordinator,
            store,
        })
    }

    // ===== Session lifecycle =====

    /// Sign in and persist the issued token pair
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let response = self.controller.login(email, password).await?;
        self.coordinator.sign_in(&response.user, &response.tokens).await?;

        info!(user_id = %response.user.user_id, role = ?response.user.role, "Signed in");
        Ok(response.user)
    }

    /// Forget the current session locally
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.coordinator.sign_out().await?;

        info!("Signed out");
        Ok(())
    }

    pub fn current_session(&self) -> Option<Session> {
        self.store.session()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.load().is_some()
    }

    pub fn state(&self) -> AuthState {
        self.coordinator.state()
    }

    /// Receive sign-in, renewal and session-end notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.coordinator.subscribe()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    // ===== Request path =====

    /// Send a request, renewing the token pair and replaying once on 401.
    ///
    /// Non-401 responses are returned as they are, whatever their status.
    pub async fn send(&self, request: ApiRequest) -> Result<Response, ApiError> {
        let dispatched = self.http.execute(&request).await?;
        if dispatched.response.status() != StatusCode::UNAUTHORIZED {
            return Ok(dispatched.response);
        }

        let Some(bearer) = dispatched.bearer else {
            debug!(path = request.path(), "Unauthorized without a session");
            return Err(ApiError::Unauthorized);
        };
        if request.is_retried() {
            warn!(path = request.path(), "Unauthorized on replayed request");
            return Err(ApiError::Unauthorized);
        }

        debug!(path = request.path(), "Access token rejected, renewing");
        self.coordinator
            .renew(&bearer)
            .await
            .map_err(ApiError::SessionExpired)?;

        let replay = request.into_retry();
        let dispatched = self.http.execute(&replay).await?;
        if dispatched.response.status() == StatusCode::UNAUTHORIZED {
            warn!(path = replay.path(), "Unauthorized on replayed request");
            return Err(ApiError::Unauthorized);
        }
        Ok(dispatched.response)
    }

    /// Send a request and decode a successful JSON response
    pub async fn request_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let path = request.path().to_string();
        let response = HttpClient::check_response(self.send(request).await?).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", path, e)))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request_json(ApiRequest::get(path)).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.request_json(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.request_json(ApiRequest::put(path).json(body)?).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        HttpClient::check_response(self.send(ApiRequest::delete(path)).await?).await?;
        Ok(())
    }
}
