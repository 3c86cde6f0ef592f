//! Client-side session lifecycle for a bearer-token protected backend.
//!
//! - `auth`: identity and token types, on-disk session store, keychain credentials
//! - `api`: the authenticated `ApiClient` with single-flight token renewal
//! - `config`: client configuration

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiClient, ApiError, ApiRequest, AuthState, SessionEvent};
pub use auth::{Role, Session, SessionStore, TokenPair};
pub use config::Config;
