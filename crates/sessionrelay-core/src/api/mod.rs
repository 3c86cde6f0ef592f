//! Authenticated HTTP access to the backend.
//!
//! This module provides the `ApiClient` through which every call to a
//! protected endpoint passes. Requests carry the stored access token as a
//! bearer credential; an unauthorized response triggers a single shared token
//! renewal and one transparent replay of the original call.

pub mod client;
pub mod controller;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod request;

pub use client::ApiClient;
pub use controller::{LoginResponse, SessionController};
pub use coordinator::{AuthState, RefreshCoordinator, SessionEvent};
pub use error::{ApiError, RenewalFailure};
pub use http::{Dispatched, HttpClient};
pub use request::ApiRequest;
