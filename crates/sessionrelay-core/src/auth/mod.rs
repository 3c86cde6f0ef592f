//! Session state for the authenticated client.
//!
//! This module provides:
//! - `Session`, `TokenPair`: identity and credential types
//! - `SessionStore`: durable on-disk persistence of the current session
//! - `CredentialStore`: optional "remember me" password in the OS keychain
//!
//! Stored entries expire after 7 days unless renewed by a save.

pub mod credentials;
pub mod session;
pub mod store;

pub use credentials::{CredentialError, CredentialStore};
pub use session::{Role, Session, StoredSession, TokenPair};
pub use store::{SameSite, SessionStore, StoreError, DEFAULT_SESSION_TTL_DAYS};
