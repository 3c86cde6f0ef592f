//! File-backed persistence for the signed-in identity and its token pair.
//!
//! The three values (identity, access token, refresh token) are kept as
//! independently keyed entries inside one JSON document, each with its own
//! expiry and same-site scope. A save replaces the document through a
//! temporary file and a rename, so readers never see a half-written state.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::session::{Session, StoredSession, TokenPair};

/// Session file name in the session directory
const SESSION_FILE: &str = "session.json";

/// Scratch file used for the write-then-rename commit
const SESSION_TMP_FILE: &str = "session.json.tmp";

/// Sliding lifetime of every persisted entry, renewed on each save.
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 7;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session file I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Session file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Cross-site scope recorded with each entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    #[default]
    Lax,
    Strict,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    value: String,
    expires_at: DateTime<Utc>,
    #[serde(default)]
    same_site: SameSite,
}

impl StoredEntry {
    fn new(value: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            value,
            expires_at,
            same_site: SameSite::Lax,
        }
    }

    fn live_value(self, now: DateTime<Utc>) -> Option<String> {
        (now < self.expires_at).then_some(self.value)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identity: Option<StoredEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<StoredEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<StoredEntry>,
}

pub struct SessionStore {
    dir: PathBuf,
    ttl: Duration,
    io_lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ttl: Duration::days(DEFAULT_SESSION_TTL_DAYS),
            io_lock: Mutex::new(()),
        }
    }

    /// Override the sliding entry lifetime
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reconstruct the authenticated state from disk.
    ///
    /// Returns `None` when nothing usable is stored. Partially present or
    /// malformed data is removed so the store never stays half-populated.
    pub fn load(&self) -> Option<StoredSession> {
        let _guard = self.guard();

        let doc = match self.read_document() {
            Ok(Some(doc)) => doc,
            Ok(None) => return None,
            Err(StoreError::Json(e)) => {
                warn!(error = %e, "Session file is malformed, clearing");
                self.remove_document_logged();
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read session file");
                return None;
            }
        };

        let now = Utc::now();
        let identity = doc.identity.and_then(|e| e.live_value(now));
        let access_token = doc.access_token.and_then(|e| e.live_value(now));
        let refresh_token = doc.refresh_token.and_then(|e| e.live_value(now));

        match (identity, access_token) {
            (Some(identity), Some(access_token)) => match serde_json::from_str::<Session>(&identity) {
                Ok(session) => {
                    debug!(user_id = %session.user_id, has_refresh = refresh_token.is_some(), "Session loaded");
                    return Some(StoredSession {
                        session,
                        access_token,
                        refresh_token,
                    });
                }
                Err(e) => warn!(error = %e, "Stored identity is unreadable, clearing session"),
            },
            (None, None) if refresh_token.is_none() => {
                debug!("Stored session has expired");
            }
            (identity, access_token) => warn!(
                has_identity = identity.is_some(),
                has_access = access_token.is_some(),
                has_refresh = refresh_token.is_some(),
                "Partial session on disk, clearing"
            ),
        }

        self.remove_document_logged();
        None
    }

    /// Persist identity and token pair together with a renewed expiry.
    pub fn save(&self, session: &Session, tokens: &TokenPair) -> Result<(), StoreError> {
        let _guard = self.guard();

        let expires_at = Utc::now() + self.ttl;
        let doc = StoreDocument {
            identity: Some(StoredEntry::new(serde_json::to_string(session)?, expires_at)),
            access_token: Some(StoredEntry::new(tokens.access_token.clone(), expires_at)),
            refresh_token: Some(StoredEntry::new(tokens.refresh_token.clone(), expires_at)),
        };
        let contents = serde_json::to_string_pretty(&doc)?;

        std::fs::create_dir_all(&self.dir)?;
        let tmp_path = self.dir.join(SESSION_TMP_FILE);
        std::fs::write(&tmp_path, contents)?;
        restrict_permissions(&tmp_path)?;
        std::fs::rename(&tmp_path, self.session_path())?;

        debug!(user_id = %session.user_id, %expires_at, "Session saved");
        Ok(())
    }

    /// Remove every stored entry. Clearing an empty store succeeds.
    pub fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.guard();
        self.remove_document()
    }

    /// Current access token, re-read from disk
    pub fn access_token(&self) -> Option<String> {
        self.load().map(|s| s.access_token)
    }

    /// Current identity, re-read from disk
    pub fn session(&self) -> Option<Session> {
        self.load().map(|s| s.session)
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.io_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_document(&self) -> Result<Option<StoreDocument>, StoreError> {
        let contents = match std::fs::read_to_string(self.session_path()) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn remove_document(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(self.session_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_document_logged(&self) {
        if let Err(e) = self.remove_document() {
            warn!(error = %e, "Failed to remove session file");
        }
    }

    fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;

    fn sample_session() -> Session {
        Session {
            user_id: "7".to_string(),
            email: "a@b.com".to_string(),
            display_name: "Ada".to_string(),
            role: Role::User,
        }
    }

    fn sample_tokens() -> TokenPair {
        TokenPair {
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
        }
    }

    fn write_raw(dir: &Path, value: serde_json::Value) {
        std::fs::write(dir.join(SESSION_FILE), value.to_string()).unwrap();
    }

    fn entry(value: &str, expires_at: DateTime<Utc>) -> serde_json::Value {
        serde_json::json!({ "value": value, "expires_at": expires_at, "same_site": "lax" })
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        store.save(&sample_session(), &sample_tokens()).unwrap();

        let loaded = store.load().expect("session should load");
        assert_eq!(loaded.session, sample_session());
        assert_eq!(loaded.access_token, "access-1");
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(loaded.token_pair(), Some(sample_tokens()));
    }

    #[test]
    fn test_load_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("missing"));
        assert!(store.load().is_none());
    }

    #[test]
    fn test_identity_only_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let identity = serde_json::to_string(&sample_session()).unwrap();
        let later = Utc::now() + Duration::days(1);
        write_raw(dir.path(), serde_json::json!({ "identity": entry(&identity, later) }));

        assert!(store.load().is_none());
        assert!(!dir.path().join(SESSION_FILE).exists());
    }

    #[test]
    fn test_access_token_without_identity_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let later = Utc::now() + Duration::days(1);
        write_raw(
            dir.path(),
            serde_json::json!({
                "access_token": entry("a", later),
                "refresh_token": entry("r", later),
            }),
        );

        assert!(store.load().is_none());
        assert!(!dir.path().join(SESSION_FILE).exists());
    }

    #[test]
    fn test_missing_refresh_token_still_authenticated() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let identity = serde_json::to_string(&sample_session()).unwrap();
        let later = Utc::now() + Duration::days(1);
        write_raw(
            dir.path(),
            serde_json::json!({
                "identity": entry(&identity, later),
                "access_token": entry("a", later),
            }),
        );

        let loaded = store.load().unwrap();
        assert_eq!(loaded.access_token, "a");
        assert!(loaded.refresh_token.is_none());
        assert!(loaded.token_pair().is_none());
    }

    #[test]
    fn test_expired_entries_count_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).with_ttl(Duration::seconds(-1));
        store.save(&sample_session(), &sample_tokens()).unwrap();

        assert!(store.load().is_none());
        assert!(!dir.path().join(SESSION_FILE).exists());
    }

    #[test]
    fn test_expired_access_token_with_live_identity_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let identity = serde_json::to_string(&sample_session()).unwrap();
        write_raw(
            dir.path(),
            serde_json::json!({
                "identity": entry(&identity, Utc::now() + Duration::days(1)),
                "access_token": entry("a", Utc::now() - Duration::days(1)),
            }),
        );

        assert!(store.load().is_none());
        assert!(!dir.path().join(SESSION_FILE).exists());
    }

    #[test]
    fn test_malformed_file_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        std::fs::write(dir.path().join(SESSION_FILE), "{not json").unwrap();

        assert!(store.load().is_none());
        assert!(!dir.path().join(SESSION_FILE).exists());
    }

    #[test]
    fn test_unreadable_identity_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let later = Utc::now() + Duration::days(1);
        write_raw(
            dir.path(),
            serde_json::json!({
                "identity": entry("{\"userId\": 1}", later),
                "access_token": entry("a", later),
                "refresh_token": entry("r", later),
            }),
        );

        assert!(store.load().is_none());
        assert!(!dir.path().join(SESSION_FILE).exists());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.save(&sample_session(), &sample_tokens()).unwrap();

        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_save_renews_expiry_and_scope() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.save(&sample_session(), &sample_tokens()).unwrap();

        let raw = std::fs::read_to_string(dir.path().join(SESSION_FILE)).unwrap();
        let doc: StoreDocument = serde_json::from_str(&raw).unwrap();
        let access = doc.access_token.unwrap();
        let identity = doc.identity.unwrap();
        let refresh = doc.refresh_token.unwrap();

        assert_eq!(access.same_site, SameSite::Lax);
        assert_eq!(access.expires_at, identity.expires_at);
        assert_eq!(access.expires_at, refresh.expires_at);
        assert!(access.expires_at > Utc::now() + Duration::days(DEFAULT_SESSION_TTL_DAYS - 1));
        assert!(!dir.path().join(SESSION_TMP_FILE).exists());
    }

    #[test]
    fn test_save_replaces_all_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.save(&sample_session(), &sample_tokens()).unwrap();

        let rotated = TokenPair {
            access_token: "access-2".to_string(),
            refresh_token: "refresh-2".to_string(),
        };
        store.save(&sample_session(), &rotated).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.access_token, "access-2");
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh-2"));
        assert_eq!(store.access_token().as_deref(), Some("access-2"));
    }
}
