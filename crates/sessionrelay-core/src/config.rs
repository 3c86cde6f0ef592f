//! Client configuration management.
//!
//! This module handles loading and saving the client configuration: the
//! backend base URL, request timeout, session lifetime, the login entry point
//! announced when a session ends, and the last used email.
//!
//! Configuration is stored at `~/.config/sessionrelay/config.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::auth::{SessionStore, DEFAULT_SESSION_TTL_DAYS};

/// Application name used for config/data directory paths
const APP_NAME: &str = "sessionrelay";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Default per-call timeout in seconds.
/// Inference-backed endpoints can take well over a minute to answer.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Where the embedding application should send the user once a session ends
pub const DEFAULT_LOGIN_ENTRY_POINT: &str = "/login";

pub const ENV_BASE_URL: &str = "SESSIONRELAY_BASE_URL";
pub const ENV_TIMEOUT_SECS: &str = "SESSIONRELAY_TIMEOUT_SECS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not find {0} directory")]
    NoDirectory(&'static str),

    #[error("Invalid base URL {url:?}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub session_ttl_days: i64,
    pub login_entry_point: String,
    pub last_email: Option<String>,
    pub session_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            session_ttl_days: DEFAULT_SESSION_TTL_DAYS,
            login_entry_point: DEFAULT_LOGIN_ENTRY_POINT.to_string(),
            last_email: None,
            session_dir: None,
        }
    }
}

impl Config {
    /// Load the config file (defaults when absent) and apply environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::load_from(&Self::config_path()?)?;
        Ok(config.apply_overrides(|key| std::env::var(key).ok()))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from an environment-like lookup.
    /// Unparseable numeric values are ignored.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|u| !u.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS).and_then(|s| s.trim().parse().ok()) {
            self.request_timeout_secs = secs;
        }
        self
    }

    fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoDirectory("config"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Base URL with a trailing slash so relative paths join beneath it
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).map_err(|source| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            source,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.session_ttl_days)
    }

    pub fn session_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref dir) = self.session_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir().ok_or(ConfigError::NoDirectory("data"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Open the session store described by this config
    pub fn open_store(&self) -> Result<SessionStore, ConfigError> {
        Ok(SessionStore::new(self.session_dir()?).with_ttl(self.session_ttl()))
    }
}
