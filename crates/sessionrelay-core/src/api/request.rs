use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use url::Url;

use super::ApiError;

/// A replayable description of one outbound call.
///
/// Requests are kept as data rather than as built `reqwest` requests so the
/// same call can be sent a second time after a token renewal.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    timeout: Option<Duration>,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            timeout: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attach a JSON body
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("body is not serializable: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Override the client's default timeout for this call only
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether this call has already been replayed after a renewal
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    /// The replay of this call; never eligible for another renewal
    pub(crate) fn into_retry(mut self) -> Self {
        self.retried = true;
        self
    }

    /// Resolve the request path against the base URL, including query pairs
    pub(crate) fn url(&self, base: &Url) -> Result<Url, ApiError> {
        let mut url = endpoint(base, &self.path)?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

/// Join a path beneath the base URL, keeping any path prefix the base carries.
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url, ApiError> {
    if path.contains("://") {
        return Err(ApiError::InvalidRequest(format!(
            "absolute URL {:?} is not allowed, use a path relative to the base URL",
            path
        )));
    }
    base.join(path.trim_start_matches('/'))
        .map_err(|e| ApiError::InvalidRequest(format!("bad path {:?}: {}", path, e)))
}
