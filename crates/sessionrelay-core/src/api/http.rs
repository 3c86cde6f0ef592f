//! Bearer-decorating HTTP transport.
//!
//! Every outbound call goes through `HttpClient::execute`, which re-reads the
//! session store and attaches the current access token. Nothing here retries;
//! replay after renewal is decided one layer up.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Response};
use tracing::debug;
use url::Url;

use crate::auth::SessionStore;

use super::{ApiError, ApiRequest};

/// Response together with the bearer token the request went out with.
#[derive(Debug)]
pub struct Dispatched {
    pub response: Response,
    pub bearer: Option<String>,
}

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
    default_timeout: Duration,
    store: Arc<SessionStore>,
}

impl HttpClient {
    pub fn new(
        client: Client,
        base_url: Url,
        default_timeout: Duration,
        store: Arc<SessionStore>,
    ) -> Self {
        Self {
            client,
            base_url,
            default_timeout,
            store,
        }
    }

    fn auth_headers(bearer: Option<&str>) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = bearer {
            let mut value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidRequest("access token is not a valid header value".to_string()))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Send a request, attaching the stored access token if there is one.
    pub async fn execute(&self, request: &ApiRequest) -> Result<Dispatched, ApiError> {
        let url = request.url(&self.base_url)?;
        let bearer = self.store.access_token();
        let timeout = request.timeout_override().unwrap_or(self.default_timeout);

        debug!(
            method = %request.method(),
            url = %url,
            authenticated = bearer.is_some(),
            retried = request.is_retried(),
            timeout_secs = timeout.as_secs_f64(),
            "Sending request"
        );

        let mut builder = self
            .client
            .request(request.method().clone(), url)
            .headers(Self::auth_headers(bearer.as_deref())?)
            .timeout(timeout);
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        debug!(status = %response.status(), "Response received");

        Ok(Dispatched { response, bearer })
    }

    /// Check if response is successful, returning an error with body if not.
    pub async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Role, Session, TokenPair};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http_client(server: &MockServer, store: Arc<SessionStore>) -> HttpClient {
        let base = Url::parse(&format!("{}/", server.uri())).unwrap();
        HttpClient::new(Client::new(), base, Duration::from_secs(120), store)
    }

    fn save_tokens(store: &SessionStore, access: &str) {
        let session = Session {
            user_id: "1".to_string(),
            email: "a@b.com".to_string(),
            display_name: "Ada".to_string(),
            role: Role::User,
        };
        let tokens = TokenPair {
            access_token: access.to_string(),
            refresh_token: "refresh".to_string(),
        };
        store.save(&session, &tokens).unwrap();
    }

    #[tokio::test]
    async fn test_attaches_stored_bearer() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new(dir.path()));
        save_tokens(&store, "access-1");

        Mock::given(method("GET"))
            .and(path("/items"))
            .and(header("Authorization", "Bearer access-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = http_client(&server, store);
        let dispatched = client.execute(&ApiRequest::get("/items")).await.unwrap();
        assert_eq!(dispatched.response.status(), 200);
        assert_eq!(dispatched.bearer.as_deref(), Some("access-1"));
    }

    #[tokio::test]
    async fn test_rereads_store_on_every_call() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new(dir.path()));
        save_tokens(&store, "access-1");

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = http_client(&server, Arc::clone(&store));
        client.execute(&ApiRequest::get("/a")).await.unwrap();
        save_tokens(&store, "access-2");
        let second = client.execute(&ApiRequest::get("/a")).await.unwrap();
        assert_eq!(second.bearer.as_deref(), Some("access-2"));

        store.clear().unwrap();
        let third = client.execute(&ApiRequest::get("/a")).await.unwrap();
        assert!(third.bearer.is_none());

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
        assert!(!requests[2].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_per_call_timeout_is_network_error() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new(dir.path()));

        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = http_client(&server, store);
        let request = ApiRequest::get("/slow").timeout(Duration::from_millis(100));
        match client.execute(&request).await {
            Err(ApiError::NetworkError(e)) => assert!(e.is_timeout()),
            other => panic!("expected timeout, got {:?}", other.map(|d| d.response.status())),
        }
    }

    #[tokio::test]
    async fn test_check_response_maps_status() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new(dir.path()));

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .mount(&server)
            .await;

        let client = http_client(&server, store);
        let dispatched = client.execute(&ApiRequest::get("/missing")).await.unwrap();
        let err = HttpClient::check_response(dispatched.response).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(ref body) if body == "gone"));
    }
}
