//! HTTP client implementation
//!
//! Authenticated JSON requests against the StockFlow REST API.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::session::SessionStore;

/// Path prefix of the unauthenticated entry points (login, register)
const AUTH_PATH_PREFIX: &str = "/api/auth/";

/// Error body returned by the API
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Client for the StockFlow REST API
///
/// Attaches the session's bearer token to every request. A 401 received
/// while holding a token expires the session, unless the request was itself
/// a login or registration attempt.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str, session: Arc<SessionStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> ApiResult<T> {
        self.send(Method::GET, path, query, None).await
    }

    pub(crate) async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> ApiResult<T> {
        self.send(Method::POST, path, &[], Some(body)).await
    }

    pub(crate) async fn put<T: DeserializeOwned>(&self, path: &str, body: Value) -> ApiResult<T> {
        self.send(Method::PUT, path, &[], Some(body)).await
    }

    pub(crate) async fn patch<T: DeserializeOwned>(&self, path: &str, body: Value) -> ApiResult<T> {
        self.send(Method::PATCH, path, &[], Some(body)).await
    }

    pub(crate) async fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.send(Method::DELETE, path, &[], None).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&'static str, String)],
        body: Option<Value>,
    ) -> ApiResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let token = self.session.token();
        let mut request = self.http.request(method, &url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(ref token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|source| ApiError::Transport {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        if status.is_success() {
            let bytes = response.bytes().await.map_err(|source| ApiError::Transport {
                url: url.clone(),
                source,
            })?;
            // Empty bodies (e.g. 204 on delete) decode as JSON null
            let slice: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
            return serde_json::from_slice(slice).map_err(|e| ApiError::Decode {
                url,
                details: e.to_string(),
            });
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error.or(body.message));

        if status == StatusCode::UNAUTHORIZED {
            self.handle_unauthorized(path, token.is_some());
            return Err(ApiError::Unauthorized { message });
        }

        warn!("{} returned {}", url, status);
        Err(ApiError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    /// Force a logout after a rejected token
    ///
    /// Skipped when no token was sent or when the request came from the
    /// login/register entry point, where a 401 just means bad credentials.
    fn handle_unauthorized(&self, path: &str, had_token: bool) {
        if !had_token || path.starts_with(AUTH_PATH_PREFIX) {
            return;
        }
        if let Err(e) = self.session.expire() {
            warn!("Failed to clear expired session: {}", e);
        }
    }
}
