//! Shared HTTP client with a request stage and a response stage.
//!
//! ARCHITECTURE
//! ============
//! Every call goes through the same two stages:
//!
//! - request stage (`prepare`): read the bearer token from the token store,
//!   attach `Authorization`, resolve the URL, build the request.
//! - response stage (`dispatch`): unwrap the payload on success, or classify
//!   the failure (error status, no response, construction) and propagate it.
//!
//! A 401 additionally records `ApiEvent::Unauthorized` and asks the injected
//! `Navigator` to go to the login page. Errors are never swallowed here.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use super::error::{ApiError, classify_transport};
use super::events::{ApiEvent, EventSink, LogNavigator, Navigator, TracingSink};
use super::token::{FileTokenStore, TokenStore};
use crate::config::ClientConfig;

// =============================================================================
// REQUEST DESCRIPTOR
// =============================================================================

/// An outgoing request before the request stage has run.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the base URL, or an absolute `http(s)://` URL.
    pub path: String,
    pub query: Option<Value>,
    pub body: Option<Value>,
    pub headers: HeaderMap,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: None, body: None, headers: HeaderMap::new() }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    #[must_use]
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn with_query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Set `Authorization: Bearer <token>` when a non-blank token is present.
///
/// Returns whether the header was set. With no token the map is untouched.
///
/// # Errors
///
/// Returns `RequestConstruction` if the token is not a valid header value.
pub fn attach_bearer(headers: &mut HeaderMap, token: Option<&str>) -> Result<bool, ApiError> {
    let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(false);
    };
    let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| ApiError::RequestConstruction(format!("invalid bearer token: {e}")))?;
    value.set_sensitive(true);
    headers.insert(AUTHORIZATION, value);
    Ok(true)
}

fn decode_payload<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    let parsed = if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::from_value(Value::Null)
    } else {
        serde_json::from_slice(body)
    };
    parsed.map_err(|e| ApiError::Decode(e.to_string()))
}

// =============================================================================
// CLIENT
// =============================================================================

/// The shared wrapper instance. Cheap to share behind an `Arc`.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    login_page: String,
    tokens: Arc<dyn TokenStore>,
    events: Arc<dyn EventSink>,
    navigator: Arc<dyn Navigator>,
}

/// Builder for [`ApiClient`]; unset collaborators fall back to the
/// file token store, [`TracingSink`] and [`LogNavigator`].
pub struct ApiClientBuilder {
    config: ClientConfig,
    tokens: Option<Arc<dyn TokenStore>>,
    events: Option<Arc<dyn EventSink>>,
    navigator: Option<Arc<dyn Navigator>>,
}

impl ApiClientBuilder {
    #[must_use]
    pub fn token_store(mut self, tokens: Arc<dyn TokenStore>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    #[must_use]
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// # Errors
    ///
    /// Returns `RequestConstruction` if the underlying HTTP client fails to build.
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(self.config.timeouts.connect_secs))
            .build()
            .map_err(|e| ApiError::RequestConstruction(format!("HTTP client build failed: {e}")))?;
        let tokens = self
            .tokens
            .unwrap_or_else(|| Arc::new(FileTokenStore::new(self.config.token_file.clone())));
        Ok(ApiClient {
            http,
            base_url: self.config.base_url.trim_end_matches('/').to_owned(),
            login_page: self.config.login_page,
            tokens,
            events: self.events.unwrap_or_else(|| Arc::new(TracingSink)),
            navigator: self.navigator.unwrap_or_else(|| Arc::new(LogNavigator)),
        })
    }
}

impl ApiClient {
    #[must_use]
    pub fn builder(config: &ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder { config: config.clone(), tokens: None, events: None, navigator: None }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn tokens(&self) -> &dyn TokenStore {
        self.tokens.as_ref()
    }

    /// Resolve a path against the base URL; absolute URLs pass through.
    #[must_use]
    pub fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_owned();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    // -------------------------------------------------------------------------
    // REQUEST STAGE
    // -------------------------------------------------------------------------

    /// Run the request stage and build the outgoing request.
    ///
    /// # Errors
    ///
    /// Returns `RequestConstruction` (after recording `RequestFailed`) if the
    /// token cannot be read or the request cannot be built. Nothing is sent.
    pub fn prepare(&self, id: Uuid, request: ApiRequest) -> Result<reqwest::Request, ApiError> {
        let ApiRequest { method, path, query, body, mut headers } = request;

        let token = self
            .tokens
            .load()
            .map_err(|e| self.construction_failed(id, format!("token read failed: {e}")))?;
        let authorized = attach_bearer(&mut headers, token.as_deref()).map_err(|e| self.record_failed(id, e))?;

        let mut builder = self.http.request(method, self.resolve_url(&path)).headers(headers);
        if let Some(query) = &query {
            builder = builder.query(query);
        }
        if let Some(body) = &body {
            builder = builder.json(body);
        }
        let built = builder.build().map_err(|e| self.construction_failed(id, e.to_string()))?;

        self.events.record(&ApiEvent::RequestSent {
            id,
            method: built.method().to_string(),
            url: built.url().to_string(),
            authorized,
        });
        Ok(built)
    }

    fn construction_failed(&self, id: Uuid, error: String) -> ApiError {
        self.record_failed(id, ApiError::RequestConstruction(error))
    }

    fn record_failed(&self, id: Uuid, err: ApiError) -> ApiError {
        self.events.record(&ApiEvent::RequestFailed { id, error: err.to_string() });
        err
    }

    // -------------------------------------------------------------------------
    // RESPONSE STAGE
    // -------------------------------------------------------------------------

    async fn dispatch<T: DeserializeOwned>(&self, id: Uuid, request: reqwest::Request) -> Result<T, ApiError> {
        let response = match self.http.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                let err = classify_transport(&e);
                match &err {
                    ApiError::RequestConstruction(error) => {
                        self.events.record(&ApiEvent::RequestFailed { id, error: error.clone() });
                    }
                    _ => self.events.record(&ApiEvent::NoResponse { id, error: e.to_string() }),
                }
                return Err(err);
            }
        };

        let status = response.status();
        if status.is_success() {
            let body = match response.bytes().await {
                Ok(body) => body,
                Err(e) => {
                    self.events.record(&ApiEvent::NoResponse { id, error: e.to_string() });
                    return Err(ApiError::Network(e.to_string()));
                }
            };
            self.events.record(&ApiEvent::ResponseReceived { id, status: status.as_u16(), bytes: body.len() });
            return decode_payload(&body);
        }

        // The status alone decides the error path; a broken body only loses detail.
        let text = match response.bytes().await {
            Ok(body) => String::from_utf8_lossy(&body).into_owned(),
            Err(e) => {
                tracing::debug!(%id, status = status.as_u16(), error = %e, "error response body unreadable");
                String::new()
            }
        };
        self.events.record(&ApiEvent::ResponseError { id, status: status.as_u16(), body: text.clone() });
        if status == StatusCode::UNAUTHORIZED {
            self.events.record(&ApiEvent::Unauthorized { id, redirect_to: self.login_page.clone() });
            self.navigator.redirect(&self.login_page);
        }
        Err(ApiError::Server { status: status.as_u16(), body: text })
    }

    // -------------------------------------------------------------------------
    // PUBLIC HELPERS
    // -------------------------------------------------------------------------

    /// Send a request through both stages and return the decoded payload.
    ///
    /// # Errors
    ///
    /// Propagates every [`ApiError`] kind; see the module docs.
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        self.send_with_id(Uuid::new_v4(), request).await
    }

    async fn send_with_id<T: DeserializeOwned>(&self, id: Uuid, request: ApiRequest) -> Result<T, ApiError> {
        let prepared = self.prepare(id, request)?;
        self.dispatch(id, prepared).await
    }

    /// Like [`ApiClient::send`], abandoning the request if `cancel` completes first.
    ///
    /// An already-completed `cancel` wins, so nothing is sent.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` when `cancel` wins, otherwise as [`ApiClient::send`].
    pub async fn send_until<T, F>(&self, request: ApiRequest, cancel: F) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            () = cancel => {
                tracing::debug!("request cancelled by caller");
                Err(ApiError::Cancelled)
            }
            result = self.send(request) => result,
        }
    }

    /// `GET path`, with `params` encoded as the query string.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::send`]. Params that are not a flat object fail as
    /// `RequestConstruction`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, params: Option<&Value>) -> Result<T, ApiError> {
        let mut request = ApiRequest::get(path);
        request.query = params.cloned();
        self.send(request).await
    }

    /// `POST path` with `data` as the JSON body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn post<T, B>(&self, path: &str, data: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let id = Uuid::new_v4();
        let body = self.serialize_body(id, data)?;
        self.send_with_id(id, ApiRequest::post(path, body)).await
    }

    /// `PUT path` with `data` as the JSON body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn put<T, B>(&self, path: &str, data: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let id = Uuid::new_v4();
        let body = self.serialize_body(id, data)?;
        self.send_with_id(id, ApiRequest::put(path, body)).await
    }

    /// `DELETE path`.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::delete(path)).await
    }

    fn serialize_body<B: Serialize + ?Sized>(&self, id: Uuid, data: &B) -> Result<Value, ApiError> {
        serde_json::to_value(data).map_err(|e| self.construction_failed(id, format!("body serialization failed: {e}")))
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
