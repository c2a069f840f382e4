//! Auth endpoints consumed by the session store.

use std::sync::Arc;

use serde_json::Value;

use super::client::ApiClient;
use super::error::ApiError;
use super::types::{AuthResponse, Credentials};

pub const LOGIN_ENDPOINT: &str = "/api/login";
pub const CHECK_AUTH_ENDPOINT: &str = "/api/check-auth";
pub const LOGOUT_ENDPOINT: &str = "/logout";

/// Backend calls the session store depends on. Mocked in tests.
#[async_trait::async_trait]
pub trait AuthApi: Send + Sync {
    /// `POST /api/login`.
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError>;

    /// `GET /api/check-auth`.
    async fn check_auth(&self) -> Result<AuthResponse, ApiError>;

    /// `POST /logout`.
    async fn logout(&self) -> Result<(), ApiError>;
}

#[async_trait::async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        let response: AuthResponse = self.post(LOGIN_ENDPOINT, credentials).await?;
        if let Some(token) = response.token.as_deref() {
            if let Err(e) = self.tokens().save(token) {
                tracing::warn!(error = %e, "login succeeded but token could not be stored");
            }
        }
        Ok(response)
    }

    async fn check_auth(&self) -> Result<AuthResponse, ApiError> {
        self.get(CHECK_AUTH_ENDPOINT, None).await
    }

    async fn logout(&self) -> Result<(), ApiError> {
        let result = self
            .post::<Value, _>(LOGOUT_ENDPOINT, &Value::Object(serde_json::Map::new()))
            .await
            .map(|_| ());
        if let Err(e) = self.tokens().clear() {
            tracing::warn!(error = %e, "stored token could not be removed");
        }
        result
    }
}

#[async_trait::async_trait]
impl<T: AuthApi + ?Sized> AuthApi for Arc<T> {
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        (**self).login(credentials).await
    }

    async fn check_auth(&self) -> Result<AuthResponse, ApiError> {
        (**self).check_auth().await
    }

    async fn logout(&self) -> Result<(), ApiError> {
        (**self).logout().await
    }
}
