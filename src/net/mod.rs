//! HTTP client wrapper: token injection, diagnostics, unauthorized handling.

pub mod auth;
pub mod client;
pub mod error;
pub mod events;
pub mod token;
pub mod types;

pub use auth::AuthApi;
pub use client::{ApiClient, ApiRequest};
pub use error::ApiError;
pub use events::{ApiEvent, EventSink, Navigator};
pub use token::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use types::{AuthResponse, Credentials, User};
