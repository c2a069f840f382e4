//! Diagnostic events and navigation hooks emitted by the request pipeline.
//!
//! DESIGN
//! ======
//! The client does not log or navigate on its own. It records typed
//! [`ApiEvent`]s into an injected [`EventSink`] and, on a 401, asks an
//! injected [`Navigator`] to move the host to the login page. The
//! composition layer picks both; the defaults log through `tracing`.

use uuid::Uuid;

/// One step of a request's life in the wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiEvent {
    /// The request stage finished and the request is about to leave.
    RequestSent { id: Uuid, method: String, url: String, authorized: bool },
    /// A success status arrived.
    ResponseReceived { id: Uuid, status: u16, bytes: usize },
    /// An error status arrived.
    ResponseError { id: Uuid, status: u16, body: String },
    /// The request was sent but nothing came back.
    NoResponse { id: Uuid, error: String },
    /// The request could not be built or sent.
    RequestFailed { id: Uuid, error: String },
    /// The server rejected the credentials (401).
    Unauthorized { id: Uuid, redirect_to: String },
}

impl ApiEvent {
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        match self {
            Self::RequestSent { id, .. }
            | Self::ResponseReceived { id, .. }
            | Self::ResponseError { id, .. }
            | Self::NoResponse { id, .. }
            | Self::RequestFailed { id, .. }
            | Self::Unauthorized { id, .. } => *id,
        }
    }
}

/// Receiver for wrapper diagnostics.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &ApiEvent);
}

/// Host navigation capability, used for the hard redirect on 401.
pub trait Navigator: Send + Sync {
    fn redirect(&self, path: &str);
}

/// Default sink: structured `tracing` output.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &ApiEvent) {
        match event {
            ApiEvent::RequestSent { id, method, url, authorized } => {
                tracing::debug!(%id, %method, %url, authorized, "request sent");
            }
            ApiEvent::ResponseReceived { id, status, bytes } => {
                tracing::debug!(%id, status, bytes, "response received");
            }
            ApiEvent::ResponseError { id, status, body } => {
                tracing::warn!(%id, status, body = %truncate(body, 256), "response error");
            }
            ApiEvent::NoResponse { id, error } => {
                tracing::error!(%id, %error, "no response received");
            }
            ApiEvent::RequestFailed { id, error } => {
                tracing::error!(%id, %error, "request configuration error");
            }
            ApiEvent::Unauthorized { id, redirect_to } => {
                tracing::warn!(%id, %redirect_to, "unauthorized; redirecting to login");
            }
        }
    }
}

/// Default navigator: records the redirect and leaves the host alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn redirect(&self, path: &str) {
        tracing::info!(%path, "navigation requested");
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
#[path = "events_test.rs"]
mod tests;
