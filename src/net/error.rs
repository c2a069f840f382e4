//! Wrapper error taxonomy.
//!
//! The wrapper never absorbs a failure: every variant below reaches the
//! caller. Only the session store decides to turn them into booleans or
//! state transitions.

/// Errors produced by [`crate::net::client::ApiClient`] requests.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ApiError {
    /// The request could not be built or handed to the transport.
    #[error("request construction failed: {0}")]
    RequestConstruction(String),

    /// The request went out but no response arrived (timeout, connectivity).
    #[error("no response received: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("server responded with status {status}")]
    Server { status: u16, body: String },

    /// The response payload was not the expected JSON shape.
    #[error("response payload decode failed: {0}")]
    Decode(String),

    /// The caller's cancellation signal fired before a response arrived.
    #[error("request cancelled")]
    Cancelled,
}

impl ApiError {
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::RequestConstruction(_) => "E_REQUEST",
            Self::Network(_) => "E_NETWORK",
            Self::Server { .. } => "E_SERVER",
            Self::Decode(_) => "E_DECODE",
            Self::Cancelled => "E_CANCELLED",
        }
    }

    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { status: 429 | 500..=599, .. })
    }

    /// HTTP status of a server error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

/// Sort a transport failure into construction vs. no-response.
pub(crate) fn classify_transport(err: &reqwest::Error) -> ApiError {
    if err.is_builder() {
        ApiError::RequestConstruction(err.to_string())
    } else {
        ApiError::Network(err.to_string())
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
