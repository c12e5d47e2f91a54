//! Client error types

use thiserror::Error;

/// Errors that can occur while driving the backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("{0}")]
    Validation(String),

    #[error("Authentication required. Please log in.")]
    AuthRequired,

    #[error("Server rejected the request ({status}): {message}")]
    ServerRejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl ClientError {
    /// Build a validation error from a message
    pub fn validation(message: impl Into<String>) -> Self {
        ClientError::Validation(message.into())
    }

    /// Check if this is an authorization failure
    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::AuthRequired)
    }

    /// Check if a poll that failed with this error should be followed by another poll
    ///
    /// The job keeps running server-side regardless of our connectivity, so transport
    /// faults and 5xx answers only cost us one stale status line.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Network(_) => true,
            ClientError::ServerRejected { status, .. } => *status >= 500,
            ClientError::Validation(_) => false,
            ClientError::AuthRequired => false,
            ClientError::MalformedResponse(_) => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::MalformedResponse(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::MalformedResponse(err.to_string())
    }
}
