//! Transport error types

use thiserror::Error;

/// Errors reported by a transport for a single request
///
/// These are delivered to the request's completion and never affect
/// scheduling or the rate-limit table.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error("Request was never dispatched: scheduler shut down")]
    Abandoned,

    #[error("Transport failure: {0}")]
    Other(String),
}

impl TransportError {
    /// HTTP status code, if the remote API answered
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Api { status, .. } => Some(*status),
            TransportError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if the remote API rejected the call for exceeding its quota
    pub fn is_rate_limit(&self) -> bool {
        self.status() == Some(429)
    }
}
