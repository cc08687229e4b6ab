//! Error types for reqwest-based network calls.

use nodeflow_runtime::provider::{NetworkError, NetworkErrorKind};
use thiserror::Error;

/// Result type alias for reqwest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for reqwest operations.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// The request could not be built from the node configuration.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// Credentials were missing or expired.
    #[error("Authentication error: {0}")]
    Authentication(String),
}

impl From<Error> for NetworkError {
    fn from(err: Error) -> Self {
        match err {
            Error::Reqwest(e) => {
                let kind = if e.is_timeout() {
                    NetworkErrorKind::Timeout
                } else if e.is_connect() {
                    NetworkErrorKind::Connect
                } else if e.is_builder() {
                    NetworkErrorKind::InvalidRequest
                } else {
                    NetworkErrorKind::Other
                };
                NetworkError::new(kind, e.to_string())
            }
            Error::InvalidRequest(message) => {
                NetworkError::new(NetworkErrorKind::InvalidRequest, message)
            }
            Error::Authentication(message) => {
                NetworkError::new(NetworkErrorKind::Authentication, message)
            }
        }
    }
}
