//! Outbound network call interface.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use strum::{AsRefStr, Display};
use thiserror::Error;
use uuid::Uuid;

use crate::definition::{AuthConfig, HttpMethod};
use crate::execution::ErrorType;

/// An outbound HTTP request issued by an `api_call` node.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkRequest {
    /// Unique identifier for this request.
    pub request_id: Uuid,
    /// HTTP method.
    pub method: HttpMethod,
    /// Fully interpolated URL.
    pub url: String,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// JSON body, if any.
    pub body: Option<Value>,
    /// Authentication, applied by the executor.
    pub auth: AuthConfig,
    /// Request timeout (executor default if not set).
    pub timeout: Option<Duration>,
}

impl NetworkRequest {
    /// Creates a request without headers, body or authentication.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            auth: AuthConfig::default(),
            timeout: None,
        }
    }

    /// Sets multiple headers.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Sets the JSON body.
    pub fn with_body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }

    /// Sets the authentication.
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Response to a [`NetworkRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Body parsed as JSON, or a JSON string when it is not JSON.
    pub body: Value,
}

impl NetworkResponse {
    /// Creates a response with the given status and body.
    pub fn new(status_code: u16, body: Value) -> Self {
        Self {
            status_code,
            headers: HashMap::new(),
            body,
        }
    }

    /// Returns whether the status code indicates a failure.
    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }
}

/// Kind of transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum NetworkErrorKind {
    /// The request did not complete in time.
    Timeout,
    /// The connection could not be established.
    Connect,
    /// Credentials were missing, malformed or expired.
    Authentication,
    /// The request could not be built.
    InvalidRequest,
    /// Any other transport failure.
    Other,
}

/// Failure to obtain a response at all.
///
/// HTTP error statuses are not network errors; they are returned as a
/// [`NetworkResponse`].
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct NetworkError {
    pub kind: NetworkErrorKind,
    pub message: String,
}

impl NetworkError {
    /// Creates a network error.
    pub fn new(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Category reported on the failing node.
    pub fn error_type(&self) -> ErrorType {
        match self.kind {
            NetworkErrorKind::Timeout => ErrorType::TimeoutError,
            NetworkErrorKind::Authentication => ErrorType::AuthenticationError,
            NetworkErrorKind::InvalidRequest => ErrorType::ConfigurationError,
            NetworkErrorKind::Connect | NetworkErrorKind::Other => ErrorType::NetworkError,
        }
    }
}

/// Executes outbound calls on behalf of `api_call` nodes.
///
/// Implementations own transport concerns: TLS, connection pooling and the
/// application of [`AuthConfig`] to the request.
#[async_trait::async_trait]
pub trait NetworkExecutor: Send + Sync {
    /// Performs the request.
    async fn call(&self, request: NetworkRequest) -> Result<NetworkResponse, NetworkError>;
}

/// Executor used when no network access was configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNetwork;

#[async_trait::async_trait]
impl NetworkExecutor for NoNetwork {
    async fn call(&self, request: NetworkRequest) -> Result<NetworkResponse, NetworkError> {
        Err(NetworkError::new(
            NetworkErrorKind::Other,
            format!("no network executor configured for {}", request.url),
        ))
    }
}
