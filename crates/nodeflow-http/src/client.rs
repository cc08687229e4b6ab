//! Reqwest-based network executor.

use std::collections::HashMap;
use std::sync::Arc;

use jiff::Timestamp;
use nodeflow_runtime::definition::HttpMethod;
use nodeflow_runtime::provider::{NetworkError, NetworkExecutor, NetworkRequest, NetworkResponse};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use url::Url;

use crate::{Error, ReqwestConfig, Result, TRACING_TARGET, auth};

/// Inner state that holds the HTTP client and configuration.
struct ReqwestExecutorInner {
    http: Client,
    config: ReqwestConfig,
}

/// Reqwest-based [`NetworkExecutor`] for `api_call` nodes.
///
/// Error statuses are returned as responses; only transport failures,
/// invalid URLs and unusable credentials produce a [`NetworkError`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use nodeflow_http::{ReqwestConfig, ReqwestExecutor};
/// use nodeflow_runtime::prelude::*;
///
/// # fn example() -> nodeflow_http::Result<()> {
/// let network = ReqwestExecutor::new(ReqwestConfig::default())?;
/// let registry = NodeRegistry::builtin(Arc::new(network), Arc::new(TokioClock));
/// let _engine = Engine::new(EngineConfig::default(), registry);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ReqwestExecutor {
    inner: Arc<ReqwestExecutorInner>,
}

impl std::fmt::Debug for ReqwestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestExecutor")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl ReqwestExecutor {
    /// Creates a new executor with the given configuration.
    pub fn new(config: ReqwestConfig) -> Result<Self> {
        let timeout = config.effective_timeout();

        tracing::debug!(
            target: TRACING_TARGET,
            timeout_ms = timeout.as_millis(),
            "Creating reqwest client"
        );

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(config.effective_user_agent())
            .build()?;

        tracing::info!(target: TRACING_TARGET, "Reqwest client created successfully");

        Ok(Self {
            inner: Arc::new(ReqwestExecutorInner { http, config }),
        })
    }

    /// Gets the client configuration.
    pub fn config(&self) -> &ReqwestConfig {
        &self.inner.config
    }

    /// Translates a runtime request into a reqwest request.
    fn prepare(&self, request: &NetworkRequest, now: Timestamp) -> Result<RequestBuilder> {
        let url = Url::parse(&request.url)
            .map_err(|e| Error::InvalidRequest(format!("invalid url '{}': {e}", request.url)))?;

        let mut builder = self.inner.http.request(method(request.method), url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        auth::apply(builder, &request.auth, now)
    }
}

#[async_trait::async_trait]
impl NetworkExecutor for ReqwestExecutor {
    async fn call(&self, request: NetworkRequest) -> std::result::Result<NetworkResponse, NetworkError> {
        tracing::debug!(
            target: TRACING_TARGET,
            request_id = %request.request_id,
            method = %request.method,
            url = %request.url,
            "Sending request"
        );

        let response = self
            .prepare(&request, Timestamp::now())?
            .send()
            .await
            .map_err(Error::from)?;
        let response = read(response).await.map_err(Error::from)?;

        tracing::debug!(
            target: TRACING_TARGET,
            request_id = %request.request_id,
            status_code = response.status_code,
            "Request completed"
        );

        Ok(response)
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Patch => Method::PATCH,
    }
}

async fn read(response: Response) -> reqwest::Result<NetworkResponse> {
    let status_code = response.status().as_u16();
    let headers: HashMap<String, String> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_owned())))
        .collect();

    let bytes = response.bytes().await?;
    Ok(NetworkResponse {
        status_code,
        headers,
        body: decode(&bytes),
    })
}

/// Parses a body as JSON, falling back to a JSON string.
fn decode(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::Json;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use nodeflow_runtime::definition::{AuthConfig, AuthType};
    use nodeflow_runtime::provider::NetworkErrorKind;
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;

    async fn serve() -> String {
        let router = Router::new()
            .route("/orders", get(|| async { Json(json!({ "orders": [1, 2] })) }))
            .route("/text", get(|| async { "plain text" }))
            .route("/missing", get(|| async { (StatusCode::NOT_FOUND, "gone") }))
            .route(
                "/echo",
                post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                    let token = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_owned();
                    (StatusCode::CREATED, Json(json!({ "body": body, "auth": token })))
                }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await });
        format!("http://{addr}")
    }

    fn executor() -> ReqwestExecutor {
        ReqwestExecutor::new(ReqwestConfig::default()).unwrap()
    }

    #[test]
    fn test_decode_body() {
        assert_eq!(decode(b""), Value::Null);
        assert_eq!(decode(br#"{"a":1}"#), json!({ "a": 1 }));
        assert_eq!(decode(b"not json"), json!("not json"));
    }

    #[test]
    fn test_prepare_applies_timeout_and_headers() {
        let request = NetworkRequest::new(HttpMethod::Put, "https://api.example.com/orders/7")
            .with_headers(HashMap::from([("X-Trace".to_owned(), "t-1".to_owned())]))
            .with_body(Some(json!({ "amount": 42 })))
            .with_timeout(Some(Duration::from_millis(1500)));

        let built = executor()
            .prepare(&request, Timestamp::now())
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(built.method(), &Method::PUT);
        assert_eq!(built.headers()["X-Trace"], "t-1");
        assert_eq!(built.headers()["content-type"], "application/json");
        assert_eq!(built.timeout(), Some(&Duration::from_millis(1500)));
    }

    #[test]
    fn test_invalid_url() {
        let request = NetworkRequest::new(HttpMethod::Get, "not a url");
        let error = executor().prepare(&request, Timestamp::now()).unwrap_err();
        assert_eq!(NetworkError::from(error).kind, NetworkErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_json_response() {
        let base = serve().await;
        let request = NetworkRequest::new(HttpMethod::Get, format!("{base}/orders"));

        let response = executor().call(request).await.unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, json!({ "orders": [1, 2] }));
        assert_eq!(response.headers["content-type"], "application/json");
    }

    #[tokio::test]
    async fn test_text_and_error_status() {
        let base = serve().await;
        let executor = executor();

        let request = NetworkRequest::new(HttpMethod::Get, format!("{base}/text"));
        let response = executor.call(request).await.unwrap();
        assert_eq!(response.body, json!("plain text"));

        let request = NetworkRequest::new(HttpMethod::Get, format!("{base}/missing"));
        let response = executor.call(request).await.unwrap();
        assert_eq!(response.status_code, 404);
        assert!(response.is_error());
    }

    #[tokio::test]
    async fn test_post_with_auth() {
        let base = serve().await;
        let request = NetworkRequest::new(HttpMethod::Post, format!("{base}/echo"))
            .with_body(Some(json!({ "id": 7 })))
            .with_auth(AuthConfig::new(AuthType::BearerToken, [("token", "abc")]));

        let response = executor().call(request).await.unwrap();
        assert_eq!(response.status_code, 201);
        assert_eq!(response.body, json!({ "body": { "id": 7 }, "auth": "Bearer abc" }));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let request = NetworkRequest::new(HttpMethod::Get, format!("http://{addr}/"));
        let error = executor().call(request).await.unwrap_err();
        assert_eq!(error.kind, NetworkErrorKind::Connect);
    }
}
