//! Outbound HTTP call behavior.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use url::Url;

use super::{NodeBehavior, NodeOutput, TRACING_TARGET};
use crate::context::NodeContext;
use crate::definition::{Node, NodeKind};
use crate::execution::{ErrorType, NodeError, NodeErrorType};
use crate::provider::{NetworkExecutor, NetworkRequest};

/// Calls a remote endpoint through a [`NetworkExecutor`].
///
/// The URL, header values and string leaves of the body are interpolated
/// against the context before the call.
#[derive(Clone)]
pub struct ApiCallBehavior {
    network: Arc<dyn NetworkExecutor>,
}

impl std::fmt::Debug for ApiCallBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCallBehavior").finish_non_exhaustive()
    }
}

impl ApiCallBehavior {
    /// Creates the behavior over a network executor.
    pub fn new(network: Arc<dyn NetworkExecutor>) -> Self {
        Self { network }
    }
}

#[async_trait::async_trait]
impl NodeBehavior for ApiCallBehavior {
    async fn execute(&self, node: &Node, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let NodeKind::ApiCall(data) = &node.kind else {
            return Err(NodeError::new(
                NodeErrorType::InvalidConfiguration,
                format!("expected an api_call node, found `{}`", node.node_type()),
            ));
        };

        let method = data.method.ok_or_else(|| NodeError::missing_field("method"))?;
        if data.url.trim().is_empty() {
            return Err(NodeError::missing_field("url"));
        }

        let url = ctx.interpolate(&data.url);
        if let Err(e) = Url::parse(&url) {
            return Err(NodeError::new(
                NodeErrorType::InvalidConfiguration,
                format!("invalid url `{url}`: {e}"),
            )
            .with_details(json!({ "url": url })));
        }

        let headers: HashMap<String, String> = data
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), ctx.interpolate(value)))
            .collect();
        let body = data.body.as_ref().map(|body| ctx.interpolate_value(body));

        let request = NetworkRequest::new(method, url.clone())
            .with_headers(headers)
            .with_body(body)
            .with_auth(data.authentication.clone())
            .with_timeout(node.timeout_ms().map(Duration::from_millis));

        tracing::debug!(
            target: TRACING_TARGET,
            node_id = %node.id,
            request_id = %request.request_id,
            method = %method,
            url = %url,
            "Sending request"
        );

        let response = self.network.call(request).await.map_err(|e| {
            NodeError::new(NodeErrorType::ApiRequestFailed, e.to_string())
                .with_category(e.error_type())
                .with_details(json!({ "url": url }))
        })?;

        if response.is_error() {
            let category = match response.status_code {
                401 | 403 => ErrorType::AuthenticationError,
                _ => ErrorType::NetworkError,
            };
            return Err(NodeError::new(
                NodeErrorType::ApiRequestFailed,
                format!("{method} {url} returned status {}", response.status_code),
            )
            .with_category(category)
            .with_details(json!({ "url": url, "body": response.body }))
            .with_status_code(response.status_code));
        }

        Ok(NodeOutput::new(json!({
            "statusCode": response.status_code,
            "headers": response.headers,
            "body": response.body,
        })))
    }
}
