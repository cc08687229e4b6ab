//! Webhook entry behavior.

use serde_json::json;

use super::{NodeBehavior, NodeOutput, TRACING_TARGET};
use crate::context::NodeContext;
use crate::definition::{Node, NodeKind, TriggerType};
use crate::execution::{NodeError, NodeErrorType};

/// Emits the delivery that started the run.
///
/// Service and event filters only apply to webhook deliveries; other trigger
/// types pass through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebhookBehavior;

#[async_trait::async_trait]
impl NodeBehavior for WebhookBehavior {
    async fn execute(&self, node: &Node, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let NodeKind::Webhook(data) = &node.kind else {
            return Err(NodeError::new(
                NodeErrorType::InvalidConfiguration,
                format!("expected a webhook node, found `{}`", node.node_type()),
            ));
        };

        let failed = |message: String| NodeError::new(NodeErrorType::WebhookProcessingFailed, message);

        if !data.is_active {
            return Err(failed(format!("webhook `{}` is inactive", data.endpoint)));
        }

        let trigger = ctx.trigger();
        if trigger.trigger_type == TriggerType::Webhook {
            if let (Some(expected), Some(received)) = (data.service, trigger.service.as_deref())
                && !expected.as_ref().eq_ignore_ascii_case(received)
            {
                return Err(failed(format!(
                    "delivery from `{received}` does not match service `{expected}`"
                )));
            }

            if !data.accepts_event(trigger.event.as_deref()) {
                return Err(failed(format!(
                    "event `{}` is not accepted by webhook `{}`",
                    trigger.event.as_deref().unwrap_or_default(),
                    data.endpoint
                )));
            }
        }

        tracing::debug!(
            target: TRACING_TARGET,
            node_id = %node.id,
            endpoint = %data.endpoint,
            event = trigger.event.as_deref().unwrap_or_default(),
            "Webhook delivery accepted"
        );

        let service = trigger
            .service
            .clone()
            .or_else(|| data.service.map(|s| s.to_string()));

        Ok(NodeOutput::new(json!({
            "service": service,
            "event": trigger.event,
            "payload": trigger.payload,
            "headers": trigger.headers,
        })))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Value, json};

    use super::*;
    use crate::context::tests::context;
    use crate::definition::{TriggerEvent, WebhookData, WebhookService};

    fn node_context(trigger: TriggerEvent) -> NodeContext {
        NodeContext::new(
            "hook".into(),
            trigger.payload.clone(),
            Arc::new(context(trigger.payload.clone())),
            Arc::new(trigger),
        )
    }

    fn hook() -> Node {
        Node::new(
            "hook",
            WebhookData::new(WebhookService::Stripe, "/stripe")
                .with_event_types(["charge.succeeded"]),
        )
    }

    #[tokio::test]
    async fn test_webhook_emits_delivery() {
        let trigger = TriggerEvent::webhook("stripe", "charge.succeeded", json!({ "amount": 5 }))
            .with_header("x-signature", "abc");
        let output = WebhookBehavior
            .execute(&hook(), &node_context(trigger))
            .await
            .unwrap();

        assert_eq!(
            output.value,
            json!({
                "service": "stripe",
                "event": "charge.succeeded",
                "payload": { "amount": 5 },
                "headers": { "x-signature": "abc" }
            })
        );
    }

    #[tokio::test]
    async fn test_webhook_rejects_unaccepted_event() {
        let trigger = TriggerEvent::webhook("stripe", "charge.failed", Value::Null);
        let error = WebhookBehavior
            .execute(&hook(), &node_context(trigger))
            .await
            .unwrap_err();
        assert_eq!(error.kind, NodeErrorType::WebhookProcessingFailed);

        let trigger = TriggerEvent::webhook("github", "charge.succeeded", Value::Null);
        assert!(WebhookBehavior.execute(&hook(), &node_context(trigger)).await.is_err());
    }

    #[tokio::test]
    async fn test_inactive_webhook_fails() {
        let mut node = hook();
        if let NodeKind::Webhook(data) = &mut node.kind {
            data.is_active = false;
        }

        let error = WebhookBehavior
            .execute(&node, &node_context(TriggerEvent::manual(Value::Null)))
            .await
            .unwrap_err();
        assert_eq!(error.kind, NodeErrorType::WebhookProcessingFailed);
    }

    #[tokio::test]
    async fn test_manual_runs_skip_event_filters() {
        let output = WebhookBehavior
            .execute(&hook(), &node_context(TriggerEvent::manual(json!({ "x": 1 }))))
            .await
            .unwrap();
        assert_eq!(output.value["payload"], json!({ "x": 1 }));
        assert_eq!(output.value["service"], "stripe");
    }
}
