//! Delay behavior.

use std::sync::Arc;

use serde_json::json;

use super::{NodeBehavior, NodeOutput, TRACING_TARGET};
use crate::context::NodeContext;
use crate::definition::{Node, NodeKind};
use crate::execution::{NodeError, NodeErrorType};
use crate::provider::Clock;

/// Suspends the node's task for `duration * unit` and passes its input on.
#[derive(Clone)]
pub struct TimerBehavior {
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TimerBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerBehavior").finish_non_exhaustive()
    }
}

impl TimerBehavior {
    /// Creates the behavior over a clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait::async_trait]
impl NodeBehavior for TimerBehavior {
    async fn execute(&self, node: &Node, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let NodeKind::Timer(data) = &node.kind else {
            return Err(NodeError::new(
                NodeErrorType::InvalidConfiguration,
                format!("expected a timer node, found `{}`", node.node_type()),
            ));
        };

        let wait = data.wait_time().ok_or_else(|| {
            NodeError::new(
                NodeErrorType::TimerExecutionFailed,
                format!("invalid timer duration {} {}", data.duration, data.unit),
            )
        })?;

        tracing::debug!(
            target: TRACING_TARGET,
            node_id = %node.id,
            wait_ms = wait.as_millis() as u64,
            timer_type = %data.timer_type,
            "Timer started"
        );
        self.clock.sleep(wait).await;

        Ok(NodeOutput::new(json!({
            "waited": wait.as_secs_f64(),
            "unit": data.unit,
            "resumedAt": self.clock.now(),
            "input": ctx.input(),
        })))
    }
}
