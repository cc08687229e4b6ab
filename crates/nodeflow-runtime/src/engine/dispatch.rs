//! Single-node execution: per-attempt timeout and retry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::retry::Retrier;
use crate::context::NodeContext;
use crate::definition::{Node, NodeId};
use crate::execution::NodeError;
use crate::registry::{NodeBehavior, NodeOutput};

/// Notice that a failed attempt will be retried.
#[derive(Debug)]
pub(crate) struct RetryNotice {
    pub node_id: NodeId,
    /// Number of the failed attempt, starting at 1.
    pub attempt: u32,
    pub delay: Duration,
    pub error: NodeError,
}

/// Terminal outcome of a dispatched node.
#[derive(Debug)]
pub(crate) struct NodeCompletion {
    pub node_id: NodeId,
    pub result: Result<NodeOutput, NodeError>,
    pub attempts: u32,
}

/// Everything a spawned node task owns.
pub(crate) struct NodeTask {
    pub node: Arc<Node>,
    pub behavior: Arc<dyn NodeBehavior>,
    pub ctx: NodeContext,
    pub timeout: Option<Duration>,
    pub retrier: Retrier,
    pub cancel: CancellationToken,
    pub notices: mpsc::UnboundedSender<RetryNotice>,
}

impl NodeTask {
    /// Runs the node until it succeeds or its retry policy gives up.
    pub async fn run(self) -> NodeCompletion {
        let Self {
            node,
            behavior,
            ctx,
            timeout,
            retrier,
            cancel,
            notices,
        } = self;

        let outcome = retrier
            .run(
                node.retry_config(),
                &cancel,
                |_| attempt(&node, behavior.as_ref(), &ctx, timeout),
                |attempt, error, delay| {
                    // The scheduler may already be gone after a run timeout.
                    let _ = notices.send(RetryNotice {
                        node_id: node.id.clone(),
                        attempt,
                        delay,
                        error: error.clone(),
                    });
                },
            )
            .await;

        NodeCompletion {
            node_id: node.id.clone(),
            result: outcome.result,
            attempts: outcome.attempts,
        }
    }
}

async fn attempt(
    node: &Node,
    behavior: &dyn NodeBehavior,
    ctx: &NodeContext,
    timeout: Option<Duration>,
) -> Result<NodeOutput, NodeError> {
    let Some(limit) = timeout else {
        return behavior.execute(node, ctx).await;
    };

    match tokio::time::timeout(limit, behavior.execute(node, ctx)).await {
        Ok(result) => result,
        Err(_) => Err(NodeError::timeout(&node.node_type(), limit.as_millis())),
    }
}
