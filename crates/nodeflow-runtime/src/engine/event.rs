//! Progress events published while runs execute.

use serde::Serialize;

use crate::definition::{NodeId, WorkflowId};
use crate::execution::{ExecutionId, ExecutionStatus, NodeStatus};

/// Capacity of the engine's event channel.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle event of an execution.
///
/// Subscribers that fall behind miss events; the final
/// [`ExecutionResult`](crate::execution::ExecutionResult) stays authoritative.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ExecutionEvent {
    Started {
        workflow_id: WorkflowId,
        execution_id: ExecutionId,
    },
    NodeStarted {
        execution_id: ExecutionId,
        node_id: NodeId,
    },
    NodeRetrying {
        execution_id: ExecutionId,
        node_id: NodeId,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    NodeFinished {
        execution_id: ExecutionId,
        node_id: NodeId,
        status: NodeStatus,
    },
    Finished {
        execution_id: ExecutionId,
        status: ExecutionStatus,
    },
}

impl ExecutionEvent {
    /// Returns the execution the event belongs to.
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            Self::Started { execution_id, .. }
            | Self::NodeStarted { execution_id, .. }
            | Self::NodeRetrying { execution_id, .. }
            | Self::NodeFinished { execution_id, .. }
            | Self::Finished { execution_id, .. } => *execution_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_event_serialization() {
        let execution_id = ExecutionId::new();
        let event = ExecutionEvent::NodeRetrying {
            execution_id,
            node_id: "fetch".into(),
            attempt: 1,
            delay_ms: 200,
            error: "timeout".into(),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "node_retrying");
        assert_eq!(value["nodeId"], "fetch");
        assert_eq!(value["delayMs"], 200);
        assert_eq!(value["executionId"], json!(execution_id.to_string()));
        assert_eq!(event.execution_id(), execution_id);
    }
}
