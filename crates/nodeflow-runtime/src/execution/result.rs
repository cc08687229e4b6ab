//! Per-node and per-run results.

use std::collections::HashMap;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ExecutionError, ExecutionId, ExecutionStatus, NodeError, NodeStatus};
use crate::definition::{NodeId, WorkflowId};

fn seconds_between(start: Timestamp, end: Timestamp) -> f64 {
    end.duration_since(start).as_secs_f64().max(0.0)
}

/// Outcome of one node within a run.
///
/// Transitions are ignored once the result reached a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResult {
    pub node_id: NodeId,
    pub status: NodeStatus,
    pub start_time: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<Timestamp>,
    /// Wall time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

impl NodeResult {
    /// Creates a pending result.
    pub fn pending(node_id: NodeId) -> Self {
        Self {
            node_id,
            status: NodeStatus::Pending,
            start_time: Timestamp::now(),
            end_time: None,
            duration: None,
            input: Value::Null,
            output: Value::Null,
            error: None,
            retry_count: None,
        }
    }

    /// Returns whether the result can no longer change.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Marks the node as running with the given input.
    pub fn start(&mut self, input: Value) {
        if self.is_terminal() {
            return;
        }
        self.status = NodeStatus::Running;
        self.start_time = Timestamp::now();
        self.input = input;
    }

    /// Records that a failed attempt will be retried.
    pub fn retrying(&mut self, retry_count: u32) {
        if self.is_terminal() {
            return;
        }
        self.status = NodeStatus::Retrying;
        self.retry_count = Some(retry_count);
    }

    /// Records a successful completion.
    pub fn succeed(&mut self, output: Value, retry_count: u32) {
        if self.is_terminal() {
            return;
        }
        self.status = NodeStatus::Success;
        self.output = output;
        self.finish(retry_count);
    }

    /// Records a terminal failure.
    pub fn fail(&mut self, error: NodeError, retry_count: u32) {
        if self.is_terminal() {
            return;
        }
        self.status = NodeStatus::Error;
        self.error = Some(error);
        self.finish(retry_count);
    }

    /// Records that the node was not executed.
    pub fn skip(&mut self) {
        if self.is_terminal() {
            return;
        }
        let now = Timestamp::now();
        self.status = NodeStatus::Skipped;
        self.start_time = now;
        self.end_time = Some(now);
    }

    fn finish(&mut self, retry_count: u32) {
        let end = Timestamp::now();
        self.end_time = Some(end);
        self.duration = Some(seconds_between(self.start_time, end));
        if retry_count > 0 {
            self.retry_count = Some(retry_count);
        }
    }
}

/// Aggregated outcome of one execution.
///
/// Mutations are ignored once the result reached a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub workflow_id: WorkflowId,
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    pub start_time: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<Timestamp>,
    /// Wall time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Node ids in completion order.
    #[serde(default)]
    pub executed_nodes: Vec<NodeId>,
    #[serde(default)]
    pub node_results: HashMap<NodeId, NodeResult>,
    #[serde(default)]
    pub errors: Vec<ExecutionError>,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_data: Option<Value>,
}

impl ExecutionResult {
    /// Creates a pending result.
    pub fn new(workflow_id: WorkflowId, execution_id: ExecutionId, trigger_data: Value) -> Self {
        Self {
            workflow_id,
            execution_id,
            status: ExecutionStatus::Pending,
            start_time: Timestamp::now(),
            end_time: None,
            duration: None,
            executed_nodes: Vec::new(),
            node_results: HashMap::new(),
            errors: Vec::new(),
            output: Value::Null,
            trigger_data: (!trigger_data.is_null()).then_some(trigger_data),
        }
    }

    /// Returns whether the result can no longer change.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns whether the run completed successfully.
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// Marks the run as started.
    pub fn start(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.status = ExecutionStatus::Running;
    }

    /// Records a run-level error.
    pub fn push_error(&mut self, error: ExecutionError) {
        if self.is_terminal() {
            return;
        }
        self.errors.push(error);
    }

    /// Returns the result of the given node.
    pub fn node(&self, node_id: &NodeId) -> Option<&NodeResult> {
        self.node_results.get(node_id)
    }

    /// Returns the result of the given node, creating a pending one if needed.
    pub fn node_mut(&mut self, node_id: &NodeId) -> &mut NodeResult {
        self.node_results
            .entry(node_id.clone())
            .or_insert_with(|| NodeResult::pending(node_id.clone()))
    }

    /// Returns the result of a node that is about to run again, replacing a
    /// terminal result left by an earlier loop iteration.
    pub fn restart_node(&mut self, node_id: &NodeId) -> &mut NodeResult {
        let result = self.node_mut(node_id);
        if result.is_terminal() {
            *result = NodeResult::pending(node_id.clone());
        }
        result
    }

    /// Freezes the result with the given terminal status.
    pub fn finish(&mut self, status: ExecutionStatus) {
        if self.is_terminal() {
            return;
        }
        let end = Timestamp::now();
        self.status = status;
        self.end_time = Some(end);
        self.duration = Some(seconds_between(self.start_time, end));
    }

    /// Immediately fails the run with a single error.
    pub fn fail(mut self, error: ExecutionError) -> Self {
        self.push_error(error);
        self.finish(ExecutionStatus::Error);
        self
    }
}
