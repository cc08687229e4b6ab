//! Workflow definition types.
//!
//! This module contains the serializable, frontend-friendly types used to
//! describe a workflow. These types are designed for:
//! - Lossless round-tripping to/from JSON (unknown keys are preserved)
//! - Consumption by the visual editor
//! - Storage by an external persistence layer
//!
//! Definitions are validated by [`crate::validation`] and compiled into a
//! [`crate::graph::WorkflowGraph`] before the [`crate::engine::Engine`] runs them.

use serde::{Deserialize, Serialize};

mod auth;
mod edge;
mod kind;
mod metadata;
mod node;
mod retry;
mod trigger;

pub use auth::{AuthConfig, AuthType};
pub use edge::{Edge, EdgeData};
pub use kind::{
    ApiCallData, ComparisonOperator, Condition, ConditionData, ConditionType, CustomNode,
    FieldMapping, HttpMethod, LoopData, LoopType, Schema, SchemaType, TimeUnit, TimerData,
    TimerType, Transformation, TransformationType, TransformData, WebhookData, WebhookService,
};
pub use metadata::{WorkflowId, WorkflowMetadata, WorkflowStatus};
pub use node::{Node, NodeConfig, NodeId, NodeKind, NodeType, Position};
pub use retry::{BackoffStrategy, RetryCondition, RetryConditionType, RetryConfig};
pub use trigger::{TriggerConfig, TriggerEvent, TriggerType};

use crate::error::WorkflowResult;

/// Side map of unrecognized JSON keys, re-emitted verbatim on serialization.
pub type Extra = serde_json::Map<String, serde_json::Value>;

/// Serializable workflow definition.
///
/// This is the JSON representation of a workflow graph as produced by the
/// editor. It contains everything needed to validate and execute a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Workflow identifier.
    pub id: WorkflowId,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Nodes in declaration order.
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Edges connecting nodes.
    #[serde(rename = "edge", alias = "edges", default)]
    pub edges: Vec<Edge>,
    /// Workflow metadata.
    #[serde(default)]
    pub metadata: WorkflowMetadata,
    /// Lifecycle status.
    #[serde(default)]
    pub status: WorkflowStatus,
    /// Triggers that may start the workflow.
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
}

impl Workflow {
    /// Creates an empty workflow with the given id and name.
    pub fn new(id: impl Into<WorkflowId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            metadata: WorkflowMetadata::default(),
            status: WorkflowStatus::default(),
            triggers: Vec::new(),
        }
    }

    /// Parses a workflow from its JSON representation.
    pub fn from_json(json: &str) -> WorkflowResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the workflow to pretty-printed JSON.
    pub fn to_json(&self) -> WorkflowResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Appends a node.
    #[must_use]
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Appends an edge.
    #[must_use]
    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Appends a trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger: TriggerConfig) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// Sets the lifecycle status.
    #[must_use]
    pub fn with_status(mut self, status: WorkflowStatus) -> Self {
        self.status = status;
        self
    }

    /// Returns the first node with the given id.
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|node| &node.id == id)
    }

    /// Returns whether a node with the given id exists.
    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Returns the triggers that accept the given event.
    pub fn matching_triggers<'a>(
        &'a self,
        event: &'a TriggerEvent,
    ) -> impl Iterator<Item = &'a TriggerConfig> + 'a {
        self.triggers.iter().filter(move |t| t.matches(event))
    }
}
