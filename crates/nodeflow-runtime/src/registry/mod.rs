//! Node type registry and built-in behaviors.
//!
//! A [`NodeRegistry`] maps every [`NodeType`] to the [`NodeBehavior`] that
//! executes it. [`NodeRegistry::builtin`] wires the six built-in node kinds;
//! additional behaviors can be registered for any custom type name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::context::NodeContext;
use crate::definition::{Node, NodeType};
use crate::error::{WorkflowError, WorkflowResult};
use crate::execution::NodeError;
use crate::provider::{Clock, NetworkExecutor};

mod api_call;
mod condition;
mod iteration;
mod timer;
mod transform;
mod webhook;

pub use api_call::ApiCallBehavior;
pub use condition::ConditionBehavior;
pub(crate) use condition::evaluate_condition;
pub use iteration::LoopBehavior;
pub use timer::TimerBehavior;
pub use transform::TransformBehavior;
pub use webhook::WebhookBehavior;

/// Tracing target for node behaviors.
pub const TRACING_TARGET: &str = "nodeflow_runtime::registry";

/// Executes nodes of one type.
#[async_trait::async_trait]
pub trait NodeBehavior: Send + Sync {
    /// Executes a single attempt of `node`.
    async fn execute(&self, node: &Node, ctx: &NodeContext) -> Result<NodeOutput, NodeError>;
}

/// Which outgoing edges a completed node activates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Route {
    /// Every outgoing edge.
    #[default]
    Default,
    /// Only edges whose source handle is listed.
    ///
    /// `matched` tells whether any condition held; when it is `true`, edges
    /// without a handle are followed as well.
    Branch { handles: Vec<String>, matched: bool },
    /// Re-enter the loop body.
    LoopContinue,
    /// Leave the loop.
    LoopExit,
}

/// Successful outcome of a node attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOutput {
    /// Value merged into the context under the node id.
    pub value: Value,
    /// Variable writes keyed by dotted path.
    pub variables: Map<String, Value>,
    /// Edge selection.
    pub route: Route,
}

impl NodeOutput {
    /// Creates an output following every outgoing edge.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            variables: Map::new(),
            route: Route::Default,
        }
    }

    /// Sets the edge selection.
    #[must_use]
    pub fn with_route(mut self, route: Route) -> Self {
        self.route = route;
        self
    }

    /// Adds a variable write.
    #[must_use]
    pub fn with_variable(mut self, key: impl Into<String>, value: Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }
}

/// Maps node types to behaviors.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    behaviors: HashMap<NodeType, Arc<dyn NodeBehavior>>,
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.behaviors.keys().map(NodeType::as_str).collect();
        types.sort_unstable();
        f.debug_struct("NodeRegistry").field("types", &types).finish()
    }
}

impl NodeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in behavior.
    pub fn builtin(network: Arc<dyn NetworkExecutor>, clock: Arc<dyn Clock>) -> Self {
        Self::new()
            .with(NodeType::Webhook, WebhookBehavior)
            .with(NodeType::ApiCall, ApiCallBehavior::new(network))
            .with(NodeType::Condition, ConditionBehavior)
            .with(NodeType::Timer, TimerBehavior::new(clock))
            .with(NodeType::DataTransform, TransformBehavior)
            .with(NodeType::Loop, LoopBehavior)
    }

    /// Registers a behavior, replacing any previous one for the type.
    pub fn register(&mut self, node_type: NodeType, behavior: impl NodeBehavior + 'static) {
        self.behaviors.insert(node_type, Arc::new(behavior));
    }

    /// Registers a behavior and returns the registry.
    #[must_use]
    pub fn with(mut self, node_type: NodeType, behavior: impl NodeBehavior + 'static) -> Self {
        self.register(node_type, behavior);
        self
    }

    /// Returns the behavior of a node type.
    pub fn resolve(&self, node_type: &NodeType) -> WorkflowResult<Arc<dyn NodeBehavior>> {
        self.behaviors
            .get(node_type)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownNodeType(node_type.clone()))
    }

    /// Returns whether a behavior is registered for the type.
    pub fn contains(&self, node_type: &NodeType) -> bool {
        self.behaviors.contains_key(node_type)
    }
}
