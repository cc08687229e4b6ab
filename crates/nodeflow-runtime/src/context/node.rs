use std::sync::Arc;

use serde_json::Value;

use super::{ExecutionContext, Lookup, template};
use crate::definition::{NodeId, TriggerEvent};

/// Read-only view handed to a node behavior.
///
/// Holds a snapshot of the execution context taken when the node was
/// dispatched; writes made by concurrently running nodes are not visible.
#[derive(Debug, Clone)]
pub struct NodeContext {
    node_id: NodeId,
    input: Value,
    snapshot: Arc<ExecutionContext>,
    trigger: Arc<TriggerEvent>,
    max_loop_iterations: u64,
}

impl NodeContext {
    /// Creates a node context.
    pub fn new(
        node_id: NodeId,
        input: Value,
        snapshot: Arc<ExecutionContext>,
        trigger: Arc<TriggerEvent>,
    ) -> Self {
        Self {
            node_id,
            input,
            snapshot,
            trigger,
            max_loop_iterations: u64::MAX,
        }
    }

    /// Sets the iteration limit enforced by loop behaviors.
    #[must_use]
    pub fn with_max_loop_iterations(mut self, limit: u64) -> Self {
        self.max_loop_iterations = limit;
        self
    }

    /// Returns the id of the node being executed.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Returns the node input.
    pub fn input(&self) -> &Value {
        &self.input
    }

    /// Returns the event that started the run.
    pub fn trigger(&self) -> &TriggerEvent {
        &self.trigger
    }

    /// Returns the context snapshot.
    pub fn snapshot(&self) -> &ExecutionContext {
        &self.snapshot
    }

    /// Returns the iteration limit enforced by loop behaviors.
    pub fn max_loop_iterations(&self) -> u64 {
        self.max_loop_iterations
    }

    /// Resolves a path, with `input` bound to this node's input.
    pub fn get(&self, path: &str) -> Lookup {
        self.snapshot.lookup(path, Some(&self.input))
    }

    /// Returns a run variable.
    pub fn variable(&self, key: &str) -> Option<&Value> {
        self.snapshot.variables.get(key)
    }

    /// Interpolates `{{path}}` placeholders in a string.
    pub fn interpolate(&self, text: &str) -> String {
        template::interpolate(text, &|path| self.get(path))
    }

    /// Interpolates `{{path}}` placeholders in every string leaf of a value.
    pub fn interpolate_value(&self, value: &Value) -> Value {
        template::interpolate_value(value, &|path| self.get(path))
    }
}
