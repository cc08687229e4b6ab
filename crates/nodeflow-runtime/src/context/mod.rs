//! Execution context of a single run.
//!
//! The [`ExecutionContext`] holds node outputs (`data`), user variables and run
//! metadata. It is owned by the scheduler through a [`ContextStore`]; node
//! behaviors read an immutable snapshot through [`NodeContext`].
//!
//! Paths are resolved against these root namespaces:
//! - `trigger`: the trigger payload
//! - `variables` (alias `vars`): run variables
//! - `input`: the input of the node being executed
//! - `metadata`: run metadata
//! - `data`: the map of node outputs
//!
//! Any other first segment names a node id (or alias) inside `data`.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};

mod node;
pub mod path;
mod store;
pub mod template;

pub use node::NodeContext;
pub use path::{Lookup, Path, PathError};
pub use store::ContextStore;

use crate::definition::{NodeId, TriggerType, WorkflowId};
use crate::execution::ExecutionId;

/// Deployment environment a run executes in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

/// Metadata describing how a run was started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetadata {
    pub start_time: Timestamp,
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub trigger_data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub environment: ExecutionEnvironment,
}

/// Data, variables and metadata of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub workflow_id: WorkflowId,
    pub execution_id: ExecutionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node_id: Option<NodeId>,
    /// Node outputs keyed by node id and alias.
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub variables: Map<String, Value>,
    pub metadata: ExecutionMetadata,
}

impl ExecutionContext {
    /// Creates an empty context.
    pub fn new(
        workflow_id: WorkflowId,
        execution_id: ExecutionId,
        metadata: ExecutionMetadata,
    ) -> Self {
        Self {
            workflow_id,
            execution_id,
            current_node_id: None,
            data: Map::new(),
            variables: Map::new(),
            metadata,
        }
    }

    /// Resolves a path against the context.
    pub fn get(&self, path: &str) -> Lookup {
        self.lookup(path, None)
    }

    /// Resolves a path, using `input` for the `input` namespace.
    pub fn lookup(&self, path: &str, input: Option<&Value>) -> Lookup {
        let Ok(path) = path.parse::<Path>() else {
            return Lookup::Absent;
        };

        let segments = path.segments();
        let Some((path::Segment::Key(root), rest)) = segments.split_first() else {
            return Lookup::from_option(path::resolve_in(&self.data, segments));
        };

        match root.as_str() {
            "trigger" => Lookup::from_option(path::resolve(&self.metadata.trigger_data, rest)),
            "variables" | "vars" => self.resolve_map(&self.variables, rest),
            "input" => match input {
                Some(input) => Lookup::from_option(path::resolve(input, rest)),
                None => Lookup::Absent,
            },
            "metadata" => match serde_json::to_value(&self.metadata) {
                Ok(metadata) => Lookup::from_option(path::resolve(&metadata, rest)),
                Err(_) => Lookup::Absent,
            },
            "data" => self.resolve_map(&self.data, rest),
            _ => Lookup::from_option(path::resolve_in(&self.data, segments)),
        }
    }

    fn resolve_map(&self, map: &Map<String, Value>, rest: &[path::Segment]) -> Lookup {
        if rest.is_empty() {
            return Lookup::Present(Value::Object(map.clone()));
        }
        Lookup::from_option(path::resolve_in(map, rest))
    }

    /// Writes a variable. Dotted keys create nested objects.
    pub fn set(&mut self, key: &str, value: Value) -> Result<(), PathError> {
        let path: Path = key.parse()?;
        path::assign_in(&mut self.variables, path.segments(), value)
    }

    /// Applies variable writes produced by a node.
    ///
    /// Keys are dotted paths; each value replaces whatever the path held
    /// while sibling keys along the way are kept.
    pub fn assign_variables(&mut self, updates: Map<String, Value>) -> Result<(), PathError> {
        for (key, value) in updates {
            self.set(&key, value)?;
        }
        Ok(())
    }

    /// Stores a node output under the node id and, if given, its alias.
    pub fn merge(&mut self, node_id: &NodeId, alias: Option<&str>, output: Value) {
        if let Some(alias) = alias.filter(|a| !a.is_empty() && *a != node_id.as_str()) {
            self.data.insert(alias.to_owned(), output.clone());
        }
        self.data.insert(node_id.as_str().to_owned(), output);
    }

    /// Returns the stored output of a node.
    pub fn output(&self, node_id: &NodeId) -> Option<&Value> {
        self.data.get(node_id.as_str())
    }
}
