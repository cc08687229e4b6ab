//! Shared, lock-protected context of a running execution.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{ExecutionContext, Lookup, PathError};
use crate::definition::NodeId;

/// Async handle to the [`ExecutionContext`] of one run.
///
/// Cloning the store shares the underlying context. Readers that need a
/// consistent view for the duration of a node call [`snapshot`].
///
/// [`snapshot`]: ContextStore::snapshot
#[derive(Debug, Clone)]
pub struct ContextStore {
    inner: Arc<RwLock<ExecutionContext>>,
}

impl ContextStore {
    /// Wraps a context.
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            inner: Arc::new(RwLock::new(context)),
        }
    }

    /// Resolves a path.
    pub async fn get(&self, path: &str) -> Lookup {
        self.inner.read().await.get(path)
    }

    /// Writes a variable.
    pub async fn set(&self, key: &str, value: Value) -> Result<(), PathError> {
        self.inner.write().await.set(key, value)
    }

    /// Stores a node output under its id and alias.
    pub async fn merge(&self, node_id: &NodeId, alias: Option<&str>, output: Value) {
        self.inner.write().await.merge(node_id, alias, output);
    }

    /// Applies variable writes keyed by dotted path.
    pub async fn assign_variables(&self, updates: Map<String, Value>) -> Result<(), PathError> {
        if updates.is_empty() {
            return Ok(());
        }
        self.inner.write().await.assign_variables(updates)
    }

    /// Records the node currently being dispatched.
    pub async fn set_current_node(&self, node_id: &NodeId) {
        self.inner.write().await.current_node_id = Some(node_id.clone());
    }

    /// Returns the stored output of a node.
    pub async fn output(&self, node_id: &NodeId) -> Option<Value> {
        self.inner.read().await.output(node_id).cloned()
    }

    /// Takes an immutable copy of the current state.
    pub async fn snapshot(&self) -> Arc<ExecutionContext> {
        Arc::new(self.inner.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::context::tests::context;

    #[tokio::test]
    async fn test_store_merge_and_get() {
        let store = ContextStore::new(context(json!({ "n": 1 })));
        store.merge(&NodeId::from("a"), None, json!({ "v": 2 })).await;
        store.set("flag", json!(true)).await.unwrap();

        assert_eq!(store.get("a.v").await, Lookup::Present(json!(2)));
        assert_eq!(store.get("vars.flag").await, Lookup::Present(json!(true)));
        assert_eq!(store.output(&NodeId::from("a")).await, Some(json!({ "v": 2 })));
    }

    #[tokio::test]
    async fn test_snapshot_is_isolated_from_later_writes() {
        let store = ContextStore::new(context(Value::Null));
        let snapshot = store.snapshot().await;
        store.merge(&NodeId::from("a"), None, json!(1)).await;

        assert_eq!(snapshot.get("a"), Lookup::Absent);
        assert_eq!(store.get("a").await, Lookup::Present(json!(1)));
    }
}
