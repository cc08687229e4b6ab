//! Persistence interface for definitions and execution history.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::definition::{Workflow, WorkflowId};
use crate::error::{WorkflowError, WorkflowResult};
use crate::execution::{ExecutionId, ExecutionResult};

/// Loads workflow definitions and records execution results.
#[async_trait::async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Loads a workflow definition.
    async fn load_workflow(&self, id: &WorkflowId) -> WorkflowResult<Workflow>;

    /// Persists a finished execution result.
    async fn save_execution_result(&self, result: &ExecutionResult) -> WorkflowResult<()>;
}

#[derive(Debug, Default)]
struct MemoryState {
    workflows: HashMap<WorkflowId, Workflow>,
    results: HashMap<ExecutionId, ExecutionResult>,
}

/// In-memory [`WorkflowStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a workflow definition.
    pub async fn insert_workflow(&self, workflow: Workflow) {
        let mut state = self.inner.write().await;
        state.workflows.insert(workflow.id.clone(), workflow);
    }

    /// Returns a stored execution result.
    pub async fn execution_result(&self, id: &ExecutionId) -> Option<ExecutionResult> {
        self.inner.read().await.results.get(id).cloned()
    }

    /// Returns all stored results of a workflow.
    pub async fn execution_results(&self, workflow_id: &WorkflowId) -> Vec<ExecutionResult> {
        let state = self.inner.read().await;
        let mut results: Vec<_> = state
            .results
            .values()
            .filter(|r| &r.workflow_id == workflow_id)
            .cloned()
            .collect();
        results.sort_by_key(|r| r.execution_id);
        results
    }
}

#[async_trait::async_trait]
impl WorkflowStore for MemoryStore {
    async fn load_workflow(&self, id: &WorkflowId) -> WorkflowResult<Workflow> {
        self.inner
            .read()
            .await
            .workflows
            .get(id)
            .cloned()
            .ok_or_else(|| WorkflowError::WorkflowNotFound(id.clone()))
    }

    async fn save_execution_result(&self, result: &ExecutionResult) -> WorkflowResult<()> {
        if !result.is_terminal() {
            return Err(WorkflowError::Storage(format!(
                "execution {} has not finished",
                result.execution_id
            )));
        }

        let mut state = self.inner.write().await;
        state.results.insert(result.execution_id, result.clone());
        Ok(())
    }
}
