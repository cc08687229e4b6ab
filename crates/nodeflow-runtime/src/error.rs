//! Workflow error types.

use thiserror::Error;

use crate::definition::{NodeId, NodeType, TriggerType, WorkflowId};
use crate::execution::ErrorType;

/// Result type for workflow operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Errors that can occur during workflow operations.
///
/// Failures of individual nodes never surface here; they are recorded on the
/// [`ExecutionResult`](crate::execution::ExecutionResult) instead.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Workflow definition is invalid.
    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(String),

    /// No behavior is registered for a node type.
    #[error("no behavior registered for node type `{0}`")]
    UnknownNodeType(NodeType),

    /// No active trigger accepts the invocation.
    #[error("no active {trigger_type} trigger of workflow {workflow_id} matches the invocation")]
    NoMatchingTrigger {
        /// Workflow that was invoked.
        workflow_id: WorkflowId,
        /// Type of the invocation.
        trigger_type: TriggerType,
    },

    /// A matching trigger resolved to no entry nodes.
    #[error("trigger {0} has no entry nodes")]
    NoEntryNodes(String),

    /// Workflow is not in a runnable status.
    #[error("workflow {0} is not runnable in its current status")]
    NotRunnable(WorkflowId),

    /// Graph contains a cycle outside of a loop body.
    #[error("circular dependency detected at node {0}")]
    CircularDependency(NodeId),

    /// Workflow definition could not be found.
    #[error("workflow {0} not found")]
    WorkflowNotFound(WorkflowId),

    /// Workflow execution was cancelled.
    #[error("workflow execution cancelled")]
    Cancelled,

    /// Workflow execution timed out.
    #[error("workflow execution timed out")]
    Timeout,

    /// Storage operation failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    /// Category used when the error is reported on an execution result.
    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::InvalidDefinition(_) | Self::CircularDependency(_) => ErrorType::ValidationError,
            Self::UnknownNodeType(_) => ErrorType::ConfigurationError,
            Self::NoMatchingTrigger { .. }
            | Self::NoEntryNodes(_)
            | Self::NotRunnable(_)
            | Self::WorkflowNotFound(_)
            | Self::Cancelled => ErrorType::WorkflowError,
            Self::Timeout => ErrorType::TimeoutError,
            Self::Serialization(_) => ErrorType::DataTransformationError,
            Self::Storage(_) | Self::Internal(_) => ErrorType::RuntimeError,
        }
    }
}
