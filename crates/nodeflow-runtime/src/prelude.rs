//! Prelude module for convenient imports.
//!
//! This module re-exports commonly used types for ergonomic imports:
//!
//! ```rust
//! use nodeflow_runtime::prelude::*;
//! ```

pub use crate::context::{ExecutionContext, Lookup, NodeContext};
pub use crate::definition::{
    Edge, Node, NodeId, NodeKind, NodeType, RetryConfig, TriggerConfig, TriggerEvent,
    TriggerType, Workflow, WorkflowId, WorkflowStatus,
};
pub use crate::engine::{Engine, EngineConfig, EngineConfigBuilder, ExecutionEvent};
pub use crate::error::{WorkflowError, WorkflowResult};
pub use crate::execution::{
    ErrorType, ExecutionError, ExecutionId, ExecutionResult, ExecutionStatus, NodeError,
    NodeErrorType, NodeResult, NodeStatus,
};
pub use crate::graph::WorkflowGraph;
pub use crate::provider::{
    Clock, MemoryStore, NetworkError, NetworkErrorKind, NetworkExecutor, NetworkRequest,
    NetworkResponse, NoNetwork, TokioClock, WorkflowStore,
};
pub use crate::registry::{NodeBehavior, NodeOutput, NodeRegistry, Route};
pub use crate::validation::{ValidationResult, Validator};
