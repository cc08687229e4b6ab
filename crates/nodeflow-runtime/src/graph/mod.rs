//! Compiled workflow graph.
//!
//! A [`WorkflowGraph`] is the petgraph form of a [`Workflow`] definition with
//! every edge classified by the role it plays during scheduling:
//! - [`EdgeRole::Forward`]: ordinary data flow
//! - [`EdgeRole::LoopBody`]: from a loop node into its body
//! - [`EdgeRole::LoopExit`]: from a loop node to what follows it
//! - [`EdgeRole::LoopBack`]: from a loop body back into its loop node
//!
//! Any edge leaving a loop node without a body handle is an exit. An edge
//! returning into a loop from that loop's body closes the loop; besides the
//! back-edges this includes the exit of a nested loop leading into its outer
//! loop. Edges closing a loop are the only cycles a valid workflow may
//! contain.
//!
//! [`Workflow`]: crate::definition::Workflow

mod workflow;

pub use workflow::{EdgeInfo, EdgeRole, WorkflowGraph};

/// Tracing target for graph operations.
pub const TRACING_TARGET: &str = "nodeflow_runtime::graph";

/// Handles selecting the body of a loop node.
pub const LOOP_BODY_HANDLES: &[&str] = &["body", "loop"];

/// Handle followed when at least one condition matched.
pub const TRUE_HANDLE: &str = "true";

/// Handle followed when no condition matched.
pub const FALSE_HANDLE: &str = "false";
