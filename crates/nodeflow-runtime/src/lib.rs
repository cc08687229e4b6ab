#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod context;
pub mod definition;
pub mod engine;
mod error;
pub mod execution;
pub mod graph;
pub mod provider;
pub mod registry;
pub mod validation;

#[doc(hidden)]
pub mod prelude;

pub use error::{WorkflowError, WorkflowResult};

/// Tracing target for runtime operations.
pub const TRACING_TARGET: &str = "nodeflow_runtime";
