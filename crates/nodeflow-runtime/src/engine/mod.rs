//! Workflow execution engine.
//!
//! This module provides the runtime for executing workflows:
//! - [`Engine`]: validates definitions and runs them
//! - [`EngineConfig`]: concurrency limits, timeouts and loop bounds
//! - [`ExecutionEvent`]: progress events published while runs execute
//!
//! Each run schedules its nodes as tokio tasks. A node becomes ready once
//! all of its forward incoming edges are resolved and at least one of them
//! was taken; failures skip everything downstream of the failing node while
//! independent branches keep running.

mod config;
mod dispatch;
mod event;
mod executor;
mod frontier;
mod retry;
mod scheduler;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use event::ExecutionEvent;
pub use executor::Engine;

/// Tracing target for engine operations.
pub const TRACING_TARGET: &str = "nodeflow_runtime::engine";
