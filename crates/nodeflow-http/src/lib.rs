#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod auth;
mod client;
mod config;
mod error;

pub use client::ReqwestExecutor;
pub use config::{DEFAULT_TIMEOUT_SECS, ReqwestConfig};
pub use error::{Error, Result};

/// Tracing target for outbound HTTP calls.
pub const TRACING_TARGET: &str = "nodeflow_http";
