//! Engine limits configuration.

use std::time::Duration;

use anyhow::Context;
use clap::Args;
use nodeflow_runtime::context::ExecutionEnvironment;
use nodeflow_runtime::engine::{EngineConfig, EngineConfigBuilder};
use serde::{Deserialize, Serialize};

use crate::TRACING_TARGET_CONFIG;

/// Execution engine configuration.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct EngineArgs {
    /// Maximum number of workflow executions running at once
    #[arg(long, env = "NODEFLOW_MAX_CONCURRENT_RUNS", default_value = "10")]
    pub max_concurrent_runs: usize,

    /// Maximum number of nodes running at once within an execution
    #[arg(long, env = "NODEFLOW_MAX_PARALLEL_NODES", default_value = "8")]
    pub max_parallel_nodes: usize,

    /// Wall-clock limit of an execution in seconds
    #[arg(long, env = "NODEFLOW_EXECUTION_TIMEOUT")]
    pub execution_timeout_secs: Option<u64>,

    /// Per-attempt timeout in milliseconds for nodes that declare none
    #[arg(long, env = "NODEFLOW_NODE_TIMEOUT")]
    pub node_timeout_ms: Option<u64>,

    /// Upper bound on iterations of a single loop
    #[arg(long, env = "NODEFLOW_MAX_LOOP_ITERATIONS", default_value = "1000")]
    pub max_loop_iterations: u64,

    /// Environment recorded in the execution metadata
    #[arg(long, env = "NODEFLOW_ENVIRONMENT", default_value = "development")]
    pub environment: ExecutionEnvironment,
}

impl EngineArgs {
    /// Builds the engine configuration, rejecting out-of-range limits.
    pub fn to_config(&self) -> anyhow::Result<EngineConfig> {
        let mut builder = EngineConfigBuilder::default()
            .with_max_concurrent_runs(self.max_concurrent_runs)
            .with_max_parallel_nodes(self.max_parallel_nodes)
            .with_max_loop_iterations(self.max_loop_iterations)
            .with_environment(self.environment);

        if let Some(secs) = self.execution_timeout_secs {
            builder = builder.with_execution_timeout(Duration::from_secs(secs));
        }
        if let Some(ms) = self.node_timeout_ms {
            builder = builder.with_default_node_timeout(Duration::from_millis(ms));
        }

        builder.build().context("invalid engine configuration")
    }

    /// Logs the engine configuration.
    pub fn log(&self) {
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            max_concurrent_runs = self.max_concurrent_runs,
            max_parallel_nodes = self.max_parallel_nodes,
            execution_timeout_secs = ?self.execution_timeout_secs,
            node_timeout_ms = ?self.node_timeout_ms,
            max_loop_iterations = self.max_loop_iterations,
            environment = %self.environment,
            "Engine configuration"
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[clap(flatten)]
        engine: EngineArgs,
    }

    #[test]
    fn test_defaults() {
        let harness = Harness::try_parse_from(["nodeflow"]).unwrap();
        let config = harness.engine.to_config().unwrap();
        assert_eq!(config.max_concurrent_runs, 10);
        assert_eq!(config.max_parallel_nodes, 8);
        assert_eq!(config.execution_timeout, None);
        assert_eq!(config.environment, ExecutionEnvironment::Development);
    }

    #[test]
    fn test_overrides() {
        let harness = Harness::try_parse_from([
            "nodeflow",
            "--max-parallel-nodes",
            "2",
            "--execution-timeout-secs",
            "30",
            "--node-timeout-ms",
            "1500",
            "--environment",
            "production",
        ])
        .unwrap();

        let config = harness.engine.to_config().unwrap();
        assert_eq!(config.max_parallel_nodes, 2);
        assert_eq!(config.execution_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.default_node_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.environment, ExecutionEnvironment::Production);
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        let harness =
            Harness::try_parse_from(["nodeflow", "--max-concurrent-runs", "0"]).unwrap();
        assert!(harness.engine.to_config().is_err());
    }
}
