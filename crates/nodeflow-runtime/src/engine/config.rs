//! Engine configuration.

use std::time::Duration;

use derive_builder::Builder;

use crate::context::ExecutionEnvironment;

/// Configuration for the workflow execution engine.
#[derive(Debug, Clone, Builder)]
#[builder(
    pattern = "owned",
    setter(into, strip_option, prefix = "with"),
    build_fn(validate = "Self::validate")
)]
pub struct EngineConfig {
    /// Maximum number of concurrent workflow executions.
    #[builder(default = "10")]
    pub max_concurrent_runs: usize,

    /// Maximum number of nodes running at once within one execution.
    #[builder(default = "8")]
    pub max_parallel_nodes: usize,

    /// Wall-clock limit of a whole execution.
    #[builder(default)]
    pub execution_timeout: Option<Duration>,

    /// Per-attempt timeout for nodes that declare none.
    #[builder(default)]
    pub default_node_timeout: Option<Duration>,

    /// Upper bound on iterations of any single loop.
    #[builder(default = "1000")]
    pub max_loop_iterations: u64,

    /// Environment recorded in the execution metadata.
    #[builder(default)]
    pub environment: ExecutionEnvironment,
}

impl EngineConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_runs == Some(0) {
            return Err("max_concurrent_runs must be at least 1".into());
        }
        if self.max_parallel_nodes == Some(0) {
            return Err("max_parallel_nodes must be at least 1".into());
        }
        if self.max_loop_iterations == Some(0) {
            return Err("max_loop_iterations must be at least 1".into());
        }
        if let Some(Some(timeout)) = self.execution_timeout
            && timeout.is_zero()
        {
            return Err("execution_timeout must be greater than zero".into());
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 10,
            max_parallel_nodes: 8,
            execution_timeout: None,
            default_node_timeout: None,
            max_loop_iterations: 1000,
            environment: ExecutionEnvironment::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_match_default() {
        let built = EngineConfigBuilder::default().build().unwrap();
        let default = EngineConfig::default();

        assert_eq!(built.max_concurrent_runs, default.max_concurrent_runs);
        assert_eq!(built.max_parallel_nodes, default.max_parallel_nodes);
        assert_eq!(built.max_loop_iterations, default.max_loop_iterations);
        assert_eq!(built.execution_timeout, None);
    }

    #[test]
    fn test_builder_setters() {
        let config = EngineConfigBuilder::default()
            .with_max_parallel_nodes(2usize)
            .with_execution_timeout(Duration::from_secs(30))
            .with_environment(ExecutionEnvironment::Production)
            .build()
            .unwrap();

        assert_eq!(config.max_parallel_nodes, 2);
        assert_eq!(config.execution_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.environment, ExecutionEnvironment::Production);
    }

    #[test]
    fn test_builder_rejects_zero_limits() {
        assert!(
            EngineConfigBuilder::default()
                .with_max_concurrent_runs(0usize)
                .build()
                .is_err()
        );
        assert!(
            EngineConfigBuilder::default()
                .with_max_loop_iterations(0u64)
                .build()
                .is_err()
        );
    }
}
