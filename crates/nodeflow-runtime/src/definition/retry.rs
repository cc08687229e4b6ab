//! Retry policy definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BackoffStrategy {
    Linear,
    #[default]
    Exponential,
    Fixed,
}

/// Kind of failure a retry condition matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RetryConditionType {
    StatusCode,
    ErrorType,
    Timeout,
}

/// A single retry condition.
///
/// The interpretation of `value` depends on the condition type; see
/// [`crate::engine::retry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryCondition {
    #[serde(rename = "type")]
    pub condition_type: RetryConditionType,
    #[serde(default)]
    pub value: Value,
}

impl RetryCondition {
    /// Creates a condition of the given type and value.
    pub fn new(condition_type: RetryConditionType, value: impl Into<Value>) -> Self {
        Self {
            condition_type,
            value: value.into(),
        }
    }
}

/// Bounded retry policy of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Total number of attempts, including the first one.
    #[serde(default = "default_max_attempts", alias = "max_attempts")]
    pub max_attempts: u32,
    #[serde(default, alias = "backoff_strategy")]
    pub backoff_strategy: BackoffStrategy,
    /// Base delay in milliseconds.
    #[serde(default = "default_base_delay", alias = "base_delay")]
    pub base_delay: u64,
    /// Upper bound of any single delay in milliseconds.
    #[serde(default = "default_max_delay", alias = "max_delay")]
    pub max_delay: u64,
    #[serde(default, alias = "retry_conditions")]
    pub retry_conditions: Vec<RetryCondition>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_attempts: default_max_attempts(),
            backoff_strategy: BackoffStrategy::default(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            retry_conditions: Vec::new(),
        }
    }

    /// An enabled policy with the given strategy and bounds.
    pub fn new(
        backoff_strategy: BackoffStrategy,
        max_attempts: u32,
        base_delay: u64,
        max_delay: u64,
    ) -> Self {
        Self {
            enabled: true,
            max_attempts,
            backoff_strategy,
            base_delay,
            max_delay,
            retry_conditions: Vec::new(),
        }
    }

    /// An enabled exponential policy.
    pub fn exponential(max_attempts: u32, base_delay: u64, max_delay: u64) -> Self {
        Self::new(BackoffStrategy::Exponential, max_attempts, base_delay, max_delay)
    }

    /// An enabled linear policy.
    pub fn linear(max_attempts: u32, base_delay: u64, max_delay: u64) -> Self {
        Self::new(BackoffStrategy::Linear, max_attempts, base_delay, max_delay)
    }

    /// An enabled fixed-delay policy.
    pub fn fixed(max_attempts: u32, delay: u64) -> Self {
        Self::new(BackoffStrategy::Fixed, max_attempts, delay, delay)
    }

    /// Adds a retry condition.
    #[must_use]
    pub fn with_condition(mut self, condition: RetryCondition) -> Self {
        self.retry_conditions.push(condition);
        self
    }
}
