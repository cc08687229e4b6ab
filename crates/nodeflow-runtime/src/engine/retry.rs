//! Bounded retry with backoff.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::TRACING_TARGET;
use crate::definition::{BackoffStrategy, RetryCondition, RetryConditionType, RetryConfig};
use crate::execution::NodeError;
use crate::provider::Clock;

impl RetryConfig {
    /// Delay before the attempt following failed attempt number `attempt`
    /// (starting at 1), clamped to `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let millis = match self.backoff_strategy {
            BackoffStrategy::Linear => self.base_delay.saturating_mul(u64::from(attempt)),
            BackoffStrategy::Exponential => {
                let factor = 2u64.checked_pow(attempt - 1).unwrap_or(u64::MAX);
                self.base_delay.saturating_mul(factor)
            }
            BackoffStrategy::Fixed => self.base_delay,
        };
        Duration::from_millis(millis.min(self.max_delay))
    }

    /// Returns whether another attempt should follow failed attempt number
    /// `attempts`.
    ///
    /// The failure must match at least one declared condition, so a config
    /// without conditions never retries. Permanent failures are never
    /// retried.
    pub fn should_retry(&self, error: &NodeError, attempts: u32) -> bool {
        if !self.enabled || attempts >= self.max_attempts || error.is_permanent() {
            return false;
        }

        self.retry_conditions.iter().any(|c| c.matches(error))
    }
}

impl RetryCondition {
    /// Returns whether the failure satisfies this condition.
    ///
    /// - `status_code`: a code, a list of codes, a class such as `"5xx"`, or
    ///   `null` for any HTTP status
    /// - `error_type`: a node error type or category name, or a list of them
    /// - `timeout`: any timeout unless the value is `false`
    pub fn matches(&self, error: &NodeError) -> bool {
        match self.condition_type {
            RetryConditionType::StatusCode => status_matches(&self.value, error.status_code()),
            RetryConditionType::ErrorType => type_matches(&self.value, error),
            RetryConditionType::Timeout => error.is_timeout() && self.value != Value::Bool(false),
        }
    }
}

fn status_matches(expected: &Value, status: Option<u16>) -> bool {
    let Some(status) = status else {
        return false;
    };

    match expected {
        Value::Null => true,
        Value::Number(n) => n.as_u64() == Some(u64::from(status)),
        Value::Array(values) => values.iter().any(|v| status_matches(v, Some(status))),
        Value::String(s) => {
            let s = s.trim().to_ascii_lowercase();
            match s.strip_suffix("xx").and_then(|d| d.parse::<u16>().ok()) {
                Some(class) if s.len() == 3 => status / 100 == class,
                _ => s.parse::<u16>().is_ok_and(|code| code == status),
            }
        }
        _ => false,
    }
}

fn type_matches(expected: &Value, error: &NodeError) -> bool {
    match expected {
        Value::String(s) => s == error.kind.as_ref() || s == error.category.as_ref(),
        Value::Array(values) => values.iter().any(|v| type_matches(v, error)),
        _ => false,
    }
}

/// Final result of a retried operation.
#[derive(Debug)]
pub(crate) struct RetryOutcome<T> {
    pub result: Result<T, NodeError>,
    /// Number of attempts made, at least 1.
    pub attempts: u32,
}

/// Runs attempts of a node until one succeeds or retrying stops.
#[derive(Clone)]
pub(crate) struct Retrier {
    clock: Arc<dyn Clock>,
}

impl Retrier {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Runs `attempt` (called with the 1-based attempt number) under the
    /// policy. `on_retry` is called before each backoff with the failed
    /// attempt number, its error and the delay. A cancellation observed
    /// during a backoff stops further attempts.
    pub async fn run<T, F, Fut, R>(
        &self,
        config: Option<&RetryConfig>,
        cancel: &CancellationToken,
        mut attempt: F,
        mut on_retry: R,
    ) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, NodeError>>,
        R: FnMut(u32, &NodeError, Duration),
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let error = match attempt(attempts).await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts,
                    };
                }
                Err(error) => error,
            };

            let Some(config) = config.filter(|c| c.should_retry(&error, attempts)) else {
                return RetryOutcome {
                    result: Err(error),
                    attempts,
                };
            };

            let backoff = config.delay_for(attempts);
            tracing::debug!(
                target: TRACING_TARGET,
                attempt = attempts,
                max_attempts = config.max_attempts,
                backoff_ms = backoff.as_millis() as u64,
                error = %error,
                "Retrying node after backoff"
            );
            on_retry(attempts, &error, backoff);

            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!(
                        target: TRACING_TARGET,
                        attempt = attempts,
                        "Cancelled during backoff"
                    );
                    return RetryOutcome {
                        result: Err(error),
                        attempts,
                    };
                }
                () = self.clock.sleep(backoff) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::json;

    use super::*;
    use crate::execution::{ErrorType, NodeErrorType};
    use crate::provider::TokioClock;

    fn api_error(status: u16) -> NodeError {
        NodeError::new(NodeErrorType::ApiRequestFailed, "request failed").with_status_code(status)
    }

    fn server_errors() -> RetryCondition {
        RetryCondition::new(RetryConditionType::StatusCode, "5xx")
    }

    #[test]
    fn test_exponential_delays_clamp() {
        let config = RetryConfig::exponential(10, 100, 2000);
        let delays: Vec<u64> = (1..=6)
            .map(|n| config.delay_for(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1600, 2000]);
        assert_eq!(config.delay_for(200), Duration::from_millis(2000));
    }

    #[test]
    fn test_linear_and_fixed_delays() {
        let linear = RetryConfig::linear(5, 250, 600);
        assert_eq!(linear.delay_for(1), Duration::from_millis(250));
        assert_eq!(linear.delay_for(2), Duration::from_millis(500));
        assert_eq!(linear.delay_for(3), Duration::from_millis(600));

        let fixed = RetryConfig::fixed(5, 300);
        assert_eq!(fixed.delay_for(4), Duration::from_millis(300));
    }

    #[test]
    fn test_should_retry_respects_bounds() {
        let config = RetryConfig::fixed(3, 10).with_condition(server_errors());
        assert!(config.should_retry(&api_error(503), 1));
        assert!(config.should_retry(&api_error(503), 2));
        assert!(!config.should_retry(&api_error(503), 3));
        assert!(!config.should_retry(&api_error(404), 1));
        assert!(!RetryConfig::disabled().should_retry(&api_error(503), 1));
        assert!(!config.should_retry(&NodeError::missing_field("url"), 1));
    }

    #[test]
    fn test_no_conditions_never_retries() {
        let config = RetryConfig::fixed(3, 10);
        assert!(!config.should_retry(&api_error(503), 1));
        assert!(!config.should_retry(&api_error(429), 1));

        let timed_out = NodeError::new(NodeErrorType::ApiRequestFailed, "slow")
            .with_category(ErrorType::TimeoutError);
        assert!(!config.should_retry(&timed_out, 1));
    }

    #[test]
    fn test_retry_conditions() {
        let status = RetryCondition::new(RetryConditionType::StatusCode, json!([429, "5xx"]));
        assert!(status.matches(&api_error(429)));
        assert!(status.matches(&api_error(502)));
        assert!(!status.matches(&api_error(404)));

        let any_status = RetryCondition::new(RetryConditionType::StatusCode, Value::Null);
        assert!(any_status.matches(&api_error(404)));

        let kind = RetryCondition::new(RetryConditionType::ErrorType, "network_error");
        assert!(kind.matches(&api_error(500)));
        let kind = RetryCondition::new(RetryConditionType::ErrorType, "api_request_failed");
        assert!(kind.matches(&api_error(500)));

        let timeout = RetryCondition::new(RetryConditionType::Timeout, true);
        let timed_out = NodeError::new(NodeErrorType::ApiRequestFailed, "slow")
            .with_category(ErrorType::TimeoutError);
        assert!(timeout.matches(&timed_out));
        assert!(!timeout.matches(&api_error(500)));

        let config = RetryConfig::fixed(3, 10)
            .with_condition(RetryCondition::new(RetryConditionType::StatusCode, 404));
        assert!(config.should_retry(&api_error(404), 1));
        assert!(!config.should_retry(&api_error(503), 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrier_recovers() {
        let retrier = Retrier::new(Arc::new(TokioClock));
        let config = RetryConfig::exponential(3, 100, 1000).with_condition(server_errors());
        let calls = AtomicU32::new(0);
        let mut delays = Vec::new();

        let outcome = retrier
            .run(
                Some(&config),
                &CancellationToken::new(),
                |_| {
                    let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        if call < 3 { Err(api_error(503)) } else { Ok(call) }
                    }
                },
                |_, _, delay| delays.push(delay),
            )
            .await;

        assert_eq!(outcome.result.unwrap(), 3);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(
            delays,
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrier_exhausts_with_last_error() {
        let retrier = Retrier::new(Arc::new(TokioClock));
        let config = RetryConfig::fixed(2, 50).with_condition(server_errors());

        let outcome = retrier
            .run(
                Some(&config),
                &CancellationToken::new(),
                |attempt| async move { Err::<(), _>(api_error(500 + attempt as u16)) },
                |_, _, _| {},
            )
            .await;

        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.result.unwrap_err().status_code(), Some(502));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_backoff() {
        let retrier = Retrier::new(Arc::new(TokioClock));
        let config = RetryConfig::fixed(5, 60_000).with_condition(server_errors());
        let cancel = CancellationToken::new();

        let outcome = retrier
            .run(
                Some(&config),
                &cancel,
                |_| async { Err::<(), _>(api_error(503)) },
                |_, _, _| cancel.cancel(),
            )
            .await;

        assert_eq!(outcome.attempts, 1);
        assert!(outcome.result.is_err());
    }
}
