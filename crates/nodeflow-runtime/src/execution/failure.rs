//! Node-level and run-level failures.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::definition::{NodeId, NodeType};
use crate::validation::ValidationIssue;

/// Category of a run-level failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorType {
    ValidationError,
    #[default]
    RuntimeError,
    NetworkError,
    AuthenticationError,
    TimeoutError,
    ConfigurationError,
    DataTransformationError,
    WorkflowError,
}

/// Kind of failure of a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeErrorType {
    InvalidConfiguration,
    MissingRequiredField,
    ApiRequestFailed,
    WebhookProcessingFailed,
    ConditionEvaluationFailed,
    DataTransformationFailed,
    TimerExecutionFailed,
    LoopExecutionFailed,
}

impl NodeErrorType {
    /// Category assigned when the failing code does not pick one.
    pub const fn default_category(self) -> ErrorType {
        match self {
            Self::InvalidConfiguration | Self::MissingRequiredField => {
                ErrorType::ConfigurationError
            }
            Self::ApiRequestFailed => ErrorType::NetworkError,
            Self::DataTransformationFailed => ErrorType::DataTransformationError,
            Self::WebhookProcessingFailed
            | Self::ConditionEvaluationFailed
            | Self::TimerExecutionFailed
            | Self::LoopExecutionFailed => ErrorType::RuntimeError,
        }
    }

    /// Failure kind reported for an execution failure of the given node type.
    pub fn for_node_type(node_type: &NodeType) -> Self {
        match node_type {
            NodeType::Webhook => Self::WebhookProcessingFailed,
            NodeType::ApiCall => Self::ApiRequestFailed,
            NodeType::Condition => Self::ConditionEvaluationFailed,
            NodeType::Timer => Self::TimerExecutionFailed,
            NodeType::DataTransform => Self::DataTransformationFailed,
            NodeType::Loop => Self::LoopExecutionFailed,
            NodeType::Custom(_) => Self::InvalidConfiguration,
        }
    }
}

/// Failure of a single node attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{kind}: {message}")]
pub struct NodeError {
    #[serde(rename = "type")]
    pub kind: NodeErrorType,
    /// Category used by retry matching and run-level reporting.
    #[serde(default)]
    pub category: ErrorType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl NodeError {
    /// Creates an error with the default category of `kind`.
    pub fn new(kind: NodeErrorType, message: impl Into<String>) -> Self {
        Self {
            kind,
            category: kind.default_category(),
            message: message.into(),
            details: None,
            timestamp: Timestamp::now(),
            stack: None,
        }
    }

    /// Creates a timeout failure of a node of the given type.
    pub fn timeout(node_type: &NodeType, millis: u128) -> Self {
        Self::new(
            NodeErrorType::for_node_type(node_type),
            format!("node timed out after {millis}ms"),
        )
        .with_category(ErrorType::TimeoutError)
    }

    /// Creates a failure for a missing configuration value.
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            NodeErrorType::MissingRequiredField,
            format!("required field `{field}` is missing"),
        )
    }

    /// Overrides the category.
    #[must_use]
    pub fn with_category(mut self, category: ErrorType) -> Self {
        self.category = category;
        self
    }

    /// Attaches structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attaches an HTTP status code to the details.
    #[must_use]
    pub fn with_status_code(mut self, status_code: u16) -> Self {
        match &mut self.details {
            Some(Value::Object(map)) => {
                map.insert("statusCode".to_owned(), json!(status_code));
            }
            _ => self.details = Some(json!({ "statusCode": status_code })),
        }
        self
    }

    /// Returns the HTTP status code carried in the details, if any.
    pub fn status_code(&self) -> Option<u16> {
        self.details
            .as_ref()?
            .get("statusCode")?
            .as_u64()
            .and_then(|code| u16::try_from(code).ok())
    }

    /// Returns whether the failure is a timeout.
    pub fn is_timeout(&self) -> bool {
        self.category == ErrorType::TimeoutError
    }

    /// Returns whether the failure stems from the definition itself and
    /// would fail again on every attempt.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self.category,
            ErrorType::ConfigurationError | ErrorType::ValidationError
        )
    }

    /// Returns whether the failure is likely to go away on its own.
    pub fn is_transient(&self) -> bool {
        match self.status_code() {
            Some(code) => code == 408 || code == 429 || code >= 500,
            None => matches!(
                self.category,
                ErrorType::NetworkError | ErrorType::TimeoutError
            ),
        }
    }
}

/// Run-level failure recorded on an [`ExecutionResult`].
///
/// [`ExecutionResult`]: super::ExecutionResult
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionError {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ErrorType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, alias = "node_id", skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ExecutionError {
    /// Creates an error of the given category.
    pub fn new(kind: ErrorType, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            kind,
            message: message.into(),
            details: None,
            node_id: None,
            timestamp: Timestamp::now(),
            stack: None,
        }
    }

    /// Associates the error with a node.
    #[must_use]
    pub fn with_node(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }

    /// Attaches structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Lifts a terminal node failure to the run level.
    pub fn from_node_error(node_id: &NodeId, error: &NodeError) -> Self {
        let mut details = json!({ "nodeErrorType": error.kind });
        if let (Value::Object(map), Some(Value::Object(extra))) = (&mut details, &error.details) {
            map.extend(extra.clone());
        }

        Self {
            id: Uuid::now_v7().to_string(),
            kind: error.category,
            message: error.message.clone(),
            details: Some(details),
            node_id: Some(node_id.clone()),
            timestamp: error.timestamp,
            stack: error.stack.clone(),
        }
    }
}

impl From<&ValidationIssue> for ExecutionError {
    fn from(issue: &ValidationIssue) -> Self {
        let mut error = Self::new(ErrorType::ValidationError, issue.message.clone())
            .with_details(json!({
                "validationType": issue.kind,
                "field": issue.field,
            }));
        error.node_id = issue.node_id.clone();
        error
    }
}

impl From<&crate::WorkflowError> for ExecutionError {
    fn from(error: &crate::WorkflowError) -> Self {
        Self::new(error.error_type(), error.to_string())
    }
}
