//! Pre-execution workflow validation.
//!
//! The [`Validator`] inspects a [`Workflow`] without running it and reports
//! problems as [`ValidationIssue`]s, split into errors (which block a run)
//! and warnings.
//!
//! [`Workflow`]: crate::definition::Workflow

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::definition::NodeId;

mod validator;

pub use validator::Validator;

/// Tracing target for validation.
pub const TRACING_TARGET: &str = "nodeflow_runtime::validation";

/// Category of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValidationType {
    RequiredFieldMissing,
    InvalidFormat,
    InvalidType,
    CircularDependency,
    OrphanedNode,
    InvalidConnection,
    ConfigurationConflict,
}

/// A single problem found in a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    #[serde(rename = "type")]
    pub kind: ValidationType,
    pub message: String,
    #[serde(default, alias = "node_id", skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Issue reported as an error.
pub type ValidationError = ValidationIssue;

/// Issue reported as a warning.
pub type ValidationWarning = ValidationIssue;

impl ValidationIssue {
    /// Creates an issue not tied to a node.
    pub fn new(kind: ValidationType, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            node_id: None,
            field: None,
        }
    }

    /// Associates the issue with a node.
    #[must_use]
    pub fn for_node(mut self, node_id: &NodeId) -> Self {
        self.node_id = Some(node_id.clone());
        self
    }

    /// Names the offending field.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Outcome of validating a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl ValidationResult {
    /// Records an error, invalidating the result.
    pub fn error(&mut self, issue: ValidationIssue) {
        self.is_valid = false;
        self.errors.push(issue);
    }

    /// Records a warning.
    pub fn warning(&mut self, issue: ValidationIssue) {
        self.warnings.push(issue);
    }

    /// Returns whether any error of the given kind was recorded.
    pub fn has_error(&self, kind: ValidationType) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }

    /// Returns whether any warning of the given kind was recorded.
    pub fn has_warning(&self, kind: ValidationType) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}
