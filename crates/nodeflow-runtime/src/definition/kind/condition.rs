use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

use crate::definition::Extra;

/// Branch selection mode of a condition node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConditionType {
    /// First matching condition wins.
    #[default]
    IfElse,
    /// Every matching condition is followed.
    Switch,
}

/// Comparison applied by a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComparisonOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotEmpty,
}

impl ComparisonOperator {
    /// Returns whether the operator compares against `value`.
    pub const fn takes_value(self) -> bool {
        !matches!(self, Self::IsEmpty | Self::IsNotEmpty)
    }
}

/// A single comparison.
///
/// The compared value is read from `path.field` when `path` is set, or from
/// `field` alone otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub field: String,
    pub operator: ComparisonOperator,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Condition {
    /// Creates a condition reading `field`.
    pub fn new(
        id: impl Into<String>,
        field: impl Into<String>,
        operator: ComparisonOperator,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            id: id.into(),
            field: field.into(),
            operator,
            value: value.into(),
            path: String::new(),
            extra: Extra::new(),
        }
    }

    /// Sets the path prefix.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Returns the context path of the compared value, if any.
    pub fn target_path(&self) -> Option<String> {
        match (self.path.is_empty(), self.field.is_empty()) {
            (true, true) => None,
            (true, false) => Some(self.field.clone()),
            (false, true) => Some(self.path.clone()),
            (false, false) => Some(format!("{}.{}", self.path, self.field)),
        }
    }
}

/// Payload of a `condition` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionData {
    #[serde(default, alias = "condition_type")]
    pub condition_type: ConditionType,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, alias = "default_path", skip_serializing_if = "Option::is_none")]
    pub default_path: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl ConditionData {
    /// Creates an `if_else` payload.
    pub fn if_else(conditions: Vec<Condition>) -> Self {
        Self::new(ConditionType::IfElse, conditions)
    }

    /// Creates a `switch` payload.
    pub fn switch(conditions: Vec<Condition>) -> Self {
        Self::new(ConditionType::Switch, conditions)
    }

    fn new(condition_type: ConditionType, conditions: Vec<Condition>) -> Self {
        Self {
            condition_type,
            conditions,
            default_path: None,
            extra: Extra::new(),
        }
    }

    /// Sets the handle followed when no condition matches.
    #[must_use]
    pub fn with_default_path(mut self, handle: impl Into<String>) -> Self {
        self.default_path = Some(handle.into());
        self
    }

    /// Returns the default path handle, treating an empty string as absent.
    pub fn default_handle(&self) -> Option<&str> {
        self.default_path.as_deref().filter(|h| !h.is_empty())
    }
}
