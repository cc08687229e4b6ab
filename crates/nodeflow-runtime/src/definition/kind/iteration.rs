use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use super::condition::Condition;
use crate::definition::Extra;

/// Iteration mode of a loop node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LoopType {
    /// Runs the body a fixed number of times.
    For,
    /// Runs the body while a condition holds.
    While,
    /// Runs the body once per element of an array.
    ForEach,
}

/// Payload of a `loop` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopData {
    #[serde(default, alias = "loop_type", skip_serializing_if = "Option::is_none")]
    pub loop_type: Option<LoopType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, alias = "array_path", skip_serializing_if = "Option::is_none")]
    pub array_path: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl LoopData {
    fn new(loop_type: LoopType) -> Self {
        Self {
            loop_type: Some(loop_type),
            iterations: None,
            condition: None,
            array_path: None,
            extra: Extra::new(),
        }
    }

    /// Creates a counted loop.
    pub fn counted(iterations: u64) -> Self {
        Self {
            iterations: Some(iterations),
            ..Self::new(LoopType::For)
        }
    }

    /// Creates a loop over the array at the given context path.
    pub fn for_each(array_path: impl Into<String>) -> Self {
        Self {
            array_path: Some(array_path.into()),
            ..Self::new(LoopType::ForEach)
        }
    }

    /// Creates a loop that runs while the condition holds.
    pub fn repeat_while(condition: Condition) -> Self {
        Self {
            condition: Some(condition),
            ..Self::new(LoopType::While)
        }
    }

    /// Returns the declared loop type, or the one implied by the fields set.
    pub fn resolved_type(&self) -> Option<LoopType> {
        self.loop_type.or(if self.array_path.is_some() {
            Some(LoopType::ForEach)
        } else if self.condition.is_some() {
            Some(LoopType::While)
        } else if self.iterations.is_some() {
            Some(LoopType::For)
        } else {
            None
        })
    }
}
