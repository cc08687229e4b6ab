//! Type-specific node payloads.
//!
//! Every payload keeps the keys it does not recognize in an `extra` map so
//! that editor-only settings survive a round trip through the engine.

mod api_call;
mod condition;
mod iteration;
mod timer;
mod transform;
mod webhook;

pub use api_call::{ApiCallData, HttpMethod};
pub use condition::{ComparisonOperator, Condition, ConditionData, ConditionType};
pub use iteration::{LoopData, LoopType};
pub use timer::{TimeUnit, TimerData, TimerType};
pub use transform::{
    FieldMapping, Schema, SchemaType, Transformation, TransformationType, TransformData,
};
pub use webhook::{WebhookData, WebhookService};

use super::Extra;

/// Payload of a node whose type has no built-in schema.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomNode {
    /// Declared type name.
    pub node_type: String,
    /// Raw `data` object, minus `label` and `description`.
    pub data: Extra,
}

impl CustomNode {
    /// Creates a custom payload.
    pub fn new(node_type: impl Into<String>, data: Extra) -> Self {
        Self {
            node_type: node_type.into(),
            data,
        }
    }
}
