//! Node definition types.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use derive_more::{Debug, Display, From, Into};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::Extra;
use super::kind::{
    ApiCallData, ConditionData, CustomNode, LoopData, TimerData, TransformData, WebhookData,
};
use super::retry::RetryConfig;

/// Unique identifier for a node in a workflow graph.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Debug, Display, From, Into)]
#[debug("{_0}")]
#[display("{_0}")]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Returns the identifier as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Declared type of a node.
///
/// The six built-in kinds have dedicated payloads; any other type string is
/// kept verbatim so behaviors registered at runtime can execute it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum NodeType {
    Webhook,
    ApiCall,
    Condition,
    Timer,
    DataTransform,
    Loop,
    Custom(String),
}

impl NodeType {
    /// Returns the wire name of the node type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Webhook => "webhook",
            Self::ApiCall => "api_call",
            Self::Condition => "condition",
            Self::Timer => "timer",
            Self::DataTransform => "data_transform",
            Self::Loop => "loop",
            Self::Custom(name) => name,
        }
    }

    /// Returns whether this is one of the built-in node types.
    pub fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "webhook" => Self::Webhook,
            "api_call" => Self::ApiCall,
            "condition" => Self::Condition,
            "timer" => Self::Timer,
            "data_transform" => Self::DataTransform,
            "loop" => Self::Loop,
            other => Self::Custom(other.to_owned()),
        })
    }
}

impl From<&str> for NodeType {
    fn from(value: &str) -> Self {
        match value.parse() {
            Ok(node_type) => node_type,
            Err(infallible) => match infallible {},
        }
    }
}

impl Serialize for NodeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from(name.as_str()))
    }
}

/// Canvas position of a node. Ignored by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Engine-facing node configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    /// Editor-side validity flag.
    #[serde(default, alias = "is_valid", skip_serializing_if = "Option::is_none")]
    pub is_valid: Option<bool>,
    /// Editor-side validation messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Failures of an optional node do not fail the run.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    /// Additional name the node output is stored under in the context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Per-attempt timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Retry policy applied to the node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Type-specific payload of a node.
#[derive(Debug, Clone, PartialEq, From)]
pub enum NodeKind {
    Webhook(WebhookData),
    ApiCall(ApiCallData),
    Condition(ConditionData),
    Timer(TimerData),
    DataTransform(TransformData),
    Loop(LoopData),
    Custom(CustomNode),
}

impl NodeKind {
    /// Returns the declared node type of this payload.
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Webhook(_) => NodeType::Webhook,
            Self::ApiCall(_) => NodeType::ApiCall,
            Self::Condition(_) => NodeType::Condition,
            Self::Timer(_) => NodeType::Timer,
            Self::DataTransform(_) => NodeType::DataTransform,
            Self::Loop(_) => NodeType::Loop,
            Self::Custom(custom) => NodeType::Custom(custom.node_type.clone()),
        }
    }

    fn from_parts(node_type: NodeType, data: Extra) -> serde_json::Result<Self> {
        let payload = |data: Extra| Value::Object(data);
        Ok(match node_type {
            NodeType::Webhook => Self::Webhook(serde_json::from_value(payload(data))?),
            NodeType::ApiCall => Self::ApiCall(serde_json::from_value(payload(data))?),
            NodeType::Condition => Self::Condition(serde_json::from_value(payload(data))?),
            NodeType::Timer => Self::Timer(serde_json::from_value(payload(data))?),
            NodeType::DataTransform => {
                Self::DataTransform(serde_json::from_value(payload(data))?)
            }
            NodeType::Loop => Self::Loop(serde_json::from_value(payload(data))?),
            NodeType::Custom(node_type) => Self::Custom(CustomNode { node_type, data }),
        })
    }

    fn into_data(self) -> Extra {
        let value = match self {
            Self::Webhook(data) => serde_json::to_value(data),
            Self::ApiCall(data) => serde_json::to_value(data),
            Self::Condition(data) => serde_json::to_value(data),
            Self::Timer(data) => serde_json::to_value(data),
            Self::DataTransform(data) => serde_json::to_value(data),
            Self::Loop(data) => serde_json::to_value(data),
            Self::Custom(custom) => return custom.data,
        };

        match value {
            Ok(Value::Object(map)) => map,
            _ => Extra::new(),
        }
    }
}

/// A workflow node definition.
///
/// On the wire, `label` and `description` live inside `data` next to the
/// type-specific payload; they are lifted out here so every kind shares them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNode", into = "RawNode")]
pub struct Node {
    /// Unique identifier within the workflow.
    pub id: NodeId,
    /// Canvas position.
    pub position: Position,
    /// Display label.
    pub label: Option<String>,
    /// Display description.
    pub description: Option<String>,
    /// Type-specific payload.
    pub kind: NodeKind,
    /// Engine-facing configuration.
    pub config: NodeConfig,
    /// Unrecognized top-level keys.
    pub extra: Extra,
}

impl Node {
    /// Creates a node with default position and configuration.
    pub fn new(id: impl Into<NodeId>, kind: impl Into<NodeKind>) -> Self {
        Self {
            id: id.into(),
            position: Position::default(),
            label: None,
            description: None,
            kind: kind.into(),
            config: NodeConfig::default(),
            extra: Extra::new(),
        }
    }

    /// Sets the display label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the engine-facing configuration.
    #[must_use]
    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Marks the node as optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.config.optional = true;
        self
    }

    /// Sets the per-attempt timeout in milliseconds.
    #[must_use]
    pub fn with_timeout(mut self, millis: u64) -> Self {
        self.config.timeout = Some(millis);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = Some(retry);
        self
    }

    /// Returns the declared node type.
    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    /// Returns the retry policy in effect for this node.
    ///
    /// The node-level `config.retry` takes precedence over the ApiCall
    /// payload's `retryConfig`.
    pub fn retry_config(&self) -> Option<&RetryConfig> {
        if let Some(retry) = &self.config.retry {
            return Some(retry);
        }

        match &self.kind {
            NodeKind::ApiCall(data) => Some(&data.retry_config),
            _ => None,
        }
    }

    /// Returns the per-attempt timeout in milliseconds, if any.
    pub fn timeout_ms(&self) -> Option<u64> {
        self.config.timeout.or(match &self.kind {
            NodeKind::ApiCall(data) => data.timeout,
            _ => None,
        })
    }

    /// Returns whether this node is a loop.
    pub fn is_loop(&self) -> bool {
        matches!(self.kind, NodeKind::Loop(_))
    }
}

/// Wire representation of a node.
#[derive(Serialize, Deserialize)]
struct RawNode {
    id: NodeId,
    #[serde(rename = "type")]
    node_type: NodeType,
    #[serde(default)]
    position: Position,
    #[serde(default)]
    data: Extra,
    #[serde(default)]
    config: NodeConfig,
    #[serde(flatten)]
    extra: Extra,
}

fn take_string(data: &mut Extra, key: &str) -> Option<String> {
    match data.remove(key) {
        Some(Value::String(value)) => Some(value),
        Some(other) => {
            data.insert(key.to_owned(), other);
            None
        }
        None => None,
    }
}

impl TryFrom<RawNode> for Node {
    type Error = serde_json::Error;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        let mut data = raw.data;
        let label = take_string(&mut data, "label");
        let description = take_string(&mut data, "description");
        let kind = NodeKind::from_parts(raw.node_type, data)?;

        Ok(Self {
            id: raw.id,
            position: raw.position,
            label,
            description,
            kind,
            config: raw.config,
            extra: raw.extra,
        })
    }
}

impl From<Node> for RawNode {
    fn from(node: Node) -> Self {
        let node_type = node.kind.node_type();
        let mut data = node.kind.into_data();
        if let Some(label) = node.label {
            data.insert("label".to_owned(), Value::String(label));
        }
        if let Some(description) = node.description {
            data.insert("description".to_owned(), Value::String(description));
        }

        Self {
            id: node.id,
            node_type,
            position: node.position,
            data,
            config: node.config,
            extra: node.extra,
        }
    }
}
