//! Trigger definitions and the events that start a run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

use super::Extra;
use super::node::NodeId;

/// Kind of event that starts a workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TriggerType {
    Webhook,
    Schedule,
    #[default]
    Manual,
    Event,
}

/// A trigger declared on a workflow.
///
/// Recognized `config` keys:
/// - `nodeId` / `nodeIds`: pin the entry nodes of runs started by this trigger
/// - `service`: only accept events from this webhook service
/// - `events`: only accept these event names (`*` accepts any)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub config: Extra,
    #[serde(default, alias = "is_active")]
    pub is_active: bool,
}

impl TriggerConfig {
    /// Creates an active trigger without configuration.
    pub fn new(id: impl Into<String>, trigger_type: TriggerType) -> Self {
        Self {
            id: id.into(),
            trigger_type,
            config: Extra::new(),
            is_active: true,
        }
    }

    /// Creates an active manual trigger.
    pub fn manual(id: impl Into<String>) -> Self {
        Self::new(id, TriggerType::Manual)
    }

    /// Creates an active webhook trigger.
    pub fn webhook(id: impl Into<String>) -> Self {
        Self::new(id, TriggerType::Webhook)
    }

    /// Sets a configuration key.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Pins the entry nodes of runs started by this trigger.
    #[must_use]
    pub fn with_entry_nodes<I, N>(self, nodes: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NodeId>,
    {
        let ids: Vec<Value> = nodes
            .into_iter()
            .map(|id| {
                let id: NodeId = id.into();
                Value::String(id.into())
            })
            .collect();
        self.with_config("nodeIds", ids)
    }

    /// Marks the trigger inactive.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Returns the pinned entry nodes, if the trigger declares any.
    pub fn entry_nodes(&self) -> Option<Vec<NodeId>> {
        let mut ids = Vec::new();
        if let Some(Value::String(id)) = self.config.get("nodeId") {
            ids.push(NodeId::from(id.as_str()));
        }
        if let Some(Value::Array(values)) = self.config.get("nodeIds") {
            ids.extend(
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(NodeId::from),
            );
        }

        (!ids.is_empty()).then_some(ids)
    }

    /// Returns whether this trigger accepts the event.
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        if !self.is_active || self.trigger_type != event.trigger_type {
            return false;
        }

        if event.trigger_id.as_ref().is_some_and(|id| id != &self.id) {
            return false;
        }

        if let Some(Value::String(service)) = self.config.get("service") {
            let accepted = event
                .service
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case(service));
            if !accepted {
                return false;
            }
        }

        if let Some(Value::Array(events)) = self.config.get("events") {
            let names: Vec<&str> = events.iter().filter_map(Value::as_str).collect();
            if !names.is_empty() {
                let accepted = names.contains(&"*")
                    || event
                        .event
                        .as_deref()
                        .is_some_and(|name| names.contains(&name));
                if !accepted {
                    return false;
                }
            }
        }

        true
    }
}

/// Trigger data handed to a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    /// Restricts the event to a single declared trigger.
    #[serde(default, alias = "trigger_id", skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<String>,
    #[serde(rename = "type", default)]
    pub trigger_type: TriggerType,
    /// Originating webhook service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Event name reported by the originating service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

impl TriggerEvent {
    /// Creates an event of the given type carrying the payload.
    pub fn new(trigger_type: TriggerType, payload: Value) -> Self {
        Self {
            trigger_type,
            payload,
            ..Self::default()
        }
    }

    /// Creates a manual invocation.
    pub fn manual(payload: Value) -> Self {
        Self::new(TriggerType::Manual, payload)
    }

    /// Creates a webhook delivery from the given service.
    pub fn webhook(service: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
        Self {
            service: Some(service.into()),
            event: Some(event.into()),
            ..Self::new(TriggerType::Webhook, payload)
        }
    }

    /// Restricts the event to the trigger with the given id.
    #[must_use]
    pub fn for_trigger(mut self, id: impl Into<String>) -> Self {
        self.trigger_id = Some(id.into());
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_trigger_matches_type_and_activity() {
        let trigger = TriggerConfig::manual("t1");
        assert!(trigger.matches(&TriggerEvent::manual(json!({}))));
        assert!(!trigger.matches(&TriggerEvent::new(TriggerType::Schedule, json!({}))));
        assert!(!trigger.clone().inactive().matches(&TriggerEvent::manual(json!({}))));
    }

    #[test]
    fn test_trigger_matches_trigger_id() {
        let trigger = TriggerConfig::manual("t1");
        assert!(trigger.matches(&TriggerEvent::manual(json!({})).for_trigger("t1")));
        assert!(!trigger.matches(&TriggerEvent::manual(json!({})).for_trigger("t2")));
    }

    #[test]
    fn test_trigger_filters_webhook_service_and_events() {
        let trigger = TriggerConfig::webhook("t1")
            .with_config("service", "Stripe")
            .with_config("events", json!(["charge.succeeded"]));

        assert!(trigger.matches(&TriggerEvent::webhook("stripe", "charge.succeeded", json!({}))));
        assert!(!trigger.matches(&TriggerEvent::webhook("github", "charge.succeeded", json!({}))));
        assert!(!trigger.matches(&TriggerEvent::webhook("stripe", "charge.failed", json!({}))));

        let wildcard = TriggerConfig::webhook("t2").with_config("events", json!(["*"]));
        assert!(wildcard.matches(&TriggerEvent::webhook("github", "push", json!({}))));
    }

    #[test]
    fn test_trigger_entry_nodes() {
        assert_eq!(TriggerConfig::manual("t1").entry_nodes(), None);

        let single = TriggerConfig::manual("t1").with_config("nodeId", "a");
        assert_eq!(single.entry_nodes(), Some(vec![NodeId::from("a")]));

        let many = TriggerConfig::manual("t1").with_entry_nodes(["a", "b"]);
        assert_eq!(
            many.entry_nodes(),
            Some(vec![NodeId::from("a"), NodeId::from("b")])
        );
    }
}
