use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::definition::{AuthConfig, Extra};

/// Service a webhook node receives deliveries from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum WebhookService {
    Stripe,
    Typeform,
    Twilio,
    Github,
}

/// Payload of a `webhook` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<WebhookService>,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub authentication: AuthConfig,
    #[serde(default, alias = "event_types")]
    pub event_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default = "default_active", alias = "is_active")]
    pub is_active: bool,
    #[serde(flatten)]
    pub extra: Extra,
}

fn default_active() -> bool {
    true
}

impl WebhookData {
    /// Creates an active webhook payload for the given service and endpoint.
    pub fn new(service: WebhookService, endpoint: impl Into<String>) -> Self {
        Self {
            service: Some(service),
            endpoint: endpoint.into(),
            authentication: AuthConfig::default(),
            event_types: Vec::new(),
            secret: None,
            is_active: true,
            extra: Extra::new(),
        }
    }

    /// Restricts accepted deliveries to the given event names.
    #[must_use]
    pub fn with_event_types<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_types = events.into_iter().map(Into::into).collect();
        self
    }

    /// Returns whether a delivery of the given event is accepted.
    pub fn accepts_event(&self, event: Option<&str>) -> bool {
        if self.event_types.is_empty() {
            return true;
        }

        match event {
            Some(name) => self.event_types.iter().any(|t| t == "*" || t == name),
            None => false,
        }
    }
}
