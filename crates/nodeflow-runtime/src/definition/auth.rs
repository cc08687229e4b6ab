//! Authentication configuration consumed by the network executor.

use std::collections::HashMap;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Authentication scheme of an outbound call or inbound webhook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuthType {
    #[default]
    None,
    ApiKey,
    BearerToken,
    BasicAuth,
    #[serde(rename = "oauth2")]
    #[strum(serialize = "oauth2")]
    OAuth2,
}

/// Authentication settings.
///
/// The runtime never interprets credentials; they are handed as-is to the
/// configured network executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(rename = "type", default)]
    pub auth_type: AuthType,
    #[serde(default)]
    pub credentials: HashMap<String, String>,
    #[serde(default, alias = "refresh_token", skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, alias = "expires_at", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
    #[serde(default, alias = "is_valid", skip_serializing_if = "Option::is_none")]
    pub is_valid: Option<bool>,
}

impl AuthConfig {
    /// Creates a configuration of the given type with the given credentials.
    pub fn new<K, V>(auth_type: AuthType, credentials: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            auth_type,
            credentials: credentials
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            ..Self::default()
        }
    }

    /// Returns the first credential present under any of the given keys.
    pub fn credential(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|key| self.credentials.get(*key))
            .map(String::as_str)
    }

    /// Returns whether the token is known to be unusable.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.is_valid == Some(false) || self.expires_at.is_some_and(|at| at <= now)
    }
}
