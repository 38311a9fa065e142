// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the orchestration core, its collaborators, and runners.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// System-wide handle of a plugin configuration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ConfigurationId(pub u64);

impl fmt::Display for ConfigurationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a registered plugin.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PluginStatus {
    Stopped,
    Starting,
    Started,
    StartFailed,
    Stopping,
}

impl PluginStatus {
    /// Whether a START command may be accepted from this state.
    pub fn can_start(self) -> bool {
        self == PluginStatus::Stopped
    }

    /// Whether a STOP command may be accepted from this state.
    ///
    /// `StartFailed` counts as stopped-equivalent so a failed start can be
    /// cleaned up and retried.
    pub fn can_stop(self) -> bool {
        matches!(self, PluginStatus::Started | PluginStatus::StartFailed)
    }
}

/// Direction of an event flow between the host and a plugin.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowType {
    In,
    Out,
}

impl FlowType {
    /// Name prefix of the router serving this direction.
    pub fn router_prefix(self) -> &'static str {
        match self {
            FlowType::In => "in-router-",
            FlowType::Out => "out-router-",
        }
    }

    /// Directory name of the router serving this direction for a plugin.
    pub fn router_name(self, id: ConfigurationId) -> String {
        format!("{}{}", self.router_prefix(), id)
    }
}

/// Data-type tag carried by event messages and declared by runners.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataType(pub String);

impl DataType {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DataType {
    fn from(tag: &str) -> Self {
        Self(tag.to_string())
    }
}

/// Classification of an event message.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Broadcast to every started plugin compatible with the data type.
    #[default]
    Normal,
    /// Synthetic request to re-synchronize the referenced object.
    Resync,
    /// Targets exactly one plugin configuration.
    Addressed,
}

/// An event exchanged between the host and plugins.
///
/// Messages are transient: the core never persists them, it only routes them
/// to the routers of the matching plugins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub transaction_id: String,
    #[serde(default)]
    pub kind: MessageKind,
    pub data_type: DataType,
    /// Target plugin, only meaningful for [`MessageKind::Addressed`].
    #[serde(default)]
    pub configuration_id: Option<ConfigurationId>,
    #[serde(default)]
    pub internal_id: Option<i64>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

impl EventMessage {
    /// A broadcast message about an internal object.
    pub fn broadcast(data_type: impl Into<DataType>, internal_id: i64) -> Self {
        Self {
            transaction_id: uuid::Uuid::new_v4().to_string(),
            kind: MessageKind::Normal,
            data_type: data_type.into(),
            configuration_id: None,
            internal_id: Some(internal_id),
            external_id: None,
            payload: None,
        }
    }

    /// A message addressed to a single plugin configuration.
    pub fn addressed(target: ConfigurationId, data_type: impl Into<DataType>) -> Self {
        Self {
            transaction_id: uuid::Uuid::new_v4().to_string(),
            kind: MessageKind::Addressed,
            data_type: data_type.into(),
            configuration_id: Some(target),
            internal_id: None,
            external_id: None,
            payload: None,
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn is_addressed(&self) -> bool {
        self.kind == MessageKind::Addressed
    }

    /// Check the message is well-formed enough to be routed.
    pub fn validate(&self) -> Result<(), String> {
        if self.transaction_id.trim().is_empty() {
            return Err("transaction id must not be empty".to_string());
        }
        if self.data_type.as_str().trim().is_empty() {
            return Err(format!(
                "transaction {}: data type must not be empty",
                self.transaction_id
            ));
        }
        match self.kind {
            MessageKind::Addressed if self.configuration_id.is_none() => Err(format!(
                "transaction {}: addressed message without a target plugin",
                self.transaction_id
            )),
            MessageKind::Normal | MessageKind::Resync
                if self.internal_id.is_none() && self.external_id.is_none() =>
            {
                Err(format!(
                    "transaction {}: message does not reference any object",
                    self.transaction_id
                ))
            }
            _ => Ok(()),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.validate().is_ok()
    }

    /// Derive the resync request issued after a failed handling attempt.
    pub fn resync(&self) -> Self {
        Self {
            transaction_id: self.transaction_id.clone(),
            kind: MessageKind::Resync,
            data_type: self.data_type.clone(),
            configuration_id: self.configuration_id,
            internal_id: self.internal_id,
            external_id: self.external_id.clone(),
            payload: None,
        }
    }

    /// Short description used in audit entries.
    pub fn summary(&self) -> String {
        format!(
            "{} {} (internal={}, external={})",
            self.kind,
            self.data_type,
            self.internal_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.external_id.as_deref().unwrap_or("-"),
        )
    }
}

/// A plugin definition as recorded by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDefinition {
    pub identifier: String,
    /// Implementation reference supplied by the extension loader.
    pub implementation: String,
    pub is_available: bool,
}

/// A named, persisted instantiation of a plugin definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfiguration {
    pub id: ConfigurationId,
    pub name: String,
    pub definition: PluginDefinition,
    pub is_autostart: bool,
    pub is_available: bool,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// Category of a plugin log entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PluginLogKind {
    Start,
    Stop,
    EventHandling,
}

/// Append-only audit record about a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginLogEntry {
    pub id: String,
    pub configuration_id: ConfigurationId,
    pub kind: PluginLogKind,
    pub is_error: bool,
    pub message: String,
    pub transaction_id: Option<String>,
    pub message_kind: Option<MessageKind>,
    pub data_type: Option<DataType>,
    pub internal_id: Option<i64>,
    pub external_id: Option<String>,
    pub created_at: String,
}

impl PluginLogEntry {
    fn new(
        configuration_id: ConfigurationId,
        kind: PluginLogKind,
        is_error: bool,
        message: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            configuration_id,
            kind,
            is_error,
            message,
            transaction_id: None,
            message_kind: None,
            data_type: None,
            internal_id: None,
            external_id: None,
            created_at: chrono::Utc::now()
                .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                .to_string(),
        }
    }

    pub fn start(configuration_id: ConfigurationId, message: String, is_error: bool) -> Self {
        Self::new(configuration_id, PluginLogKind::Start, is_error, message)
    }

    pub fn stop(configuration_id: ConfigurationId, message: String, is_error: bool) -> Self {
        Self::new(configuration_id, PluginLogKind::Stop, is_error, message)
    }

    /// Failure while handling an event message.
    pub fn event_handling(
        configuration_id: ConfigurationId,
        event: &EventMessage,
        message: String,
    ) -> Self {
        Self {
            transaction_id: Some(event.transaction_id.clone()),
            message_kind: Some(event.kind),
            data_type: Some(event.data_type.clone()),
            internal_id: event.internal_id,
            external_id: event.external_id.clone(),
            ..Self::new(configuration_id, PluginLogKind::EventHandling, true, message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_guards() {
        assert!(PluginStatus::Stopped.can_start());
        assert!(!PluginStatus::StartFailed.can_start());
        assert!(PluginStatus::Started.can_stop());
        assert!(PluginStatus::StartFailed.can_stop());
        assert!(!PluginStatus::Stopping.can_stop());
        assert!(!PluginStatus::Stopped.can_stop());
    }

    #[test]
    fn status_display_and_parse() {
        assert_eq!(PluginStatus::StartFailed.to_string(), "START_FAILED");
        assert_eq!(
            PluginStatus::from_str("STOPPING").unwrap(),
            PluginStatus::Stopping
        );
    }

    #[test]
    fn router_names_follow_direction() {
        assert_eq!(FlowType::In.router_name(ConfigurationId(4)), "in-router-4");
        assert_eq!(FlowType::Out.router_name(ConfigurationId(4)), "out-router-4");
    }

    #[test]
    fn addressed_message_requires_target() {
        let mut msg = EventMessage::addressed(ConfigurationId(1), "actor");
        assert!(msg.is_consistent());
        msg.configuration_id = None;
        assert!(!msg.is_consistent());
    }

    #[test]
    fn broadcast_requires_object_reference() {
        let mut msg = EventMessage::broadcast("actor", 12);
        assert!(msg.is_consistent());
        msg.internal_id = None;
        assert!(!msg.is_consistent());
        msg.external_id = Some("EXT-1".into());
        assert!(msg.is_consistent());
    }

    #[test]
    fn empty_transaction_is_rejected() {
        let mut msg = EventMessage::broadcast("actor", 1);
        msg.transaction_id = " ".into();
        assert!(msg.validate().unwrap_err().contains("transaction id"));
    }

    #[test]
    fn resync_keeps_target_and_type() {
        let msg = EventMessage::broadcast("portfolio", 9)
            .with_payload(serde_json::json!({"name": "x"}));
        let resync = msg.resync();
        assert_eq!(resync.kind, MessageKind::Resync);
        assert_eq!(resync.transaction_id, msg.transaction_id);
        assert_eq!(resync.data_type, msg.data_type);
        assert_eq!(resync.configuration_id, msg.configuration_id);
        assert_eq!(resync.internal_id, Some(9));
        assert!(resync.payload.is_none());
        assert!(resync.is_consistent());
    }

    #[test]
    fn event_message_deserializes_with_defaults() {
        let msg: EventMessage = serde_json::from_str(
            r#"{"transaction_id":"t-1","data_type":"actor","internal_id":5}"#,
        )
        .unwrap();
        assert_eq!(msg.kind, MessageKind::Normal);
        assert!(msg.configuration_id.is_none());
        assert!(msg.is_consistent());
    }

    #[test]
    fn event_log_entry_copies_message_fields() {
        let msg = EventMessage::broadcast("actor", 3).with_external_id("A-3");
        let entry = PluginLogEntry::event_handling(ConfigurationId(2), &msg, "boom".into());
        assert_eq!(entry.kind, PluginLogKind::EventHandling);
        assert!(entry.is_error);
        assert_eq!(entry.transaction_id.as_deref(), Some(msg.transaction_id.as_str()));
        assert_eq!(entry.external_id.as_deref(), Some("A-3"));
        assert_eq!(entry.message_kind, Some(MessageKind::Normal));
    }
}
