// MIT License - Copyright (c) 2026 envisalink-bridge contributors

use serde::Serialize;

use crate::devices::{PartitionUpdate, SystemUpdate, ZoneUpdate};

/// Severity of a diagnostic message emitted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Warn,
    Error,
}

/// Every event a [`ConnectionEngine`](crate::engine::ConnectionEngine) can emit.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Session established and logged in
    Connected,
    /// Connection-level failure. Not fatal; a `Disconnect` follows unless
    /// the engine re-establishes the session on its own.
    Error(String),
    /// The session has ended. Emitted exactly once per started session.
    Disconnect,
    /// Diagnostic text
    Log(LogLevel, String),
    /// Device state change
    Update(DeviceUpdate),
}

/// Category tag for a fanned-out device update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Zone,
    Partition,
    System,
}

impl UpdateKind {
    /// The downstream topic used for live updates of this kind.
    pub fn topic(&self) -> &'static str {
        match self {
            UpdateKind::Zone => "zone event",
            UpdateKind::Partition => "partition event",
            UpdateKind::System => "system event",
        }
    }
}

/// A device update payload, tagged with its category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DeviceUpdate {
    Zone(ZoneUpdate),
    Partition(PartitionUpdate),
    System(SystemUpdate),
}

impl DeviceUpdate {
    pub fn kind(&self) -> UpdateKind {
        match self {
            DeviceUpdate::Zone(_) => UpdateKind::Zone,
            DeviceUpdate::Partition(_) => UpdateKind::Partition,
            DeviceUpdate::System(_) => UpdateKind::System,
        }
    }

    /// Whether this is part of the state snapshot taken right after connecting.
    pub fn is_initial(&self) -> bool {
        match self {
            DeviceUpdate::Zone(u) => u.initial_update,
            DeviceUpdate::Partition(u) => u.initial_update,
            DeviceUpdate::System(u) => u.initial_update,
        }
    }

    /// The payload as JSON without the `initialUpdate` marker.
    pub fn to_payload(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(obj) = value.as_object_mut() {
            obj.remove("initialUpdate");
        }
        value
    }
}

/// Connection status pushed to each registered consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerStatus {
    Connecting,
    Connected,
    Disconnected,
}

impl ConsumerStatus {
    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            ConsumerStatus::Connecting => "Connecting...",
            ConsumerStatus::Connected => "Connected",
            ConsumerStatus::Disconnected => "Disconnected",
        }
    }

    /// Indicator colour for a status display.
    pub fn fill(&self) -> &'static str {
        match self {
            ConsumerStatus::Connecting => "orange",
            ConsumerStatus::Connected => "green",
            ConsumerStatus::Disconnected => "red",
        }
    }

    /// Indicator shape for a status display.
    pub fn shape(&self) -> &'static str {
        match self {
            ConsumerStatus::Connected => "dot",
            ConsumerStatus::Connecting | ConsumerStatus::Disconnected => "ring",
        }
    }
}

/// Sending half used by engines to report events.
pub type EventSender = tokio::sync::mpsc::UnboundedSender<EngineEvent>;

/// Receiving half of an engine's event stream.
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<EngineEvent>;

/// Create a new engine event channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{ZoneEvent, ZoneStatusFlags};

    fn zone_update(initial: bool) -> DeviceUpdate {
        DeviceUpdate::Zone(ZoneUpdate {
            zone: 7,
            partition: Some(1),
            code: 601,
            event: ZoneEvent::Alarm,
            status: ZoneStatusFlags::ALARM.into(),
            initial_update: initial,
        })
    }

    #[test]
    fn test_payload_strips_initial_marker() {
        let update = zone_update(true);
        assert!(update.is_initial());
        assert_eq!(update.kind(), UpdateKind::Zone);

        let payload = update.to_payload();
        assert_eq!(payload["zone"], 7);
        assert_eq!(payload["partition"], 1);
        assert!(payload.get("initialUpdate").is_none());
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(ConsumerStatus::Connecting.label(), "Connecting...");
        assert_eq!(ConsumerStatus::Connected.fill(), "green");
        assert_eq!(ConsumerStatus::Disconnected.shape(), "ring");
    }

    #[test]
    fn test_kind_topics() {
        assert_eq!(UpdateKind::Zone.topic(), "zone event");
        assert_eq!(UpdateKind::System.topic(), "system event");
    }
}
