// MIT License - Copyright (c) 2026 envisalink-bridge contributors
// Consumers that bridge the shared connection to a message flow

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{BridgeError, Result};
use crate::event::{ConsumerStatus, DeviceUpdate};
use crate::mux::{Consumer, ConsumerId, MuxHandle};
use crate::protocol::{Command, PanicType};

/// A message travelling through the downstream flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownstreamMessage {
    pub topic: String,
    pub payload: Value,
}

/// What an adapter hands to the flow it is attached to.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterOutput {
    Status(ConsumerStatus),
    Message(DownstreamMessage),
}

pub type AdapterReceiver = mpsc::UnboundedReceiver<AdapterOutput>;

/// Emits live device updates downstream.
///
/// Updates flagged `initial_update` describe the state the panel was already
/// in when the connection came up and are not forwarded.
pub struct InputAdapter {
    id: ConsumerId,
    tx: mpsc::UnboundedSender<AdapterOutput>,
}

impl InputAdapter {
    pub fn new(id: impl Into<ConsumerId>) -> (Arc<Self>, AdapterReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let adapter = Arc::new(Self { id: id.into(), tx });
        (adapter, rx)
    }
}

impl Consumer for InputAdapter {
    fn id(&self) -> &ConsumerId {
        &self.id
    }

    fn status(&self, status: ConsumerStatus) {
        let _ = self.tx.send(AdapterOutput::Status(status));
    }

    fn update(&self, update: &DeviceUpdate) {
        if update.is_initial() {
            trace!("{}: skipping initial {}", self.id, update.kind().topic());
            return;
        }
        let message = DownstreamMessage {
            topic: update.kind().topic().to_string(),
            payload: update.to_payload(),
        };
        let _ = self.tx.send(AdapterOutput::Message(message));
    }
}

/// Turns inbound downstream messages into panel commands.
///
/// A payload is either a raw command string (`"0301"`, code then data, no
/// checksum) or an object naming the operation:
///
/// ```json
/// { "op": "disarm", "partition": 1, "code": "1234" }
/// ```
///
/// Accepted messages are passed on unchanged.
pub struct OutputAdapter {
    id: ConsumerId,
    mux: MuxHandle,
    tx: mpsc::UnboundedSender<AdapterOutput>,
}

impl OutputAdapter {
    pub fn new(id: impl Into<ConsumerId>, mux: MuxHandle) -> (Arc<Self>, AdapterReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let adapter = Arc::new(Self {
            id: id.into(),
            mux,
            tx,
        });
        (adapter, rx)
    }

    /// Send the command carried by `message` and pass the message on.
    pub fn handle_input(&self, message: DownstreamMessage) -> Result<()> {
        let command = parse_command(&message.payload)?;
        debug!("{}: sending command {}", self.id, command.code());
        self.mux.send_command(command)?;
        self.tx
            .send(AdapterOutput::Message(message))
            .map_err(|_| BridgeError::ChannelClosed)
    }
}

impl Consumer for OutputAdapter {
    fn id(&self) -> &ConsumerId {
        &self.id
    }

    fn status(&self, status: ConsumerStatus) {
        let _ = self.tx.send(AdapterOutput::Status(status));
    }

    fn update(&self, _update: &DeviceUpdate) {}
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum CommandRequest {
    Poll,
    StatusReport,
    DumpZoneTimers,
    CommandOutput { partition: u8, output: u8 },
    ArmAway { partition: u8 },
    ArmStay { partition: u8 },
    ArmZeroEntry { partition: u8 },
    ArmWithCode { partition: u8, code: String },
    Disarm { partition: u8, code: String },
    Panic { kind: PanicType },
    KeySequence { partition: u8, keys: String },
    SendCode { code: String },
    Raw { command: String },
}

/// Decode a command from a downstream payload.
pub fn parse_command(payload: &Value) -> Result<Command> {
    if let Value::String(raw) = payload {
        return Command::from_raw(raw);
    }

    let request: CommandRequest =
        serde_json::from_value(payload.clone()).map_err(|e| BridgeError::InvalidMessage {
            details: format!("unrecognised command payload: {}", e),
        })?;

    let command = match request {
        CommandRequest::Poll => Command::Poll,
        CommandRequest::StatusReport => Command::StatusReport,
        CommandRequest::DumpZoneTimers => Command::DumpZoneTimers,
        CommandRequest::CommandOutput { partition, output } => {
            Command::CommandOutput { partition, output }
        }
        CommandRequest::ArmAway { partition } => Command::ArmAway { partition },
        CommandRequest::ArmStay { partition } => Command::ArmStay { partition },
        CommandRequest::ArmZeroEntry { partition } => Command::ArmZeroEntry { partition },
        CommandRequest::ArmWithCode { partition, code } => Command::ArmWithCode { partition, code },
        CommandRequest::Disarm { partition, code } => Command::Disarm { partition, code },
        CommandRequest::Panic { kind } => Command::Panic { kind },
        CommandRequest::KeySequence { partition, keys } => Command::KeySequence { partition, keys },
        CommandRequest::SendCode { code } => Command::SendCode { code },
        CommandRequest::Raw { command } => Command::from_raw(&command)?,
    };
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::devices::zone::ZoneState;
    use crate::devices::{ZoneEvent, ZoneStatusFlags, ZoneUpdate};

    fn zone_update(initial: bool) -> DeviceUpdate {
        DeviceUpdate::Zone(ZoneUpdate {
            zone: 12,
            partition: None,
            code: 609,
            event: ZoneEvent::Open,
            status: ZoneState::from(ZoneStatusFlags::OPEN),
            initial_update: initial,
        })
    }

    #[test]
    fn test_input_adapter_skips_initial_updates() {
        let (adapter, mut rx) = InputAdapter::new("in");
        adapter.update(&zone_update(true));
        adapter.update(&zone_update(false));

        match rx.try_recv().unwrap() {
            AdapterOutput::Message(msg) => {
                assert_eq!(msg.topic, "zone event");
                assert_eq!(msg.payload["zone"], 12);
                assert!(msg.payload.get("initialUpdate").is_none());
            }
            other => panic!("unexpected output {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_input_adapter_forwards_status() {
        let (adapter, mut rx) = InputAdapter::new("in");
        adapter.status(ConsumerStatus::Connected);
        assert_eq!(
            rx.try_recv().unwrap(),
            AdapterOutput::Status(ConsumerStatus::Connected)
        );
    }

    #[test]
    fn test_parse_raw_string() {
        let command = parse_command(&json!("0301")).unwrap();
        assert_eq!(command.to_wire_string(), "0301C4\r\n");
    }

    #[test]
    fn test_parse_op_objects() {
        let command = parse_command(&json!({"op": "disarm", "partition": 1, "code": "1234"})).unwrap();
        assert_eq!(
            command,
            Command::Disarm {
                partition: 1,
                code: "1234".to_string()
            }
        );

        let command = parse_command(&json!({"op": "panic", "kind": "fire"})).unwrap();
        assert_eq!(command, Command::Panic { kind: PanicType::Fire });

        let command = parse_command(&json!({"op": "raw", "command": "0301"})).unwrap();
        assert_eq!(command.code(), "030");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_command(&json!("hello")).is_err());
        assert!(parse_command(&json!({"op": "self_destruct"})).is_err());
        assert!(parse_command(&json!({"op": "arm_away"})).is_err());
        assert!(parse_command(&json!(42)).is_err());
    }
}
