// MIT License - Copyright (c) 2026 envisalink-bridge contributors

use bitflags::bitflags;
use serde::Serialize;

use crate::protocol::TpiMessage;

bitflags! {
    /// Zone status flags accumulated from `601`-`610` messages.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ZoneStatusFlags: u8 {
        /// 609 / 610 - Zone open
        const OPEN   = 0b0001;
        /// 601 / 602 - Zone in alarm
        const ALARM  = 0b0010;
        /// 603 / 604 - Tamper detected
        const TAMPER = 0b0100;
        /// 605 / 606 - Zone fault
        const FAULT  = 0b1000;
    }
}

/// What happened to a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneEvent {
    Alarm,
    AlarmRestore,
    Tamper,
    TamperRestore,
    Fault,
    FaultRestore,
    Open,
    Restored,
}

impl ZoneEvent {
    /// Decode a zone event from its TPI code.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            601 => Some(Self::Alarm),
            602 => Some(Self::AlarmRestore),
            603 => Some(Self::Tamper),
            604 => Some(Self::TamperRestore),
            605 => Some(Self::Fault),
            606 => Some(Self::FaultRestore),
            609 => Some(Self::Open),
            610 => Some(Self::Restored),
            _ => None,
        }
    }

    /// Whether the message data is prefixed with a partition digit.
    fn has_partition(&self) -> bool {
        matches!(
            self,
            Self::Alarm | Self::AlarmRestore | Self::Tamper | Self::TamperRestore
        )
    }

    /// Apply this event to a set of flags.
    pub fn apply(&self, status: ZoneStatusFlags) -> ZoneStatusFlags {
        match self {
            Self::Alarm => status | ZoneStatusFlags::ALARM,
            Self::AlarmRestore => status - ZoneStatusFlags::ALARM,
            Self::Tamper => status | ZoneStatusFlags::TAMPER,
            Self::TamperRestore => status - ZoneStatusFlags::TAMPER,
            Self::Fault => status | ZoneStatusFlags::FAULT,
            Self::FaultRestore => status - ZoneStatusFlags::FAULT,
            Self::Open => status | ZoneStatusFlags::OPEN,
            Self::Restored => status - ZoneStatusFlags::OPEN,
        }
    }
}

/// Flattened zone status for serialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ZoneState {
    pub open: bool,
    pub alarm: bool,
    pub tamper: bool,
    pub fault: bool,
}

impl From<ZoneStatusFlags> for ZoneState {
    fn from(flags: ZoneStatusFlags) -> Self {
        Self {
            open: flags.contains(ZoneStatusFlags::OPEN),
            alarm: flags.contains(ZoneStatusFlags::ALARM),
            tamper: flags.contains(ZoneStatusFlags::TAMPER),
            fault: flags.contains(ZoneStatusFlags::FAULT),
        }
    }
}

/// A zone update as delivered to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneUpdate {
    pub zone: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition: Option<u8>,
    pub code: u16,
    pub event: ZoneEvent,
    pub status: ZoneState,
    /// First update for this zone since the connection was established.
    pub initial_update: bool,
}

/// A single alarm zone as last reported by the panel.
#[derive(Debug, Clone)]
pub struct Zone {
    pub id: u16,
    pub status: ZoneStatusFlags,
}

impl Zone {
    pub fn new(id: u16) -> Self {
        Self {
            id,
            status: ZoneStatusFlags::empty(),
        }
    }

    /// Update status from an event. Returns the changed flags.
    pub fn update_status(&mut self, event: ZoneEvent) -> ZoneStatusFlags {
        let new_status = event.apply(self.status);
        let changed = self.status ^ new_status;
        self.status = new_status;
        changed
    }

    pub fn is_open(&self) -> bool { self.status.contains(ZoneStatusFlags::OPEN) }
    pub fn is_alarm(&self) -> bool { self.status.contains(ZoneStatusFlags::ALARM) }
    pub fn is_tamper(&self) -> bool { self.status.contains(ZoneStatusFlags::TAMPER) }
    pub fn is_fault(&self) -> bool { self.status.contains(ZoneStatusFlags::FAULT) }
}

/// Parse a zone message into `(zone, partition, event)`.
///
/// Alarm and tamper messages carry `PZZZ` (partition digit + zone); the
/// others carry just `ZZZ`.
pub fn parse_zone_message(msg: &TpiMessage) -> Option<(u16, Option<u8>, ZoneEvent)> {
    let event = ZoneEvent::from_code(msg.code)?;
    let data = msg.data.as_str();
    if event.has_partition() {
        if data.len() < 4 {
            return None;
        }
        let partition = data[..1].parse::<u8>().ok()?;
        let zone = data[1..4].parse::<u16>().ok()?;
        Some((zone, Some(partition), event))
    } else {
        if data.len() < 3 {
            return None;
        }
        let zone = data[..3].parse::<u16>().ok()?;
        Some((zone, None, event))
    }
}
