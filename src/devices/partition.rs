// MIT License - Copyright (c) 2026 envisalink-bridge contributors

use bitflags::bitflags;
use serde::Serialize;

use crate::protocol::TpiMessage;

bitflags! {
    /// Partition status flags accumulated from `650`-`841` messages.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PartitionStatusFlags: u8 {
        /// 650 / 651 - Ready to arm
        const READY       = 1 << 0;
        /// 652 / 655 - Armed
        const ARMED       = 1 << 1;
        /// 654 - In alarm (cleared by disarm)
        const ALARM       = 1 << 2;
        /// 656 - Exit delay running
        const EXIT_DELAY  = 1 << 3;
        /// 657 - Entry delay running
        const ENTRY_DELAY = 1 << 4;
        /// 663 / 664 - Door chime enabled
        const CHIME       = 1 << 5;
        /// 840 / 841 - Trouble LED lit
        const TROUBLE     = 1 << 6;
    }
}

/// Arming mode reported with `652`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmMode {
    Away,
    Stay,
    ZeroEntryAway,
    ZeroEntryStay,
}

impl ArmMode {
    pub fn from_digit(c: char) -> Option<Self> {
        match c {
            '0' => Some(Self::Away),
            '1' => Some(Self::Stay),
            '2' => Some(Self::ZeroEntryAway),
            '3' => Some(Self::ZeroEntryStay),
            _ => None,
        }
    }
}

/// What happened to a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionEvent {
    Ready,
    NotReady,
    Armed,
    ReadyForceArming,
    InAlarm,
    Disarmed,
    ExitDelay,
    EntryDelay,
    KeypadLockout,
    FailedToArm,
    PgmOutput,
    ChimeEnabled,
    ChimeDisabled,
    InvalidAccessCode,
    FunctionNotAvailable,
    FailureToArm,
    Busy,
    ArmingInProgress,
    UserClosing,
    SpecialClosing,
    PartialClosing,
    UserOpening,
    SpecialOpening,
    TroubleLedOn,
    TroubleLedOff,
}

impl PartitionEvent {
    /// Decode a partition event from its TPI code.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            650 => Some(Self::Ready),
            651 => Some(Self::NotReady),
            652 => Some(Self::Armed),
            653 => Some(Self::ReadyForceArming),
            654 => Some(Self::InAlarm),
            655 => Some(Self::Disarmed),
            656 => Some(Self::ExitDelay),
            657 => Some(Self::EntryDelay),
            658 => Some(Self::KeypadLockout),
            659 => Some(Self::FailedToArm),
            660 => Some(Self::PgmOutput),
            663 => Some(Self::ChimeEnabled),
            664 => Some(Self::ChimeDisabled),
            670 => Some(Self::InvalidAccessCode),
            671 => Some(Self::FunctionNotAvailable),
            672 => Some(Self::FailureToArm),
            673 => Some(Self::Busy),
            674 => Some(Self::ArmingInProgress),
            700 => Some(Self::UserClosing),
            701 => Some(Self::SpecialClosing),
            702 => Some(Self::PartialClosing),
            750 => Some(Self::UserOpening),
            751 => Some(Self::SpecialOpening),
            840 => Some(Self::TroubleLedOn),
            841 => Some(Self::TroubleLedOff),
            _ => None,
        }
    }

    /// Apply this event to a set of flags.
    pub fn apply(&self, status: PartitionStatusFlags) -> PartitionStatusFlags {
        use PartitionStatusFlags as F;
        match self {
            Self::Ready | Self::ReadyForceArming => status | F::READY,
            Self::NotReady => status - F::READY,
            Self::Armed => (status | F::ARMED) - (F::EXIT_DELAY | F::ENTRY_DELAY),
            Self::InAlarm => status | F::ALARM,
            Self::Disarmed => status - (F::ARMED | F::ALARM | F::EXIT_DELAY | F::ENTRY_DELAY),
            Self::ExitDelay => status | F::EXIT_DELAY,
            Self::EntryDelay => status | F::ENTRY_DELAY,
            Self::ChimeEnabled => status | F::CHIME,
            Self::ChimeDisabled => status - F::CHIME,
            Self::TroubleLedOn => status | F::TROUBLE,
            Self::TroubleLedOff => status - F::TROUBLE,
            _ => status,
        }
    }
}

/// Flattened partition status for serialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionState {
    pub ready: bool,
    pub armed: bool,
    pub alarm: bool,
    pub exit_delay: bool,
    pub entry_delay: bool,
    pub chime: bool,
    pub trouble: bool,
}

impl From<PartitionStatusFlags> for PartitionState {
    fn from(flags: PartitionStatusFlags) -> Self {
        use PartitionStatusFlags as F;
        Self {
            ready: flags.contains(F::READY),
            armed: flags.contains(F::ARMED),
            alarm: flags.contains(F::ALARM),
            exit_delay: flags.contains(F::EXIT_DELAY),
            entry_delay: flags.contains(F::ENTRY_DELAY),
            chime: flags.contains(F::CHIME),
            trouble: flags.contains(F::TROUBLE),
        }
    }
}

/// A partition update as delivered to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionUpdate {
    pub partition: u8,
    pub code: u16,
    pub event: PartitionEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ArmMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<u16>,
    pub status: PartitionState,
    /// First update for this partition since the connection was established.
    pub initial_update: bool,
}

/// A single partition as last reported by the panel.
#[derive(Debug, Clone)]
pub struct Partition {
    pub id: u8,
    pub status: PartitionStatusFlags,
    pub arm_mode: Option<ArmMode>,
}

impl Partition {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            status: PartitionStatusFlags::empty(),
            arm_mode: None,
        }
    }

    /// Update status from an event. Returns the changed flags.
    pub fn update_status(&mut self, event: PartitionEvent, mode: Option<ArmMode>) -> PartitionStatusFlags {
        let new_status = event.apply(self.status);
        let changed = self.status ^ new_status;
        self.status = new_status;
        match event {
            PartitionEvent::Armed => self.arm_mode = mode,
            PartitionEvent::Disarmed => self.arm_mode = None,
            _ => {}
        }
        changed
    }

    pub fn is_ready(&self) -> bool { self.status.contains(PartitionStatusFlags::READY) }
    pub fn is_armed(&self) -> bool { self.status.contains(PartitionStatusFlags::ARMED) }
    pub fn is_alarm(&self) -> bool { self.status.contains(PartitionStatusFlags::ALARM) }
}

/// A decoded partition message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionMessage {
    pub partition: u8,
    pub event: PartitionEvent,
    pub mode: Option<ArmMode>,
    pub user: Option<u16>,
}

/// Parse a partition message. Data is the partition digit, followed by the
/// arm mode for `652` or a four digit user number for `700`/`750`.
pub fn parse_partition_message(msg: &TpiMessage) -> Option<PartitionMessage> {
    let event = PartitionEvent::from_code(msg.code)?;
    let data = msg.data.as_str();
    let partition = data.get(..1)?.parse::<u8>().ok()?;
    let rest = &data[1..];

    let mode = match event {
        PartitionEvent::Armed => rest.chars().next().and_then(ArmMode::from_digit),
        _ => None,
    };
    let user = match event {
        PartitionEvent::UserClosing | PartitionEvent::UserOpening => rest.parse::<u16>().ok(),
        _ => None,
    };

    Some(PartitionMessage {
        partition,
        event,
        mode,
        user,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(code: u16, data: &str) -> TpiMessage {
        TpiMessage {
            code,
            data: data.to_string(),
        }
    }

    #[test]
    fn test_parse_armed_with_mode() {
        let parsed = parse_partition_message(&msg(652, "11")).unwrap();
        assert_eq!(parsed.partition, 1);
        assert_eq!(parsed.event, PartitionEvent::Armed);
        assert_eq!(parsed.mode, Some(ArmMode::Stay));
    }

    #[test]
    fn test_parse_user_opening() {
        let parsed = parse_partition_message(&msg(750, "20040")).unwrap();
        assert_eq!(parsed.partition, 2);
        assert_eq!(parsed.user, Some(40));
    }

    #[test]
    fn test_parse_empty_data() {
        assert!(parse_partition_message(&msg(650, "")).is_none());
    }

    #[test]
    fn test_partition_arm_disarm_cycle() {
        let mut part = Partition::new(1);
        part.update_status(PartitionEvent::Ready, None);
        part.update_status(PartitionEvent::ExitDelay, None);
        let changed = part.update_status(PartitionEvent::Armed, Some(ArmMode::Away));
        assert!(changed.contains(PartitionStatusFlags::ARMED));
        assert!(changed.contains(PartitionStatusFlags::EXIT_DELAY));
        assert!(part.is_armed());
        assert_eq!(part.arm_mode, Some(ArmMode::Away));

        part.update_status(PartitionEvent::InAlarm, None);
        assert!(part.is_alarm());

        part.update_status(PartitionEvent::Disarmed, None);
        assert!(!part.is_armed());
        assert!(!part.is_alarm());
        assert!(part.is_ready());
        assert_eq!(part.arm_mode, None);
    }
}
