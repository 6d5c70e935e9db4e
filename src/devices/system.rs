// MIT License - Copyright (c) 2026 envisalink-bridge contributors

use bitflags::bitflags;
use serde::Serialize;

use crate::protocol::TpiMessage;

bitflags! {
    /// Panel-wide trouble conditions from `800`-`830` messages.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SystemStatusFlags: u8 {
        /// 800 / 801 - Panel battery trouble
        const BATTERY_TROUBLE = 1 << 0;
        /// 802 / 803 - AC power lost
        const AC_TROUBLE      = 1 << 1;
        /// 806 / 807 - Bell circuit trouble
        const BELL_TROUBLE    = 1 << 2;
        /// 829 / 830 - General system tamper
        const TAMPER          = 1 << 3;
    }
}

bitflags! {
    /// Keypad LED bitfield carried by `510` (lit) and `511` (flashing).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct KeypadLeds: u8 {
        const READY     = 1 << 0;
        const ARMED     = 1 << 1;
        const MEMORY    = 1 << 2;
        const BYPASS    = 1 << 3;
        const TROUBLE   = 1 << 4;
        const PROGRAM   = 1 << 5;
        const FIRE      = 1 << 6;
        const BACKLIGHT = 1 << 7;
    }
}

bitflags! {
    /// Trouble bitfield carried by `849` (verbose trouble status).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TroubleFlags: u8 {
        const SERVICE_REQUIRED   = 1 << 0;
        const AC_POWER_LOST      = 1 << 1;
        const TELEPHONE_FAULT    = 1 << 2;
        const FAILURE_TO_COMM    = 1 << 3;
        const ZONE_FAULT         = 1 << 4;
        const ZONE_TAMPER        = 1 << 5;
        const ZONE_LOW_BATTERY   = 1 << 6;
        const LOSS_OF_TIME       = 1 << 7;
    }
}

/// Panel-wide events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemEvent {
    KeypadLedState,
    KeypadLedFlash,
    BatteryTrouble,
    BatteryRestore,
    AcTrouble,
    AcRestore,
    BellTrouble,
    BellRestore,
    TamperTrouble,
    TamperRestore,
    VerboseTrouble,
    CodeRequired,
}

impl SystemEvent {
    /// Decode a system event from its TPI code.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            510 => Some(Self::KeypadLedState),
            511 => Some(Self::KeypadLedFlash),
            800 => Some(Self::BatteryTrouble),
            801 => Some(Self::BatteryRestore),
            802 => Some(Self::AcTrouble),
            803 => Some(Self::AcRestore),
            806 => Some(Self::BellTrouble),
            807 => Some(Self::BellRestore),
            829 => Some(Self::TamperTrouble),
            830 => Some(Self::TamperRestore),
            849 => Some(Self::VerboseTrouble),
            900 => Some(Self::CodeRequired),
            _ => None,
        }
    }

    /// The condition this event reports on. Trouble and restore of the same
    /// circuit share a condition.
    pub fn condition(&self) -> &'static str {
        match self {
            Self::KeypadLedState => "keypad_led_state",
            Self::KeypadLedFlash => "keypad_led_flash",
            Self::BatteryTrouble | Self::BatteryRestore => "battery",
            Self::AcTrouble | Self::AcRestore => "ac",
            Self::BellTrouble | Self::BellRestore => "bell",
            Self::TamperTrouble | Self::TamperRestore => "tamper",
            Self::VerboseTrouble => "verbose_trouble",
            Self::CodeRequired => "code_required",
        }
    }

    /// Apply this event to a set of flags.
    pub fn apply(&self, status: SystemStatusFlags) -> SystemStatusFlags {
        use SystemStatusFlags as F;
        match self {
            Self::BatteryTrouble => status | F::BATTERY_TROUBLE,
            Self::BatteryRestore => status - F::BATTERY_TROUBLE,
            Self::AcTrouble => status | F::AC_TROUBLE,
            Self::AcRestore => status - F::AC_TROUBLE,
            Self::BellTrouble => status | F::BELL_TROUBLE,
            Self::BellRestore => status - F::BELL_TROUBLE,
            Self::TamperTrouble => status | F::TAMPER,
            Self::TamperRestore => status - F::TAMPER,
            _ => status,
        }
    }
}

/// Flattened system status for serialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemState {
    pub battery_trouble: bool,
    pub ac_trouble: bool,
    pub bell_trouble: bool,
    pub tamper: bool,
}

impl From<SystemStatusFlags> for SystemState {
    fn from(flags: SystemStatusFlags) -> Self {
        use SystemStatusFlags as F;
        Self {
            battery_trouble: flags.contains(F::BATTERY_TROUBLE),
            ac_trouble: flags.contains(F::AC_TROUBLE),
            bell_trouble: flags.contains(F::BELL_TROUBLE),
            tamper: flags.contains(F::TAMPER),
        }
    }
}

/// A system update as delivered to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemUpdate {
    pub code: u16,
    pub event: SystemEvent,
    /// Decoded flag names for `510`/`511`/`849`; empty otherwise.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<&'static str>,
    pub status: SystemState,
    /// First update for this condition since the connection was established.
    pub initial_update: bool,
}

/// Decode the hex bitfield carried by LED and trouble messages into flag names.
pub fn decode_flag_names(event: SystemEvent, data: &str) -> Vec<&'static str> {
    let Ok(bits) = u8::from_str_radix(data.get(..2).unwrap_or(data), 16) else {
        return Vec::new();
    };
    match event {
        SystemEvent::KeypadLedState | SystemEvent::KeypadLedFlash => KeypadLeds::from_bits_truncate(bits)
            .iter_names()
            .map(|(name, _)| name)
            .collect(),
        SystemEvent::VerboseTrouble => TroubleFlags::from_bits_truncate(bits)
            .iter_names()
            .map(|(name, _)| name)
            .collect(),
        _ => Vec::new(),
    }
}

/// Parse a system message into its event and decoded flag names.
pub fn parse_system_message(msg: &TpiMessage) -> Option<(SystemEvent, Vec<&'static str>)> {
    let event = SystemEvent::from_code(msg.code)?;
    Some((event, decode_flag_names(event, &msg.data)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_led_state_decoding() {
        let msg = TpiMessage {
            code: 510,
            data: "83".to_string(),
        };
        let (event, flags) = parse_system_message(&msg).unwrap();
        assert_eq!(event, SystemEvent::KeypadLedState);
        assert_eq!(flags, vec!["READY", "ARMED", "BACKLIGHT"]);
    }

    #[test]
    fn test_verbose_trouble_decoding() {
        assert_eq!(
            decode_flag_names(SystemEvent::VerboseTrouble, "02"),
            vec!["AC_POWER_LOST"]
        );
        assert!(decode_flag_names(SystemEvent::VerboseTrouble, "zz").is_empty());
    }

    #[test]
    fn test_trouble_restore_pairs() {
        let status = SystemEvent::AcTrouble.apply(SystemStatusFlags::empty());
        assert!(status.contains(SystemStatusFlags::AC_TROUBLE));
        let status = SystemEvent::AcRestore.apply(status);
        assert!(status.is_empty());
        assert_eq!(
            SystemEvent::AcTrouble.condition(),
            SystemEvent::AcRestore.condition()
        );
    }
}
