// MIT License - Copyright (c) 2026 envisalink-bridge contributors

use std::fmt;

/// System error codes reported by the Envisalink in a `502` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TpiErrorCode {
    /// 000 - No Error
    NoError,
    /// 001 - Receive Buffer Overrun
    ReceiveBufferOverrun,
    /// 002 - Receive Buffer Overflow
    ReceiveBufferOverflow,
    /// 003 - Transmit Buffer Overflow
    TransmitBufferOverflow,
    /// 010 - Keybus Transmit Buffer Overrun
    KeybusTransmitBufferOverrun,
    /// 011 - Keybus Transmit Time Timeout
    KeybusTransmitTimeTimeout,
    /// 012 - Keybus Transmit Mode Timeout
    KeybusTransmitModeTimeout,
    /// 013 - Keybus Transmit Keystring Timeout
    KeybusTransmitKeystringTimeout,
    /// 014 - Keybus Interface Not Functioning
    KeybusNotFunctioning,
    /// 015 - Keybus Busy (arming or disarming with user code)
    KeybusBusy,
    /// 016 - Keybus Busy - Lockout
    KeybusBusyLockout,
    /// 017 - Keybus Busy - Installers Mode
    KeybusBusyInstallersMode,
    /// 018 - Keybus Busy - General Busy
    KeybusBusyGeneral,
    /// 020 - API Command Syntax Error
    CommandSyntax,
    /// 021 - API Command Partition Error
    CommandPartition,
    /// 022 - API Command Not Supported
    CommandNotSupported,
    /// 023 - API System Not Armed
    SystemNotArmed,
    /// 024 - API System Not Ready to Arm
    SystemNotReadyToArm,
    /// 025 - API Command Invalid Length
    CommandInvalidLength,
    /// 026 - API User Code not Required
    UserCodeNotRequired,
    /// 027 - API Invalid Characters in Command
    InvalidCharacters,
}

impl TpiErrorCode {
    /// Parse the three digit error code carried by a `502` message.
    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "000" => Some(Self::NoError),
            "001" => Some(Self::ReceiveBufferOverrun),
            "002" => Some(Self::ReceiveBufferOverflow),
            "003" => Some(Self::TransmitBufferOverflow),
            "010" => Some(Self::KeybusTransmitBufferOverrun),
            "011" => Some(Self::KeybusTransmitTimeTimeout),
            "012" => Some(Self::KeybusTransmitModeTimeout),
            "013" => Some(Self::KeybusTransmitKeystringTimeout),
            "014" => Some(Self::KeybusNotFunctioning),
            "015" => Some(Self::KeybusBusy),
            "016" => Some(Self::KeybusBusyLockout),
            "017" => Some(Self::KeybusBusyInstallersMode),
            "018" => Some(Self::KeybusBusyGeneral),
            "020" => Some(Self::CommandSyntax),
            "021" => Some(Self::CommandPartition),
            "022" => Some(Self::CommandNotSupported),
            "023" => Some(Self::SystemNotArmed),
            "024" => Some(Self::SystemNotReadyToArm),
            "025" => Some(Self::CommandInvalidLength),
            "026" => Some(Self::UserCodeNotRequired),
            "027" => Some(Self::InvalidCharacters),
            _ => None,
        }
    }

    /// Human-readable description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NoError => "No Error",
            Self::ReceiveBufferOverrun => "Receive Buffer Overrun",
            Self::ReceiveBufferOverflow => "Receive Buffer Overflow",
            Self::TransmitBufferOverflow => "Transmit Buffer Overflow",
            Self::KeybusTransmitBufferOverrun => "Keybus Transmit Buffer Overrun",
            Self::KeybusTransmitTimeTimeout => "Keybus Transmit Time Timeout",
            Self::KeybusTransmitModeTimeout => "Keybus Transmit Mode Timeout",
            Self::KeybusTransmitKeystringTimeout => "Keybus Transmit Keystring Timeout",
            Self::KeybusNotFunctioning => "Keybus Interface Not Functioning",
            Self::KeybusBusy => "Keybus Busy (Attempting to Disarm or Arm with user code)",
            Self::KeybusBusyLockout => "Keybus Busy - Lockout",
            Self::KeybusBusyInstallersMode => "Keybus Busy - Installers Mode",
            Self::KeybusBusyGeneral => "Keybus Busy - General Busy",
            Self::CommandSyntax => "API Command Syntax Error",
            Self::CommandPartition => "API Command Partition Error (Requested Partition is out of bounds)",
            Self::CommandNotSupported => "API Command Not Supported",
            Self::SystemNotArmed => "API System Not Armed (sent in response to a disarm command)",
            Self::SystemNotReadyToArm => "API System Not Ready to Arm",
            Self::CommandInvalidLength => "API Command Invalid Length",
            Self::UserCodeNotRequired => "API User Code not Required",
            Self::InvalidCharacters => "API Invalid Characters in Command",
        }
    }

    /// The wire representation (e.g. "024").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoError => "000",
            Self::ReceiveBufferOverrun => "001",
            Self::ReceiveBufferOverflow => "002",
            Self::TransmitBufferOverflow => "003",
            Self::KeybusTransmitBufferOverrun => "010",
            Self::KeybusTransmitTimeTimeout => "011",
            Self::KeybusTransmitModeTimeout => "012",
            Self::KeybusTransmitKeystringTimeout => "013",
            Self::KeybusNotFunctioning => "014",
            Self::KeybusBusy => "015",
            Self::KeybusBusyLockout => "016",
            Self::KeybusBusyInstallersMode => "017",
            Self::KeybusBusyGeneral => "018",
            Self::CommandSyntax => "020",
            Self::CommandPartition => "021",
            Self::CommandNotSupported => "022",
            Self::SystemNotArmed => "023",
            Self::SystemNotReadyToArm => "024",
            Self::CommandInvalidLength => "025",
            Self::UserCodeNotRequired => "026",
            Self::InvalidCharacters => "027",
        }
    }
}

impl fmt::Display for TpiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.as_str(), self.description())
    }
}

/// All errors that can occur in the envisalink-bridge library.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Login rejected by the Envisalink (bad password)")]
    LoginFailed,

    #[error("Login timed out")]
    LoginTimeout,

    #[error("Panel error: {0}")]
    PanelError(TpiErrorCode),

    #[error("Checksum mismatch: {line}")]
    ChecksumMismatch { line: String },

    #[error("Invalid message: {details}")]
    InvalidMessage { details: String },

    #[error("Socket disconnected")]
    Disconnected,

    #[error("Controller task has exited")]
    ControllerGone,

    #[error("Channel closed")]
    ChannelClosed,
}

impl BridgeError {
    /// Whether this error is transient and the connection should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::Io(_)
                | BridgeError::ConnectionTimeout
                | BridgeError::LoginTimeout
                | BridgeError::Disconnected
                | BridgeError::ChecksumMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
