// MIT License - Copyright (c) 2026 envisalink-bridge contributors
// Envisalink TPI (third party interface) line protocol

use serde::Deserialize;

use crate::error::{BridgeError, Result};

/// Line terminator for every TPI frame in both directions.
pub const CRLF: &str = "\r\n";

/// Panic alarm type for the `060` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanicType {
    Fire,
    Ambulance,
    Police,
}

impl PanicType {
    fn digit(&self) -> char {
        match self {
            PanicType::Fire => '1',
            PanicType::Ambulance => '2',
            PanicType::Police => '3',
        }
    }
}

/// Commands that can be sent to the Envisalink.
///
/// # Framing
///
/// Every frame is a three digit command code, optional data, a two
/// character uppercase hex checksum and CRLF. The checksum is the sum of
/// all code and data bytes, truncated to 8 bits.
///
/// # Login
///
/// On TCP connect the Envisalink sends `505` with data `3` (password
/// request). The client answers with [`Command::NetworkLogin`]; the
/// Envisalink replies `505` with `1` (accepted), `0` (rejected) or `2`
/// (timed out).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `000` — Poll. Keeps the session alive.
    Poll,
    /// `001` — Status report. The panel replays current zone and partition state.
    StatusReport,
    /// `005<password>` — Network login.
    NetworkLogin { password: String },
    /// `008` — Dump zone timers.
    DumpZoneTimers,
    /// `020<partition><output>` — Activate command output (1-4).
    CommandOutput { partition: u8, output: u8 },
    /// `030<partition>` — Away arm.
    ArmAway { partition: u8 },
    /// `031<partition>` — Stay arm.
    ArmStay { partition: u8 },
    /// `032<partition>` — Arm with zero entry delay.
    ArmZeroEntry { partition: u8 },
    /// `033<partition><code>` — Arm with user code.
    ArmWithCode { partition: u8, code: String },
    /// `040<partition><code>` — Disarm with user code.
    Disarm { partition: u8, code: String },
    /// `060<type>` — Trigger a panic alarm.
    Panic { kind: PanicType },
    /// `071<partition><keys>` — Send a keypad key sequence (Envisalink extension).
    KeySequence { partition: u8, keys: String },
    /// `200<code>` — Send user code in answer to a `900` code request.
    /// Four digit codes are padded to six with trailing zeros.
    SendCode { code: String },
    /// Any other command, given as code and data.
    Raw { code: String, data: String },
}

impl Command {
    /// The three digit command code.
    pub fn code(&self) -> &str {
        match self {
            Command::Poll => "000",
            Command::StatusReport => "001",
            Command::NetworkLogin { .. } => "005",
            Command::DumpZoneTimers => "008",
            Command::CommandOutput { .. } => "020",
            Command::ArmAway { .. } => "030",
            Command::ArmStay { .. } => "031",
            Command::ArmZeroEntry { .. } => "032",
            Command::ArmWithCode { .. } => "033",
            Command::Disarm { .. } => "040",
            Command::Panic { .. } => "060",
            Command::KeySequence { .. } => "071",
            Command::SendCode { .. } => "200",
            Command::Raw { code, .. } => code,
        }
    }

    /// The data portion of the frame (may be empty).
    pub fn data(&self) -> String {
        match self {
            Command::Poll | Command::StatusReport | Command::DumpZoneTimers => String::new(),
            Command::NetworkLogin { password } => password.clone(),
            Command::CommandOutput { partition, output } => format!("{}{}", partition, output),
            Command::ArmAway { partition }
            | Command::ArmStay { partition }
            | Command::ArmZeroEntry { partition } => partition.to_string(),
            Command::ArmWithCode { partition, code } | Command::Disarm { partition, code } => {
                format!("{}{}", partition, code)
            }
            Command::Panic { kind } => kind.digit().to_string(),
            Command::KeySequence { partition, keys } => format!("{}{}", partition, keys),
            Command::SendCode { code } => {
                if code.len() == 4 {
                    format!("{}00", code)
                } else {
                    code.clone()
                }
            }
            Command::Raw { data, .. } => data.clone(),
        }
    }

    /// Convert the command to its complete wire frame, including checksum and CRLF.
    pub fn to_wire_string(&self) -> String {
        let body = format!("{}{}", self.code(), self.data());
        format!("{}{}{}", body, checksum(&body), CRLF)
    }

    /// Whether the frame carries a secret (password or user code) that must not be logged.
    pub fn is_sensitive(&self) -> bool {
        matches!(
            self,
            Command::NetworkLogin { .. }
                | Command::ArmWithCode { .. }
                | Command::Disarm { .. }
                | Command::SendCode { .. }
        )
    }

    /// Parse a raw command string such as `"0301"` (code followed by data,
    /// no checksum) into a command.
    pub fn from_raw(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.len() < 3 || !raw.is_char_boundary(3) || !raw[..3].bytes().all(|b| b.is_ascii_digit()) {
            return Err(BridgeError::InvalidMessage {
                details: format!("command must start with a 3 digit code: {:?}", raw),
            });
        }
        Ok(Command::Raw {
            code: raw[..3].to_string(),
            data: raw[3..].to_string(),
        })
    }
}

/// Compute the TPI checksum of a frame body: the 8-bit sum of its bytes as
/// two uppercase hex digits.
pub fn checksum(body: &str) -> String {
    let sum = body.bytes().fold(0u8, |acc, b| acc.wrapping_add(b));
    format!("{:02X}", sum)
}

/// A single decoded frame received from the Envisalink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpiMessage {
    pub code: u16,
    pub data: String,
}

impl TpiMessage {
    /// Parse a received line (with or without its CRLF) and verify its checksum.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.len() < 5 || !line.is_ascii() {
            return Err(BridgeError::InvalidMessage {
                details: format!("frame too short or not ASCII: {:?}", line),
            });
        }

        let (body, sum) = line.split_at(line.len() - 2);
        if !sum.eq_ignore_ascii_case(&checksum(body)) {
            return Err(BridgeError::ChecksumMismatch {
                line: line.to_string(),
            });
        }

        let code = body[..3].parse::<u16>().map_err(|_| BridgeError::InvalidMessage {
            details: format!("bad command code: {:?}", line),
        })?;

        Ok(Self {
            code,
            data: body[3..].to_string(),
        })
    }
}

/// Split a received buffer into complete CRLF-terminated lines.
///
/// Any trailing partial line is appended to `leftover` and should be
/// prepended to the next read.
pub fn split_lines(data: &[u8], leftover: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    let mut start = 0;

    for i in 0..data.len() {
        if data[i] == b'\n' {
            let line = String::from_utf8_lossy(&data[start..i]);
            let line = line.trim_end_matches('\r');
            if !line.is_empty() {
                lines.push(line.to_string());
            }
            start = i + 1;
        }
    }

    if start < data.len() {
        leftover.extend_from_slice(&data[start..]);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        // Values taken from the TPI programmer's guide
        assert_eq!(checksum("005user"), "54");
        assert_eq!(checksum("000"), "90");
        assert_eq!(checksum("0301"), "C4");
    }

    #[test]
    fn test_command_wire_strings() {
        assert_eq!(Command::Poll.to_wire_string(), "00090\r\n");
        assert_eq!(
            Command::NetworkLogin {
                password: "user".to_string()
            }
            .to_wire_string(),
            "005user54\r\n"
        );
        assert_eq!(
            Command::ArmAway { partition: 1 }.to_wire_string(),
            "0301C4\r\n"
        );
        assert_eq!(
            Command::Disarm {
                partition: 1,
                code: "1234".to_string()
            }
            .data(),
            "11234"
        );
        assert_eq!(
            Command::Panic {
                kind: PanicType::Police
            }
            .data(),
            "3"
        );
    }

    #[test]
    fn test_send_code_padding() {
        assert_eq!(
            Command::SendCode {
                code: "1234".to_string()
            }
            .data(),
            "123400"
        );
        assert_eq!(
            Command::SendCode {
                code: "123456".to_string()
            }
            .data(),
            "123456"
        );
    }

    #[test]
    fn test_sensitive_commands() {
        assert!(Command::NetworkLogin { password: "x".into() }.is_sensitive());
        assert!(!Command::ArmStay { partition: 2 }.is_sensitive());
    }

    #[test]
    fn test_from_raw() {
        let cmd = Command::from_raw("0712*1#").unwrap();
        assert_eq!(cmd.code(), "071");
        assert_eq!(cmd.data(), "2*1#");
        assert!(Command::from_raw("ab").is_err());
        assert!(Command::from_raw("x01").is_err());
    }

    #[test]
    fn test_parse_message() {
        let msg = TpiMessage::parse("5053CD\r\n").unwrap();
        assert_eq!(msg.code, 505);
        assert_eq!(msg.data, "3");

        let body = "609001";
        let line = format!("{}{}", body, checksum(body));
        let msg = TpiMessage::parse(&line).unwrap();
        assert_eq!(msg.code, 609);
        assert_eq!(msg.data, "001");
    }

    #[test]
    fn test_parse_bad_checksum() {
        assert!(matches!(
            TpiMessage::parse("5053FF"),
            Err(BridgeError::ChecksumMismatch { .. })
        ));
        assert!(TpiMessage::parse("50").is_err());
    }

    #[test]
    fn test_split_lines() {
        let mut leftover = Vec::new();
        let lines = split_lines(b"5053CD\r\n00090\r\n6090", &mut leftover);
        assert_eq!(lines, vec!["5053CD".to_string(), "00090".to_string()]);
        assert_eq!(leftover, b"6090".to_vec());
    }
}
