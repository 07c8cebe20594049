//! Lap command and control frame encoding
//!
//! Inbound command (JSON): `{"lap_count": <integer>}`
//!
//! Outbound frame (8 data bytes):
//! - byte 0: lap count as an unsigned 8-bit value
//! - bytes 1-7: zero

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::CommandError;

/// Default identifier of the lap frame on the control bus
pub const DEFAULT_LAP_FRAME_ID: u32 = 0x700;

/// Highest standard (11-bit) identifier
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// Parsed lap command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LapCommand {
    /// Lap counter supplied by the remote side
    pub lap_count: i64,
}

impl LapCommand {
    /// Decode a raw payload
    pub fn parse(payload: &[u8]) -> Result<Self, CommandError> {
        let text = std::str::from_utf8(payload)?;
        let json: JsonValue = serde_json::from_str(text.trim())?;

        let lap = match json.get("lap_count") {
            None | Some(JsonValue::Null) => return Err(CommandError::MissingLapCount),
            Some(v) => v,
        };

        if let Some(n) = lap.as_i64() {
            Ok(Self { lap_count: n })
        } else if let Some(n) = lap.as_u64() {
            Err(CommandError::OutOfRange(n as i128))
        } else {
            Err(CommandError::InvalidLapCount(lap.to_string()))
        }
    }
}

/// What to do with lap counts that do not fit in one byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LapOverflowPolicy {
    /// Keep the low 8 bits (999 → 231)
    #[default]
    Wrap,
    /// Saturate at 255
    Clamp,
    /// Discard the command
    Reject,
}

impl LapOverflowPolicy {
    /// Reduce a lap count to the frame byte. Negative counts are always rejected.
    pub fn apply(self, lap_count: i64) -> Result<u8, CommandError> {
        if lap_count < 0 {
            return Err(CommandError::OutOfRange(lap_count as i128));
        }
        if let Ok(byte) = u8::try_from(lap_count) {
            return Ok(byte);
        }
        match self {
            LapOverflowPolicy::Wrap => Ok((lap_count & 0xFF) as u8),
            LapOverflowPolicy::Clamp => Ok(u8::MAX),
            LapOverflowPolicy::Reject => Err(CommandError::OutOfRange(lap_count as i128)),
        }
    }
}

/// A frame queued for the control bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFrame {
    /// Arbitration identifier
    pub id: u32,
    /// Payload
    pub data: [u8; 8],
}

impl ControlFrame {
    /// Lap-count frame: byte 0 carries the count, the rest is zero
    pub fn lap_count(id: u32, lap: u8) -> Self {
        let mut data = [0u8; 8];
        data[0] = lap;
        Self { id, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lap_command() {
        let cmd = LapCommand::parse(br#"{"lap_count": 3}"#).unwrap();
        assert_eq!(cmd.lap_count, 3);
    }

    #[test]
    fn test_parse_rejects_bad_payloads() {
        assert!(matches!(
            LapCommand::parse(&[0xff, 0xfe]),
            Err(CommandError::InvalidUtf8(_))
        ));
        assert!(matches!(
            LapCommand::parse(b"lap=3"),
            Err(CommandError::InvalidJson(_))
        ));
        assert!(matches!(
            LapCommand::parse(br#"{"lap": 3}"#),
            Err(CommandError::MissingLapCount)
        ));
        assert!(matches!(
            LapCommand::parse(br#"{"lap_count": null}"#),
            Err(CommandError::MissingLapCount)
        ));
        assert!(matches!(
            LapCommand::parse(br#"{"lap_count": "3"}"#),
            Err(CommandError::InvalidLapCount(_))
        ));
        assert!(matches!(
            LapCommand::parse(br#"{"lap_count": 2.5}"#),
            Err(CommandError::InvalidLapCount(_))
        ));
    }

    #[test]
    fn test_overflow_policies() {
        assert_eq!(LapOverflowPolicy::Wrap.apply(999).unwrap(), 231);
        assert_eq!(LapOverflowPolicy::Wrap.apply(256).unwrap(), 0);
        assert_eq!(LapOverflowPolicy::Clamp.apply(999).unwrap(), 255);
        assert!(LapOverflowPolicy::Reject.apply(999).is_err());
        assert_eq!(LapOverflowPolicy::Reject.apply(255).unwrap(), 255);
        for policy in [
            LapOverflowPolicy::Wrap,
            LapOverflowPolicy::Clamp,
            LapOverflowPolicy::Reject,
        ] {
            assert!(policy.apply(-1).is_err());
        }
    }

    #[test]
    fn test_lap_frame_layout() {
        let frame = ControlFrame::lap_count(DEFAULT_LAP_FRAME_ID, 3);
        assert_eq!(frame.id, 0x700);
        assert_eq!(frame.data, [3, 0, 0, 0, 0, 0, 0, 0]);
    }
}
