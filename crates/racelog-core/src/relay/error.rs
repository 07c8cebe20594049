//! Command relay errors

use thiserror::Error;

use crate::hardware::HardwareError;

/// Reasons an inbound command was discarded
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Message on unexpected topic '{0}'")]
    UnexpectedTopic(String),

    #[error("Payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Command has no lap_count")]
    MissingLapCount,

    #[error("lap_count is not an integer: {0}")]
    InvalidLapCount(String),

    #[error("lap_count {0} does not fit the control frame")]
    OutOfRange(i128),

    #[error("Control bus send failed: {0}")]
    Send(#[from] HardwareError),
}
