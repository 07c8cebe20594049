//! Hardware collaborator errors

use thiserror::Error;

/// Errors reported by sensors, buses and output lines
#[derive(Error, Debug)]
pub enum HardwareError {
    #[error("Device unavailable: {0}")]
    Unavailable(String),

    #[error("Control bus is down")]
    BusDown,

    #[error("Device timeout")]
    Timeout,

    #[error("Device not started")]
    NotStarted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Whether a worker loop should stop after seeing this error
    ///
    /// Timeouts only mean no data arrived within the read window.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, HardwareError::Timeout)
    }
}
