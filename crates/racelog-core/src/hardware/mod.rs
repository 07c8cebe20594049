//! Hardware collaborators
//!
//! Interfaces the orchestrator needs from acquisition devices, the operator
//! button, indicator lamps and the control-bus transmitter. Concrete drivers
//! (SocketCAN, NMEA serial, I2C IMU, GPIO) implement these outside the core.

mod error;

pub use error::HardwareError;

use crate::store::{Domain, DomainMap};

/// A device that produces telemetry for one domain
///
/// Each worker runs on its own thread and is polled in a tight loop. Reads
/// must be bounded by a short timeout so the loop can observe shutdown.
pub trait AcquisitionWorker: Send {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Domain the worker's fields are merged into
    fn domain(&self) -> Domain;

    /// Open the device. Fails if the hardware is unavailable.
    fn start(&mut self) -> Result<(), HardwareError>;

    /// Perform a single bounded read.
    ///
    /// Returns `Ok(None)` when nothing complete arrived. Transient decode or
    /// parse problems are swallowed here; only fatal I/O errors propagate.
    fn poll(&mut self) -> Result<Option<DomainMap>, HardwareError>;

    /// Release the device. Safe to call repeatedly or before `start`.
    fn shutdown(&mut self) -> Result<(), HardwareError>;
}

/// Operator push button
pub trait DigitalInputReader: Send {
    /// Current level of the input, without blocking
    fn read_pressed(&mut self) -> bool;
}

/// Status lamps
pub trait IndicatorOutput: Send + Sync {
    /// Steady logging lamp
    fn set_logging_indicator(&self, on: bool);

    /// Brief flash marking one written row
    fn pulse_logging_indicator_once(&self);

    /// Error lamp
    fn set_error_indicator(&self, on: bool);

    /// Network lamp, lit while the broker link is up
    fn set_network_indicator(&self, on: bool);

    /// Turn everything off and release the lines. Idempotent.
    fn release(&self) -> Result<(), HardwareError> {
        Ok(())
    }
}

/// Control-bus transmitter
pub trait ControlBusSender: Send + Sync {
    /// Transmit one standard frame
    fn send(&self, id: u32, data: [u8; 8]) -> Result<(), HardwareError>;

    /// Close the bus handle. Idempotent.
    fn release(&self) -> Result<(), HardwareError> {
        Ok(())
    }
}

/// Indicator sink that ignores every call
#[derive(Debug, Default, Clone, Copy)]
pub struct NullIndicators;

impl IndicatorOutput for NullIndicators {
    fn set_logging_indicator(&self, _on: bool) {}

    fn pulse_logging_indicator_once(&self) {}

    fn set_error_indicator(&self, _on: bool) {}

    fn set_network_indicator(&self, _on: bool) {}
}
