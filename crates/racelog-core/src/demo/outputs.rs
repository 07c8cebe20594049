//! Bench stand-ins for the button, the lamps and the control bus

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

use crate::hardware::{ControlBusSender, DigitalInputReader, HardwareError, IndicatorOutput};

/// Button that is never pressed
#[derive(Debug, Default, Clone, Copy)]
pub struct NoButton;

impl DigitalInputReader for NoButton {
    fn read_pressed(&mut self) -> bool {
        false
    }
}

/// Button replaying a fixed sequence of levels, one per read.
///
/// Reads past the end of the script return `false`.
#[derive(Debug, Default, Clone)]
pub struct ScriptedButton {
    levels: VecDeque<bool>,
}

impl ScriptedButton {
    /// Replay `levels` in order
    pub fn new(levels: impl IntoIterator<Item = bool>) -> Self {
        Self {
            levels: levels.into_iter().collect(),
        }
    }

    /// Reads left before the script runs out
    pub fn remaining(&self) -> usize {
        self.levels.len()
    }
}

impl DigitalInputReader for ScriptedButton {
    fn read_pressed(&mut self) -> bool {
        self.levels.pop_front().unwrap_or(false)
    }
}

/// Lamps reported through tracing
#[derive(Debug, Default)]
pub struct ConsoleIndicators {
    logging: AtomicBool,
    error: AtomicBool,
    network: AtomicBool,
    pulses: AtomicU64,
}

impl ConsoleIndicators {
    /// All lamps off
    pub fn new() -> Self {
        Self::default()
    }

    /// Logging lamp state
    pub fn logging_on(&self) -> bool {
        self.logging.load(Ordering::SeqCst)
    }

    /// Error lamp state
    pub fn error_on(&self) -> bool {
        self.error.load(Ordering::SeqCst)
    }

    /// Network lamp state
    pub fn network_on(&self) -> bool {
        self.network.load(Ordering::SeqCst)
    }

    /// Row pulses seen so far
    pub fn pulses(&self) -> u64 {
        self.pulses.load(Ordering::SeqCst)
    }
}

impl IndicatorOutput for ConsoleIndicators {
    fn set_logging_indicator(&self, on: bool) {
        if self.logging.swap(on, Ordering::SeqCst) != on {
            info!(lamp = "logging", on, "Indicator changed");
        }
    }

    fn pulse_logging_indicator_once(&self) {
        self.pulses.fetch_add(1, Ordering::SeqCst);
    }

    fn set_error_indicator(&self, on: bool) {
        if self.error.swap(on, Ordering::SeqCst) != on {
            info!(lamp = "error", on, "Indicator changed");
        }
    }

    fn set_network_indicator(&self, on: bool) {
        if self.network.swap(on, Ordering::SeqCst) != on {
            info!(lamp = "network", on, "Indicator changed");
        }
    }

    fn release(&self) -> Result<(), HardwareError> {
        self.logging.store(false, Ordering::SeqCst);
        self.error.store(false, Ordering::SeqCst);
        self.network.store(false, Ordering::SeqCst);
        debug!("Indicators released");
        Ok(())
    }
}

/// Control bus that logs every frame and keeps a copy
#[derive(Debug, Default)]
pub struct LoggingBusSender {
    frames: Mutex<Vec<(u32, [u8; 8])>>,
    released: AtomicBool,
}

impl LoggingBusSender {
    /// Open bus with no frames sent
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames sent so far, oldest first
    pub fn frames(&self) -> Vec<(u32, [u8; 8])> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether [`ControlBusSender::release`] was called
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl ControlBusSender for LoggingBusSender {
    fn send(&self, id: u32, data: [u8; 8]) -> Result<(), HardwareError> {
        if self.is_released() {
            return Err(HardwareError::BusDown);
        }
        info!("TX {:03X} [8] {:02X?}", id, data);
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, data));
        Ok(())
    }

    fn release(&self) -> Result<(), HardwareError> {
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }
}
