//! Demo collaborators
//!
//! Simulated devices for running the node on a bench without a car.

mod engine;
mod outputs;
mod track;

pub use engine::{DemoCanWorker, EngineSimulator, DEMO_FRAME_PERIOD};
pub use outputs::{ConsoleIndicators, LoggingBusSender, NoButton, ScriptedButton};
pub use track::{DemoAccelWorker, DemoGpsWorker, TrackModel, GPS_FIX_PERIOD, IMU_SAMPLE_PERIOD};

use crate::hardware::AcquisitionWorker;

/// One simulated worker per domain
pub fn demo_workers() -> Vec<Box<dyn AcquisitionWorker>> {
    let track = TrackModel::default();
    vec![
        Box::new(DemoCanWorker::new()),
        Box::new(DemoGpsWorker::new(track)),
        Box::new(DemoAccelWorker::new(track)),
    ]
}
