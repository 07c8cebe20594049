//! Simulated ECU stream
//!
//! Generates engine channels for bench runs without a car on the bus.
//! Simulates an engine idling at ~850 RPM with random throttle blips.

use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::hardware::{AcquisitionWorker, HardwareError};
use crate::store::{Domain, DomainMap, FieldValue};

const IDLE_RPM: f64 = 850.0;
const RAMP_UP_MS: u64 = 300;
const HOLD_MS: u64 = 200;
const RAMP_DOWN_MS: u64 = 800;

/// Period between simulated ECU frames
pub const DEMO_FRAME_PERIOD: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq)]
enum BlipState {
    /// Engine idling normally
    Idle,
    /// Throttle opening, RPM rising
    RampUp { start_ms: u64 },
    /// At peak RPM, holding
    Hold { start_ms: u64 },
    /// Throttle closing, RPM falling
    RampDown { start_ms: u64 },
}

/// Engine model behind [`DemoCanWorker`]
pub struct EngineSimulator {
    last_update_ms: Option<u64>,
    next_blip_at_ms: u64,
    blip_state: BlipState,
    current_rpm: f64,
    blip_target_rpm: f64,
    rng: StdRng,
}

impl EngineSimulator {
    /// Simulator seeded from entropy
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic simulator
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(mut rng: StdRng) -> Self {
        let first_blip = rng.gen_range(8000..15000);
        Self {
            last_update_ms: None,
            next_blip_at_ms: first_blip,
            blip_state: BlipState::Idle,
            current_rpm: IDLE_RPM,
            blip_target_rpm: 0.0,
            rng,
        }
    }

    /// Advance to `sim_ms` (milliseconds since start) and return all channels
    pub fn update(&mut self, sim_ms: u64) -> DomainMap {
        let delta_ms = self
            .last_update_ms
            .map(|last| sim_ms.saturating_sub(last))
            .unwrap_or(0);
        self.last_update_ms = Some(sim_ms);

        self.update_blip_state(sim_ms);
        let target_rpm = self.target_rpm(sim_ms);

        // RPM/sec slew limits
        let rpm_rate = if target_rpm > self.current_rpm { 8000.0 } else { 3000.0 };
        let max_change = rpm_rate * (delta_ms as f64 / 1000.0);
        self.current_rpm += (target_rpm - self.current_rpm).clamp(-max_change, max_change);

        let t = sim_ms as f64 / 1000.0;
        let idle_wobble = if matches!(self.blip_state, BlipState::Idle) {
            20.0 * (t * 2.5).sin() + 10.0 * (t * 7.3).sin()
        } else {
            0.0
        };
        let rpm = (self.current_rpm + idle_wobble).max(0.0);

        let blip_progress = if self.blip_target_rpm > IDLE_RPM {
            ((self.current_rpm - IDLE_RPM) / (self.blip_target_rpm - IDLE_RPM)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let tps = match self.blip_state {
            BlipState::Idle => 1.5 + 1.0 * (t * 0.3).sin().abs(),
            BlipState::RampUp { .. } => 2.0 + blip_progress * 45.0,
            BlipState::Hold { .. } => 45.0 + 5.0 * (t * 3.0).sin(),
            BlipState::RampDown { .. } => 2.0 + blip_progress * 40.0,
        }
        .clamp(0.0, 100.0);

        let map = if rpm < 1000.0 {
            35.0 + 10.0 * (1.0 - rpm / 1000.0)
        } else {
            25.0 + rpm / 100.0
        }
        .clamp(20.0, 105.0);

        let lambda = 1.0 + 0.02 * (t * 1.5).sin() + 0.007 * (t * 4.7).sin();
        let lambda_target = if rpm < 1500.0 { 1.0 } else { 0.92 };
        let coolant = 20.0 + 70.0 * (1.0 - (-t / 120.0).exp());
        let iat = 25.0 + 5.0 * (t * 0.1).sin();
        let battery = 13.8 + 0.2 * (t * 0.5).sin();
        let advance = (10.0 + rpm / 200.0 + 3.0 * (t * 0.7).sin()).clamp(-10.0, 45.0);
        let pulse_width = 2.5 + (rpm / 1000.0) * 1.5 + (tps / 50.0) * 2.0;
        let dwell = 3.0 + 0.5 * (rpm / 2000.0);
        let oil_temp = 20.0 + 80.0 * (1.0 - (-t / 240.0).exp());
        let oil_pressure = 1.0 + rpm / 1500.0;

        // Bench car sits in neutral
        let gear = 0.0;
        let vss = 0.0;

        let mut data = DomainMap::new();
        let mut put = |key: &str, value: f64| {
            data.insert(key.to_string(), FieldValue::Number(value));
        };
        put("RPM", rpm.round());
        put("TPS_percent", tps);
        put("MAP_kPa", map);
        put("Baro_kPa", 101.0);
        put("WBO_Lambda", lambda);
        put("LambdaTarget", lambda_target);
        put("CLT_C", coolant);
        put("IAT_C", iat);
        put("Batt_V", battery);
        put("IgnAngle_deg", advance);
        put("PulseWidth_ms", pulse_width);
        put("DwellTime_ms", dwell);
        put("OilTemp_C", oil_temp);
        put("OilPressure_bar", oil_pressure);
        put("Gear", gear);
        put("VSS_kmh", vss);
        data
    }

    fn update_blip_state(&mut self, sim_ms: u64) {
        match self.blip_state {
            BlipState::Idle => {
                if sim_ms >= self.next_blip_at_ms {
                    self.blip_target_rpm = self.rng.gen_range(2000.0..4000.0);
                    self.blip_state = BlipState::RampUp { start_ms: sim_ms };
                }
            }
            BlipState::RampUp { start_ms } => {
                if sim_ms >= start_ms + RAMP_UP_MS {
                    self.blip_state = BlipState::Hold { start_ms: sim_ms };
                }
            }
            BlipState::Hold { start_ms } => {
                if sim_ms >= start_ms + HOLD_MS {
                    self.blip_state = BlipState::RampDown { start_ms: sim_ms };
                }
            }
            BlipState::RampDown { start_ms } => {
                if sim_ms >= start_ms + RAMP_DOWN_MS {
                    self.blip_state = BlipState::Idle;
                    self.next_blip_at_ms = sim_ms + self.rng.gen_range(8000..15000);
                }
            }
        }
    }

    fn target_rpm(&self, sim_ms: u64) -> f64 {
        match self.blip_state {
            BlipState::Idle => IDLE_RPM,
            BlipState::RampUp { start_ms } => {
                let progress = ((sim_ms - start_ms) as f64 / RAMP_UP_MS as f64).min(1.0);
                IDLE_RPM + (self.blip_target_rpm - IDLE_RPM) * progress
            }
            BlipState::Hold { .. } => self.blip_target_rpm,
            BlipState::RampDown { start_ms } => {
                let progress = ((sim_ms - start_ms) as f64 / RAMP_DOWN_MS as f64).min(1.0);
                self.blip_target_rpm + (IDLE_RPM - self.blip_target_rpm) * progress
            }
        }
    }
}

impl Default for EngineSimulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Acquisition worker emitting [`EngineSimulator`] frames into the CAN domain
pub struct DemoCanWorker {
    sim: EngineSimulator,
    started: Option<Instant>,
    frame_period: Duration,
}

impl DemoCanWorker {
    /// Create a worker with an entropy-seeded engine
    pub fn new() -> Self {
        Self::with_simulator(EngineSimulator::new())
    }

    /// Create a worker around a given simulator
    pub fn with_simulator(sim: EngineSimulator) -> Self {
        Self {
            sim,
            started: None,
            frame_period: DEMO_FRAME_PERIOD,
        }
    }
}

impl Default for DemoCanWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl AcquisitionWorker for DemoCanWorker {
    fn name(&self) -> &str {
        "demo-can"
    }

    fn domain(&self) -> Domain {
        Domain::Can
    }

    fn start(&mut self) -> Result<(), HardwareError> {
        self.started.get_or_insert_with(Instant::now);
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<DomainMap>, HardwareError> {
        let started = self.started.ok_or(HardwareError::NotStarted)?;
        // Stands in for the bus receive timeout
        thread::sleep(self.frame_period);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(Some(self.sim.update(elapsed_ms)))
    }

    fn shutdown(&mut self) -> Result<(), HardwareError> {
        self.started = None;
        Ok(())
    }
}
