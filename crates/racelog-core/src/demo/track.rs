//! Simulated positioning and inertial sensors
//!
//! A car lapping a circular track at constant speed. GPS fixes arrive at
//! 10 Hz, IMU samples at 100 Hz.

use std::f64::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::hardware::{AcquisitionWorker, HardwareError};
use crate::store::{Domain, DomainMap, FieldValue};

/// Period between simulated GPS fixes
pub const GPS_FIX_PERIOD: Duration = Duration::from_millis(100);

/// Period between simulated IMU samples
pub const IMU_SAMPLE_PERIOD: Duration = Duration::from_millis(10);

const METERS_PER_DEG_LAT: f64 = 111_320.0;
const STANDARD_GRAVITY: f64 = 9.80665;

/// Circular track geometry shared by the GPS and IMU simulators
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackModel {
    /// Centre latitude, degrees
    pub center_lat: f64,
    /// Centre longitude, degrees
    pub center_lon: f64,
    /// Radius in metres
    pub radius_m: f64,
    /// Constant speed in km/h
    pub speed_kph: f64,
}

impl Default for TrackModel {
    fn default() -> Self {
        Self {
            center_lat: 37.2968,
            center_lon: 127.2065,
            radius_m: 180.0,
            speed_kph: 80.0,
        }
    }
}

impl TrackModel {
    fn speed_ms(&self) -> f64 {
        self.speed_kph / 3.6
    }

    /// Angle around the track (radians) after `t` seconds
    pub fn angle_at(&self, t: f64) -> f64 {
        (self.speed_ms() * t / self.radius_m) % TAU
    }

    /// Position after `t` seconds
    pub fn position_at(&self, t: f64) -> (f64, f64) {
        let theta = self.angle_at(t);
        let north_m = self.radius_m * theta.cos();
        let east_m = self.radius_m * theta.sin();
        let lat = self.center_lat + north_m / METERS_PER_DEG_LAT;
        let lon = self.center_lon
            + east_m / (METERS_PER_DEG_LAT * self.center_lat.to_radians().cos());
        (lat, lon)
    }

    /// Course over ground after `t` seconds, degrees from north
    pub fn heading_at(&self, t: f64) -> f64 {
        (self.angle_at(t).to_degrees() + 90.0).rem_euclid(360.0)
    }

    /// Lateral acceleration in g while cornering
    pub fn lateral_g(&self) -> f64 {
        self.speed_ms().powi(2) / self.radius_m / STANDARD_GRAVITY
    }
}

/// Acquisition worker producing GPS fixes
pub struct DemoGpsWorker {
    track: TrackModel,
    started: Option<Instant>,
    /// Fixes before the receiver reports a valid position
    acquire_fixes: u32,
    fixes: u32,
}

impl DemoGpsWorker {
    /// Worker lapping `track`
    pub fn new(track: TrackModel) -> Self {
        Self {
            track,
            started: None,
            acquire_fixes: 5,
            fixes: 0,
        }
    }

    fn fix_at(&mut self, t: f64) -> DomainMap {
        self.fixes = self.fixes.saturating_add(1);
        let valid = self.fixes > self.acquire_fixes;

        let mut data = DomainMap::new();
        data.insert("gps_fix".into(), FieldValue::Bool(valid));
        data.insert("Satellites".into(), FieldValue::from(if valid { 9u8 } else { 2 }));
        if !valid {
            return data;
        }

        let (lat, lon) = self.track.position_at(t);
        data.insert("Latitude".into(), FieldValue::Number(lat));
        data.insert("Longitude".into(), FieldValue::Number(lon));
        data.insert("GPS_Speed_KPH".into(), FieldValue::Number(self.track.speed_kph));
        data.insert("Heading_deg".into(), FieldValue::Number(self.track.heading_at(t)));
        data.insert("Altitude_m".into(), FieldValue::Number(142.0));
        data
    }
}

impl Default for DemoGpsWorker {
    fn default() -> Self {
        Self::new(TrackModel::default())
    }
}

impl AcquisitionWorker for DemoGpsWorker {
    fn name(&self) -> &str {
        "demo-gps"
    }

    fn domain(&self) -> Domain {
        Domain::Gps
    }

    fn start(&mut self) -> Result<(), HardwareError> {
        self.started.get_or_insert_with(Instant::now);
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<DomainMap>, HardwareError> {
        let started = self.started.ok_or(HardwareError::NotStarted)?;
        thread::sleep(GPS_FIX_PERIOD);
        Ok(Some(self.fix_at(started.elapsed().as_secs_f64())))
    }

    fn shutdown(&mut self) -> Result<(), HardwareError> {
        self.started = None;
        self.fixes = 0;
        Ok(())
    }
}

/// Acquisition worker producing accelerometer samples
pub struct DemoAccelWorker {
    track: TrackModel,
    started: Option<Instant>,
    rng: StdRng,
}

impl DemoAccelWorker {
    /// Worker sensing the car on `track`
    pub fn new(track: TrackModel) -> Self {
        Self {
            track,
            started: None,
            rng: StdRng::from_entropy(),
        }
    }

    fn sample(&mut self) -> DomainMap {
        let lateral = self.track.lateral_g();
        let mut noise = || self.rng.gen_range(-0.02..0.02);
        let mut data = DomainMap::new();
        data.insert("ax_g".into(), FieldValue::Number(noise()));
        data.insert("ay_g".into(), FieldValue::Number(lateral + noise()));
        data.insert("az_g".into(), FieldValue::Number(1.0 + noise()));
        data
    }
}

impl Default for DemoAccelWorker {
    fn default() -> Self {
        Self::new(TrackModel::default())
    }
}

impl AcquisitionWorker for DemoAccelWorker {
    fn name(&self) -> &str {
        "demo-accel"
    }

    fn domain(&self) -> Domain {
        Domain::Accel
    }

    fn start(&mut self) -> Result<(), HardwareError> {
        self.started.get_or_insert_with(Instant::now);
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<DomainMap>, HardwareError> {
        self.started.ok_or(HardwareError::NotStarted)?;
        thread::sleep(IMU_SAMPLE_PERIOD);
        Ok(Some(self.sample()))
    }

    fn shutdown(&mut self) -> Result<(), HardwareError> {
        self.started = None;
        Ok(())
    }
}
