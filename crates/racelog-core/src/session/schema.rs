//! CSV log schema
//!
//! Fixed column order and snapshot-to-row projection.

use std::borrow::Cow;

use crate::store::{FieldValue, Snapshot};

/// Timestamp format used for row stamps (millisecond resolution, local time)
pub const ROW_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Column order of every log file. Never changes within a process.
pub const CSV_COLUMNS: [&str; 60] = [
    "Timestamp",
    // GPS
    "Latitude",
    "Longitude",
    "GPS_Speed_KPH",
    "Satellites",
    "Altitude_m",
    "Heading_deg",
    // ECU stream
    "RPM",
    "TPS_percent",
    "IAT_C",
    "MAP_kPa",
    "PulseWidth_ms",
    "AnalogIn1_V",
    "AnalogIn2_V",
    "AnalogIn3_V",
    "AnalogIn4_V",
    "VSS_kmh",
    "Baro_kPa",
    "OilTemp_C",
    "OilPressure_bar",
    "FuelPressure_bar",
    "CLT_C",
    "EOT_OUT",
    "fuelPumpTemp",
    "IgnAngle_deg",
    "DwellTime_ms",
    "WBO_Lambda",
    "LambdaCorrection_percent",
    "EGT1_C",
    "EGT2_C",
    "Gear",
    "EmuTemp_C",
    "Batt_V",
    "CEL_Error",
    "Flags1",
    "Ethanol_percent",
    "DBW_Pos_percent",
    "DBW_Target_percent",
    "TC_drpm_raw",
    "TC_drpm",
    "TC_TorqueReduction_percent",
    "PitLimit_TorqueReduction_percent",
    "AnalogIn5_V",
    "AnalogIn6_V",
    "OutFlags1",
    "OutFlags2",
    "OutFlags3",
    "OutFlags4",
    "BoostTarget_kPa",
    "PWM1_DC_percent",
    "DSG_Mode",
    "LambdaTarget",
    "PWM2_DC_percent",
    "FuelUsed_L",
    // IMU
    "ax_g",
    "ay_g",
    "az_g",
    "gx_dps",
    "gy_dps",
    "gz_dps",
];

/// The header line (without line terminator)
pub fn header_line() -> String {
    CSV_COLUMNS.join(",")
}

/// Quote a cell if it contains a separator, quote or line break
pub fn escape_cell(cell: &str) -> Cow<'_, str> {
    if cell.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", cell.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(cell)
    }
}

fn render(value: Option<&FieldValue>) -> String {
    match value {
        None | Some(FieldValue::Absent) => String::new(),
        Some(FieldValue::Number(v)) if !v.is_finite() => String::new(),
        Some(FieldValue::Text(s)) => escape_cell(s).into_owned(),
        Some(v) => v.to_string(),
    }
}

/// Project a snapshot onto [`CSV_COLUMNS`].
///
/// `timestamp` fills the first column. Keys present in several domains
/// resolve Accel over CAN over GPS. Fields outside the schema are ignored;
/// missing ones render as empty cells.
pub fn project_row(snapshot: &Snapshot, timestamp: &str) -> Vec<String> {
    let mut row = Vec::with_capacity(CSV_COLUMNS.len());
    row.push(escape_cell(timestamp).into_owned());

    for column in &CSV_COLUMNS[1..] {
        let value = [&snapshot.accel, &snapshot.can, &snapshot.gps]
            .into_iter()
            .find_map(|map| map.get(*column));
        row.push(render(value));
    }
    row
}
