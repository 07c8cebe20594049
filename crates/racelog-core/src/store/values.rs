//! Typed field values
//!
//! Latest-value cells held in each domain map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Latest values for one domain, keyed by field identifier
pub type DomainMap = BTreeMap<String, FieldValue>;

/// A single telemetry field value
///
/// Serializes untagged, so a map of values renders as a plain JSON object
/// (`{"RPM": 4500, "gps_fix": true, "DSG_Mode": "D", "Gear": null}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Numeric reading
    Number(f64),
    /// Flag or status bit
    Bool(bool),
    /// Free-form text (status codes, modes)
    Text(String),
    /// Known field with no current reading
    Absent,
}

impl FieldValue {
    /// Get as number, returning None if not numeric
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as bool, returning None if not a bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as text, returning None if not text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Whether this value carries no reading
    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    /// Truthiness used by status displays: non-zero numbers, `true`, non-empty text
    pub fn is_truthy(&self) -> bool {
        match self {
            FieldValue::Number(v) => *v != 0.0 && !v.is_nan(),
            FieldValue::Bool(v) => *v,
            FieldValue::Text(v) => !v.is_empty(),
            FieldValue::Absent => false,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Text(v) => f.write_str(v),
            FieldValue::Absent => Ok(()),
        }
    }
}

macro_rules! impl_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for FieldValue {
                fn from(v: $t) -> Self {
                    FieldValue::Number(v as f64)
                }
            }
        )*
    };
}

impl_from_number!(f64, f32, i64, i32, i16, i8, u64, u32, u16, u8);

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Absent)
    }
}
