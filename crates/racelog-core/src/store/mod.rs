//! Shared Telemetry Store
//!
//! Latest-value cache shared between acquisition workers and consumers.
//!
//! Producers call [`TelemetryStore::merge`] from their own threads; consumers
//! take a [`Snapshot`]. A single mutex guards all three domain maps, so a
//! snapshot never sees one domain ahead of another relative to the same call.

mod values;

pub use values::{DomainMap, FieldValue};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Sensor/bus category a field belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Control-bus decoded channels
    Can,
    /// Positioning
    Gps,
    /// Inertial
    Accel,
}

impl Domain {
    /// All domains, in projection order
    pub const ALL: [Domain; 3] = [Domain::Can, Domain::Gps, Domain::Accel];

    /// Key used in published payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Can => "can",
            Domain::Gps => "gps",
            Domain::Accel => "accel",
        }
    }

    fn index(self) -> usize {
        match self {
            Domain::Can => 0,
            Domain::Gps => 1,
            Domain::Accel => 2,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of every domain map
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Wall-clock capture time
    pub captured_at: DateTime<Local>,
    /// Control-bus fields
    pub can: DomainMap,
    /// Positioning fields
    pub gps: DomainMap,
    /// Inertial fields
    pub accel: DomainMap,
    last_merge: [Option<DateTime<Local>>; 3],
}

impl Snapshot {
    /// Map for one domain
    pub fn domain(&self, domain: Domain) -> &DomainMap {
        match domain {
            Domain::Can => &self.can,
            Domain::Gps => &self.gps,
            Domain::Accel => &self.accel,
        }
    }

    /// Look up a field in one domain
    pub fn get(&self, domain: Domain, key: &str) -> Option<&FieldValue> {
        self.domain(domain).get(key)
    }

    /// Wall-clock time of the most recent merge into `domain`, if any.
    ///
    /// Fields carry no per-key timestamp; this is the only staleness hint.
    pub fn last_merged(&self, domain: Domain) -> Option<DateTime<Local>> {
        self.last_merge[domain.index()]
    }

    /// True when no domain holds any field
    pub fn is_empty(&self) -> bool {
        self.can.is_empty() && self.gps.is_empty() && self.accel.is_empty()
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    maps: [DomainMap; 3],
    last_merge: [Option<DateTime<Local>>; 3],
    merges: u64,
}

/// Concurrency-safe multi-domain latest-value cache
///
/// Cloning is cheap; clones share the same maps.
#[derive(Debug, Clone, Default)]
pub struct TelemetryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl TelemetryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    // Every critical section leaves the maps consistent, so a panic elsewhere
    // while holding the lock cannot corrupt them.
    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite fields in one domain, last write wins per key.
    ///
    /// The whole batch is applied under a single lock acquisition.
    pub fn merge<I, K, V>(&self, domain: Domain, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        let fields: Vec<(String, FieldValue)> = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        if fields.is_empty() {
            return;
        }

        let mut inner = self.lock();
        let idx = domain.index();
        inner.maps[idx].extend(fields);
        inner.last_merge[idx] = Some(Local::now());
        inner.merges += 1;
    }

    /// Consistent copy of all domain maps plus a capture timestamp
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.lock();
        let [can, gps, accel] = inner.maps.clone();
        Snapshot {
            captured_at: Local::now(),
            can,
            gps,
            accel,
            last_merge: inner.last_merge,
        }
    }

    /// True when every domain map is empty
    pub fn is_empty(&self) -> bool {
        self.lock().maps.iter().all(|m| m.is_empty())
    }

    /// Number of merges applied since creation
    pub fn merge_count(&self) -> u64 {
        self.lock().merges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_overwrites_per_key() {
        let store = TelemetryStore::new();
        store.merge(Domain::Can, [("RPM", 1000.0), ("TPS_percent", 3.0)]);
        store.merge(Domain::Can, [("RPM", 4500.0)]);

        let snap = store.snapshot();
        assert_eq!(snap.get(Domain::Can, "RPM"), Some(&FieldValue::Number(4500.0)));
        assert_eq!(
            snap.get(Domain::Can, "TPS_percent"),
            Some(&FieldValue::Number(3.0))
        );
        assert!(snap.gps.is_empty());
        assert_eq!(store.merge_count(), 2);
    }

    #[test]
    fn test_empty_merge_is_ignored() {
        let store = TelemetryStore::new();
        store.merge(Domain::Gps, Vec::<(String, FieldValue)>::new());

        assert!(store.is_empty());
        assert_eq!(store.snapshot().last_merged(Domain::Gps), None);
    }

    #[test]
    fn test_last_merged_tracks_domain() {
        let store = TelemetryStore::new();
        store.merge(Domain::Accel, [("ax_g", 0.1)]);

        let snap = store.snapshot();
        assert!(snap.last_merged(Domain::Accel).is_some());
        assert!(snap.last_merged(Domain::Can).is_none());
        assert!(!snap.is_empty());
    }
}
