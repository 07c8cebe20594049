//! Snapshot Publisher
//!
//! Mirrors the store to the telemetry topic at a fixed interval. Delivery is
//! at-most-once: nothing is queued or retried while the transport is down.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::session::schema::ROW_TIMESTAMP_FORMAT;
use crate::shutdown::ShutdownSignal;
use crate::store::{DomainMap, Snapshot, TelemetryStore};
use crate::transport::Transport;

/// Default publish interval (5 Hz)
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_millis(200);

/// Default telemetry topic
pub const DEFAULT_TELEMETRY_TOPIC: &str = "car/emu/telemetry";

/// Wire form of one published snapshot
#[derive(Debug, Serialize)]
pub struct TelemetryMessage<'a> {
    /// Capture time, `YYYY-MM-DD HH:MM:SS.mmm` local
    pub timestamp: String,
    /// Control-bus fields
    pub can: &'a DomainMap,
    /// Positioning fields
    pub gps: &'a DomainMap,
    /// Inertial fields
    pub accel: &'a DomainMap,
}

impl<'a> From<&'a Snapshot> for TelemetryMessage<'a> {
    fn from(snapshot: &'a Snapshot) -> Self {
        Self {
            timestamp: snapshot.captured_at.format(ROW_TIMESTAMP_FORMAT).to_string(),
            can: &snapshot.can,
            gps: &snapshot.gps,
            accel: &snapshot.accel,
        }
    }
}

/// Serialize a snapshot as the telemetry JSON object
pub fn encode_snapshot(snapshot: &Snapshot) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&TelemetryMessage::from(snapshot))
}

/// Periodic best-effort mirror of the store
pub struct SnapshotPublisher {
    store: TelemetryStore,
    transport: Arc<dyn Transport>,
    topic: String,
    interval: Duration,
}

impl SnapshotPublisher {
    /// Create a publisher
    pub fn new(
        store: TelemetryStore,
        transport: Arc<dyn Transport>,
        topic: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            transport,
            topic: topic.into(),
            interval,
        }
    }

    /// Publish the current snapshot once.
    ///
    /// Returns true if a message was handed to the transport. Empty stores
    /// and a disconnected transport are skipped silently.
    pub fn publish_once(&self) -> bool {
        let snapshot = self.store.snapshot();
        if snapshot.is_empty() || !self.transport.is_connected() {
            return false;
        }

        let payload = match encode_snapshot(&snapshot) {
            Ok(p) => p,
            Err(e) => {
                debug!("Snapshot not serializable: {}", e);
                return false;
            }
        };

        match self.transport.publish(&self.topic, &payload) {
            Ok(()) => true,
            Err(e) => {
                debug!("Telemetry publish dropped: {}", e);
                false
            }
        }
    }

    /// Publish every interval until `signal` is raised
    pub async fn run(self, signal: ShutdownSignal) {
        info!(
            topic = %self.topic,
            interval_ms = self.interval.as_millis() as u64,
            "Snapshot publisher started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = signal.triggered() => break,
                _ = ticker.tick() => {
                    self.publish_once();
                }
            }
        }

        info!("Snapshot publisher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Domain;
    use crate::transport::LoopbackTransport;

    fn publisher(store: &TelemetryStore, transport: &Arc<LoopbackTransport>) -> SnapshotPublisher {
        SnapshotPublisher::new(
            store.clone(),
            transport.clone(),
            DEFAULT_TELEMETRY_TOPIC,
            DEFAULT_PUBLISH_INTERVAL,
        )
    }

    #[test]
    fn test_empty_store_is_not_published() {
        let store = TelemetryStore::new();
        let transport = Arc::new(LoopbackTransport::new());
        transport.connect().unwrap();

        assert!(!publisher(&store, &transport).publish_once());
        assert_eq!(transport.published_count(), 0);
    }

    #[test]
    fn test_disconnected_publish_is_dropped() {
        let store = TelemetryStore::new();
        store.merge(Domain::Can, [("RPM", 4500.0)]);
        let transport = Arc::new(LoopbackTransport::new());

        assert!(!publisher(&store, &transport).publish_once());
        assert_eq!(transport.published_count(), 0);
    }

    #[test]
    fn test_payload_shape() {
        let store = TelemetryStore::new();
        store.merge(Domain::Can, [("RPM", 4500.0)]);
        let transport = Arc::new(LoopbackTransport::new());
        transport.connect().unwrap();

        assert!(publisher(&store, &transport).publish_once());

        let msg = &transport.published()[0];
        assert_eq!(msg.topic, DEFAULT_TELEMETRY_TOPIC);
        let json: serde_json::Value = serde_json::from_slice(&msg.payload).unwrap();
        assert_eq!(json["can"]["RPM"], 4500.0);
        assert!(json["gps"].as_object().unwrap().is_empty());
        assert!(json["accel"].as_object().unwrap().is_empty());
        assert_eq!(json["timestamp"].as_str().unwrap().len(), 23);
    }
}
