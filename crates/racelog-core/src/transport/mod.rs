//! Publish/subscribe transport
//!
//! The orchestrator mirrors telemetry to, and receives lap commands from, a
//! broker through this interface. Broker/TLS internals live in the concrete
//! implementation.

mod error;
mod loopback;
mod mqtt;

pub use error::TransportError;
pub use loopback::{LoopbackTransport, PublishedMessage};
pub use mqtt::{MqttTransport, RECONNECT_DELAY};

use std::sync::Arc;

/// Callback invoked with `(topic, payload)` for each inbound message
///
/// Runs on whatever thread the transport delivers on.
pub type MessageHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Best-effort publish/subscribe channel
pub trait Transport: Send + Sync {
    /// Connect to the broker
    fn connect(&self) -> Result<(), TransportError>;

    /// Whether the transport currently believes it is connected
    fn is_connected(&self) -> bool;

    /// Fire-and-forget publish
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Register `handler` for messages on `topic`
    fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<(), TransportError>;

    /// Disconnect from the broker. Idempotent.
    fn disconnect(&self) -> Result<(), TransportError>;
}
