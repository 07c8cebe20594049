//! In-process loopback transport
//!
//! Keeps published messages in memory and delivers injected messages to
//! subscribers on the caller's thread. Used by the demo node and tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{MessageHandler, Transport, TransportError};

/// Maximum published messages retained before the oldest are dropped
const MAX_RETAINED: usize = 1024;

/// A message handed to [`LoopbackTransport::publish`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Topic it was published on
    pub topic: String,
    /// Raw payload
    pub payload: Vec<u8>,
}

/// Loopback transport
#[derive(Default)]
pub struct LoopbackTransport {
    connected: AtomicBool,
    /// Refuse `connect` calls (simulates an unreachable broker)
    unreachable: AtomicBool,
    published: Mutex<VecDeque<PublishedMessage>>,
    subscriptions: Mutex<Vec<(String, MessageHandler)>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LoopbackTransport {
    /// Create a disconnected loopback transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `connect` calls fail
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Drop the connection without a `disconnect` call, as a broker outage would
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Deliver an inbound message to every handler subscribed to `topic`.
    ///
    /// Returns the number of handlers invoked.
    pub fn inject(&self, topic: &str, payload: &[u8]) -> usize {
        // Handlers run without the subscription lock held so they may subscribe.
        let handlers: Vec<MessageHandler> = lock(&self.subscriptions)
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, h)| h.clone())
            .collect();

        for handler in &handlers {
            handler(topic, payload);
        }
        handlers.len()
    }

    /// Messages published so far (oldest first)
    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.published).iter().cloned().collect()
    }

    /// Number of messages retained
    pub fn published_count(&self) -> usize {
        lock(&self.published).len()
    }

    /// Topics with at least one subscriber
    pub fn subscribed_topics(&self) -> Vec<String> {
        lock(&self.subscriptions)
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }
}

impl Transport for LoopbackTransport {
    fn connect(&self) -> Result<(), TransportError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(
                "loopback broker unreachable".to_string(),
            ));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let mut published = lock(&self.published);
        if published.len() >= MAX_RETAINED {
            published.pop_front();
        }
        published.push_back(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<(), TransportError> {
        debug!(topic, "loopback subscribe");
        lock(&self.subscriptions).push((topic.to_string(), handler));
        Ok(())
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
