//! MQTT broker transport
//!
//! Wraps a `rumqttc` client. The event loop runs as a Tokio task that
//! reconnects on its own; the link counts as up from the broker's CONNACK
//! until the next connection error. Subscriptions are replayed after every
//! reconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{MessageHandler, Transport, TransportError};
use crate::config::BrokerSettings;

/// Pause between reconnect attempts
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Outgoing request queue depth
const REQUEST_CAPACITY: usize = 32;

type Subscriptions = Arc<Mutex<Vec<(String, MessageHandler)>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport backed by an MQTT broker
pub struct MqttTransport {
    settings: BrokerSettings,
    link: Mutex<Option<(AsyncClient, JoinHandle<()>)>>,
    connected: Arc<AtomicBool>,
    subscriptions: Subscriptions,
}

impl MqttTransport {
    /// Create a transport for `settings`. Nothing is opened until `connect`.
    pub fn new(settings: &BrokerSettings) -> Self {
        Self {
            settings: settings.clone(),
            link: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Broker endpoint as `host:port`
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.settings.host, self.settings.port)
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.settings.client_id.clone(),
            self.settings.host.clone(),
            self.settings.port,
        );
        options.set_keep_alive(Duration::from_secs(self.settings.keep_alive_secs));
        options
    }
}

/// Hand an inbound message to every handler registered for its topic
fn dispatch(subscriptions: &Subscriptions, topic: &str, payload: &[u8]) -> usize {
    let handlers: Vec<MessageHandler> = lock(subscriptions)
        .iter()
        .filter(|(t, _)| t == topic)
        .map(|(_, h)| h.clone())
        .collect();

    for handler in &handlers {
        handler(topic, payload);
    }
    handlers.len()
}

async fn drive(
    mut eventloop: EventLoop,
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    subscriptions: Subscriptions,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected.store(true, Ordering::SeqCst);
                info!("Broker accepted connection");
                let topics: Vec<String> =
                    lock(&subscriptions).iter().map(|(t, _)| t.clone()).collect();
                for topic in topics {
                    if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                        warn!(topic = %topic, "Resubscribe failed: {}", e);
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                dispatch(&subscriptions, &publish.topic, &publish.payload);
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                warn!("Broker closed the connection");
            }
            Ok(_) => {}
            Err(e) => {
                if connected.swap(false, Ordering::SeqCst) {
                    warn!("Broker connection lost: {}", e);
                } else {
                    debug!("Broker unreachable: {}", e);
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

impl Transport for MqttTransport {
    /// Start the client event loop.
    ///
    /// Returns once the loop is running; [`Transport::is_connected`] turns
    /// true when the broker answers. Needs a Tokio runtime.
    fn connect(&self) -> Result<(), TransportError> {
        let mut link = lock(&self.link);
        if link.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let (client, eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);
        let task = runtime.spawn(drive(
            eventloop,
            client.clone(),
            self.connected.clone(),
            self.subscriptions.clone(),
        ));

        info!(
            broker = %self.endpoint(),
            client_id = %self.settings.client_id,
            "Connecting to broker"
        );
        *link = Some((client, task));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let link = lock(&self.link);
        let (client, _) = link.as_ref().ok_or(TransportError::NotConnected)?;
        client
            .try_publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .map_err(|e| TransportError::PublishFailed(e.to_string()))
    }

    fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<(), TransportError> {
        lock(&self.subscriptions).push((topic.to_string(), handler));

        // Otherwise the CONNACK handler subscribes.
        if self.is_connected() {
            if let Some((client, _)) = lock(&self.link).as_ref() {
                client
                    .try_subscribe(topic, QoS::AtMostOnce)
                    .map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;
            }
        }
        debug!(topic, "Subscribed");
        Ok(())
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        let Some((client, task)) = lock(&self.link).take() else {
            return Ok(());
        };
        if self.connected.swap(false, Ordering::SeqCst) {
            if let Err(e) = client.try_disconnect() {
                debug!("Disconnect request not queued: {}", e);
            }
        }
        task.abort();
        info!(broker = %self.endpoint(), "Disconnected from broker");
        Ok(())
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        if let Some((_, task)) = lock(&self.link).take() {
            task.abort();
        }
    }
}
