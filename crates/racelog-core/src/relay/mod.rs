//! Command Relay
//!
//! Turns lap-count commands arriving on the command topic into frames on the
//! control bus. Runs on the transport's delivery thread and only does the
//! synchronous parse, build and send; it never touches the store or log file.

mod error;
mod frame;

pub use error::CommandError;
pub use frame::{
    ControlFrame, LapCommand, LapOverflowPolicy, DEFAULT_LAP_FRAME_ID, MAX_STANDARD_ID,
};

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::hardware::ControlBusSender;
use crate::transport::MessageHandler;

/// Default command topic
pub const DEFAULT_COMMAND_TOPIC: &str = "vehicle/command/lap";

/// Marks "nothing relayed yet"; accepted lap counts are never negative
const NO_LAP: i64 = -1;

struct RelayInner {
    topic: String,
    frame_id: u32,
    policy: LapOverflowPolicy,
    bus: Arc<dyn ControlBusSender>,
    last_lap: AtomicI64,
    relayed: AtomicU64,
    dropped: AtomicU64,
}

/// Lap-count relay. Clones share state.
#[derive(Clone)]
pub struct CommandRelay {
    inner: Arc<RelayInner>,
}

impl CommandRelay {
    /// Create a relay for `topic`, sending frames with `frame_id` on `bus`
    pub fn new(
        topic: impl Into<String>,
        frame_id: u32,
        policy: LapOverflowPolicy,
        bus: Arc<dyn ControlBusSender>,
    ) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                topic: topic.into(),
                frame_id,
                policy,
                bus,
                last_lap: AtomicI64::new(NO_LAP),
                relayed: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Topic this relay listens on
    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    /// Last lap count successfully sent on the bus
    pub fn last_relayed(&self) -> Option<i64> {
        match self.inner.last_lap.load(Ordering::SeqCst) {
            NO_LAP => None,
            lap => Some(lap),
        }
    }

    /// Frames sent so far
    pub fn relayed_count(&self) -> u64 {
        self.inner.relayed.load(Ordering::SeqCst)
    }

    /// Messages discarded so far
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::SeqCst)
    }

    /// Parse, build and send one command
    pub fn handle(&self, topic: &str, payload: &[u8]) -> Result<ControlFrame, CommandError> {
        if topic != self.inner.topic {
            return Err(CommandError::UnexpectedTopic(topic.to_string()));
        }

        let cmd = LapCommand::parse(payload)?;
        let byte = self.inner.policy.apply(cmd.lap_count)?;
        let frame = ControlFrame::lap_count(self.inner.frame_id, byte);

        self.inner.bus.send(frame.id, frame.data)?;
        self.inner.last_lap.store(cmd.lap_count, Ordering::SeqCst);
        self.inner.relayed.fetch_add(1, Ordering::SeqCst);
        Ok(frame)
    }

    /// Transport callback: handle and log, never propagate
    pub fn on_message(&self, topic: &str, payload: &[u8]) {
        match self.handle(topic, payload) {
            Ok(frame) => info!(
                lap = frame.data[0],
                "Lap count relayed to control bus (id {:#05x})",
                frame.id
            ),
            Err(CommandError::UnexpectedTopic(t)) => {
                debug!(topic = %t, "Ignoring message on foreign topic");
            }
            Err(e) => {
                self.inner.dropped.fetch_add(1, Ordering::SeqCst);
                warn!("Lap command dropped: {}", e);
            }
        }
    }

    /// Handler suitable for [`crate::transport::Transport::subscribe`]
    pub fn handler(&self) -> MessageHandler {
        let relay = self.clone();
        Arc::new(move |topic: &str, payload: &[u8]| relay.on_message(topic, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::HardwareError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBus {
        frames: Mutex<Vec<(u32, [u8; 8])>>,
    }

    impl ControlBusSender for RecordingBus {
        fn send(&self, id: u32, data: [u8; 8]) -> Result<(), HardwareError> {
            self.frames.lock().unwrap().push((id, data));
            Ok(())
        }
    }

    struct DeadBus;

    impl ControlBusSender for DeadBus {
        fn send(&self, _id: u32, _data: [u8; 8]) -> Result<(), HardwareError> {
            Err(HardwareError::BusDown)
        }
    }

    #[test]
    fn test_relay_sends_one_frame() {
        let bus = Arc::new(RecordingBus::default());
        let relay = CommandRelay::new(
            DEFAULT_COMMAND_TOPIC,
            DEFAULT_LAP_FRAME_ID,
            LapOverflowPolicy::Wrap,
            bus.clone(),
        );

        relay.on_message(DEFAULT_COMMAND_TOPIC, br#"{"lap_count": 3}"#);

        assert_eq!(
            *bus.frames.lock().unwrap(),
            vec![(0x700, [3, 0, 0, 0, 0, 0, 0, 0])]
        );
        assert_eq!(relay.last_relayed(), Some(3));
    }

    #[test]
    fn test_relay_ignores_foreign_topic() {
        let bus = Arc::new(RecordingBus::default());
        let relay = CommandRelay::new("a", 0x700, LapOverflowPolicy::Wrap, bus.clone());

        relay.on_message("b", br#"{"lap_count": 3}"#);
        assert!(bus.frames.lock().unwrap().is_empty());
        assert_eq!(relay.dropped_count(), 0);
    }

    #[test]
    fn test_send_failure_keeps_previous_lap() {
        let relay = CommandRelay::new("a", 0x700, LapOverflowPolicy::Wrap, Arc::new(DeadBus));

        assert!(matches!(
            relay.handle("a", br#"{"lap_count": 4}"#),
            Err(CommandError::Send(HardwareError::BusDown))
        ));
        assert_eq!(relay.last_relayed(), None);
        assert_eq!(relay.relayed_count(), 0);
    }
}
