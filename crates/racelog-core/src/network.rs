//! Network monitor
//!
//! Polls the transport's link state and mirrors it on the network lamp.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::hardware::IndicatorOutput;
use crate::shutdown::ShutdownSignal;
use crate::transport::Transport;

/// Default link check period
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Drives the network lamp from [`Transport::is_connected`]
pub struct NetworkMonitor {
    transport: Arc<dyn Transport>,
    indicators: Arc<dyn IndicatorOutput>,
    interval: Duration,
    last: Option<bool>,
}

impl NetworkMonitor {
    /// Create a monitor. Nothing is checked until the first tick.
    pub fn new(
        transport: Arc<dyn Transport>,
        indicators: Arc<dyn IndicatorOutput>,
        interval: Duration,
    ) -> Self {
        Self {
            transport,
            indicators,
            interval,
            last: None,
        }
    }

    /// Link state seen on the last check
    pub fn last_state(&self) -> Option<bool> {
        self.last
    }

    /// Sample the link once and update the lamp. Returns the link state.
    pub fn check_once(&mut self) -> bool {
        let up = self.transport.is_connected();
        if self.last != Some(up) {
            if up {
                info!("Broker link up");
            } else if self.last.is_some() {
                warn!("Broker link lost");
            } else {
                info!("Broker link down");
            }
            self.indicators.set_network_indicator(up);
            self.last = Some(up);
        }
        up
    }

    /// Check every interval until `signal` is raised
    pub async fn run(mut self, signal: ShutdownSignal) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = signal.triggered() => break,
                _ = ticker.tick() => {
                    self.check_once();
                }
            }
        }
    }
}
