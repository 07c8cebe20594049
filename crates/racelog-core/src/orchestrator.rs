//! Telemetry orchestrator
//!
//! Brings the node up in order (workers, transport, relay subscription,
//! loops, automatic logging) and hands everything it started to a
//! [`ShutdownCoordinator`].

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{ConfigError, NodeConfig};
use crate::control::ControlLoop;
use crate::hardware::{
    AcquisitionWorker, ControlBusSender, DigitalInputReader, HardwareError, IndicatorOutput,
};
use crate::network::NetworkMonitor;
use crate::publisher::SnapshotPublisher;
use crate::relay::CommandRelay;
use crate::session::{lock_session, LoggingSession, SharedSession, Transition};
use crate::shutdown::{ShutdownCoordinator, ShutdownReport, ShutdownSignal};
use crate::store::TelemetryStore;
use crate::transport::Transport;
use crate::worker::{self, SharedWorker};

/// Errors that abort startup
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Worker {worker} failed to start: {source}")]
    Startup {
        worker: String,
        #[source]
        source: HardwareError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Everything the orchestrator drives but does not implement
pub struct Collaborators {
    /// One acquisition worker per device
    pub workers: Vec<Box<dyn AcquisitionWorker>>,
    /// Logging toggle button
    pub button: Box<dyn DigitalInputReader>,
    /// Status lamps
    pub indicators: Arc<dyn IndicatorOutput>,
    /// Broker connection
    pub transport: Arc<dyn Transport>,
    /// Control-bus transmitter for lap frames
    pub bus: Arc<dyn ControlBusSender>,
    /// Where the status line goes, if anywhere
    pub console: Option<Box<dyn Write + Send>>,
}

/// A running node
pub struct Orchestrator {
    store: TelemetryStore,
    session: SharedSession,
    relay: CommandRelay,
    transport: Arc<dyn Transport>,
    coordinator: ShutdownCoordinator,
}

impl Orchestrator {
    /// Start every loop and worker.
    ///
    /// If a worker fails to start, the error indicator is raised, whatever
    /// was already started is released and the error is returned before any
    /// acquisition thread runs. An unreachable broker is only a warning.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn start(
        config: &NodeConfig,
        collaborators: Collaborators,
        signal: ShutdownSignal,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;

        let Collaborators {
            workers,
            button,
            indicators,
            transport,
            bus,
            console,
        } = collaborators;

        let store = TelemetryStore::new();
        let session: SharedSession = Arc::new(Mutex::new(LoggingSession::new(
            config.log_dir.clone(),
            config.log_cadence(),
            indicators.clone(),
        )));

        let mut coordinator = ShutdownCoordinator::new(signal.clone(), config.join_timeout());
        coordinator.set_session(session.clone());
        coordinator.set_transport(transport.clone());
        coordinator.set_bus(bus.clone());

        let workers: Vec<(String, SharedWorker)> = workers
            .into_iter()
            .map(|w| (w.name().to_string(), worker::shared(w)))
            .collect();
        for (name, worker) in &workers {
            coordinator.add_worker(name.clone(), worker.clone());
        }

        for (name, worker) in &workers {
            let started = worker.lock().unwrap_or_else(PoisonError::into_inner).start();
            if let Err(source) = started {
                error!(worker = %name, "Startup failed: {}", source);
                indicators.set_error_indicator(true);
                coordinator.shutdown().await;
                return Err(OrchestratorError::Startup {
                    worker: name.clone(),
                    source,
                });
            }
            info!(worker = %name, "Worker started");
        }
        // Registered only now so a failed start leaves the error lamp lit.
        coordinator.set_indicators(indicators.clone());

        match transport.connect() {
            Ok(()) => info!("Broker connection started"),
            Err(e) => warn!("Broker unavailable, continuing offline: {}", e),
        }

        let relay = CommandRelay::new(
            config.relay.command_topic.clone(),
            config.relay.frame_id,
            config.relay.overflow,
            bus,
        );
        if let Err(e) = transport.subscribe(relay.topic(), relay.handler()) {
            warn!(topic = relay.topic(), "Lap commands unavailable: {}", e);
        }

        for (name, worker) in workers {
            let handle = worker::spawn_worker(
                worker,
                store.clone(),
                signal.clone(),
                indicators.clone(),
                config.idle_sleep(),
            );
            coordinator.register_task(name, handle);
        }

        let publisher = SnapshotPublisher::new(
            store.clone(),
            transport.clone(),
            config.publisher.telemetry_topic.clone(),
            config.publish_interval(),
        );
        coordinator.register_task("publisher", tokio::spawn(publisher.run(signal.clone())));

        let monitor = NetworkMonitor::new(
            transport.clone(),
            indicators.clone(),
            config.network_check_interval(),
        );
        coordinator.register_task("network-monitor", tokio::spawn(monitor.run(signal.clone())));

        if config.logging.auto_start {
            let toggled = lock_session(&session).toggle(Instant::now());
            if let Err(e) = toggled {
                warn!("Automatic logging start failed: {}", e);
            }
        }

        let mut control = ControlLoop::new(store.clone(), session.clone(), button)
            .with_tick(config.control_tick())
            .with_debounce(config.debounce())
            .with_relay(relay.clone());
        if let Some(console) = console.filter(|_| config.control.status_line) {
            control = control.with_console(console);
        }
        coordinator.register_task("control", tokio::spawn(control.run(signal.clone())));

        info!("Node running");
        Ok(Self {
            store,
            session,
            relay,
            transport,
            coordinator,
        })
    }

    /// Live telemetry
    pub fn store(&self) -> &TelemetryStore {
        &self.store
    }

    /// Logging session
    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Lap relay
    pub fn relay(&self) -> &CommandRelay {
        &self.relay
    }

    /// Broker connection
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// The signal every loop observes
    pub fn signal(&self) -> &ShutdownSignal {
        self.coordinator.signal()
    }

    /// Toggle logging as if the button had been pressed
    pub fn toggle_logging(&self) -> Option<Transition> {
        lock_session(&self.session).toggle(Instant::now()).ok()
    }

    /// Resolves once shutdown has been requested
    pub async fn wait(&self) {
        self.coordinator.signal().triggered().await
    }

    /// Stop everything. Later calls return an empty report.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        self.coordinator.shutdown().await
    }

    /// Wait for the signal, then shut down
    pub async fn run_until_shutdown(mut self) -> ShutdownReport {
        self.wait().await;
        self.shutdown().await
    }
}
