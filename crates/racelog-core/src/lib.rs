//! # racelog Core Library
//!
//! In-vehicle telemetry orchestration for a race car data node.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - A shared, multi-domain latest-value telemetry store
//! - CSV logging sessions toggled by an operator button
//! - A periodic best-effort telemetry mirror over a publish/subscribe transport
//! - A lap-count relay from the broker onto the control bus
//! - A network lamp tracking the broker link
//! - Coordinated startup and signal-driven shutdown
//!
//! Device drivers and the broker client sit behind the traits in
//! [`hardware`] and [`transport`]. The [`demo`] module provides simulated
//! stand-ins so a node runs on a bench.
//!
//! ## Example
//!
//! ```rust,ignore
//! use racelog_core::prelude::*;
//!
//! let config = NodeConfig::load("racelog.json")?;
//! let signal = ShutdownSignal::new();
//! install_signal_handlers(&signal)?;
//!
//! let node = Orchestrator::start(&config, collaborators, signal).await?;
//! let report = node.run_until_shutdown().await;
//! ```

pub mod config;
pub mod control;
pub mod demo;
pub mod hardware;
pub mod network;
pub mod orchestrator;
pub mod publisher;
pub mod relay;
pub mod session;
pub mod shutdown;
pub mod store;
pub mod transport;
pub mod worker;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ConfigError, NodeConfig};
    pub use crate::control::{ControlLoop, Debouncer, StatusLine};
    pub use crate::hardware::{
        AcquisitionWorker, ControlBusSender, DigitalInputReader, HardwareError, IndicatorOutput,
    };
    pub use crate::network::NetworkMonitor;
    pub use crate::orchestrator::{Collaborators, Orchestrator, OrchestratorError};
    pub use crate::publisher::SnapshotPublisher;
    pub use crate::relay::{CommandRelay, LapOverflowPolicy};
    pub use crate::session::{LoggingSession, Transition};
    pub use crate::shutdown::{install_signal_handlers, ShutdownReport, ShutdownSignal};
    pub use crate::store::{Domain, DomainMap, FieldValue, Snapshot, TelemetryStore};
    pub use crate::transport::{LoopbackTransport, MqttTransport, Transport};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
