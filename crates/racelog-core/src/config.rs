//! Node configuration
//!
//! Stored as JSON. Every field has a default, so a partial file (or none at
//! all) yields a working configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::publisher::DEFAULT_TELEMETRY_TOPIC;
use crate::relay::{LapOverflowPolicy, DEFAULT_COMMAND_TOPIC, DEFAULT_LAP_FRAME_ID, MAX_STANDARD_ID};

/// Shortest keep-alive the MQTT client accepts
pub const MIN_KEEP_ALIVE_SECS: u64 = 5;

/// Errors loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Complete node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Directory CSV logs are written to
    pub log_dir: PathBuf,

    /// CSV logging
    pub logging: LoggingSettings,

    /// Telemetry mirror
    pub publisher: PublisherSettings,

    /// Lap command relay
    pub relay: RelaySettings,

    /// Control loop
    pub control: ControlSettings,

    /// Acquisition workers
    pub workers: WorkerSettings,

    /// Teardown
    pub shutdown: ShutdownSettings,

    /// Broker endpoint
    pub broker: BrokerSettings,

    /// Network lamp
    pub network: NetworkSettings,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("/home/pi/logs"),
            logging: LoggingSettings::default(),
            publisher: PublisherSettings::default(),
            relay: RelaySettings::default(),
            control: ControlSettings::default(),
            workers: WorkerSettings::default(),
            shutdown: ShutdownSettings::default(),
            broker: BrokerSettings::default(),
            network: NetworkSettings::default(),
        }
    }
}

/// CSV logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Minimum interval between rows in milliseconds
    pub cadence_ms: u64,

    /// Start a session automatically once at startup
    pub auto_start: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            cadence_ms: 50,
            auto_start: true,
        }
    }
}

/// Telemetry mirror settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherSettings {
    /// Publish interval in milliseconds
    pub interval_ms: u64,

    /// Topic snapshots are published on
    pub telemetry_topic: String,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            interval_ms: 200,
            telemetry_topic: DEFAULT_TELEMETRY_TOPIC.to_string(),
        }
    }
}

/// Lap relay settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Topic lap commands arrive on
    pub command_topic: String,

    /// Control-bus identifier of the lap frame
    pub frame_id: u32,

    /// Handling of lap counts above 255
    pub overflow: LapOverflowPolicy,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            command_topic: DEFAULT_COMMAND_TOPIC.to_string(),
            frame_id: DEFAULT_LAP_FRAME_ID,
            overflow: LapOverflowPolicy::default(),
        }
    }
}

/// Control loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    /// Loop period in milliseconds
    pub tick_ms: u64,

    /// Minimum spacing between accepted button presses in milliseconds
    pub debounce_ms: u64,

    /// Render the status line on stdout
    pub status_line: bool,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            debounce_ms: 300,
            status_line: true,
        }
    }
}

/// Acquisition worker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Sleep between polls in milliseconds
    pub idle_sleep_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self { idle_sleep_ms: 1 }
    }
}

/// Teardown settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownSettings {
    /// Time each loop gets to exit in milliseconds
    pub join_timeout_ms: u64,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            join_timeout_ms: 500,
        }
    }
}

/// Broker endpoint used by the MQTT transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    /// Host name
    pub host: String,

    /// TCP port
    pub port: u16,

    /// Client identifier presented to the broker
    pub client_id: String,

    /// Keep-alive interval in seconds
    pub keep_alive_secs: u64,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "test.mosquitto.org".to_string(),
            port: 1883,
            client_id: "racelog-node".to_string(),
            keep_alive_secs: 60,
        }
    }
}

/// Network monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Link check period in milliseconds
    pub check_interval_ms: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            check_interval_ms: 1000,
        }
    }
}

impl NodeConfig {
    /// Load and validate a JSON config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: NodeConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)
    }

    /// Reject values the loops cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("logging.cadence_ms", self.logging.cadence_ms),
            ("publisher.interval_ms", self.publisher.interval_ms),
            ("control.tick_ms", self.control.tick_ms),
            ("shutdown.join_timeout_ms", self.shutdown.join_timeout_ms),
            ("network.check_interval_ms", self.network.check_interval_ms),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than 0", name)));
            }
        }

        if self.broker.host.trim().is_empty() {
            return Err(ConfigError::Invalid("broker.host is empty".into()));
        }
        if self.broker.client_id.trim().is_empty() {
            return Err(ConfigError::Invalid("broker.client_id is empty".into()));
        }
        if self.broker.keep_alive_secs < MIN_KEEP_ALIVE_SECS {
            return Err(ConfigError::Invalid(format!(
                "broker.keep_alive_secs must be at least {}",
                MIN_KEEP_ALIVE_SECS
            )));
        }

        if self.publisher.telemetry_topic.trim().is_empty() {
            return Err(ConfigError::Invalid("publisher.telemetry_topic is empty".into()));
        }
        if self.relay.command_topic.trim().is_empty() {
            return Err(ConfigError::Invalid("relay.command_topic is empty".into()));
        }
        if self.relay.frame_id > MAX_STANDARD_ID {
            return Err(ConfigError::Invalid(format!(
                "relay.frame_id {:#x} exceeds 11-bit range",
                self.relay.frame_id
            )));
        }
        Ok(())
    }

    /// Row cadence
    pub fn log_cadence(&self) -> Duration {
        Duration::from_millis(self.logging.cadence_ms)
    }

    /// Publish interval
    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publisher.interval_ms)
    }

    /// Control loop period
    pub fn control_tick(&self) -> Duration {
        Duration::from_millis(self.control.tick_ms)
    }

    /// Button debounce window
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.control.debounce_ms)
    }

    /// Worker idle sleep
    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.workers.idle_sleep_ms)
    }

    /// Network lamp check period
    pub fn network_check_interval(&self) -> Duration {
        Duration::from_millis(self.network.check_interval_ms)
    }

    /// Join deadline for loops at shutdown
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown.join_timeout_ms)
    }
}
