//! Command-line interface definitions and parsing

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use racelog_core::config::NodeConfig;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory CSV logs are written to
    #[arg(short, long)]
    pub log_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Do not start a logging session at startup
    #[arg(long)]
    pub no_auto_start: bool,

    /// Do not render the status line
    #[arg(long)]
    pub no_status: bool,

    /// Use the in-process loopback broker instead of MQTT
    #[arg(long)]
    pub loopback: bool,

    /// Broker host, overriding the config file
    #[arg(long, value_name = "HOST")]
    pub broker_host: Option<String>,

    /// Relay one lap command as if it had arrived from the broker
    #[arg(long, value_name = "N")]
    pub lap: Option<i64>,

    /// Shut down by itself after this many seconds
    #[arg(long, value_name = "SECS")]
    pub run_for: Option<u64>,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub dump_config: bool,
}

impl Cli {
    /// Load the config file (or defaults) and apply command-line overrides
    pub fn load_config(&self) -> Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                NodeConfig::load(path)
                    .with_context(|| format!("loading {}", path.display()))?
            }
            None => {
                info!("Using default configuration");
                NodeConfig::default()
            }
        };
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut NodeConfig) {
        if let Some(dir) = &self.log_dir {
            config.log_dir = dir.clone();
        }
        if self.no_auto_start {
            config.logging.auto_start = false;
        }
        if self.no_status {
            config.control.status_line = false;
        }
        if let Some(host) = &self.broker_host {
            config.broker.host = host.clone();
        }
    }
}
