//! racelog node - telemetry orchestrator entry point

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use racelog_core::demo::{self, ConsoleIndicators, LoggingBusSender, NoButton};
use racelog_core::prelude::*;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = cli.load_config()?;
    if cli.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    info!(
        version = racelog_core::VERSION,
        log_dir = %config.log_dir.display(),
        broker = %format!("{}:{}", config.broker.host, config.broker.port),
        "Starting racelog node"
    );

    let signal = ShutdownSignal::new();
    install_signal_handlers(&signal).context("installing signal handlers")?;

    // Vehicle drivers live outside this crate; the node runs on simulators.
    let transport: Arc<dyn Transport> = if cli.loopback {
        info!("Using loopback broker");
        Arc::new(LoopbackTransport::new())
    } else {
        Arc::new(MqttTransport::new(&config.broker))
    };
    let collaborators = Collaborators {
        workers: demo::demo_workers(),
        button: Box::new(NoButton),
        indicators: Arc::new(ConsoleIndicators::new()),
        transport,
        bus: Arc::new(LoggingBusSender::new()),
        console: Some(Box::new(std::io::stdout())),
    };
    let node = Orchestrator::start(&config, collaborators, signal.clone()).await?;

    if let Some(lap) = cli.lap {
        let payload = serde_json::json!({ "lap_count": lap }).to_string();
        node.relay().on_message(&config.relay.command_topic, payload.as_bytes());
    }

    if let Some(secs) = cli.run_for {
        let signal = signal.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!("Run time of {}s elapsed", secs);
                    signal.trigger();
                }
                _ = signal.triggered() => {}
            }
        });
    }

    let report = node.run_until_shutdown().await;
    if let Some(path) = &report.closed_log {
        info!(path = %path.display(), "Log saved");
    }
    for task in &report.late_tasks {
        warn!(task = %task, "Did not stop in time");
    }
    for (name, reason) in &report.failures {
        warn!(collaborator = %name, "Release failed: {}", reason);
    }

    info!("racelog node exited");
    Ok(())
}

/// Log to stderr so the status line on stdout stays intact.
///
/// `RUST_LOG` takes precedence over `--verbose`.
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}
