//! End-to-end node lifecycle with simulated collaborators

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pretty_assertions::assert_eq;
use racelog_core::config::NodeConfig;
use racelog_core::demo::{self, ConsoleIndicators, LoggingBusSender, NoButton};
use racelog_core::hardware::{AcquisitionWorker, HardwareError};
use racelog_core::orchestrator::{Collaborators, Orchestrator};
use racelog_core::session::{lock_session, schema::header_line};
use racelog_core::shutdown::{ShutdownReport, ShutdownSignal};
use racelog_core::store::{Domain, DomainMap, FieldValue};
use racelog_core::transport::{LoopbackTransport, Transport};

/// Route node logs through the test harness; `RUST_LOG` overrides the level.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("racelog_core=debug")),
        )
        .with_test_writer()
        .try_init();
}

struct Rig {
    indicators: Arc<ConsoleIndicators>,
    transport: Arc<LoopbackTransport>,
    bus: Arc<LoggingBusSender>,
}

impl Rig {
    fn new() -> Self {
        Self {
            indicators: Arc::new(ConsoleIndicators::new()),
            transport: Arc::new(LoopbackTransport::new()),
            bus: Arc::new(LoggingBusSender::new()),
        }
    }

    fn collaborators(&self, workers: Vec<Box<dyn AcquisitionWorker>>) -> Collaborators {
        Collaborators {
            workers,
            button: Box::new(NoButton),
            indicators: self.indicators.clone(),
            transport: self.transport.clone(),
            bus: self.bus.clone(),
            console: None,
        }
    }
}

fn config_in(dir: &std::path::Path) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.log_dir = dir.to_path_buf();
    config
}

/// Polls a fixed number of times, then fails like an unplugged adapter
struct FailingWorker {
    polls_left: u32,
}

impl AcquisitionWorker for FailingWorker {
    fn name(&self) -> &str {
        "flaky-imu"
    }

    fn domain(&self) -> Domain {
        Domain::Accel
    }

    fn start(&mut self) -> Result<(), HardwareError> {
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<DomainMap>, HardwareError> {
        if self.polls_left == 0 {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "i2c bus gone").into());
        }
        self.polls_left -= 1;
        let mut fields = DomainMap::new();
        fields.insert("az_g".into(), FieldValue::from(1.0));
        Ok(Some(fields))
    }

    fn shutdown(&mut self) -> Result<(), HardwareError> {
        Ok(())
    }
}

/// Panics on shutdown
struct PanickyWorker;

impl AcquisitionWorker for PanickyWorker {
    fn name(&self) -> &str {
        "panicky"
    }

    fn domain(&self) -> Domain {
        Domain::Gps
    }

    fn start(&mut self) -> Result<(), HardwareError> {
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<DomainMap>, HardwareError> {
        thread::sleep(Duration::from_millis(5));
        Ok(None)
    }

    fn shutdown(&mut self) -> Result<(), HardwareError> {
        panic!("driver fault during close");
    }
}

/// Blocks far longer than any join deadline
struct StuckWorker;

impl AcquisitionWorker for StuckWorker {
    fn name(&self) -> &str {
        "stuck"
    }

    fn domain(&self) -> Domain {
        Domain::Can
    }

    fn start(&mut self) -> Result<(), HardwareError> {
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<DomainMap>, HardwareError> {
        thread::sleep(Duration::from_millis(800));
        Ok(None)
    }

    fn shutdown(&mut self) -> Result<(), HardwareError> {
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_run_logs_mirrors_and_shuts_down() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let rig = Rig::new();
    let signal = ShutdownSignal::new();

    let mut node = Orchestrator::start(&config, rig.collaborators(demo::demo_workers()), signal)
        .await
        .unwrap();
    assert!(rig.transport.is_connected());
    assert_eq!(rig.transport.subscribed_topics(), vec![config.relay.command_topic.clone()]);
    assert!(lock_session(node.session()).is_active());

    tokio::time::sleep(Duration::from_millis(400)).await;
    rig.transport.inject(&config.relay.command_topic, br#"{"lap_count": 3}"#);
    assert_eq!(node.relay().last_relayed(), Some(3));
    assert!(node.store().snapshot().get(Domain::Can, "RPM").is_some());
    assert!(rig.transport.published_count() >= 1);
    assert!(rig.indicators.network_on());

    let report = node.shutdown().await;
    assert!(report.is_clean(), "{:?}", report);

    let path = report.closed_log.clone().expect("log closed at shutdown");
    let content = std::fs::read_to_string(&path).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some(header_line().as_str()));
    assert!(lines.count() >= 1);

    assert!(!rig.transport.is_connected());
    assert!(rig.bus.is_released());
    assert_eq!(rig.bus.frames(), vec![(0x700, [3, 0, 0, 0, 0, 0, 0, 0])]);
    assert!(!rig.indicators.logging_on());
    assert!(!rig.indicators.network_on());
    assert!(!lock_session(node.session()).is_active());

    // Second pass is a no-op and the file is not touched again.
    assert_eq!(node.shutdown().await, ShutdownReport::default());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unreachable_broker_keeps_logging() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let rig = Rig::new();
    rig.transport.set_unreachable(true);

    let mut node = Orchestrator::start(
        &config,
        rig.collaborators(demo::demo_workers()),
        ShutdownSignal::new(),
    )
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(rig.transport.published_count(), 0);
    assert!(!rig.indicators.network_on());
    assert!(lock_session(node.session()).rows_written() > 0);

    let report = node.shutdown().await;
    assert!(report.is_clean(), "{:?}", report);
    assert!(report.closed_log.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fatal_worker_error_raises_indicator_only() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.logging.auto_start = false;
    let rig = Rig::new();

    let workers: Vec<Box<dyn AcquisitionWorker>> = vec![
        Box::new(demo::DemoCanWorker::new()),
        Box::new(FailingWorker { polls_left: 3 }),
    ];
    let mut node = Orchestrator::start(&config, rig.collaborators(workers), ShutdownSignal::new())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(rig.indicators.error_on());
    assert!(!node.signal().is_triggered());

    let snapshot = node.store().snapshot();
    assert_eq!(snapshot.get(Domain::Accel, "az_g"), Some(&FieldValue::Number(1.0)));
    assert!(snapshot.get(Domain::Can, "RPM").is_some());

    let report = node.shutdown().await;
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(report.closed_log, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_release_failure_does_not_block_the_rest() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let rig = Rig::new();

    let mut node = Orchestrator::start(
        &config,
        rig.collaborators(vec![Box::new(PanickyWorker)]),
        ShutdownSignal::new(),
    )
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let report = node.shutdown().await;
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "panicky");
    assert!(report.closed_log.is_some());
    assert!(rig.bus.is_released());
    assert!(!rig.transport.is_connected());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stuck_worker_misses_deadline() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.shutdown.join_timeout_ms = 100;
    let rig = Rig::new();

    let mut node = Orchestrator::start(
        &config,
        rig.collaborators(vec![Box::new(StuckWorker)]),
        ShutdownSignal::new(),
    )
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = tokio::time::Instant::now();
    let report = node.shutdown().await;

    assert_eq!(report.late_tasks, vec!["stuck".to_string()]);
    assert!(report.closed_log.is_some());
    assert!(rig.bus.is_released());
    assert!(started.elapsed() < Duration::from_millis(700));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_signal_ends_run_until_shutdown() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let rig = Rig::new();
    let signal = ShutdownSignal::new();

    let node = Orchestrator::start(
        &config,
        rig.collaborators(demo::demo_workers()),
        signal.clone(),
    )
    .await
    .unwrap();
    let running = tokio::spawn(node.run_until_shutdown());

    tokio::time::sleep(Duration::from_millis(150)).await;
    signal.trigger();
    let report = tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .expect("node did not stop")
        .unwrap();

    assert!(report.is_clean(), "{:?}", report);
    assert!(report.closed_log.is_some());
    assert!(rig.bus.is_released());
}
