//! Snapshot publisher driven by its own interval

use std::sync::Arc;
use std::time::Duration;

use racelog_core::publisher::{
    SnapshotPublisher, DEFAULT_PUBLISH_INTERVAL, DEFAULT_TELEMETRY_TOPIC,
};
use racelog_core::shutdown::ShutdownSignal;
use racelog_core::store::{Domain, TelemetryStore};
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

fn spawn_publisher(
    store: &TelemetryStore,
    transport: &Arc<LoopbackTransport>,
    signal: &ShutdownSignal,
) -> tokio::task::JoinHandle<()> {
    let publisher = SnapshotPublisher::new(
        store.clone(),
        transport.clone(),
        DEFAULT_TELEMETRY_TOPIC,
        DEFAULT_PUBLISH_INTERVAL,
    );
    tokio::spawn(publisher.run(signal.clone()))
}

#[tokio::test(start_paused = true)]
async fn test_empty_store_never_published() {
    init_tracing();
    let store = TelemetryStore::new();
    let transport = Arc::new(LoopbackTransport::new());
    transport.connect().unwrap();
    let signal = ShutdownSignal::new();
    let handle = spawn_publisher(&store, &transport, &signal);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(transport.published_count(), 0);

    signal.trigger();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_publishes_within_one_interval() {
    init_tracing();
    let store = TelemetryStore::new();
    let transport = Arc::new(LoopbackTransport::new());
    transport.connect().unwrap();
    let signal = ShutdownSignal::new();
    let handle = spawn_publisher(&store, &transport, &signal);

    tokio::time::sleep(Duration::from_millis(50)).await;
    store.merge(Domain::Can, [("RPM", 4500.0)]);
    tokio::time::sleep(DEFAULT_PUBLISH_INTERVAL).await;

    let published = transport.published();
    assert!(!published.is_empty());
    let json: serde_json::Value = serde_json::from_slice(&published[0].payload).unwrap();
    assert_eq!(json["can"]["RPM"], 4500.0);

    signal.trigger();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_outage_drops_messages_without_backlog() {
    init_tracing();
    let store = TelemetryStore::new();
    store.merge(Domain::Gps, [("gps_fix", true)]);
    let transport = Arc::new(LoopbackTransport::new());
    transport.connect().unwrap();
    let signal = ShutdownSignal::new();
    let handle = spawn_publisher(&store, &transport, &signal);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let before = transport.published_count();
    assert!(before >= 1);

    transport.drop_connection();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(transport.published_count(), before);

    // Reconnecting resumes at the normal rate: no queued burst.
    transport.connect().unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    let resumed = transport.published_count() - before;
    assert!((1..=2).contains(&resumed), "resumed with {} messages", resumed);

    signal.trigger();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_exits_within_one_tick_of_signal() {
    init_tracing();
    let transport = Arc::new(LoopbackTransport::new());
    let signal = ShutdownSignal::new();
    let handle = spawn_publisher(&TelemetryStore::new(), &transport, &signal);

    tokio::time::sleep(Duration::from_millis(30)).await;
    signal.trigger();
    tokio::time::timeout(DEFAULT_PUBLISH_INTERVAL, handle)
        .await
        .expect("publisher did not stop")
        .unwrap();
}
