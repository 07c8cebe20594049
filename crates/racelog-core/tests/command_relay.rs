//! Lap commands from the broker to the control bus

use std::sync::Arc;

use pretty_assertions::assert_eq;
use racelog_core::demo::LoggingBusSender;
use racelog_core::hardware::ControlBusSender;
use racelog_core::relay::{CommandRelay, LapOverflowPolicy, DEFAULT_COMMAND_TOPIC};
use racelog_core::transport::{LoopbackTransport, Transport};

fn wired(policy: LapOverflowPolicy) -> (CommandRelay, Arc<LoggingBusSender>, LoopbackTransport) {
    let bus = Arc::new(LoggingBusSender::new());
    let relay = CommandRelay::new(DEFAULT_COMMAND_TOPIC, 0x700, policy, bus.clone());
    let transport = LoopbackTransport::new();
    transport.connect().unwrap();
    transport.subscribe(relay.topic(), relay.handler()).unwrap();
    (relay, bus, transport)
}

#[test]
fn test_lap_three_becomes_one_frame() {
    let (relay, bus, transport) = wired(LapOverflowPolicy::default());

    assert_eq!(transport.inject(DEFAULT_COMMAND_TOPIC, br#"{"lap_count": 3}"#), 1);

    assert_eq!(bus.frames(), vec![(0x700, [3, 0, 0, 0, 0, 0, 0, 0])]);
    assert_eq!(relay.last_relayed(), Some(3));
    assert_eq!(relay.relayed_count(), 1);
}

#[test]
fn test_overflow_policies() {
    let (relay, bus, transport) = wired(LapOverflowPolicy::Wrap);
    transport.inject(DEFAULT_COMMAND_TOPIC, br#"{"lap_count": 999}"#);
    assert_eq!(bus.frames()[0].1[0], 231);
    assert_eq!(relay.last_relayed(), Some(999));

    let (_, bus, transport) = wired(LapOverflowPolicy::Clamp);
    transport.inject(DEFAULT_COMMAND_TOPIC, br#"{"lap_count": 999}"#);
    assert_eq!(bus.frames()[0].1[0], 255);

    let (relay, bus, transport) = wired(LapOverflowPolicy::Reject);
    transport.inject(DEFAULT_COMMAND_TOPIC, br#"{"lap_count": 999}"#);
    assert!(bus.frames().is_empty());
    assert_eq!(relay.dropped_count(), 1);
    assert_eq!(relay.last_relayed(), None);
}

#[test]
fn test_bad_payloads_are_dropped() {
    let (relay, bus, transport) = wired(LapOverflowPolicy::default());
    let payloads: [&[u8]; 7] = [
        b"not json",
        br#"{"lap": 3}"#,
        br#"{"lap_count": "3"}"#,
        br#"{"lap_count": 2.5}"#,
        br#"{"lap_count": -1}"#,
        br#"{"lap_count": null}"#,
        &[0xff, 0xfe, 0x00],
    ];

    for payload in payloads {
        transport.inject(DEFAULT_COMMAND_TOPIC, payload);
    }

    assert!(bus.frames().is_empty());
    assert_eq!(relay.dropped_count(), payloads.len() as u64);
    assert_eq!(relay.last_relayed(), None);

    // Still alive afterwards
    transport.inject(DEFAULT_COMMAND_TOPIC, br#"{"lap_count": 12}"#);
    assert_eq!(relay.last_relayed(), Some(12));
}

#[test]
fn test_other_topics_never_reach_the_bus() {
    let (relay, bus, transport) = wired(LapOverflowPolicy::default());

    assert_eq!(transport.inject("car/emu/telemetry", br#"{"lap_count": 3}"#), 0);
    assert!(relay.handle("vehicle/command/pit", br#"{"lap_count": 3}"#).is_err());
    assert!(bus.frames().is_empty());
}

#[test]
fn test_send_failure_keeps_previous_lap() {
    let (relay, bus, transport) = wired(LapOverflowPolicy::default());
    transport.inject(DEFAULT_COMMAND_TOPIC, br#"{"lap_count": 5}"#);
    bus.release().unwrap();

    transport.inject(DEFAULT_COMMAND_TOPIC, br#"{"lap_count": 6}"#);

    assert_eq!(relay.last_relayed(), Some(5));
    assert_eq!(relay.relayed_count(), 1);
    assert_eq!(relay.dropped_count(), 1);
}
