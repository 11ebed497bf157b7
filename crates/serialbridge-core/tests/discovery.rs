//! Port discovery against simulated ports

mod common;

use common::{init_tracing, Behavior, MockPorts, MockTransport, PortEvent};
use serialbridge_core::config::LinkConfig;
use serialbridge_core::protocol::discovery::probe;
use serialbridge_core::protocol::{
    discover, Connection, Discovery, ProtocolError, Role, Transport, CONNECT_PROBE, END_MARKER,
};
use std::time::{Duration, Instant};

fn fast_config(timeout_ms: u64) -> LinkConfig {
    init_tracing();
    LinkConfig {
        connect_timeout_ms: timeout_ms,
        probe_settle_ms: 5,
        rescan_interval_ms: 5,
        ..LinkConfig::default()
    }
}

fn reply() -> Behavior {
    Behavior::Replies(END_MARKER.as_bytes().to_vec())
}

#[test]
fn test_selects_responsive_port() {
    let ports = MockPorts::new(&[
        ("COM1", Behavior::Silent),
        ("COM2", Behavior::Unavailable),
        ("COM4", Behavior::Silent),
        ("COM3", reply()),
    ]);

    let transport = discover(&ports, &fast_config(1000)).expect("COM3 should answer");
    assert_eq!(transport.name(), "COM3");
    assert!(transport.is_open());

    for other in ["COM1", "COM4"] {
        assert!(ports.open_count(other) >= 1, "{} never opened", other);
        assert_eq!(ports.open_count(other), ports.close_count(other));
    }
    assert!(ports
        .events()
        .contains(&PortEvent::OpenFailed("COM2".to_string())));
    assert_eq!(ports.close_count("COM3"), 0);
    assert_eq!(ports.still_open(), vec!["COM3".to_string()]);

    // Every failed candidate is closed before the next one is opened
    let events = ports.events();
    let com3 = events
        .iter()
        .position(|e| *e == PortEvent::Opened("COM3".to_string()))
        .unwrap();
    let com1_close = events
        .iter()
        .position(|e| *e == PortEvent::Closed("COM1".to_string()))
        .unwrap();
    assert!(com1_close < com3);
}

#[test]
fn test_times_out_without_responsive_port() {
    let ports = MockPorts::new(&[
        ("COM1", Behavior::Silent),
        ("COM2", Behavior::Silent),
        ("COM3", Behavior::Unavailable),
    ]);

    let started = Instant::now();
    let result = discover(&ports, &fast_config(50));
    assert!(matches!(
        result,
        Err(ProtocolError::ConnectTimeout { timeout_ms: 50 })
    ));
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(ports.still_open().is_empty());
    assert!(ports.open_count("COM1") >= 1);
}

#[test]
fn test_times_out_with_default_settle() {
    let ports = MockPorts::new(&[("COM1", Behavior::Silent)]);
    let config = LinkConfig {
        connect_timeout_ms: 50,
        ..LinkConfig::default()
    };

    let result = discover(&ports, &config);
    assert!(matches!(result, Err(ProtocolError::ConnectTimeout { .. })));
    assert!(ports.still_open().is_empty());
}

#[test]
fn test_retries_whole_list_until_timeout() {
    let ports = MockPorts::new(&[("COM1", Behavior::Silent), ("COM2", Behavior::Silent)]);
    let _ = discover(&ports, &fast_config(100));
    assert!(ports.open_count("COM1") >= 2);
    assert!(ports.open_count("COM2") >= 2);
}

#[test]
fn test_wrong_reply_is_rejected() {
    let ports = MockPorts::new(&[("COM1", Behavior::Replies(CONNECT_PROBE.as_bytes().to_vec()))]);
    let result = discover(&ports, &fast_config(30));
    assert!(matches!(result, Err(ProtocolError::ConnectTimeout { .. })));
}

#[test]
fn test_short_reply_is_rejected() {
    let ports = MockPorts::new(&[("COM1", Behavior::Replies(vec![0xFD, 0xFE]))]);
    let result = discover(&ports, &fast_config(30));
    assert!(matches!(result, Err(ProtocolError::ConnectTimeout { .. })));
}

#[test]
fn test_named_port_only() {
    let ports = MockPorts::new(&[("COM1", reply()), ("COM3", reply())]);
    let config = LinkConfig {
        port_name: Some("COM3".to_string()),
        ..fast_config(500)
    };

    let transport = discover(&ports, &config).unwrap();
    assert_eq!(transport.name(), "COM3");
    assert_eq!(ports.open_count("COM1"), 0);
}

#[test]
fn test_builder_overrides_config() {
    let ports = MockPorts::new(&[("/dev/ttyACM0", reply())]);
    let transport = Discovery::default()
        .timeout(Duration::from_millis(500))
        .settle(Duration::from_millis(1))
        .rescan_interval(Duration::from_millis(1))
        .port_name(None)
        .run(&ports)
        .unwrap();
    assert_eq!(transport.name(), "/dev/ttyACM0");
}

#[test]
fn test_probe_writes_connect_probe_and_discards_stale_input() {
    let (mut transport, state) = MockTransport::new("COM7");
    state.lock().unwrap().rx.extend([0x01, 0x02, 0x03]);

    assert!(!probe(&mut transport, Duration::from_millis(1)).unwrap());
    assert_eq!(state.lock().unwrap().tx, CONNECT_PROBE.as_bytes().to_vec());

    state.lock().unwrap().probe_reply = Some(END_MARKER.as_bytes().to_vec());
    assert!(probe(&mut transport, Duration::from_millis(1)).unwrap());
}

#[test]
fn test_connect_with_binds_host_connection() {
    let ports = MockPorts::new(&[("COM1", Behavior::Silent), ("COM3", reply())]);
    let conn = Connection::connect_with(&ports, &fast_config(500)).unwrap();
    assert_eq!(conn.port_name().as_deref(), Some("COM3"));
    assert_eq!(conn.role(), Role::Host);

    drop(conn);
    assert!(ports.still_open().is_empty());
    assert_eq!(ports.close_count("COM3"), 1);
}
