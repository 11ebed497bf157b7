//! Mock transports and port providers shared by the integration tests

#![allow(dead_code)]

use serialbridge_core::protocol::{PortProvider, ProtocolError, Transport, CONNECT_PROBE};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

/// Route library logs into the test harness output (`RUST_LOG=debug cargo test`)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Port lifecycle events recorded by the mocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortEvent {
    Opened(String),
    OpenFailed(String),
    Closed(String),
}

pub type EventLog = Arc<Mutex<Vec<PortEvent>>>;

/// Shared state behind a mock transport
#[derive(Debug, Default)]
pub struct MockState {
    pub rx: VecDeque<u8>,
    pub tx: Vec<u8>,
    pub open: bool,
    /// Bytes queued for reading whenever the connect probe is written
    pub probe_reply: Option<Vec<u8>>,
    /// Report one more pending byte than is actually queued
    pub overstate_available: bool,
    pub fail_writes: bool,
}

/// In-memory transport; the test keeps a handle to the shared state
pub struct MockTransport {
    name: String,
    state: Arc<Mutex<MockState>>,
    log: EventLog,
}

impl MockTransport {
    pub fn new(name: &str) -> (Self, Arc<Mutex<MockState>>) {
        Self::with_log(name, Arc::new(Mutex::new(Vec::new())))
    }

    pub fn with_log(name: &str, log: EventLog) -> (Self, Arc<Mutex<MockState>>) {
        let state = Arc::new(Mutex::new(MockState {
            open: true,
            ..MockState::default()
        }));
        let transport = Self {
            name: name.to_string(),
            state: Arc::clone(&state),
            log,
        };
        (transport, state)
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

impl Transport for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let state = self.state.lock().unwrap();
        let extra = usize::from(state.overstate_available);
        Ok(state.rx.len() + extra)
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.state.lock().unwrap().rx.pop_front())
    }

    fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
        }
        state.tx.extend_from_slice(data);
        if contains(data, CONNECT_PROBE.as_bytes()) {
            if let Some(reply) = state.probe_reply.clone() {
                state.rx.extend(reply);
            }
        }
        Ok(())
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.state.lock().unwrap().rx.clear();
        Ok(())
    }

    fn discard_output(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.open {
            state.open = false;
            self.log
                .lock()
                .unwrap()
                .push(PortEvent::Closed(self.name.clone()));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// How a simulated port behaves when probed
#[derive(Debug, Clone)]
pub enum Behavior {
    Silent,
    Replies(Vec<u8>),
    Unavailable,
}

/// Simulated set of serial ports
pub struct MockPorts {
    ports: Vec<(String, Behavior)>,
    pub log: EventLog,
    pub states: Mutex<Vec<(String, Arc<Mutex<MockState>>)>>,
}

impl MockPorts {
    pub fn new(ports: &[(&str, Behavior)]) -> Self {
        Self {
            ports: ports
                .iter()
                .map(|(name, b)| (name.to_string(), b.clone()))
                .collect(),
            log: Arc::new(Mutex::new(Vec::new())),
            states: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<PortEvent> {
        self.log.lock().unwrap().clone()
    }

    pub fn open_count(&self, name: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| **e == PortEvent::Opened(name.to_string()))
            .count()
    }

    pub fn close_count(&self, name: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| **e == PortEvent::Closed(name.to_string()))
            .count()
    }

    /// Ports opened and not closed again
    pub fn still_open(&self) -> Vec<String> {
        self.states
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| s.lock().unwrap().open)
            .map(|(n, _)| n.clone())
            .collect()
    }
}

impl PortProvider for MockPorts {
    fn list_ports(&self) -> Vec<String> {
        self.ports.iter().map(|(n, _)| n.clone()).collect()
    }

    fn open(&self, name: &str) -> Result<Box<dyn Transport>, ProtocolError> {
        let behavior = self
            .ports
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b.clone())
            .unwrap_or(Behavior::Unavailable);

        if let Behavior::Unavailable = behavior {
            self.log
                .lock()
                .unwrap()
                .push(PortEvent::OpenFailed(name.to_string()));
            return Err(ProtocolError::PortUnavailable {
                port: name.to_string(),
                reason: "access denied".to_string(),
            });
        }

        let (transport, state) = MockTransport::with_log(name, Arc::clone(&self.log));
        if let Behavior::Replies(reply) = behavior {
            state.lock().unwrap().probe_reply = Some(reply);
        }
        self.log
            .lock()
            .unwrap()
            .push(PortEvent::Opened(name.to_string()));
        self.states
            .lock()
            .unwrap()
            .push((name.to_string(), state));
        Ok(Box::new(transport))
    }
}
