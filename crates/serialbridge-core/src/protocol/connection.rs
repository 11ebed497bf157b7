//! Connection management
//!
//! A [`Connection`] owns the transport exclusively and runs the framing engine
//! over it. Received payloads go to the subscribers registered on the
//! connection.
//!
//! Locking: the transport and parser sit behind one mutex, the subscriber set
//! behind another. Neither is held while callbacks run, so a callback may send a
//! payload or unsubscribe itself. Callbacks do run on the receiving thread, so a
//! slow subscriber delays the next receive pass.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::{
    discovery::{Discovery, PortProvider},
    frame,
    serial::{open_port, SystemPorts},
    DeliveryFailure, FrameParser, ParseEvent, Payload, ProtocolError, Role, SubscriberSet,
    SubscriptionId, Transport, PROBE_REPLY,
};
use crate::config::LinkConfig;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Transport closed
    Disconnected,
    /// Transport open, receiving normally
    Connected,
    /// The transport produced a malformed byte; receiving is refused until
    /// [`Connection::resync`]
    Error,
}

/// Cumulative traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCounters {
    /// Bytes written, markers and probe replies included
    pub tx_bytes: u64,
    /// Bytes read
    pub rx_bytes: u64,
    /// Payloads sent
    pub tx_payloads: u64,
    /// Payloads completed
    pub rx_payloads: u64,
    /// Connect probes answered
    pub probes_answered: u64,
}

/// Result of one receive pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Bytes drained from the transport
    pub bytes_read: usize,
    /// Payloads completed and dispatched, in detection order
    pub payloads: usize,
    /// Connect probes answered (device role only)
    pub probes_answered: usize,
    /// Subscribers that panicked while handling a payload
    pub delivery_failures: Vec<DeliveryFailure>,
}

struct Link {
    transport: Option<Box<dyn Transport>>,
    parser: FrameParser,
    state: ConnectionState,
    counters: LinkCounters,
}

impl Link {
    fn transport(&mut self) -> Result<&mut Box<dyn Transport>, ProtocolError> {
        self.transport.as_mut().ok_or(ProtocolError::NotConnected)
    }

    /// Drain every pending byte through the parser. Payloads completed before a
    /// fault are returned alongside it so they still reach subscribers.
    fn drain(&mut self, report: &mut PumpReport) -> (Vec<Payload>, Option<ProtocolError>) {
        let mut completed = Vec::new();

        let Some(transport) = self.transport.as_mut() else {
            return (completed, Some(ProtocolError::NotConnected));
        };

        loop {
            let available = match transport.bytes_available() {
                Ok(n) => n,
                Err(e) => return (completed, Some(e.into())),
            };
            if available == 0 {
                break;
            }

            for _ in 0..available {
                let byte = match transport.read_byte() {
                    Ok(Some(b)) => b,
                    Ok(None) => {
                        error!(
                            "{} reported {} pending byte(s) but yielded none",
                            transport.name(),
                            available
                        );
                        self.state = ConnectionState::Error;
                        return (completed, Some(ProtocolError::MalformedByte));
                    }
                    Err(e) => return (completed, Some(e.into())),
                };
                report.bytes_read += 1;
                self.counters.rx_bytes += 1;

                match self.parser.feed(byte) {
                    Some(ParseEvent::Payload(payload)) => {
                        self.counters.rx_payloads += 1;
                        completed.push(payload);
                    }
                    Some(ParseEvent::ProbeReceived) => {
                        if let Err(e) = transport.write_bytes(PROBE_REPLY.as_bytes()) {
                            return (completed, Some(e.into()));
                        }
                        debug!("Answered connect probe on {}", transport.name());
                        self.counters.probes_answered += 1;
                        self.counters.tx_bytes += PROBE_REPLY.len() as u64;
                        report.probes_answered += 1;
                    }
                    Some(ParseEvent::MessageStart { .. }) | None => {}
                }
            }
        }

        (completed, None)
    }

    fn close(&mut self) -> Result<(), ProtocolError> {
        self.state = ConnectionState::Disconnected;
        match self.transport.take() {
            Some(mut transport) => {
                let name = transport.name().to_string();
                let result = transport.close();
                info!("Disconnected from {}", name);
                result.map_err(ProtocolError::from)
            }
            None => Ok(()),
        }
    }
}

/// Framed payload link over an exclusively owned transport
pub struct Connection {
    link: Mutex<Link>,
    subscribers: SubscriberSet,
    role: Role,
}

impl Connection {
    /// Discover the device among the system's serial ports and connect to it
    pub fn connect(config: &LinkConfig) -> Result<Self, ProtocolError> {
        config.validate()?;
        Self::connect_with(&SystemPorts::new(config), config)
    }

    /// Discover the device among the ports offered by `provider`
    pub fn connect_with<P: PortProvider + ?Sized>(
        provider: &P,
        config: &LinkConfig,
    ) -> Result<Self, ProtocolError> {
        let transport = Discovery::from_config(config).run(provider)?;
        Ok(Self::attach(transport, Role::Host))
    }

    /// Open a known port directly, without probing
    pub fn open(port_name: &str, config: &LinkConfig, role: Role) -> Result<Self, ProtocolError> {
        config.validate()?;
        let mut transport = open_port(port_name, config)?;
        transport.discard_input()?;
        transport.discard_output()?;
        Ok(Self::attach(Box::new(transport), role))
    }

    /// Run the link over an already open transport
    pub fn attach(transport: Box<dyn Transport>, role: Role) -> Self {
        info!("Connected to {} as {:?}", transport.name(), role);
        Self {
            link: Mutex::new(Link {
                transport: Some(transport),
                parser: FrameParser::new(role),
                state: ConnectionState::Connected,
                counters: LinkCounters::default(),
            }),
            subscribers: SubscriberSet::new(),
            role,
        }
    }

    fn link(&self) -> MutexGuard<'_, Link> {
        // Callbacks never run under this lock; a poisoned guard still holds a
        // consistent link.
        self.link.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Side of the link this connection plays
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.link().state
    }

    /// Name of the bound port, while open
    pub fn port_name(&self) -> Option<String> {
        self.link().transport.as_ref().map(|t| t.name().to_string())
    }

    /// Cumulative traffic counters
    pub fn counters(&self) -> LinkCounters {
        self.link().counters
    }

    /// Register a payload callback
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    /// Remove a payload callback
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Frame `payload` and write it to the transport
    pub fn send_payload(&self, payload: &[u8]) -> Result<(), ProtocolError> {
        let bytes = frame(payload);
        let mut link = self.link();
        link.transport()?.write_bytes(&bytes)?;
        link.counters.tx_bytes += bytes.len() as u64;
        link.counters.tx_payloads += 1;
        debug!("Sent payload of {} bytes", payload.len());
        Ok(())
    }

    /// Drain all pending bytes and deliver completed payloads
    ///
    /// This is the "data available" handler. Payloads reach subscribers in the
    /// order their end markers were seen. A malformed byte faults the session:
    /// payloads completed before it are still delivered, then the error is
    /// returned and later passes fail with [`ProtocolError::SessionFaulted`].
    pub fn pump(&self) -> Result<PumpReport, ProtocolError> {
        let mut report = PumpReport::default();

        let (completed, fault) = {
            let mut link = self.link();
            if link.state == ConnectionState::Error {
                return Err(ProtocolError::SessionFaulted);
            }
            link.drain(&mut report)
        };

        report.payloads = completed.len();
        for payload in &completed {
            report
                .delivery_failures
                .extend(self.subscribers.dispatch(payload));
        }

        match fault {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Clear a faulted session: drop parser state and stale input
    pub fn resync(&self) -> Result<(), ProtocolError> {
        let mut link = self.link();
        link.transport()?.discard_input()?;
        link.parser.reset();
        link.state = ConnectionState::Connected;
        warn!("Parse session resynchronized");
        Ok(())
    }

    /// Discard both transport buffers
    pub fn reset_port(&self) -> Result<(), ProtocolError> {
        let mut link = self.link();
        let transport = link.transport()?;
        transport.discard_input()?;
        transport.discard_output()?;
        Ok(())
    }

    /// Release the transport. Further sends and receive passes fail with
    /// [`ProtocolError::NotConnected`].
    pub fn close(&self) -> Result<(), ProtocolError> {
        self.link().close()
    }

    /// Run receive passes on a background thread
    ///
    /// The thread only holds a weak reference; it stops when the handle is
    /// stopped or dropped, when the connection is closed or dropped, or on the
    /// first fatal error.
    pub fn spawn_receiver(self: &Arc<Self>, poll: Duration) -> ReceiverHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let conn = Arc::downgrade(self);
        let flag = Arc::clone(&stop);
        let thread = thread::spawn(move || receive_loop(conn, flag, poll));
        ReceiverHandle {
            stop,
            thread: Some(thread),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(e) = self.link().close() {
            warn!("Error releasing transport: {}", e);
        }
    }
}

fn receive_loop(
    conn: Weak<Connection>,
    stop: Arc<AtomicBool>,
    poll: Duration,
) -> Result<(), ProtocolError> {
    while !stop.load(Ordering::Acquire) {
        let Some(conn) = conn.upgrade() else {
            return Ok(());
        };
        match conn.pump() {
            Ok(report) => {
                for failure in &report.delivery_failures {
                    warn!("Subscriber {:?} failed: {}", failure.subscription, failure.message);
                }
                if report.bytes_read == 0 {
                    drop(conn);
                    thread::sleep(poll);
                }
            }
            Err(ProtocolError::NotConnected) => return Ok(()),
            Err(e) => {
                error!("Receiver stopped: {}", e);
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Handle to a background receiver thread
pub struct ReceiverHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<(), ProtocolError>>>,
}

impl ReceiverHandle {
    /// True once the thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Stop the thread and return the error that ended it, if any
    pub fn stop(mut self) -> Result<(), ProtocolError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), ProtocolError> {
        self.stop.store(true, Ordering::Release);
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .unwrap_or(Err(ProtocolError::ReceiverPanicked)),
            None => Ok(()),
        }
    }
}

impl Drop for ReceiverHandle {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            debug!("Receiver ended with error: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_serde() {
        let json = serde_json::to_string(&ConnectionState::Connected).unwrap();
        assert_eq!(json, "\"Connected\"");
    }

    #[test]
    fn test_counters_default() {
        let counters = LinkCounters::default();
        assert_eq!(counters.tx_bytes, 0);
        assert_eq!(counters.rx_payloads, 0);
    }
}
