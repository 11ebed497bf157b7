//! Serial Link Protocol
//!
//! Implements the marker-framed payload protocol spoken between the host and the
//! microcontroller.
//!
//! Wire format: `FF FE FF || payload || FD FE FD`. The host finds its peer by
//! sending the connect probe `FD FE FF` and waiting for `FD FE FD` in return.

mod accumulator;
mod connection;
pub mod discovery;
mod error;
pub mod marker;
mod parser;
pub mod serial;
mod subscribers;
pub mod transport;
mod window;

pub use accumulator::PayloadAccumulator;
pub use connection::{Connection, ConnectionState, LinkCounters, PumpReport, ReceiverHandle};
pub use discovery::{discover, Discovery, PortProvider};
pub use error::ProtocolError;
pub use marker::{frame, Marker, CONNECT_PROBE, END_MARKER, PROBE_REPLY, START_MARKER};
pub use parser::{FrameParser, ParseEvent, Payload, Role};
pub use serial::{list_ports, open_port, PortInfo, SystemPorts};
pub use subscribers::{DeliveryFailure, SubscriberSet, SubscriptionId};
pub use transport::{SerialTransport, Transport};
pub use window::SlidingWindow;

/// Default baud rate for the serial link
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default overall budget for port discovery in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 30_000;

/// Time to wait for the probe reply after sending the connect probe
pub const PROBE_SETTLE_MS: u64 = 200;

/// Pause between full passes over the port list when nothing answered
pub const DEFAULT_RESCAN_INTERVAL_MS: u64 = 50;

/// Read timeout applied to opened serial ports
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;

/// Sleep between receive passes of the background receiver
pub const DEFAULT_RECEIVE_POLL_MS: u64 = 10;
