//! Byte stream parser
//!
//! Turns the raw byte stream into payloads. The parser holds no notion of being
//! "inside" a message: the accumulator content is its only state.
//!
//! Per byte, in order:
//! 1. the byte goes into the sliding window and the accumulator
//! 2. a start marker clears the accumulator (re-synchronization, even mid-payload)
//! 3. an end marker flushes the accumulator minus the marker bytes as a payload
//! 4. a connect probe is reported when running as the device
//!
//! Marker byte sequences are pairwise distinct, so at most one outcome fires per
//! byte. An end marker with no start marker before it still flushes whatever has
//! accumulated, and empty payloads are delivered like any other.

use std::fmt;
use std::ops::Deref;

use tracing::{debug, trace};

use super::marker::MAX_MARKER_LEN;
use super::{PayloadAccumulator, SlidingWindow, CONNECT_PROBE, END_MARKER, START_MARKER};

/// Which side of the link the parser runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Host process; never answers connect probes
    Host,
    /// Microcontroller side; answers every connect probe it sees
    Device,
}

/// A completed message body
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// Wrap bytes as a payload
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Payload bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Take ownership of the bytes
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for Payload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({} bytes: {:02X?})", self.0.len(), self.0)
    }
}

/// Outcome of feeding one byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    /// Start marker seen; any partial message was discarded
    MessageStart {
        /// Bytes thrown away, not counting the marker itself
        discarded: usize,
    },
    /// End marker seen; the payload is complete
    Payload(Payload),
    /// Connect probe seen while running as the device
    ProbeReceived,
}

impl ParseEvent {
    /// The payload carried by this event, if any
    pub fn into_payload(self) -> Option<Payload> {
        match self {
            ParseEvent::Payload(p) => Some(p),
            _ => None,
        }
    }
}

/// Framing state machine
#[derive(Debug, Clone)]
pub struct FrameParser {
    role: Role,
    window: SlidingWindow,
    accumulator: PayloadAccumulator,
}

impl FrameParser {
    /// Create a parser for the given side of the link
    pub fn new(role: Role) -> Self {
        Self {
            role,
            window: SlidingWindow::new(MAX_MARKER_LEN),
            accumulator: PayloadAccumulator::new(),
        }
    }

    /// Side of the link this parser runs on
    pub fn role(&self) -> Role {
        self.role
    }

    /// Bytes currently held for the in-progress message, marker bytes included
    pub fn pending_len(&self) -> usize {
        self.accumulator.count()
    }

    /// Consume one byte
    pub fn feed(&mut self, byte: u8) -> Option<ParseEvent> {
        self.window.push(byte);
        self.accumulator.push(byte);

        if self.window.matches(&START_MARKER) {
            let discarded = self.accumulator.count().saturating_sub(START_MARKER.len());
            if discarded > 0 {
                debug!("Start marker mid-message, discarding {} bytes", discarded);
            }
            self.accumulator.reset();
            return Some(ParseEvent::MessageStart { discarded });
        }

        if self.window.matches(&END_MARKER) {
            let payload = Payload::new(self.accumulator.extract_and_trim(END_MARKER.len()));
            self.accumulator.reset();
            trace!("End marker, payload of {} bytes", payload.len());
            return Some(ParseEvent::Payload(payload));
        }

        if self.role == Role::Device && self.window.matches(&CONNECT_PROBE) {
            trace!("Connect probe received");
            return Some(ParseEvent::ProbeReceived);
        }

        None
    }

    /// Consume a run of bytes, collecting every event in order
    pub fn feed_all(&mut self, bytes: &[u8]) -> Vec<ParseEvent> {
        bytes.iter().filter_map(|&b| self.feed(b)).collect()
    }

    /// Drop all window and accumulator state
    pub fn reset(&mut self) {
        self.window.clear();
        self.accumulator.reset();
    }
}
