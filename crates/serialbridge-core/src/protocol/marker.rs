//! Marker constants and frame encoding
//!
//! Every marker is three bytes long. The probe reply happens to carry the same
//! bytes as the end marker; it is kept as its own constant so the two roles are
//! never confused in the state machine.

use std::fmt;

/// A fixed byte sequence embedded in the stream
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Marker(&'static [u8]);

impl Marker {
    /// Wrap a static byte sequence
    pub const fn new(bytes: &'static [u8]) -> Self {
        Self(bytes)
    }

    /// Marker bytes in wire order
    pub const fn as_bytes(&self) -> &'static [u8] {
        self.0
    }

    /// Number of bytes in the marker
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// True for a zero-length marker
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Marker(")?;
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", b)?;
        }
        write!(f, ")")
    }
}

/// Opens a message
pub const START_MARKER: Marker = Marker::new(&[0xFF, 0xFE, 0xFF]);

/// Closes a message
pub const END_MARKER: Marker = Marker::new(&[0xFD, 0xFE, 0xFD]);

/// Sent by the host during discovery
pub const CONNECT_PROBE: Marker = Marker::new(&[0xFD, 0xFE, 0xFF]);

/// The device's answer to [`CONNECT_PROBE`]
pub const PROBE_REPLY: Marker = Marker::new(&[0xFD, 0xFE, 0xFD]);

/// Length of the longest marker; sizes the sliding window
pub const MAX_MARKER_LEN: usize = max_len(&[START_MARKER, END_MARKER, CONNECT_PROBE]);

const fn max_len(markers: &[Marker]) -> usize {
    let mut max = 0;
    let mut i = 0;
    while i < markers.len() {
        if markers[i].len() > max {
            max = markers[i].len();
        }
        i += 1;
    }
    max
}

/// Wrap a payload in start and end markers, producing the exact wire bytes
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(START_MARKER.len() + payload.len() + END_MARKER.len());
    bytes.extend_from_slice(START_MARKER.as_bytes());
    bytes.extend_from_slice(payload);
    bytes.extend_from_slice(END_MARKER.as_bytes());
    bytes
}
