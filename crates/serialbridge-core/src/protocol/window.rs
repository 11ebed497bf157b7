//! Sliding window over the most recent bytes of the stream

use std::collections::VecDeque;

use super::Marker;

/// Fixed-capacity FIFO of the last `capacity` received bytes
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    bytes: VecDeque<u8>,
    capacity: usize,
}

impl SlidingWindow {
    /// Create an empty window holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a byte, evicting the oldest when full
    pub fn push(&mut self, byte: u8) {
        if self.capacity == 0 {
            return;
        }
        if self.bytes.len() == self.capacity {
            self.bytes.pop_front();
        }
        self.bytes.push_back(byte);
    }

    /// True iff the window content equals `marker` byte for byte
    pub fn matches(&self, marker: &Marker) -> bool {
        let expected = marker.as_bytes();
        self.bytes.len() == expected.len() && self.bytes.iter().eq(expected.iter())
    }

    /// Current number of bytes held
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True before the first push
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Maximum number of bytes held
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Window content, oldest first
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.iter().copied().collect()
    }

    /// Forget everything seen so far
    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}
