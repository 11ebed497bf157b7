//! Payload accumulation between markers

/// Growable buffer of bytes in arrival order
#[derive(Debug, Clone, Default)]
pub struct PayloadAccumulator {
    buffer: Vec<u8>,
}

impl PayloadAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a byte
    pub fn push(&mut self, byte: u8) {
        self.buffer.push(byte);
    }

    /// Discard any partial message
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Number of bytes accumulated
    pub fn count(&self) -> usize {
        self.buffer.len()
    }

    /// Contents in arrival order without the last `trim_len` bytes
    ///
    /// Trimming more than the buffer holds yields an empty payload. The buffer
    /// itself is left untouched; callers reset it once the payload is out.
    pub fn extract_and_trim(&self, trim_len: usize) -> Vec<u8> {
        let keep = self.buffer.len().saturating_sub(trim_len);
        self.buffer[..keep].to_vec()
    }
}
