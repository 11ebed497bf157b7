//! Transport abstraction
//!
//! The framing engine only needs a duplex byte device that can report how many
//! bytes are pending, so reads never block when nothing has arrived.

use serialport::SerialPort;
use std::io::{self, Read, Write};

use tracing::debug;

/// Duplex byte stream the connection runs over
pub trait Transport: Send {
    /// Port name the transport was opened on
    fn name(&self) -> &str;

    /// Number of bytes that can be read without blocking
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read one byte; `None` means the device yielded nothing
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    /// Write all bytes
    fn write_bytes(&mut self, data: &[u8]) -> io::Result<()>;

    /// Drop anything received but not yet read
    fn discard_input(&mut self) -> io::Result<()>;

    /// Drop anything written but not yet transmitted
    fn discard_output(&mut self) -> io::Result<()>;

    /// Release the device. Closing twice is a no-op.
    fn close(&mut self) -> io::Result<()>;

    /// False once closed
    fn is_open(&self) -> bool;
}

fn not_open(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, format!("{} is closed", name))
}

/// Serial port wrapper implementing [`Transport`]
pub struct SerialTransport {
    name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Wrap an already opened and configured port
    pub fn new(name: impl Into<String>, port: Box<dyn SerialPort>) -> Self {
        Self {
            name: name.into(),
            port: Some(port),
        }
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        match self.port.as_mut() {
            Some(port) => Ok(port),
            None => Err(not_open(&self.name)),
        }
    }
}

impl Transport for SerialTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        self.port()?
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(io::Error::other)
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.port()?.read(&mut buf) {
            Ok(1) => Ok(Some(buf[0])),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        // write_all hands the bytes to the kernel tty buffer; flush() would
        // tcdrain on unix and block until the UART has shifted them out.
        self.port()?.write_all(data)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.port()?
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::other)
    }

    fn discard_output(&mut self) -> io::Result<()> {
        self.port()?
            .clear(serialport::ClearBuffer::Output)
            .map_err(io::Error::other)
    }

    fn close(&mut self) -> io::Result<()> {
        if self.port.take().is_some() {
            debug!("Closed serial port {}", self.name);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
