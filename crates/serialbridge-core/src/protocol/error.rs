//! Protocol errors

use thiserror::Error;

/// Errors that can occur on the serial link
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Port unavailable: {port}: {reason}")]
    PortUnavailable { port: String, reason: String },

    #[error("No responsive device found within {timeout_ms}ms")]
    ConnectTimeout { timeout_ms: u64 },

    #[error("Malformed byte: transport reported pending data but yielded no byte")]
    MalformedByte,

    #[error("Parse session faulted; resynchronize before receiving again")]
    SessionFaulted,

    #[error("Receiver thread panicked")]
    ReceiverPanicked,

    #[error("Not connected")]
    NotConnected,

    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
