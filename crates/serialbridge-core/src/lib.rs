//! # SerialBridge Core Library
//!
//! Discrete payload messaging between a host process and a microcontroller over
//! a raw serial link.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Marker framing (`FF FE FF` … `FD FE FD`) and the byte stream parser
//! - Port discovery through the connect probe handshake
//! - A connection that owns the port, dispatches payloads to subscribers and
//!   releases the port on every exit path
//! - JSON link configuration
//!
//! ## Example
//!
//! ```rust,ignore
//! use serialbridge_core::{config::LinkConfig, protocol::Connection};
//!
//! // Probe every serial port until the device answers
//! let conn = Connection::connect(&LinkConfig::default())?;
//!
//! conn.subscribe(|payload| println!("{}", String::from_utf8_lossy(payload)));
//! conn.send_payload(b"hi")?;
//!
//! // Drain whatever arrived and hand completed payloads to subscribers
//! conn.pump()?;
//! ```

pub mod config;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::LinkConfig;
    pub use crate::protocol::{
        frame, Connection, ConnectionState, FrameParser, Payload, ProtocolError, Role,
        SubscriptionId, Transport,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
