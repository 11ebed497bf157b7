//! Link configuration
//!
//! Stored as JSON. Missing keys fall back to the defaults, so a config file only
//! needs the values it changes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::protocol::{
    ProtocolError, DEFAULT_BAUD_RATE, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_READ_TIMEOUT_MS,
    DEFAULT_RECEIVE_POLL_MS, DEFAULT_RESCAN_INTERVAL_MS, PROBE_SETTLE_MS,
};

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Only probe this port instead of scanning all of them
    pub port_name: Option<String>,
    /// Baud rate (data format is always 8N1)
    pub baud_rate: u32,
    /// Overall discovery budget
    pub connect_timeout_ms: u64,
    /// Wait between sending the connect probe and checking for the reply
    pub probe_settle_ms: u64,
    /// Pause between passes over the port list
    pub rescan_interval_ms: u64,
    /// Per-read timeout on opened ports
    pub read_timeout_ms: u64,
    /// Sleep between receive passes of the background receiver
    pub receive_poll_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port_name: None,
            baud_rate: DEFAULT_BAUD_RATE,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            probe_settle_ms: PROBE_SETTLE_MS,
            rescan_interval_ms: DEFAULT_RESCAN_INTERVAL_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            receive_poll_ms: DEFAULT_RECEIVE_POLL_MS,
        }
    }
}

impl LinkConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ProtocolError> {
        let content = fs::read_to_string(path)?;
        let config: LinkConfig = serde_json::from_str(&content)
            .map_err(|e| ProtocolError::ConfigError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string_pretty(self).map_err(|e| ProtocolError::ConfigError(e.to_string()))
    }

    /// Write the config as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<(), ProtocolError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Reject settings the link cannot run with
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.baud_rate == 0 {
            return Err(ProtocolError::ConfigError(
                "baud_rate must be greater than zero".to_string(),
            ));
        }
        if let Some(name) = &self.port_name {
            if name.trim().is_empty() {
                return Err(ProtocolError::ConfigError(
                    "port_name must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Discovery budget as a duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Probe settle interval as a duration
    pub fn probe_settle(&self) -> Duration {
        Duration::from_millis(self.probe_settle_ms)
    }

    /// Rescan pause as a duration
    pub fn rescan_interval(&self) -> Duration {
        Duration::from_millis(self.rescan_interval_ms)
    }

    /// Receive poll interval as a duration
    pub fn receive_poll(&self) -> Duration {
        Duration::from_millis(self.receive_poll_ms)
    }
}
