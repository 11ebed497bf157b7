//! Port discovery
//!
//! The host does not know which port the device sits on. Discovery opens every
//! candidate in turn, sends the connect probe and keeps the first port that
//! answers with the probe reply. Passes over the port list repeat until the
//! overall budget runs out; a probe that has started always waits out its full
//! settle interval.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{ProtocolError, Transport, CONNECT_PROBE, PROBE_REPLY};
use crate::config::LinkConfig;

/// Source of candidate ports
pub trait PortProvider {
    /// Names of the ports currently present, in probe order
    fn list_ports(&self) -> Vec<String>;

    /// Open a port; failures are reported as [`ProtocolError::PortUnavailable`]
    fn open(&self, name: &str) -> Result<Box<dyn Transport>, ProtocolError>;
}

/// Discovery parameters
#[derive(Debug, Clone)]
pub struct Discovery {
    timeout: Duration,
    port_name: Option<String>,
    settle: Duration,
    rescan_interval: Duration,
}

impl Default for Discovery {
    fn default() -> Self {
        Self::from_config(&LinkConfig::default())
    }
}

impl Discovery {
    /// Take timeout, settle interval and port restriction from `config`
    pub fn from_config(config: &LinkConfig) -> Self {
        Self {
            timeout: config.connect_timeout(),
            port_name: config.port_name.clone(),
            settle: config.probe_settle(),
            rescan_interval: config.rescan_interval(),
        }
    }

    /// Overall budget
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Only probe this port
    pub fn port_name(mut self, name: Option<String>) -> Self {
        self.port_name = name;
        self
    }

    /// Wait between sending the probe and checking for the reply
    pub fn settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Pause between passes over the port list
    pub fn rescan_interval(mut self, interval: Duration) -> Self {
        self.rescan_interval = interval;
        self
    }

    fn candidates<P: PortProvider + ?Sized>(&self, provider: &P) -> Vec<String> {
        match &self.port_name {
            Some(name) => vec![name.clone()],
            None => provider.list_ports(),
        }
    }

    /// Find the port the device answers on and return it still open
    pub fn run<P: PortProvider + ?Sized>(
        &self,
        provider: &P,
    ) -> Result<Box<dyn Transport>, ProtocolError> {
        let start = Instant::now();
        let mut pass = 0u32;

        loop {
            pass += 1;
            let candidates = self.candidates(provider);
            debug!("Discovery pass {}: {} candidate port(s)", pass, candidates.len());

            for name in candidates {
                if start.elapsed() > self.timeout {
                    break;
                }

                let mut transport = match provider.open(&name) {
                    Ok(t) => t,
                    Err(e) => {
                        debug!("Skipping {}: {}", name, e);
                        continue;
                    }
                };

                match probe(transport.as_mut(), self.settle) {
                    Ok(true) => {
                        info!(
                            "Device answered on {} after {}ms",
                            name,
                            start.elapsed().as_millis()
                        );
                        return Ok(transport);
                    }
                    Ok(false) => debug!("No probe reply on {}", name),
                    Err(e) => debug!("Probe on {} failed: {}", name, e),
                }

                release(transport.as_mut());
            }

            let elapsed = start.elapsed();
            if elapsed > self.timeout {
                warn!(
                    "Discovery gave up after {} pass(es), {}ms",
                    pass,
                    elapsed.as_millis()
                );
                return Err(ProtocolError::ConnectTimeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }

            let remaining = self.timeout - elapsed;
            thread::sleep(self.rescan_interval.min(remaining));
        }
    }
}

/// Discover the device using the settings in `config`
pub fn discover<P: PortProvider + ?Sized>(
    provider: &P,
    config: &LinkConfig,
) -> Result<Box<dyn Transport>, ProtocolError> {
    Discovery::from_config(config).run(provider)
}

/// Send the connect probe on an open transport and check the reply
///
/// True when at least three bytes arrived within `settle` and the first three
/// equal the probe reply.
pub fn probe(transport: &mut dyn Transport, settle: Duration) -> Result<bool, ProtocolError> {
    transport.discard_input()?;
    transport.discard_output()?;
    transport.write_bytes(CONNECT_PROBE.as_bytes())?;

    thread::sleep(settle);

    let expected = PROBE_REPLY.as_bytes();
    if transport.bytes_available()? < expected.len() {
        return Ok(false);
    }

    for &want in expected {
        match transport.read_byte()? {
            Some(got) if got == want => {}
            _ => return Ok(false),
        }
    }
    Ok(true)
}

fn release(transport: &mut dyn Transport) {
    let _ = transport.discard_output();
    let _ = transport.discard_input();
    if let Err(e) = transport.close() {
        debug!("Closing {} failed: {}", transport.name(), e);
    }
}
