//! Serial port handling
//!
//! Enumerates and opens the physical ports the link can run over. Every port is
//! opened 8N1 without flow control.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::time::Duration;

use tracing::debug;

use super::discovery::PortProvider;
use super::{ProtocolError, SerialTransport, Transport, DEFAULT_BAUD_RATE};
use crate::config::LinkConfig;

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl PortInfo {
    fn bare(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                manufacturer: usb.manufacturer,
                product: usb.product,
            },
            _ => Self::bare(info.port_name),
        }
    }
}

/// Sort key giving a stable probe order:
///  - ttyACM* first, then ttyUSB* (numeric suffix order)
///  - then COMn (numeric)
///  - then everything else by name
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    let numbered = [("ttyACM", 0u8), ("ttyUSB", 1), ("COM", 2)];
    for (prefix, rank) in numbered {
        if let Some(rest) = basename.strip_prefix(prefix) {
            if let Ok(num) = rest.parse::<usize>() {
                return (rank, num, basename.to_string());
            }
        }
    }
    (3, 0, basename.to_string())
}

/// List all available serial ports, with /dev fallbacks and deterministic ordering
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        let p = PortInfo::from(info);
        map.entry(p.name.clone()).or_insert(p);
    }

    // The serialport API misses some CDC-ACM devices on Linux
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone())
                        .or_insert_with(|| PortInfo::bare(full));
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.name));
    v
}

/// Open and configure a port for the link
pub fn open_port(name: &str, config: &LinkConfig) -> Result<SerialTransport, ProtocolError> {
    let baud = if config.baud_rate == 0 {
        DEFAULT_BAUD_RATE
    } else {
        config.baud_rate
    };

    let mut port = serialport::new(name, baud)
        .timeout(Duration::from_millis(config.read_timeout_ms))
        .open()
        .map_err(|e| ProtocolError::PortUnavailable {
            port: name.to_string(),
            reason: e.to_string(),
        })?;
    configure_port(port.as_mut())?;

    debug!("Opened {} at {} baud", name, baud);
    Ok(SerialTransport::new(name, port))
}

/// Apply 8N1 with no flow control
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_parity(serialport::Parity::None)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    Ok(())
}

/// Port provider backed by the operating system's serial ports
#[derive(Debug, Clone, Default)]
pub struct SystemPorts {
    config: LinkConfig,
}

impl SystemPorts {
    /// Open ports with the baud rate and read timeout from `config`
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl PortProvider for SystemPorts {
    fn list_ports(&self) -> Vec<String> {
        list_ports().into_iter().map(|p| p.name).collect()
    }

    fn open(&self, name: &str) -> Result<Box<dyn Transport>, ProtocolError> {
        Ok(Box::new(open_port(name, &self.config)?))
    }
}
