//! Command line options

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serialbridge_core::config::LinkConfig;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "serialbridge", version, about = "Exchange payloads with a SerialBridge device")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List serial ports in probe order
    Ports,
    /// Find the device, then send each typed line and print every payload received
    Host(LinkArgs),
    /// Play the device side on a known port: answer probes and chat
    Device(DeviceArgs),
    /// Write the effective configuration as JSON
    DumpConfig(LinkArgs),
}

#[derive(Debug, Clone, Args)]
pub struct LinkArgs {
    /// JSON config file; command line flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Only probe this port
    #[arg(long)]
    pub port: Option<String>,

    /// Baud rate
    #[arg(long)]
    pub baud: Option<u32>,

    /// Discovery budget in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    /// Port to listen on
    #[arg(long)]
    pub port: String,

    /// JSON config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Baud rate
    #[arg(long)]
    pub baud: Option<u32>,
}

impl LinkArgs {
    /// Config file (or defaults) with command line overrides applied
    pub fn resolve(&self) -> Result<LinkConfig> {
        let mut config = load_or_default(self.config.as_ref())?;
        if let Some(port) = &self.port {
            config.port_name = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(timeout) = self.timeout_ms {
            config.connect_timeout_ms = timeout;
        }
        config.validate().context("invalid link settings")?;
        Ok(config)
    }
}

impl DeviceArgs {
    /// Config file (or defaults) with command line overrides applied
    pub fn resolve(&self) -> Result<LinkConfig> {
        let mut config = load_or_default(self.config.as_ref())?;
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        config.validate().context("invalid link settings")?;
        Ok(config)
    }
}

fn load_or_default(path: Option<&PathBuf>) -> Result<LinkConfig> {
    match path {
        Some(path) => LinkConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(LinkConfig::default()),
    }
}
