//! SerialBridge console
//!
//! Connects to the device, prints every payload it sends as text and sends each
//! line typed on stdin as a payload. Logs go to stderr (`RUST_LOG`, default
//! `info`) so stdout carries payloads only.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use serialbridge_core::config::LinkConfig;
use serialbridge_core::protocol::{list_ports, Connection, Payload, ProtocolError, Role};
use std::io::{self, BufRead};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn print_payload(payload: &Payload) {
    println!("{}", String::from_utf8_lossy(payload));
}

/// Send stdin lines until EOF while a background receiver prints payloads
fn chat(conn: Arc<Connection>, config: &LinkConfig) -> Result<()> {
    conn.subscribe(print_payload);
    let receiver = conn.spawn_receiver(config.receive_poll());

    for line in io::stdin().lock().lines() {
        let line = line.context("failed to read stdin")?;
        conn.send_payload(line.as_bytes())
            .context("failed to send payload")?;
        if receiver.is_finished() {
            break;
        }
    }

    receiver.stop().context("receiver stopped")?;
    let counters = conn.counters();
    info!(
        "Sent {} payload(s), received {}",
        counters.tx_payloads, counters.rx_payloads
    );
    conn.close()?;
    Ok(())
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Ports => {
            for port in list_ports() {
                match port.product {
                    Some(product) => println!("{}\t{}", port.name, product),
                    None => println!("{}", port.name),
                }
            }
        }
        Command::Host(args) => {
            let config = args.resolve()?;
            eprintln!("Connecting to the device.....");
            let conn = match Connection::connect(&config) {
                Ok(conn) => conn,
                Err(ProtocolError::ConnectTimeout { .. }) => {
                    eprintln!("Unable to connect to the device. Operation timed out. Bye!");
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => return Err(e).context("discovery failed"),
            };
            eprintln!(
                "Connected on {}! Type a message to send.",
                conn.port_name().unwrap_or_default()
            );
            chat(Arc::new(conn), &config)?;
        }
        Command::Device(args) => {
            let config = args.resolve()?;
            let conn = Connection::open(&args.port, &config, Role::Device)
                .with_context(|| format!("failed to open {}", args.port))?;
            eprintln!("Listening on {} as the device.", args.port);
            chat(Arc::new(conn), &config)?;
        }
        Command::DumpConfig(args) => {
            let config = args.resolve()?;
            println!("{}", config.to_json()?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    init_logging();
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
