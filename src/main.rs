//! CLI Entry Point for hub_stream
//!
//! Provides command-line interface for:
//! - Running the bridge against a simulated gateway (`demo`)
//! - Loading and validating configuration (`check-config`)
//!
//! # Usage
//!
//! ```bash
//! hub_stream demo --rounds 5
//! hub_stream --config config/hub_stream.toml check-config
//! HUB_STREAM_BRIDGE__POLL_INTERVAL_MS=100 hub_stream demo
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hub_stream::config::{HubStreamConfig, DEFAULT_CONFIG_PATH};
use hub_stream::hardware::MockHub;
use hub_stream::{logging, StreamAdapter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::info;

/// Acknowledgement byte the simulated modem appends to echoed commands.
const ACK: u8 = 0x06;

#[derive(Parser)]
#[command(name = "hub_stream")]
#[command(about = "Byte stream over an HTTP-polled ring buffer gateway", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Exchange commands with a simulated gateway
    Demo {
        /// Number of command/response exchanges
        #[arg(long, default_value = "3")]
        rounds: u8,
    },

    /// Load, validate and print the effective configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = HubStreamConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.validate()?;

    match cli.command {
        Commands::Demo { rounds } => run_demo(&config, rounds).await,
        Commands::CheckConfig => check_config(&config),
    }
}

fn check_config(config: &HubStreamConfig) -> Result<()> {
    println!("Configuration OK");
    println!();
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn run_demo(config: &HubStreamConfig, rounds: u8) -> Result<()> {
    logging::init_from_config(config)?;
    info!(app = %config.application.name, rounds, "starting demo");

    let hub = Arc::new(
        MockHub::new(config.mock_hub.ring_size)
            .with_latency(Duration::from_millis(config.mock_hub.latency_ms)),
    );
    let mut adapter = StreamAdapter::connect(hub.clone(), &config.bridge).await?;
    let mut reader = adapter.reader();
    let mut writer = adapter.writer();

    // Generous enough for several poll cycles plus simulated latency.
    let reply_timeout = config.bridge.poll_interval() * 4
        + Duration::from_millis(config.mock_hub.latency_ms) * 8
        + Duration::from_secs(1);

    for round in 0..rounds {
        let command = [0x02, 0x62, round];
        writer.write_all(&command).await?;
        println!("-> {}", hex_string(&command));

        // The simulated modem echoes the command and acknowledges it.
        let mut echo = command.to_vec();
        echo.push(ACK);
        hub.inject(&echo);

        let mut reply = vec![0u8; echo.len()];
        tokio::time::timeout(reply_timeout, reader.read_exact(&mut reply))
            .await
            .context("timed out waiting for gateway reply")??;
        println!("<- {}", hex_string(&reply));
    }

    writer.shutdown().await?;
    adapter.close().await;

    let stats = adapter.stats();
    println!();
    println!("Polls:          {}", stats.polls);
    println!("Bytes received: {}", stats.bytes_received);
    println!("Bytes sent:     {}", stats.bytes_sent);
    println!("Wraps:          {}", stats.wraps);
    println!("Resyncs:        {}", stats.resyncs);
    Ok(())
}

fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
