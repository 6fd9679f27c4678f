// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tether-hub: Relay server for the tether sync channel.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::info;

use tether_hub::{Hub, HubConfig, Result};

/// tether-hub: Real-time relay for browser extension and dashboard peers
#[derive(Parser, Debug)]
#[command(name = "tether-hub")]
#[command(about = "WebSocket relay hub for the tether sync channel")]
struct Args {
    /// Address to bind the hub to (overrides the config file)
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Evict connections silent for longer than this many milliseconds
    #[arg(long)]
    stale_timeout_ms: Option<u64>,

    /// Number of broadcasts retained for catch-up
    #[arg(long)]
    history_capacity: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    /// Defaults, then the config file, then flags.
    fn resolve(&self) -> Result<HubConfig> {
        let mut config = match &self.config {
            Some(path) => HubConfig::load(path)?,
            None => HubConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(ms) = self.stale_timeout_ms {
            config.stale_timeout_ms = ms;
        }
        if let Some(capacity) = self.history_capacity {
            config.history_capacity = capacity;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_logging(args.verbose, args.log_file.as_deref());

    let config = args.resolve()?;
    info!("Starting tether-hub");
    info!("  Bind address: {}", config.bind);
    info!("  Stale timeout: {}ms", config.stale_timeout_ms);
    info!("  History capacity: {}", config.history_capacity);

    let hub = Hub::new(config)?;
    hub.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    hub.stop().await?;
    Ok(())
}

fn setup_logging(verbose: bool, log_file: Option<&Path>) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let file = log_file.and_then(|path| {
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    if let Some(file) = file {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(file)
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
