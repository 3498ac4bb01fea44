// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! faultline server
//!
//! Hosts a fault-injection servant so a test driver can identify and kill
//! this process remotely.
//!
//! # Usage
//!
//! ```bash
//! # Default endpoint (127.0.0.1:12010), identity "test"
//! faultline-server
//!
//! # Ephemeral port; the bound address is printed as "ready <addr>"
//! faultline-server --port 0
//!
//! # From a JSON configuration file
//! faultline-server --config server.json
//! ```

use clap::Parser;
use faultline::{Communicator, FaultServant, ServerConfig};
use std::io::Write;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// faultline server - fault-injection endpoint for RPC fault-tolerance tests
#[derive(Parser, Debug)]
#[command(name = "faultline-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TCP port to listen on (0 = ephemeral)
    #[arg(short, long, default_value = "12010")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Identity to register the servant under
    #[arg(short, long, default_value = "test")]
    identity: String,

    /// Object adapter name
    #[arg(long, default_value = "TestAdapter")]
    adapter: String,

    /// Configuration file (JSON format); overrides the flags above
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries only the readiness line.
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_ids(true)
        .init();

    let config = if let Some(path) = &args.config {
        info!("Loading config from {:?}", path);
        ServerConfig::from_file(path)?
    } else {
        ServerConfig {
            bind_address: args.bind,
            port: args.port,
            adapter_name: args.adapter.clone(),
            identity: args.identity.clone(),
            ..Default::default()
        }
    };

    let communicator = Communicator::new(config.clone())?;
    let adapter = communicator.create_object_adapter(&config.adapter_name, config.endpoint())?;
    adapter.add(&config.identity, Arc::new(FaultServant::new(&adapter)))?;
    let addr = adapter.activate().await?;

    info!("+----------------------------------------------------+");
    info!(
        "|       faultline server v{:<27}|",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Endpoint: {:40}|", addr);
    info!("|  Adapter:  {:40}|", config.adapter_name);
    info!("|  Identity: {:40}|", config.identity);
    info!("|  Pid:      {:40}|", std::process::id());
    info!("+----------------------------------------------------+");

    {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "ready {}", addr)?;
        stdout.flush()?;
    }

    let signal_handle = communicator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, stopping server...");
            signal_handle.shutdown();
        }
    });

    communicator.wait_for_shutdown().await;

    info!("faultline server stopped");
    Ok(())
}
