// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! faultline control CLI
//!
//! Drives a running `faultline-server` from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Which process serves "test"?
//! faultline-ctl pid
//!
//! # Kill it in the middle of a call
//! faultline-ctl --endpoint 127.0.0.1:12010 idempotent-abort
//!
//! # Stop it gracefully
//! faultline-ctl shutdown
//!
//! # Endpoint, identity and timeout from the server's config file
//! faultline-ctl --config server.json pid
//! ```

use clap::{Parser, Subcommand};
use colored::Colorize;
use faultline::{FaultProxy, RpcError, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// faultline control CLI
#[derive(Parser, Debug)]
#[command(name = "faultline-ctl")]
#[command(about = "Drive a faultline fault-injection server")]
#[command(version)]
struct Args {
    /// Server endpoint
    #[arg(short, long, default_value = "127.0.0.1:12010")]
    endpoint: SocketAddr,

    /// Servant identity
    #[arg(short, long, default_value = "test")]
    identity: String,

    /// Call timeout in milliseconds
    #[arg(short, long, default_value = "10000")]
    timeout: u64,

    /// Server configuration file (JSON); overrides the flags above
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the server's process id
    Pid,

    /// Kill the server process (normal mode)
    Abort,

    /// Kill the server process (idempotent mode)
    IdempotentAbort,

    /// Kill the server process (nonmutating mode)
    NonmutatingAbort,

    /// Shut the server down gracefully
    Shutdown,

    /// Check the servant is reachable and print its interface
    Ping,
}

type CmdResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = connect_and_run(&args).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn connect_and_run(args: &Args) -> CmdResult {
    let (endpoint, identity, timeout) = match &args.config {
        Some(path) => {
            let config = ServerConfig::from_file(path)?;
            let timeout = config.call_timeout();
            (config.endpoint(), config.identity, timeout)
        }
        None => (
            args.endpoint,
            args.identity.clone(),
            Duration::from_millis(args.timeout),
        ),
    };

    let proxy = FaultProxy::connect_with_timeout(endpoint, &identity, timeout).await?;
    run(&proxy, &args.command).await
}

async fn run(proxy: &FaultProxy, command: &Commands) -> CmdResult {
    match command {
        Commands::Pid => cmd_pid(proxy).await,
        Commands::Abort => report_abort("abort", proxy.abort().await),
        Commands::IdempotentAbort => {
            report_abort("idempotentAbort", proxy.idempotent_abort().await)
        }
        Commands::NonmutatingAbort => {
            report_abort("nonmutatingAbort", proxy.nonmutating_abort().await)
        }
        Commands::Shutdown => cmd_shutdown(proxy).await,
        Commands::Ping => cmd_ping(proxy).await,
    }
}

async fn cmd_pid(proxy: &FaultProxy) -> CmdResult {
    let pid = proxy.pid().await?;
    println!("{}", pid);
    Ok(())
}

async fn cmd_shutdown(proxy: &FaultProxy) -> CmdResult {
    proxy.shutdown().await?;
    println!(
        "{} shutdown requested on {}",
        "[OK]".green().bold(),
        proxy.endpoint()
    );
    Ok(())
}

async fn cmd_ping(proxy: &FaultProxy) -> CmdResult {
    proxy.ping().await?;
    let interface = proxy.interface_id().await?;
    println!(
        "{} {} at {} implements {}",
        "[OK]".green().bold(),
        proxy.identity(),
        proxy.endpoint(),
        interface
    );
    Ok(())
}

/// An abort succeeds when the call dies with the server.
fn report_abort(operation: &str, err: RpcError) -> CmdResult {
    if err.is_connectivity() {
        println!(
            "{} {} terminated the server ({})",
            "[OK]".green().bold(),
            operation,
            err
        );
        Ok(())
    } else {
        Err(err.into())
    }
}
