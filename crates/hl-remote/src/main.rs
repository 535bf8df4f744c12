//! hl-tunnel: standalone local port forwarder
//!
//! Authenticates once to the jump host, binds 127.0.0.1:<local_port> and
//! forwards every accepted connection to <dest_host>:<dest_port> through the
//! session. Prints a single readiness line on stdout; all logging goes to
//! stderr.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hl_core::types::DEFAULT_SSH_PORT;
use hl_remote::tunnel::args::{self, RawTunnelArgs};
use hl_remote::tunnel::{self, SshSessionFactory};

#[derive(Parser)]
#[command(name = "hl-tunnel")]
#[command(about = "Forward a local port to a host behind an SSH jump host")]
#[command(version)]
struct Args {
    /// Jump host
    host: String,

    /// Login name on the jump host
    username: String,

    /// Password, or "null" when authenticating with a key
    password: String,

    /// Private key material with newlines escaped as \n, or "null"
    key: String,

    /// Destination host as seen from the jump host
    dest_host: String,

    /// Destination port
    dest_port: u16,

    /// Local port to bind on 127.0.0.1
    local_port: u16,

    /// SSH port on the jump host
    #[arg(long, default_value_t = DEFAULT_SSH_PORT)]
    ssh_port: u16,

    /// Connect and authentication timeout in seconds
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let spec = RawTunnelArgs {
        host: args.host,
        username: args.username,
        password: args.password,
        key: args.key,
        destination_host: args.dest_host,
        destination_port: args.dest_port,
        local_port: args.local_port,
        ssh_port: args.ssh_port,
    }
    .into_spec()?;

    let sessions = SshSessionFactory::new(Duration::from_secs(args.connect_timeout));
    let ready = tunnel::establish(&spec, &sessions)
        .await
        .context("Failed to establish tunnel")?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", args::ready_line(ready.local_addr(), &spec.destination()))?;
    stdout.flush()?;
    drop(stdout);

    let cancel = CancellationToken::new();
    tokio::spawn(stop_on_signal(cancel.clone()));

    ready.serve(cancel).await?;
    tracing::info!("Tunnel closed");
    Ok(())
}

async fn stop_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("Received shutdown signal");
    cancel.cancel();
}
