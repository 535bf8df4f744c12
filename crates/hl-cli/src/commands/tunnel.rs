//! Foreground tunnel to a compute node

use std::time::Duration;

use anyhow::{Context as _, Result};

use hl_remote::{TaskLauncher, TunnelControl, TunnelManager, TunnelSpec};

use crate::commands::shutdown_signal;
use crate::context::Context;
use crate::output::{print_info, print_success, print_warning};

/// How often the foreground loop checks the forwarder is still running
const LIVENESS_CHECK: Duration = Duration::from_secs(1);

/// Forward `127.0.0.1:<local_port>` to `<node>:<remote_port>` until interrupted
pub async fn run(
    ctx: &Context,
    node: &str,
    remote_port: Option<u16>,
    local_port: Option<u16>,
) -> Result<()> {
    let spec = TunnelSpec {
        credentials: ctx.credentials.clone(),
        destination_host: node.to_string(),
        destination_port: remote_port.unwrap_or(ctx.config.tunnel.remote_port),
        local_port: local_port.unwrap_or(ctx.config.tunnel.local_port),
    };

    let manager = TunnelManager::new(TaskLauncher::ssh(ctx.config.executor.connect_timeout));
    let started = manager
        .start(&spec)
        .await
        .with_context(|| format!("Failed to open tunnel to {}", spec.destination()))?;

    print_success(&format!(
        "Tunnel listening on {} -> {}",
        started.local_addr(),
        spec.destination()
    ));
    print_info("Press Ctrl-C to close the tunnel");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut check = tokio::time::interval(LIVENESS_CHECK);

    let exited = loop {
        tokio::select! {
            _ = &mut shutdown => break false,
            _ = check.tick() => {
                if !manager.is_active().await {
                    break true;
                }
            }
        }
    };

    manager.stop().await;
    if exited {
        anyhow::bail!("Tunnel to {} closed unexpectedly", spec.destination());
    }
    print_warning("Tunnel closed");
    Ok(())
}
