//! Tunnel hosted on a tokio task inside the current process

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use hl_core::TunnelError;

use super::manager::{RunningTunnel, TunnelLauncher};
use super::session::{SessionFactory, SshSessionFactory};
use super::TunnelSpec;

/// Launches tunnels as background tasks
pub struct TaskLauncher {
    sessions: Arc<dyn SessionFactory>,
}

impl TaskLauncher {
    pub fn new(sessions: Arc<dyn SessionFactory>) -> Self {
        Self { sessions }
    }

    /// Launcher that authenticates over SSH
    pub fn ssh(connect_timeout: Duration) -> Self {
        Self::new(Arc::new(SshSessionFactory::new(connect_timeout)))
    }
}

#[async_trait]
impl TunnelLauncher for TaskLauncher {
    async fn launch(&self, spec: &TunnelSpec) -> Result<Box<dyn RunningTunnel>, TunnelError> {
        let ready = super::establish(spec, self.sessions.as_ref()).await?;
        let local_addr = ready.local_addr();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(ready.serve(cancel.clone()));

        Ok(Box::new(TaskTunnel {
            local_addr,
            cancel,
            handle: Some(handle),
        }))
    }
}

/// A tunnel running on a tokio task
pub struct TaskTunnel {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    handle: Option<JoinHandle<Result<(), TunnelError>>>,
}

#[async_trait]
impl RunningTunnel for TaskTunnel {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn is_alive(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    async fn shutdown(mut self: Box<Self>) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            match handle.await {
                Ok(Ok(())) => tracing::debug!("Tunnel task on {} finished", self.local_addr),
                Ok(Err(e)) => tracing::warn!("Tunnel on {} ended with error: {}", self.local_addr, e),
                Err(e) => tracing::warn!("Tunnel task on {} panicked: {}", self.local_addr, e),
            }
        }
    }
}

impl Drop for TaskTunnel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
