//! Ownership of the single active tunnel
//!
//! The manager is an explicit resource shared by reference, not global
//! state. Starts are serialized through one async mutex so two concurrent
//! requests can never both bind the local port.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::sync::Mutex;

use hl_core::TunnelError;

use super::TunnelSpec;

/// A live tunnel, however it is hosted
#[async_trait]
pub trait RunningTunnel: Send + Sync {
    /// Address the local listener is bound to
    fn local_addr(&self) -> SocketAddr;

    /// False once the tunnel has exited on its own
    fn is_alive(&self) -> bool;

    /// Stop the tunnel and wait for it to exit
    async fn shutdown(self: Box<Self>);
}

/// Brings up a tunnel and returns once it is ready
#[async_trait]
pub trait TunnelLauncher: Send + Sync {
    async fn launch(&self, spec: &TunnelSpec) -> Result<Box<dyn RunningTunnel>, TunnelError>;
}

/// Outcome of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelStart {
    /// A new tunnel was launched
    Started(SocketAddr),
    /// A tunnel was already active; nothing was launched
    AlreadyRunning(SocketAddr),
}

impl TunnelStart {
    pub fn local_addr(&self) -> SocketAddr {
        match self {
            TunnelStart::Started(addr) | TunnelStart::AlreadyRunning(addr) => *addr,
        }
    }
}

/// Start/stop surface used by the job orchestrator
#[async_trait]
pub trait TunnelControl: Send + Sync {
    /// Start a tunnel unless one is already active
    async fn start(&self, spec: &TunnelSpec) -> Result<TunnelStart, TunnelError>;

    /// Stop the active tunnel; returns false if there was none
    async fn stop(&self) -> bool;

    /// Whether a live tunnel is held
    async fn is_active(&self) -> bool;
}

/// Holds at most one running tunnel
pub struct TunnelManager {
    launcher: Box<dyn TunnelLauncher>,
    active: Mutex<Option<Box<dyn RunningTunnel>>>,
}

impl TunnelManager {
    pub fn new(launcher: impl TunnelLauncher + 'static) -> Self {
        Self {
            launcher: Box::new(launcher),
            active: Mutex::new(None),
        }
    }

    /// Local address of the live tunnel, if any
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let active = self.active.lock().await;
        active
            .as_ref()
            .filter(|t| t.is_alive())
            .map(|t| t.local_addr())
    }
}

#[async_trait]
impl TunnelControl for TunnelManager {
    async fn start(&self, spec: &TunnelSpec) -> Result<TunnelStart, TunnelError> {
        let mut active = self.active.lock().await;

        if let Some(tunnel) = active.as_ref() {
            if tunnel.is_alive() {
                let addr = tunnel.local_addr();
                tracing::info!("Tunnel already active on {}", addr);
                return Ok(TunnelStart::AlreadyRunning(addr));
            }
        }
        if let Some(dead) = active.take() {
            tracing::warn!("Discarding tunnel on {} that exited on its own", dead.local_addr());
            dead.shutdown().await;
        }

        tracing::info!("Starting tunnel to {}", spec.destination());
        let tunnel = self.launcher.launch(spec).await?;
        let addr = tunnel.local_addr();
        *active = Some(tunnel);
        Ok(TunnelStart::Started(addr))
    }

    async fn stop(&self) -> bool {
        let tunnel = self.active.lock().await.take();
        match tunnel {
            Some(tunnel) => {
                tracing::info!("Stopping tunnel on {}", tunnel.local_addr());
                tunnel.shutdown().await;
                true
            }
            None => {
                tracing::debug!("No active tunnel to stop");
                false
            }
        }
    }

    async fn is_active(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|t| t.is_alive())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hl_core::Credentials;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    struct FakeTunnel {
        addr: SocketAddr,
        alive: Arc<AtomicBool>,
        shutdowns: Arc<AtomicU32>,
    }

    #[async_trait]
    impl RunningTunnel for FakeTunnel {
        fn local_addr(&self) -> SocketAddr {
            self.addr
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        async fn shutdown(self: Box<Self>) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeLauncher {
        launches: Arc<AtomicU32>,
        shutdowns: Arc<AtomicU32>,
        alive: Arc<AtomicBool>,
        fail: bool,
    }

    #[async_trait]
    impl TunnelLauncher for FakeLauncher {
        async fn launch(&self, spec: &TunnelSpec) -> Result<Box<dyn RunningTunnel>, TunnelError> {
            if self.fail {
                return Err(TunnelError::ExitedBeforeReady {
                    code: Some(1),
                    output: "Authentication failed".into(),
                });
            }
            let n = self.launches.fetch_add(1, Ordering::SeqCst);
            self.alive.store(true, Ordering::SeqCst);
            Ok(Box::new(FakeTunnel {
                addr: SocketAddr::from(([127, 0, 0, 1], spec.local_port + n as u16)),
                alive: self.alive.clone(),
                shutdowns: self.shutdowns.clone(),
            }))
        }
    }

    fn spec() -> TunnelSpec {
        TunnelSpec {
            credentials: Credentials::new("login.cluster", "alice").with_password("pw"),
            destination_host: "node07".into(),
            destination_port: 5000,
            local_port: 5000,
        }
    }

    #[tokio::test]
    async fn test_second_start_is_a_no_op() {
        let launcher = FakeLauncher::default();
        let launches = launcher.launches.clone();
        let manager = TunnelManager::new(launcher);

        let first = manager.start(&spec()).await.unwrap();
        let second = manager.start(&spec()).await.unwrap();

        assert!(matches!(first, TunnelStart::Started(_)));
        assert_eq!(second, TunnelStart::AlreadyRunning(first.local_addr()));
        assert_eq!(launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_without_tunnel_is_a_no_op() {
        let manager = TunnelManager::new(FakeLauncher::default());
        assert!(!manager.stop().await);
        assert!(!manager.is_active().await);
    }

    #[tokio::test]
    async fn test_stop_shuts_down_and_clears() {
        let launcher = FakeLauncher::default();
        let shutdowns = launcher.shutdowns.clone();
        let manager = TunnelManager::new(launcher);

        manager.start(&spec()).await.unwrap();
        assert!(manager.is_active().await);
        assert!(manager.stop().await);
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
        assert!(!manager.is_active().await);
        assert!(!manager.stop().await);
    }

    #[tokio::test]
    async fn test_exited_tunnel_is_replaced() {
        let launcher = FakeLauncher::default();
        let launches = launcher.launches.clone();
        let alive = launcher.alive.clone();
        let shutdowns = launcher.shutdowns.clone();
        let manager = TunnelManager::new(launcher);

        manager.start(&spec()).await.unwrap();
        alive.store(false, Ordering::SeqCst);
        assert!(!manager.is_active().await);

        let restarted = manager.start(&spec()).await.unwrap();
        assert!(matches!(restarted, TunnelStart::Started(_)));
        assert_eq!(launches.load(Ordering::SeqCst), 2);
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_launch_leaves_nothing_active() {
        let manager = TunnelManager::new(FakeLauncher {
            fail: true,
            ..Default::default()
        });
        assert!(manager.start(&spec()).await.is_err());
        assert!(!manager.is_active().await);
    }
}
