//! Local port forwarding over an authenticated SSH session
//!
//! A tunnel binds `127.0.0.1:<local_port>` and, for every accepted client,
//! opens a `direct-tcpip` channel to a fixed destination and splices bytes in
//! both directions. One session serves all connections for the life of the
//! tunnel.

pub mod args;
mod forwarder;
mod manager;
mod process;
mod session;
mod task;

use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use hl_core::{Credentials, TunnelError};

pub use forwarder::{AsyncStream, BoxedStream, ChannelOpener, Forwarder};
pub use manager::{RunningTunnel, TunnelControl, TunnelLauncher, TunnelManager, TunnelStart};
pub use process::{ChildTunnel, ProcessLauncher, TUNNEL_PROGRAM};
pub use session::{SessionFactory, SshChannelOpener, SshSessionFactory};
pub use task::{TaskLauncher, TaskTunnel};

/// Everything needed to bring up one tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelSpec {
    /// Jump host credentials; held for the lifetime of the tunnel
    pub credentials: Credentials,
    /// Host the remote side connects to (usually the allocated compute node)
    pub destination_host: String,
    /// Port on the destination host
    pub destination_port: u16,
    /// Local port to bind on 127.0.0.1 (0 picks a free port)
    pub local_port: u16,
}

impl TunnelSpec {
    /// `host:port` of the forwarding destination
    pub fn destination(&self) -> String {
        format!("{}:{}", self.destination_host, self.destination_port)
    }
}

/// A tunnel whose session is authenticated and whose listener is bound.
///
/// Reaching this value is what "ready" means.
pub struct ReadyTunnel {
    listener: TcpListener,
    local_addr: SocketAddr,
    forwarder: Forwarder,
}

impl ReadyTunnel {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept and forward connections until cancelled or the listener fails.
    ///
    /// The session is closed on return either way.
    pub async fn serve(self, cancel: CancellationToken) -> Result<(), TunnelError> {
        self.forwarder.serve(self.listener, cancel).await
    }
}

/// Open the session, then bind the listener.
///
/// If the bind fails the session is closed before the error is returned.
pub async fn establish(
    spec: &TunnelSpec,
    sessions: &dyn SessionFactory,
) -> Result<ReadyTunnel, TunnelError> {
    let opener = sessions.open_session(&spec.credentials).await?;

    let listener = match bind_local(spec.local_port).await {
        Ok(listener) => listener,
        Err(e) => {
            opener.close().await;
            return Err(e);
        }
    };
    let local_addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(source) => {
            opener.close().await;
            return Err(TunnelError::Bind {
                port: spec.local_port,
                source,
            });
        }
    };

    tracing::info!(
        "Tunnel listening on {} -> {}",
        local_addr,
        spec.destination()
    );

    Ok(ReadyTunnel {
        listener,
        local_addr,
        forwarder: Forwarder::new(
            opener,
            spec.destination_host.clone(),
            spec.destination_port,
        ),
    })
}

async fn bind_local(port: u16) -> Result<TcpListener, TunnelError> {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port))
        .await
        .map_err(|source| TunnelError::Bind { port, source })
}
