//! Accept loop and per-connection byte splicing

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use hl_core::TunnelError;

/// Bidirectional byte stream
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Type-erased forwarded channel
pub type BoxedStream = Box<dyn AsyncStream>;

type SharedOpener = Arc<dyn ChannelOpener>;

/// Opens forwarded data channels over an existing session
#[async_trait]
pub trait ChannelOpener: Send + Sync {
    /// Open a channel to `host:port` on behalf of the client at `originator`
    async fn open(
        &self,
        host: &str,
        port: u16,
        originator: SocketAddr,
    ) -> Result<BoxedStream, TunnelError>;

    /// Close the underlying session
    async fn close(&self) {}
}

/// Forwards every accepted connection to a fixed destination
pub struct Forwarder {
    opener: SharedOpener,
    destination_host: Arc<str>,
    destination_port: u16,
}

impl Forwarder {
    /// Create a forwarder over an opened session
    pub fn new(opener: Arc<dyn ChannelOpener>, destination_host: String, destination_port: u16) -> Self {
        Self {
            opener,
            destination_host: destination_host.into(),
            destination_port,
        }
    }

    /// Run the accept loop.
    ///
    /// Each connection is handled on its own task so a stalled channel never
    /// blocks accepting. Returns `Ok` on cancellation and
    /// [`TunnelError::Accept`] if the listener fails; the session is closed
    /// in both cases.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> Result<(), TunnelError> {
        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Tunnel stopping");
                    break Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        tracing::debug!("Accepted tunnel connection from {}", peer);
                        tokio::spawn(forward_connection(
                            self.opener.clone(),
                            self.destination_host.clone(),
                            self.destination_port,
                            socket,
                            peer,
                            cancel.child_token(),
                        ));
                    }
                    Err(e) => {
                        tracing::error!("Tunnel listener failed: {}", e);
                        break Err(TunnelError::Accept(e));
                    }
                }
            }
        };

        drop(listener);
        self.opener.close().await;
        result
    }
}

async fn forward_connection(
    opener: SharedOpener,
    host: Arc<str>,
    port: u16,
    mut socket: TcpStream,
    peer: SocketAddr,
    cancel: CancellationToken,
) {
    let mut channel = match opener.open(&host, port, peer).await {
        Ok(channel) => channel,
        Err(e) => {
            tracing::warn!("Dropping connection from {}: {}", peer, e);
            return;
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::debug!("Connection from {} closed by tunnel shutdown", peer);
        }
        copied = tokio::io::copy_bidirectional(&mut socket, &mut channel) => match copied {
            Ok((sent, received)) => tracing::debug!(
                "Connection from {} closed ({} bytes sent, {} bytes received)",
                peer,
                sent,
                received
            ),
            Err(e) => tracing::debug!("Connection from {} ended with error: {}", peer, e),
        }
    }

    let _ = socket.shutdown().await;
    let _ = channel.shutdown().await;
}
