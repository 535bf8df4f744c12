//! SSH-backed channel opener

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use hl_core::{Credentials, TunnelError};

use super::forwarder::{BoxedStream, ChannelOpener};
use crate::ssh::{self, SshHandle};

/// Opens `direct-tcpip` channels over one authenticated session
pub struct SshChannelOpener {
    handle: SshHandle,
}

impl SshChannelOpener {
    pub fn new(handle: SshHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl ChannelOpener for SshChannelOpener {
    async fn open(
        &self,
        host: &str,
        port: u16,
        originator: SocketAddr,
    ) -> Result<BoxedStream, TunnelError> {
        let channel = self
            .handle
            .channel_open_direct_tcpip(
                host,
                u32::from(port),
                originator.ip().to_string(),
                u32::from(originator.port()),
            )
            .await
            .map_err(|e| TunnelError::Forward {
                destination: format!("{}:{}", host, port),
                message: e.to_string(),
            })?;
        Ok(Box::new(channel.into_stream()))
    }

    async fn close(&self) {
        ssh::close(&self.handle).await;
    }
}

/// Produces authenticated sessions for tunnels
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open_session(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn ChannelOpener>, TunnelError>;
}

/// Session factory that connects over SSH
#[derive(Debug, Clone)]
pub struct SshSessionFactory {
    connect_timeout: Duration,
}

impl SshSessionFactory {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl SessionFactory for SshSessionFactory {
    async fn open_session(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn ChannelOpener>, TunnelError> {
        let handle = ssh::connect(credentials, self.connect_timeout).await?;
        tracing::info!("Tunnel session authenticated to {}", credentials.address());
        Ok(Arc::new(SshChannelOpener::new(handle)))
    }
}
