//! Tunnel configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Local listener and forwarding target for the inference tunnel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Port bound on 127.0.0.1
    pub local_port: u16,

    /// Port on the compute node the traffic is forwarded to
    pub remote_port: u16,

    /// Path to the `hl-tunnel` binary (defaults to the one next to the
    /// running executable, then `$PATH`)
    pub program: Option<PathBuf>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            local_port: 5000,
            remote_port: 5000,
            program: None,
        }
    }
}

impl TunnelConfig {
    /// Base URL of a service reached through the tunnel
    pub fn local_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.local_port)
    }
}
