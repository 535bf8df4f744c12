//! Cluster login configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::{Credentials, DEFAULT_SSH_PORT};

/// Where and as whom to log in.
///
/// Secrets are never stored here: the password is supplied at runtime and
/// the private key is read from `private_key_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Login node host name
    pub host: String,

    /// SSH port
    pub port: u16,

    /// Account name on the cluster
    pub username: String,

    /// Path to a private key used for authentication
    pub private_key_path: Option<PathBuf>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_SSH_PORT,
            username: whoami::username(),
            private_key_path: None,
        }
    }
}

impl ClusterConfig {
    /// Build credentials from this config plus runtime secrets
    pub fn credentials(&self, password: Option<String>, private_key: Option<String>) -> Credentials {
        Credentials {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password,
            private_key,
        }
    }
}
