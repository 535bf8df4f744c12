//! Command-line contract between the supervisor and the `hl-tunnel` process

use std::net::SocketAddr;
use std::time::Duration;

use hl_core::types::{unescape_newlines, DEFAULT_SSH_PORT};
use hl_core::{Credentials, TunnelError};

use super::TunnelSpec;

/// Prefix of the single line printed to stdout once the tunnel is ready
pub const READY_MARKER: &str = "Tunnel listening on";

/// Placeholder passed for an absent password or key
pub const ABSENT: &str = "null";

/// Format the readiness line
pub fn ready_line(local_addr: SocketAddr, destination: &str) -> String {
    format!("{} {} -> {}", READY_MARKER, local_addr, destination)
}

/// Extract the bound address from a readiness line
pub fn parse_ready_line(line: &str) -> Option<SocketAddr> {
    let rest = line.trim().strip_prefix(READY_MARKER)?;
    let addr = rest.split_whitespace().next()?;
    addr.parse().ok()
}

/// Map the sentinels `null`, `undefined` and the empty string to `None`.
///
/// Any other value is returned untouched, surrounding whitespace included.
pub fn optional_arg(value: &str) -> Option<String> {
    match value.trim() {
        "" | "null" | "undefined" => None,
        _ => Some(value.to_string()),
    }
}

/// Argument vector for `hl-tunnel`:
/// `host username password key dest_host dest_port local_port [--ssh-port N]
/// [--connect-timeout SECS]`
pub fn to_argv(spec: &TunnelSpec, connect_timeout: Option<Duration>) -> Vec<String> {
    let creds = &spec.credentials;
    let mut argv = vec![
        creds.host.clone(),
        creds.username.clone(),
        creds.password.clone().unwrap_or_else(|| ABSENT.to_string()),
        creds
            .private_key
            .as_deref()
            .map(|k| k.replace('\n', "\\n"))
            .unwrap_or_else(|| ABSENT.to_string()),
        spec.destination_host.clone(),
        spec.destination_port.to_string(),
        spec.local_port.to_string(),
    ];
    if creds.port != DEFAULT_SSH_PORT {
        argv.push("--ssh-port".to_string());
        argv.push(creds.port.to_string());
    }
    if let Some(timeout) = connect_timeout {
        argv.push("--connect-timeout".to_string());
        argv.push(timeout.as_secs().max(1).to_string());
    }
    argv
}

/// Raw positional arguments as received by `hl-tunnel`
#[derive(Debug, Clone)]
pub struct RawTunnelArgs {
    pub host: String,
    pub username: String,
    pub password: String,
    pub key: String,
    pub destination_host: String,
    pub destination_port: u16,
    pub local_port: u16,
    pub ssh_port: u16,
}

impl RawTunnelArgs {
    /// Resolve sentinels and build the tunnel spec
    pub fn into_spec(self) -> Result<TunnelSpec, TunnelError> {
        if self.host.trim().is_empty() {
            return Err(TunnelError::InvalidArgument("host is empty".into()));
        }
        if self.destination_host.trim().is_empty() {
            return Err(TunnelError::InvalidArgument(
                "destination host is empty".into(),
            ));
        }

        let mut credentials = Credentials::new(self.host, self.username).with_port(self.ssh_port);
        credentials.password = optional_arg(&self.password);
        credentials.private_key = optional_arg(&self.key).map(|k| unescape_newlines(&k));

        Ok(TunnelSpec {
            credentials,
            destination_host: self.destination_host,
            destination_port: self.destination_port,
            local_port: self.local_port,
        })
    }
}
