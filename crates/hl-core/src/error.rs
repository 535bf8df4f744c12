//! Core error types for hpc-link

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while establishing a session or running a remote command.
///
/// Each variant is classified when it is created: see [`ExecutionError::is_fatal`].
/// A remote command that runs and exits non-zero is *not* an error; it is
/// reported through [`crate::CommandResult`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The server rejected the supplied credentials
    #[error("Authentication failed for {username}@{host}")]
    AuthenticationFailed { host: String, username: String },

    /// Neither a password nor a private key was supplied
    #[error("No usable credentials: provide a password or a private key")]
    MissingCredentials,

    /// The private key material could not be decoded
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    /// Connecting and authenticating did not finish in time
    #[error("Connection to {address} timed out after {timeout:?}")]
    Timeout { address: String, timeout: Duration },

    /// DNS failure, refused connection, reset, protocol error
    #[error("Transport error for {address}: {message}")]
    Transport { address: String, message: String },

    /// The command channel could not be opened or the command not started
    #[error("Failed to open command channel: {0}")]
    Channel(String),

    /// The session went away before the command channel closed
    #[error("Connection dropped before the command channel closed")]
    Dropped,
}

impl ExecutionError {
    /// Fatal errors must never be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExecutionError::AuthenticationFailed { .. }
                | ExecutionError::MissingCredentials
                | ExecutionError::InvalidKey(_)
        )
    }

    /// Transient errors are plausibly caused by network flakiness.
    pub fn is_transient(&self) -> bool {
        !self.is_fatal()
    }
}

/// Tunnel-related errors
#[derive(Error, Debug)]
pub enum TunnelError {
    /// Could not establish the authenticated session to the jump host
    #[error("Session error: {0}")]
    Session(#[from] ExecutionError),

    /// Could not bind the local listener
    #[error("Failed to bind 127.0.0.1:{port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The listener failed to accept a connection
    #[error("Failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),

    /// A forwarded channel for a single client could not be opened
    #[error("Forwarding to {destination} failed: {message}")]
    Forward { destination: String, message: String },

    /// The tunnel process could not be spawned
    #[error("Failed to spawn tunnel process {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The tunnel process exited without announcing readiness
    #[error("Tunnel process exited before becoming ready (code {code:?}). Output: {output}")]
    ExitedBeforeReady { code: Option<i32>, output: String },

    /// Invalid tunnel arguments
    #[error("Invalid tunnel argument: {0}")]
    InvalidArgument(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
