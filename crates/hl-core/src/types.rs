//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ExecutionError;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Identifies a remote endpoint and how to authenticate against it.
///
/// Passed by value (or borrowed) into each operation; nothing keeps it beyond
/// the call it serves except a running tunnel.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Remote host name or address
    pub host: String,
    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login name
    pub username: String,
    /// Password, if password authentication is used
    #[serde(default)]
    pub password: Option<String>,
    /// OpenSSH/PEM private key material, if key authentication is used
    #[serde(default)]
    pub private_key: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// Authentication method resolved from [`Credentials`]
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMethod {
    Password(String),
    PrivateKey(String),
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Password(_) => write!(f, "Password(<redacted>)"),
            AuthMethod::PrivateKey(_) => write!(f, "PrivateKey(<redacted>)"),
        }
    }
}

impl Credentials {
    /// Create credentials on the default port with no secret attached
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            username: username.into(),
            password: None,
            private_key: None,
        }
    }

    /// Set the SSH port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Attach a password
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Attach private key material
    pub fn with_private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    /// `host:port` for logging and error messages
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Pick the authentication method: password if present, else private key.
    ///
    /// Key material that arrived with literal `\n` sequences (for example
    /// through a command line) is unescaped before use.
    pub fn auth_method(&self) -> Result<AuthMethod, ExecutionError> {
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            return Ok(AuthMethod::Password(password.to_string()));
        }
        if let Some(key) = self.private_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return Ok(AuthMethod::PrivateKey(unescape_newlines(key)));
        }
        Err(ExecutionError::MissingCredentials)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Replace literal `\n` escape sequences with real newlines
pub fn unescape_newlines(s: &str) -> String {
    s.replace("\\n", "\n")
}

/// Outcome of one remote command.
///
/// Always fully populated. `exit_code` is `None` when the remote process was
/// terminated by a signal; treat that as a failure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandResult {
    /// True only for a normal exit with status 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stderr if it has content, otherwise the given fallback
    pub fn error_message(&self, fallback: &str) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            fallback.to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Scheduler job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new job ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
