//! Authenticated SSH session establishment
//!
//! Every caller gets a brand-new transport connection. Sessions are never
//! pooled or shared between commands.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config, Handle};
use russh::Disconnect;
use russh_keys::key::{KeyPair, PublicKey};

use hl_core::{AuthMethod, Credentials, ExecutionError};

/// Handle to an authenticated session
pub type SshHandle = Handle<ClientHandler>;

/// Authentication material ready to hand to russh
enum Auth {
    Password(String),
    Key(Arc<KeyPair>),
}

/// Open a session to `credentials.host:credentials.port` and authenticate.
///
/// Connect and authentication together are bounded by `timeout`. A rejected
/// password or key yields [`ExecutionError::AuthenticationFailed`]; network
/// and protocol failures yield transient errors.
pub async fn connect(
    credentials: &Credentials,
    timeout: Duration,
) -> Result<SshHandle, ExecutionError> {
    let auth = match credentials.auth_method()? {
        AuthMethod::Password(password) => Auth::Password(password),
        AuthMethod::PrivateKey(material) => {
            let key = russh_keys::decode_secret_key(&material, None)
                .map_err(|e| ExecutionError::InvalidKey(e.to_string()))?;
            Auth::Key(Arc::new(key))
        }
    };

    let address = credentials.address();
    tokio::time::timeout(timeout, establish(credentials, auth))
        .await
        .map_err(|_| ExecutionError::Timeout { address, timeout })?
}

async fn establish(credentials: &Credentials, auth: Auth) -> Result<SshHandle, ExecutionError> {
    let address = credentials.address();
    let config = Arc::new(Config::default());
    let handler = ClientHandler::new(address.clone());

    tracing::debug!("Connecting to {}", address);
    let mut session = client::connect(config, (credentials.host.as_str(), credentials.port), handler)
        .await
        .map_err(|e| transport_error(&address, e))?;

    tracing::debug!("Authenticating as user '{}'", credentials.username);
    let authenticated = match auth {
        Auth::Password(password) => {
            session
                .authenticate_password(credentials.username.as_str(), password)
                .await
        }
        Auth::Key(key) => {
            session
                .authenticate_publickey(credentials.username.as_str(), key)
                .await
        }
    }
    .map_err(|e| transport_error(&address, e))?;

    if !authenticated {
        tracing::warn!(
            "Authentication rejected for {}@{}",
            credentials.username,
            address
        );
        return Err(ExecutionError::AuthenticationFailed {
            host: credentials.host.clone(),
            username: credentials.username.clone(),
        });
    }

    tracing::debug!("Authenticated to {}", address);
    Ok(session)
}

/// Disconnect a session, ignoring errors from an already-dead transport
pub async fn close(session: &SshHandle) {
    if let Err(e) = session
        .disconnect(Disconnect::ByApplication, "closing", "en")
        .await
    {
        tracing::debug!("Disconnect failed (session already gone?): {}", e);
    }
}

fn transport_error(address: &str, e: russh::Error) -> ExecutionError {
    ExecutionError::Transport {
        address: address.to_string(),
        message: e.to_string(),
    }
}

/// SSH client handler
///
/// Host keys are accepted and logged; the login node is addressed by the
/// operator and no known_hosts store is kept.
pub struct ClientHandler {
    address: String,
}

impl ClientHandler {
    fn new(address: String) -> Self {
        Self { address }
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::debug!(
            "Server host key for {}: {}",
            self.address,
            server_public_key.fingerprint()
        );
        Ok(true)
    }
}
