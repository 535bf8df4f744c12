//! Tunnel hosted in a separate `hl-tunnel` process
//!
//! The child announces readiness with one line on stdout. Anything it writes
//! to stderr is forwarded into our log. Exiting before that line appears is a
//! startup failure.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use hl_core::TunnelError;

use super::args;
use super::manager::{RunningTunnel, TunnelLauncher};
use super::TunnelSpec;

/// Name of the tunnel binary
pub const TUNNEL_PROGRAM: &str = "hl-tunnel";

/// How long a stopped child gets to exit after SIGTERM before it is killed
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Stderr lines kept for the startup failure message
const MAX_CAPTURED_LINES: usize = 50;

/// Spawns `hl-tunnel` child processes
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    connect_timeout: Option<Duration>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            connect_timeout: None,
        }
    }

    /// Bound the child's connect + authenticate step (the child's own
    /// default applies otherwise)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Use the configured program, else `hl-tunnel` next to the current
    /// executable, else `hl-tunnel` from `PATH`.
    pub fn locate(configured: Option<PathBuf>) -> Self {
        if let Some(program) = configured {
            return Self::new(program);
        }
        let file_name = format!("{}{}", TUNNEL_PROGRAM, std::env::consts::EXE_SUFFIX);
        let sibling = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(&file_name)))
            .filter(|path| path.is_file());
        match sibling {
            Some(path) => Self::new(path),
            None => Self::new(TUNNEL_PROGRAM),
        }
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    fn spawn_error(&self, source: io::Error) -> TunnelError {
        TunnelError::Spawn {
            program: self.program.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl TunnelLauncher for ProcessLauncher {
    async fn launch(&self, spec: &TunnelSpec) -> Result<Box<dyn RunningTunnel>, TunnelError> {
        tracing::debug!("Spawning {}", self.program.display());
        let mut child = Command::new(&self.program)
            .args(args::to_argv(spec, self.connect_timeout))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.spawn_error(io::Error::other("stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| self.spawn_error(io::Error::other("stderr not captured")))?;
        let stderr_task = tokio::spawn(forward_stderr(stderr));

        let mut lines = BufReader::new(stdout).lines();
        let mut local_addr = None;
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(addr) = args::parse_ready_line(&line) {
                local_addr = Some(addr);
                break;
            }
            tracing::debug!(target: "hl_tunnel", "{}", line);
        }

        let Some(local_addr) = local_addr else {
            let code = child.wait().await.ok().and_then(|status| status.code());
            let output = stderr_task.await.unwrap_or_default();
            tracing::error!("Tunnel process exited before becoming ready (code {:?})", code);
            return Err(TunnelError::ExitedBeforeReady { code, output });
        };

        tracing::info!("Tunnel process ready on {}", local_addr);
        tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });

        let cancel = CancellationToken::new();
        let exited = Arc::new(AtomicBool::new(false));
        let monitor = tokio::spawn(supervise(child, cancel.clone(), exited.clone()));

        Ok(Box::new(ChildTunnel {
            local_addr,
            cancel,
            exited,
            monitor: Some(monitor),
        }))
    }
}

/// Log child stderr and return the first lines of it
async fn forward_stderr(stderr: ChildStderr) -> String {
    let mut captured = Vec::new();
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::info!(target: "hl_tunnel", "{}", line);
        if captured.len() < MAX_CAPTURED_LINES {
            captured.push(line);
        }
    }
    captured.join("\n")
}

async fn supervise(mut child: Child, cancel: CancellationToken, exited: Arc<AtomicBool>) {
    tokio::select! {
        status = child.wait() => {
            match status {
                Ok(status) => tracing::warn!("Tunnel process exited unexpectedly: {}", status),
                Err(e) => tracing::warn!("Failed to wait on tunnel process: {}", e),
            }
        }
        _ = cancel.cancelled() => terminate(&mut child).await,
    }
    exited.store(true, Ordering::SeqCst);
}

async fn terminate(child: &mut Child) {
    request_stop(child);
    match tokio::time::timeout(STOP_GRACE, child.wait()).await {
        Ok(Ok(status)) => tracing::debug!("Tunnel process exited: {}", status),
        Ok(Err(e)) => tracing::warn!("Failed to wait on tunnel process: {}", e),
        Err(_) => {
            tracing::warn!("Tunnel process ignored SIGTERM for {:?}, killing", STOP_GRACE);
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill tunnel process: {}", e);
            }
        }
    }
}

#[cfg(unix)]
fn request_stop(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: pid belongs to a child we have not yet reaped
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            tracing::warn!(
                "Failed to signal tunnel process {}: {}",
                pid,
                io::Error::last_os_error()
            );
        }
    }
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::warn!("Failed to stop tunnel process: {}", e);
    }
}

/// A running `hl-tunnel` child
pub struct ChildTunnel {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    exited: Arc<AtomicBool>,
    monitor: Option<JoinHandle<()>>,
}

#[async_trait]
impl RunningTunnel for ChildTunnel {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn is_alive(&self) -> bool {
        !self.exited.load(Ordering::SeqCst)
    }

    async fn shutdown(mut self: Box<Self>) {
        self.cancel.cancel();
        if let Some(monitor) = self.monitor.take() {
            if let Err(e) = monitor.await {
                tracing::warn!("Tunnel supervisor task failed: {}", e);
            }
        }
    }
}

impl Drop for ChildTunnel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
