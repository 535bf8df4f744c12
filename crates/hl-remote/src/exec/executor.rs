//! Remote command executor
//!
//! Each attempt opens a fresh session, runs the command line verbatim and
//! accumulates stdout/stderr until the channel closes. Fatal errors abort
//! immediately; transient ones are retried with linear backoff.

use std::time::Duration;

use async_trait::async_trait;
use russh::ChannelMsg;

use hl_core::config::ExecutorConfig;
use hl_core::{CommandResult, Credentials, ExecutionError};

use super::retry::RetryPolicy;
use crate::ssh::{self, SshHandle};

/// Runs a command line on the remote host.
///
/// The command is passed through unmodified; callers quote their own
/// arguments. A non-zero exit status is a normal result.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(
        &self,
        credentials: &Credentials,
        command: &str,
    ) -> Result<CommandResult, ExecutionError>;
}

/// A single attempt: connect, authenticate, run, disconnect.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn run_once(
        &self,
        credentials: &Credentials,
        command: &str,
    ) -> Result<CommandResult, ExecutionError>;
}

/// SSH transport backed by russh
#[derive(Debug, Clone)]
pub struct SshTransport {
    connect_timeout: Duration,
}

impl SshTransport {
    /// Create a transport with the given connect + auth timeout
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn run_once(
        &self,
        credentials: &Credentials,
        command: &str,
    ) -> Result<CommandResult, ExecutionError> {
        let session = ssh::connect(credentials, self.connect_timeout).await?;
        let result = run_command(&session, command).await;
        ssh::close(&session).await;
        result
    }
}

async fn run_command(session: &SshHandle, command: &str) -> Result<CommandResult, ExecutionError> {
    let mut channel = session
        .channel_open_session()
        .await
        .map_err(|e| ExecutionError::Channel(e.to_string()))?;

    channel
        .exec(true, command)
        .await
        .map_err(|e| ExecutionError::Channel(e.to_string()))?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_code = None;
    let mut exited = false;
    let mut closed = false;

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
            ChannelMsg::ExtendedData { data, ext: 1 } => stderr.extend_from_slice(&data),
            ChannelMsg::ExitStatus { exit_status } => {
                exit_code = Some(exit_status as i32);
                exited = true;
            }
            ChannelMsg::ExitSignal { signal_name, .. } => {
                tracing::debug!("Remote command terminated by signal {:?}", signal_name);
                exit_code = None;
                exited = true;
            }
            ChannelMsg::Close => {
                closed = true;
                break;
            }
            _ => {}
        }
    }

    if !closed && !exited {
        return Err(ExecutionError::Dropped);
    }

    Ok(CommandResult {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
    })
}

/// Retrying command executor
pub struct Executor<T = SshTransport> {
    transport: T,
    policy: RetryPolicy,
}

impl Executor<SshTransport> {
    /// Executor over SSH configured from `[executor]`
    pub fn ssh(config: &ExecutorConfig) -> Self {
        Self::new(
            SshTransport::new(config.connect_timeout),
            RetryPolicy::from_config(config),
        )
    }
}

impl<T: Transport> Executor<T> {
    /// Create an executor over any transport
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// The retry policy in use
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl<T: Transport> CommandRunner for Executor<T> {
    async fn execute(
        &self,
        credentials: &Credentials,
        command: &str,
    ) -> Result<CommandResult, ExecutionError> {
        let mut attempt = 1;
        loop {
            match self.transport.run_once(credentials, command).await {
                Ok(result) => {
                    tracing::debug!(
                        "Command on {} finished with {:?} after {} attempt(s)",
                        credentials.address(),
                        result.exit_code,
                        attempt
                    );
                    return Ok(result);
                }
                Err(e) if e.is_transient() && self.policy.has_next(attempt) => {
                    let delay = self.policy.delay_after(attempt);
                    tracing::warn!(
                        "SSH attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt,
                        self.policy.max_attempts(),
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!("SSH attempt {} failed fatally: {}", attempt, e);
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(
                        "SSH command failed after {} attempts: {}",
                        attempt,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Transport that replays a scripted sequence of outcomes
    struct ScriptedTransport {
        outcomes: Mutex<VecDeque<Result<CommandResult, ExecutionError>>>,
        attempts: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(outcomes: Vec<Result<CommandResult, ExecutionError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                attempts: AtomicU32::new(0),
            }
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn run_once(
            &self,
            _credentials: &Credentials,
            _command: &str,
        ) -> Result<CommandResult, ExecutionError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("transport called more often than scripted")
        }
    }

    fn creds() -> Credentials {
        Credentials::new("login.cluster", "alice").with_password("pw")
    }

    fn hello() -> CommandResult {
        CommandResult {
            stdout: "hello\n".into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    fn reset(n: u32) -> ExecutionError {
        ExecutionError::Transport {
            address: "login.cluster:22".into(),
            message: format!("connection reset #{}", n),
        }
    }

    fn executor(outcomes: Vec<Result<CommandResult, ExecutionError>>) -> Executor<ScriptedTransport> {
        Executor::new(
            ScriptedTransport::new(outcomes),
            RetryPolicy::new(3, Duration::from_millis(1000)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success() {
        let exec = executor(vec![Ok(hello())]);
        let result = exec.execute(&creds(), "echo hello").await.unwrap();
        assert_eq!(result, hello());
        assert_eq!(exec.transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_then_success() {
        for failures in 1..3u32 {
            let mut outcomes: Vec<_> = (1..=failures).map(|n| Err(reset(n))).collect();
            outcomes.push(Ok(hello()));
            let exec = executor(outcomes);

            let result = exec.execute(&creds(), "echo hello").await.unwrap();
            assert_eq!(result.stdout, "hello\n");
            assert_eq!(exec.transport.attempts(), failures + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let exec = executor(vec![Err(reset(1)), Err(reset(2)), Err(reset(3))]);
        let err = exec.execute(&creds(), "echo hello").await.unwrap_err();
        assert_eq!(err, reset(3));
        assert_eq!(exec.transport.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_is_not_retried() {
        let auth = ExecutionError::AuthenticationFailed {
            host: "login.cluster".into(),
            username: "alice".into(),
        };
        let exec = executor(vec![Err(auth.clone()), Ok(hello())]);
        let err = exec.execute(&creds(), "echo hello").await.unwrap_err();
        assert_eq!(err, auth);
        assert_eq!(exec.transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_after_transient_stops_retrying() {
        let auth = ExecutionError::AuthenticationFailed {
            host: "login.cluster".into(),
            username: "alice".into(),
        };
        let exec = executor(vec![Err(reset(1)), Err(auth.clone()), Ok(hello())]);
        let err = exec.execute(&creds(), "true").await.unwrap_err();
        assert_eq!(err, auth);
        assert_eq!(exec.transport.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_one_then_two_seconds() {
        let exec = executor(vec![Err(reset(1)), Err(reset(2)), Ok(hello())]);
        let started = tokio::time::Instant::now();
        exec.execute(&creds(), "echo hello").await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_zero_exit_is_a_result() {
        let failed = CommandResult {
            stdout: String::new(),
            stderr: "squeue: error: Invalid job id specified\n".into(),
            exit_code: Some(1),
        };
        let exec = executor(vec![Ok(failed.clone())]);
        let result = exec.execute(&creds(), "squeue -j 1").await.unwrap();
        assert_eq!(result, failed);
        assert_eq!(exec.transport.attempts(), 1);
    }
}
