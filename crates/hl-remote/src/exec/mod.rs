//! One-shot remote command execution with retry

mod executor;
mod retry;

pub use executor::{CommandRunner, Executor, SshTransport, Transport};
pub use retry::RetryPolicy;
