//! hl-remote: remote execution and SSH tunnelling for hpc-link
//!
//! Every remote command runs over a fresh, short-lived SSH session with
//! retry on transient failures. Tunnels hold one session for their whole
//! lifetime and forward local TCP connections through it.

pub mod exec;
pub mod ssh;
pub mod tunnel;

pub use exec::{CommandRunner, Executor, RetryPolicy, SshTransport, Transport};
pub use tunnel::{
    ProcessLauncher, TaskLauncher, TunnelControl, TunnelManager, TunnelSpec, TunnelStart,
};
