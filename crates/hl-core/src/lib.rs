//! hl-core: Core types, errors and configuration for hpc-link
//!
//! This crate provides the credential and command-result types, the error
//! taxonomy and the configuration structures shared by the remote executor,
//! the tunnel, the job orchestrator and the CLI.

pub mod config;
pub mod error;
pub mod shell;
pub mod time;
pub mod types;

pub use error::{ConfigError, ExecutionError, TunnelError};
pub use types::{AuthMethod, CommandResult, Credentials, JobId};
