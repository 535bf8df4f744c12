//! hl-cli: command-line interface for hpc-link
//!
//! Provides the `hpc-link` binary: remote commands, Slurm job control, the
//! inference server lifecycle and a foreground tunnel.

pub mod commands;
pub mod context;
pub mod output;
