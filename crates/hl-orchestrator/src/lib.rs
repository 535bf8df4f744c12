//! hl-orchestrator: batch job lifecycle for hpc-link
//!
//! Submits a Slurm job through the remote executor, polls the queue until
//! the job is running, then brings up a tunnel to the allocated node. The
//! inference module provides the job body and an HTTP client for the server
//! it starts.

pub mod batch;
pub mod error;
pub mod inference;
pub mod orchestrator;
pub mod scheduler;
pub mod slurm;
pub mod state;

pub use batch::BatchJob;
pub use error::JobError;
pub use orchestrator::{JobOrchestrator, OrchestratorSettings};
pub use scheduler::Scheduler;
pub use slurm::{QueueStatus, SchedulerState};
pub use state::{JobSnapshot, JobState, LogEntry};
