//! Orchestrator error types

use thiserror::Error;

use hl_core::{ExecutionError, JobId, TunnelError};

use crate::slurm::SchedulerState;
use crate::state::JobState;

/// Errors from scheduler commands and job runs
#[derive(Error, Debug)]
pub enum JobError {
    /// The remote command could not be run
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// The tunnel could not be started
    #[error(transparent)]
    Tunnel(#[from] TunnelError),

    /// `sbatch` exited non-zero
    #[error("{0}")]
    SubmitRejected(String),

    /// `sbatch` succeeded but printed no job id
    #[error("Submission output did not contain a job id: {0:?}")]
    MissingJobId(String),

    /// Neither the live queue nor accounting knows the job
    #[error("Job {0} not found")]
    JobNotFound(JobId),

    /// The job reached a terminal scheduler state before running
    #[error("Job ended with state: {0}")]
    JobEnded(SchedulerState),

    /// A scheduler command ran but failed
    #[error("{action} failed: {message}")]
    CommandFailed { action: &'static str, message: String },

    /// A run is already in progress
    #[error("A job run is already in progress (state: {0})")]
    AlreadyRunning(JobState),

    /// The model is not on the allowed list
    #[error("Invalid model selection: {0}")]
    InvalidModel(String),
}

impl JobError {
    /// True for errors that no amount of polling will fix
    pub fn is_fatal(&self) -> bool {
        match self {
            JobError::Execution(e) => e.is_fatal(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failure_is_fatal() {
        let err: JobError = ExecutionError::AuthenticationFailed {
            host: "login".into(),
            username: "alice".into(),
        }
        .into();
        assert!(err.is_fatal());
        assert!(!JobError::JobNotFound(JobId::from("1")).is_fatal());
    }

    #[test]
    fn test_job_ended_message_names_state() {
        let err = JobError::JobEnded(SchedulerState::Failed);
        assert_eq!(err.to_string(), "Job ended with state: FAILED");
    }
}
