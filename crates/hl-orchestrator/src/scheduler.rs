//! Typed Slurm operations over the remote executor

use std::sync::Arc;

use hl_core::{CommandResult, Credentials, JobId};
use hl_remote::CommandRunner;

use crate::batch::{self, BatchJob};
use crate::error::JobError;
use crate::slurm::{self, QueueStatus, SchedulerState};

/// Runs scheduler commands for one set of credentials
#[derive(Clone)]
pub struct Scheduler {
    runner: Arc<dyn CommandRunner>,
    credentials: Credentials,
}

impl Scheduler {
    pub fn new(runner: Arc<dyn CommandRunner>, credentials: Credentials) -> Self {
        Self {
            runner,
            credentials,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Run an arbitrary command line
    pub async fn run(&self, command: &str) -> Result<CommandResult, JobError> {
        Ok(self.runner.execute(&self.credentials, command).await?)
    }

    /// Check that we can log in and run a command
    pub async fn verify_connection(&self) -> Result<(), JobError> {
        let result = self.run("echo \"Connection Verified\"").await?;
        if !result.success() {
            return Err(JobError::CommandFailed {
                action: "Connection check",
                message: result.error_message("remote shell exited with an error"),
            });
        }
        tracing::info!("Connection to {} verified", self.credentials.address());
        Ok(())
    }

    /// Submit a batch job and return its id.
    ///
    /// `prefix` names the temporary script file on the login node.
    pub async fn submit(&self, job: &BatchJob, prefix: &str) -> Result<JobId, JobError> {
        let file = batch::unique_script_name(prefix);
        let command = batch::submission_command(&file, &job.render());

        tracing::debug!("Submitting {} as {}", job.name, file);
        let result = self.run(&command).await?;
        if !result.success() {
            return Err(JobError::SubmitRejected(
                result.error_message("Failed to submit job"),
            ));
        }

        let id = slurm::parse_job_id(&result.stdout)
            .ok_or_else(|| JobError::MissingJobId(result.stdout.trim().to_string()))?;
        tracing::info!("Submitted job {} ({})", id, job.name);
        Ok(id)
    }

    /// Current state of a job.
    ///
    /// Falls back to accounting when squeue rejects the id. A job missing
    /// from a successful squeue is reported as `COMPLETED`.
    pub async fn status(&self, job: &JobId) -> Result<QueueStatus, JobError> {
        let live = self.run(&slurm::status_command(job)).await?;

        if live.success() {
            return Ok(slurm::parse_queue_status(&live.stdout).unwrap_or(QueueStatus {
                state: SchedulerState::Completed,
                node: None,
            }));
        }

        tracing::debug!(
            "squeue failed for job {} ({}); checking accounting",
            job,
            live.error_message("no output")
        );
        let history = self.run(&slurm::history_command(job)).await?;
        match slurm::parse_history_state(&history.stdout) {
            Some(state) => Ok(QueueStatus { state, node: None }),
            None => Err(JobError::JobNotFound(job.clone())),
        }
    }

    /// Cancel a job
    pub async fn cancel(&self, job: &JobId) -> Result<(), JobError> {
        let result = self.run(&slurm::cancel_command(job)).await?;
        if !result.success() {
            return Err(JobError::CommandFailed {
                action: "Cancel",
                message: result.error_message("Failed to cancel job"),
            });
        }
        tracing::info!("Cancelled job {}", job);
        Ok(())
    }
}
