//! Job run state and the snapshot observers see

use std::fmt;

use serde::Serialize;

use hl_core::time::{clock_label, current_time_millis};
use hl_core::JobId;

/// Where a job run is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Idle,
    Submitting,
    Queued,
    StartingTunnel,
    Ready,
    Error,
}

impl JobState {
    /// Forward edges of a run. Every state returns to `Idle` on stop.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (_, Idle) => true,
            (Idle, Submitting) => true,
            (Submitting, Queued | Error) => true,
            (Queued, Queued | StartingTunnel | Error) => true,
            (StartingTunnel, Ready | Error) => true,
            _ => false,
        }
    }

    /// A run is in progress and `start` must be refused
    pub fn is_active(self) -> bool {
        self != JobState::Idle
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Idle => "idle",
            JobState::Submitting => "submitting",
            JobState::Queued => "queued",
            JobState::StartingTunnel => "starting tunnel",
            JobState::Ready => "ready",
            JobState::Error => "error",
        };
        f.write_str(name)
    }
}

/// One timestamped log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub at_millis: u64,
    pub message: String,
}

impl LogEntry {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            at_millis: current_time_millis(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", clock_label(self.at_millis), self.message)
    }
}

/// Everything an observer can see about the current run
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct JobSnapshot {
    pub state: JobState,
    pub job_id: Option<JobId>,
    pub allocated_node: Option<String>,
    pub last_error: Option<String>,
    pub log: Vec<LogEntry>,
}

impl JobSnapshot {
    /// Append a log line
    pub fn record(&mut self, message: impl Into<String>) {
        let entry = LogEntry::now(message);
        tracing::info!("{}", entry.message);
        self.log.push(entry);
    }

    /// Move to `next`, logging the transition.
    ///
    /// Returns false and leaves the snapshot untouched for an edge the state
    /// machine does not have.
    pub fn transition(&mut self, next: JobState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!("Ignoring invalid transition {} -> {}", self.state, next);
            return false;
        }
        if self.state != next {
            tracing::debug!("Job state {} -> {}", self.state, next);
        }
        self.state = next;
        true
    }

    /// Park the run in `Error` with a message
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        if self.transition(JobState::Error) {
            self.record(format!("Error: {}", message));
            self.last_error = Some(message);
        }
    }
}
