//! Slurm command lines and output parsing

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use hl_core::shell::quote;
use hl_core::JobId;

/// Node placeholder squeue prints for jobs without an allocation
const NO_NODE: &str = "(N/A)";

/// Job state as reported by squeue/sacct
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    Pending,
    Running,
    Completing,
    Completed,
    Failed,
    Cancelled,
    Timeout,
    /// Any state we do not act on (CONFIGURING, SUSPENDED, NODE_FAIL...)
    Other(String),
}

impl SchedulerState {
    /// States after which the job never runs again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SchedulerState::Completed
                | SchedulerState::Failed
                | SchedulerState::Cancelled
                | SchedulerState::Timeout
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            SchedulerState::Pending => "PENDING",
            SchedulerState::Running => "RUNNING",
            SchedulerState::Completing => "COMPLETING",
            SchedulerState::Completed => "COMPLETED",
            SchedulerState::Failed => "FAILED",
            SchedulerState::Cancelled => "CANCELLED",
            SchedulerState::Timeout => "TIMEOUT",
            SchedulerState::Other(s) => s,
        }
    }
}

impl FromStr for SchedulerState {
    type Err = Infallible;

    /// Accepts long and compact state codes; sacct's truncation marker `+`
    /// is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_end_matches('+').to_ascii_uppercase();
        Ok(match s.as_str() {
            "PENDING" | "PD" => SchedulerState::Pending,
            "RUNNING" | "R" => SchedulerState::Running,
            "COMPLETING" | "CG" => SchedulerState::Completing,
            "COMPLETED" | "CD" => SchedulerState::Completed,
            "FAILED" | "F" => SchedulerState::Failed,
            "CANCELLED" | "CA" => SchedulerState::Cancelled,
            "TIMEOUT" | "TO" => SchedulerState::Timeout,
            _ => SchedulerState::Other(s),
        })
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SchedulerState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One status observation for a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub state: SchedulerState,
    /// Allocated node, once the scheduler has assigned one
    pub node: Option<String>,
}

impl QueueStatus {
    /// Job has started and we know where
    pub fn running_on(&self) -> Option<&str> {
        match self.state {
            SchedulerState::Running => self.node.as_deref(),
            _ => None,
        }
    }
}

/// `squeue` for one job, printing `<STATE> <NODELIST>`
pub fn status_command(job: &JobId) -> String {
    format!(
        "squeue -j {} --noheader --format=\"%T %N\"",
        quote(job.as_str())
    )
}

/// `sacct` for one job, printing its state
pub fn history_command(job: &JobId) -> String {
    format!("sacct -j {} --noheader --format=State", quote(job.as_str()))
}

/// `scancel` for one job
pub fn cancel_command(job: &JobId) -> String {
    format!("scancel {}", quote(job.as_str()))
}

/// Parse `squeue --format="%T %N"` output.
///
/// Empty output means the job has left the live queue and yields `None`.
pub fn parse_queue_status(output: &str) -> Option<QueueStatus> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut fields = line.split_whitespace();
    let state = fields.next()?.parse().ok()?;
    let node = fields
        .next()
        .filter(|n| *n != NO_NODE)
        .map(str::to_string);
    Some(QueueStatus { state, node })
}

/// Parse `sacct --format=State` output: the first token is the state
/// (`CANCELLED by 42` is `CANCELLED`).
pub fn parse_history_state(output: &str) -> Option<SchedulerState> {
    output.split_whitespace().next()?.parse().ok()
}

/// Extract the id from sbatch output like `Submitted batch job 4821`
pub fn parse_job_id(output: &str) -> Option<JobId> {
    let marker = "Submitted batch job ";
    output.lines().find_map(|line| {
        let idx = line.find(marker)?;
        let digits: String = line[idx + marker.len()..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        (!digits.is_empty()).then(|| JobId::new(digits))
    })
}
