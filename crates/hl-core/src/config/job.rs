//! Inference server job configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Defaults for the batch job that hosts the inference server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Hugging Face model id served by the job
    pub model: String,

    /// Slurm partition
    pub partition: String,

    /// CPUs per task
    pub cpus: u32,

    /// Memory request (Slurm syntax, e.g. `32G`)
    pub memory: String,

    /// Generic resources (e.g. `gpu:1`)
    pub gres: Option<String>,

    /// Wall-clock limit (`HH:MM:SS`)
    pub time: String,

    /// Environment modules loaded before the body runs
    pub modules: Vec<String>,

    /// Queue polling cadence
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,

    /// Cancel the scheduler job when the run is stopped
    pub cancel_on_stop: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            model: "meta-llama/Meta-Llama-3-8B-Instruct".to_string(),
            partition: "kamiak".to_string(),
            cpus: 4,
            memory: "32G".to_string(),
            gres: Some("gpu:1".to_string()),
            time: "04:00:00".to_string(),
            modules: vec!["python3/3.13.1".to_string(), "cuda/12.2.0".to_string()],
            poll_interval: Duration::from_secs(5),
            cancel_on_stop: false,
        }
    }
}
