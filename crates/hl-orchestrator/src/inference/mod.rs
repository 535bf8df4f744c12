//! On-demand inference server job
//!
//! The job provisions a small Flask app under `$HOME/llm` on the compute
//! node and serves it on a fixed port; the tunnel makes that port reachable
//! locally.

mod client;

pub use client::{HealthStatus, InferenceClient, InferenceError, QueryReply};

use hl_core::config::JobConfig;

use crate::batch::BatchJob;
use crate::error::JobError;

/// Models the server is allowed to load
pub const ALLOWED_MODELS: &[&str] = &[
    "meta-llama/Meta-Llama-3-8B-Instruct",
    "mistralai/Mistral-7B-Instruct-v0.2",
    "google/gemma-7b-it",
    "google/gemma-3-1b-it",
];

/// Prefix for the submitted script's remote file name
pub const SCRIPT_PREFIX: &str = "llm_job";

/// Job name shown in the queue
pub const JOB_NAME: &str = "rag_app";

const SERVER_TEMPLATE: &str = include_str!("../../templates/llm_server.sh");

/// Reject models outside [`ALLOWED_MODELS`]
pub fn validate_model(model: &str) -> Result<(), JobError> {
    if ALLOWED_MODELS.contains(&model) {
        Ok(())
    } else {
        Err(JobError::InvalidModel(model.to_string()))
    }
}

/// Build the inference server job for `model`, listening on `port`
pub fn server_job(config: &JobConfig, model: &str, port: u16) -> Result<BatchJob, JobError> {
    validate_model(model)?;

    let body = SERVER_TEMPLATE
        .replace("{{MODEL_ID}}", model)
        .replace("{{PORT}}", &port.to_string());

    Ok(BatchJob {
        name: JOB_NAME.to_string(),
        partition: config.partition.clone(),
        nodes: 1,
        ntasks_per_node: Some(1),
        cpus: config.cpus,
        memory: config.memory.clone(),
        time: config.time.clone(),
        gres: config.gres.clone(),
        output: Some(format!("{}_%j.out", JOB_NAME)),
        error: Some(format!("{}_%j.err", JOB_NAME)),
        modules: config.modules.clone(),
        body,
    })
}
