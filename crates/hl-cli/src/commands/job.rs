//! Batch job submission, status and cancellation

use std::path::Path;

use anyhow::{Context as _, Result};
use clap::{Args, ValueEnum};

use hl_core::JobId;
use hl_orchestrator::BatchJob;

use crate::context::Context;
use crate::output::{format_job_status, print_success};

/// Prefix for scripts uploaded by `submit`
const SCRIPT_PREFIX: &str = "job";

/// Starting point for a job's directives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Template {
    #[default]
    Standard,
    Gpu,
}

/// Options for `submit`
#[derive(Args, Debug, Clone)]
pub struct SubmitArgs {
    /// Shell script to run as the job body (template body if omitted)
    #[arg(short, long)]
    pub script: Option<std::path::PathBuf>,

    /// Directive template
    #[arg(long, value_enum, default_value_t = Template::Standard)]
    pub template: Template,

    /// Job name
    #[arg(short, long, default_value = "hpc_link_job")]
    pub name: String,

    #[arg(long)]
    pub partition: Option<String>,

    #[arg(long)]
    pub nodes: Option<u32>,

    /// CPUs per task
    #[arg(long)]
    pub cpus: Option<u32>,

    /// Memory request, e.g. 8G
    #[arg(long)]
    pub memory: Option<String>,

    /// Wall-clock limit, HH:MM:SS
    #[arg(long)]
    pub time: Option<String>,

    /// Generic resources, e.g. gpu:1
    #[arg(long)]
    pub gres: Option<String>,

    /// Print the rendered script instead of submitting it
    #[arg(long)]
    pub dry_run: bool,
}

impl SubmitArgs {
    /// Apply the template and overrides
    pub fn build_job(&self) -> Result<BatchJob> {
        let mut job = match self.template {
            Template::Standard => BatchJob::standard(&self.name),
            Template::Gpu => BatchJob::gpu(&self.name),
        };
        if let Some(path) = &self.script {
            job = job.with_body(read_body(path)?);
        }
        if let Some(partition) = &self.partition {
            job.partition = partition.clone();
        }
        if let Some(nodes) = self.nodes {
            job.nodes = nodes;
        }
        if let Some(cpus) = self.cpus {
            job.cpus = cpus;
        }
        if let Some(memory) = &self.memory {
            job.memory = memory.clone();
        }
        if let Some(time) = &self.time {
            job.time = time.clone();
        }
        if let Some(gres) = &self.gres {
            job.gres = Some(gres.clone());
        }
        Ok(job)
    }
}

/// Script body without its shebang; the rendered job supplies one
fn read_body(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {:?}", path))?;
    let body = match content.strip_prefix("#!") {
        Some(rest) => rest.split_once('\n').map(|(_, body)| body).unwrap_or(""),
        None => content.as_str(),
    };
    Ok(body.trim_end().to_string())
}

/// Render the script only
pub fn render(args: &SubmitArgs) -> Result<()> {
    print!("{}", args.build_job()?.render());
    Ok(())
}

pub async fn submit(ctx: &Context, args: &SubmitArgs) -> Result<()> {
    let job = args.build_job()?;
    let job_id = ctx
        .scheduler()
        .submit(&job, SCRIPT_PREFIX)
        .await
        .context("Job submission failed")?;
    print_success(&format!("Submitted batch job {}", job_id));
    Ok(())
}

pub async fn status(ctx: &Context, job: &str, json: bool) -> Result<()> {
    let job = JobId::from(job);
    let status = ctx
        .scheduler()
        .status(&job)
        .await
        .with_context(|| format!("Failed to query job {}", job))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("{}", format_job_status(&job, &status));
    }
    Ok(())
}

pub async fn cancel(ctx: &Context, job: &str) -> Result<()> {
    let job = JobId::from(job);
    ctx.scheduler()
        .cancel(&job)
        .await
        .with_context(|| format!("Failed to cancel job {}", job))?;
    print_success(&format!("Cancelled job {}", job));
    Ok(())
}
