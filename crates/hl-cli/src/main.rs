//! hpc-link CLI
//!
//! Single binary for working with a Slurm cluster over SSH:
//! - Remote commands and connection checks
//! - Batch job submission, status and cancellation
//! - The on-demand inference server (job + tunnel) and a client for it

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hl_core::config;
use hpc_link::commands;
use hpc_link::commands::job::SubmitArgs;
use hpc_link::context::{ConnectionArgs, Context};
use hpc_link::output::print_error;

#[derive(Parser)]
#[command(name = "hpc-link")]
#[command(author, version, about = "Remote execution and job tunnels for Slurm clusters")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    connection: ConnectionArgs,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the cluster login works
    Verify,

    /// Run a command on the login node
    Exec {
        /// Command line, passed to the remote shell unmodified
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Submit a batch job
    Submit(SubmitArgs),

    /// Show a job's scheduler state
    Status {
        /// Job ID
        job: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Cancel a job
    Cancel {
        /// Job ID
        job: String,
    },

    /// Forward a local port to a compute node until interrupted
    Tunnel {
        /// Compute node to forward to
        #[arg(long)]
        node: String,
        /// Port on the node (overrides [tunnel].remote_port)
        #[arg(long)]
        remote_port: Option<u16>,
        /// Local port (overrides [tunnel].local_port)
        #[arg(long)]
        local_port: Option<u16>,
    },

    /// Start the inference server job and tunnel to it
    Serve {
        /// Model to load (overrides [job].model)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Send a message to the inference server
    Ask {
        #[arg(required = true)]
        message: Vec<String>,
    },

    /// Clear the inference server's conversation context
    ResetContext,

    /// Show the inference server's health
    Health,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Show config file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            print_error(&format!("{:#}", e));
            std::process::exit(1);
        }
    }
}

/// Dispatch a command; the result is the process exit code
async fn run(cli: Cli) -> Result<i32> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Config { action } => {
            match action {
                ConfigAction::Show => commands::config::config_show(config_path)?,
                ConfigAction::Path => commands::config::config_path(config_path)?,
                ConfigAction::Init { force } => commands::config::config_init(config_path, force)?,
            }
            return Ok(0);
        }
        Commands::Ask { message } => {
            let config = config::load_or_default(config_path)?;
            commands::llm::ask(&config, &message.join(" ")).await?;
            return Ok(0);
        }
        Commands::ResetContext => {
            let config = config::load_or_default(config_path)?;
            commands::llm::reset(&config).await?;
            return Ok(0);
        }
        Commands::Health => {
            let config = config::load_or_default(config_path)?;
            commands::llm::health(&config).await?;
            return Ok(0);
        }
        Commands::Submit(args) if args.dry_run => {
            commands::job::render(&args)?;
            return Ok(0);
        }
        _ => {}
    }

    // Everything below talks to the cluster
    let ctx = Context::load(config_path, &cli.connection)?;

    match cli.command {
        Commands::Verify => commands::remote::verify(&ctx).await?,
        Commands::Exec { command } => return commands::remote::exec(&ctx, &command).await,
        Commands::Submit(args) => commands::job::submit(&ctx, &args).await?,
        Commands::Status { job, json } => commands::job::status(&ctx, &job, json).await?,
        Commands::Cancel { job } => commands::job::cancel(&ctx, &job).await?,
        Commands::Tunnel {
            node,
            remote_port,
            local_port,
        } => commands::tunnel::run(&ctx, &node, remote_port, local_port).await?,
        Commands::Serve { model } => commands::serve::run(&ctx, model).await?,
        Commands::Config { .. } | Commands::Ask { .. } | Commands::ResetContext | Commands::Health => {}
    }

    Ok(0)
}
