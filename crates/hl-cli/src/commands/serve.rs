//! Run the inference server job and keep its tunnel up

use std::sync::Arc;

use anyhow::{Context as _, Result};

use hl_orchestrator::inference;
use hl_orchestrator::{JobOrchestrator, JobSnapshot, JobState, OrchestratorSettings};
use hl_remote::{ProcessLauncher, TunnelManager};

use crate::commands::shutdown_signal;
use crate::context::Context;
use crate::output::{print_error, print_info, print_success};

/// Submit the server job, stream the run log and stop on Ctrl-C
pub async fn run(ctx: &Context, model: Option<String>) -> Result<()> {
    let model = model.unwrap_or_else(|| ctx.config.job.model.clone());
    let job = inference::server_job(&ctx.config.job, &model, ctx.config.tunnel.remote_port)?;

    let launcher = ProcessLauncher::locate(ctx.config.tunnel.program.clone())
        .with_connect_timeout(ctx.config.executor.connect_timeout);
    tracing::debug!("Tunnel program: {:?}", launcher.program());

    let orchestrator = JobOrchestrator::new(
        ctx.scheduler(),
        Arc::new(TunnelManager::new(launcher)),
        OrchestratorSettings::from_config(&ctx.config.job, &ctx.config.tunnel),
    );
    let mut updates = orchestrator.subscribe();

    print_info(&format!("Starting {} on {}", model, ctx.credentials.host));
    orchestrator
        .start(job)
        .await
        .context("Failed to start inference job")?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut printer = LogPrinter::default();

    let outcome = loop {
        tokio::select! {
            _ = &mut shutdown => break Ok(()),
            changed = updates.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let snapshot = updates.borrow_and_update().clone();
                printer.print_new(&snapshot);

                match snapshot.state {
                    JobState::Ready if !printer.announced => {
                        printer.announced = true;
                        print_success(&format!(
                            "Server ready at {} (Ctrl-C to stop)",
                            ctx.config.tunnel.local_url()
                        ));
                    }
                    JobState::Error => {
                        let message = snapshot
                            .last_error
                            .unwrap_or_else(|| "unknown error".to_string());
                        break Err(anyhow::anyhow!(message));
                    }
                    _ => {}
                }
            }
        }
    };

    orchestrator.stop().await;
    match outcome {
        Ok(()) => {
            print_info("Stopped");
            Ok(())
        }
        Err(e) => {
            print_error("Inference job failed");
            Err(e)
        }
    }
}

/// Prints each log entry once
#[derive(Default)]
struct LogPrinter {
    printed: usize,
    announced: bool,
}

impl LogPrinter {
    fn print_new(&mut self, snapshot: &JobSnapshot) {
        if snapshot.log.len() < self.printed {
            self.printed = 0;
        }
        for entry in &snapshot.log[self.printed..] {
            println!("{}", entry);
        }
        self.printed = snapshot.log.len();
    }
}
