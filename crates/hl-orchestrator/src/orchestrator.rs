//! Job run state machine
//!
//! `Idle -> Submitting -> Queued -> StartingTunnel -> Ready`, with `Error`
//! reachable from every in-flight state and `stop` returning to `Idle` from
//! anywhere.
//!
//! # Stale results
//!
//! Each run gets a generation number. `stop` bumps it under the run lock,
//! so a submission, poll or tunnel start that finishes after the run was
//! stopped sees a different generation and its result is discarded. In-flight
//! remote commands are never aborted; only the polling timer is cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use hl_core::config::{JobConfig, TunnelConfig};
use hl_core::JobId;
use hl_remote::tunnel::{TunnelControl, TunnelSpec, TunnelStart};

use crate::batch::BatchJob;
use crate::error::JobError;
use crate::inference;
use crate::scheduler::Scheduler;
use crate::state::{JobSnapshot, JobState};

/// Tunables for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Queue polling period
    pub poll_interval: Duration,
    /// Local port the tunnel binds
    pub local_port: u16,
    /// Port on the allocated node the tunnel forwards to
    pub remote_port: u16,
    /// `scancel` the job when a run is stopped
    pub cancel_on_stop: bool,
    /// Prefix of the temporary script file on the login node
    pub script_prefix: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            local_port: 5000,
            remote_port: 5000,
            cancel_on_stop: false,
            script_prefix: inference::SCRIPT_PREFIX.to_string(),
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(job: &JobConfig, tunnel: &TunnelConfig) -> Self {
        Self {
            poll_interval: job.poll_interval,
            local_port: tunnel.local_port,
            remote_port: tunnel.remote_port,
            cancel_on_stop: job.cancel_on_stop,
            ..Self::default()
        }
    }
}

/// Run bookkeeping guarded by one lock
#[derive(Default)]
struct RunControl {
    generation: u64,
    cancel: Option<CancellationToken>,
}

struct Inner {
    scheduler: Scheduler,
    tunnels: Arc<dyn TunnelControl>,
    settings: OrchestratorSettings,
    run: Mutex<RunControl>,
    snapshot: watch::Sender<JobSnapshot>,
}

/// Drives one job at a time from submission to a ready tunnel
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

impl JobOrchestrator {
    pub fn new(
        scheduler: Scheduler,
        tunnels: Arc<dyn TunnelControl>,
        settings: OrchestratorSettings,
    ) -> Self {
        let (snapshot, _) = watch::channel(JobSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                scheduler,
                tunnels,
                settings,
                run: Mutex::new(RunControl::default()),
                snapshot,
            }),
        }
    }

    /// Current state, job id, node, error and log
    pub fn snapshot(&self) -> JobSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn state(&self) -> JobState {
        self.inner.snapshot.borrow().state
    }

    /// Receiver notified on every change
    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Begin a run. Refused unless the orchestrator is `Idle`.
    ///
    /// Returns once the run is `Submitting`; progress is observed through
    /// [`snapshot`](Self::snapshot) or [`subscribe`](Self::subscribe).
    pub async fn start(&self, job: BatchJob) -> Result<(), JobError> {
        let mut run = self.inner.run.lock().await;
        let current = self.state();
        if current.is_active() {
            return Err(JobError::AlreadyRunning(current));
        }

        run.generation += 1;
        let generation = run.generation;
        let cancel = CancellationToken::new();
        run.cancel = Some(cancel.clone());

        self.inner.snapshot.send_modify(|s| {
            *s = JobSnapshot::default();
            s.transition(JobState::Submitting);
            s.record(format!("Submitting job {}", job.name));
        });
        drop(run);

        tokio::spawn(self.inner.clone().drive(generation, cancel, job));
        Ok(())
    }

    /// Stop the current run from any state and return to `Idle`.
    ///
    /// Cancels polling, tears down the tunnel and clears the run. With
    /// `cancel_on_stop` the job is also cancelled, best effort.
    pub async fn stop(&self) {
        let previous = {
            let mut run = self.inner.run.lock().await;
            run.generation += 1;
            if let Some(cancel) = run.cancel.take() {
                cancel.cancel();
            }
            self.inner.snapshot.send_replace(JobSnapshot::default())
        };

        if self.inner.tunnels.stop().await {
            tracing::info!("Tunnel stopped");
        }

        if self.inner.settings.cancel_on_stop {
            if let Some(id) = &previous.job_id {
                self.inner.cancel_job(id).await;
            }
        }

        tracing::info!("Job run stopped (was {})", previous.state);
    }
}

impl Drop for JobOrchestrator {
    fn drop(&mut self) {
        if let Ok(mut run) = self.inner.run.try_lock() {
            if let Some(cancel) = run.cancel.take() {
                cancel.cancel();
            }
        }
    }
}

impl Inner {
    /// Apply `f` to the snapshot if `generation` is still the current run
    async fn update(&self, generation: u64, f: impl FnOnce(&mut JobSnapshot)) -> bool {
        let run = self.run.lock().await;
        if run.generation != generation {
            return false;
        }
        self.snapshot.send_modify(f);
        true
    }

    async fn drive(self: Arc<Self>, generation: u64, cancel: CancellationToken, job: BatchJob) {
        let id = match self.scheduler.submit(&job, &self.settings.script_prefix).await {
            Ok(id) => id,
            Err(e) => {
                self.update(generation, |s| s.fail(e.to_string())).await;
                return;
            }
        };

        let current = self
            .update(generation, |s| {
                s.job_id = Some(id.clone());
                if s.transition(JobState::Queued) {
                    s.record(format!("Job {} submitted, waiting for allocation", id));
                }
            })
            .await;
        if !current {
            tracing::info!("Run stopped during submission of job {}", id);
            if self.settings.cancel_on_stop {
                self.cancel_job(&id).await;
            }
            return;
        }

        if let Some(node) = self.poll(generation, &cancel, &id).await {
            self.start_tunnel(generation, node).await;
        }
    }

    /// Poll until the job runs on a node (returned) or the run ends (`None`)
    async fn poll(&self, generation: u64, cancel: &CancellationToken, id: &JobId) -> Option<String> {
        let period = self.settings.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = ticker.tick() => {}
            }

            let result = self.scheduler.status(id).await;
            let mut finished = None;
            let current = self
                .update(generation, |s| match &result {
                    Ok(status) => {
                        if let Some(node) = status.running_on() {
                            s.allocated_node = Some(node.to_string());
                            if s.transition(JobState::StartingTunnel) {
                                s.record(format!("Job {} running on {}, starting tunnel", id, node));
                            }
                            finished = Some(Some(node.to_string()));
                        } else if status.state.is_terminal() {
                            s.fail(JobError::JobEnded(status.state.clone()).to_string());
                            finished = Some(None);
                        } else {
                            s.record(format!("Job {} is {}", id, status.state));
                        }
                    }
                    Err(e) if e.is_fatal() => {
                        s.fail(e.to_string());
                        finished = Some(None);
                    }
                    Err(e) => s.record(format!("Status check failed: {}", e)),
                })
                .await;

            if !current {
                tracing::debug!("Discarding status of job {} from a stopped run", id);
                return None;
            }
            if let Some(outcome) = finished {
                return outcome;
            }
        }
    }

    async fn start_tunnel(&self, generation: u64, node: String) {
        let spec = TunnelSpec {
            credentials: self.scheduler.credentials().clone(),
            destination_host: node,
            destination_port: self.settings.remote_port,
            local_port: self.settings.local_port,
        };

        let result = self.tunnels.start(&spec).await;
        let current = self
            .update(generation, |s| match &result {
                Ok(start) => {
                    if s.transition(JobState::Ready) {
                        s.record(format!(
                            "Tunnel ready: {} -> {}",
                            start.local_addr(),
                            spec.destination()
                        ));
                    }
                }
                Err(e) => s.fail(format!("Failed to start tunnel: {}", e)),
            })
            .await;

        if !current {
            if let Ok(TunnelStart::Started(addr)) = result {
                tracing::info!("Run stopped while the tunnel started; closing {}", addr);
                self.tunnels.stop().await;
            }
        }
    }

    async fn cancel_job(&self, id: &JobId) {
        if let Err(e) = self.scheduler.cancel(id).await {
            tracing::warn!("Failed to cancel job {}: {}", id, e);
        }
    }
}
