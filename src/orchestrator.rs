// ===============================
// src/orchestrator.rs
// ===============================
//
// External solver job lifecycle:
//
//   SUBMITTED -> RUNNING -> COMPLETED
//                        -> FAILED
//   (any non-terminal)   -> TIMED_OUT   once now - submitted_at > timeout
//
// The poll loop sleeps through an injected Clock and stops as soon as the
// cancel flag flips, so nothing keeps polling after the caller gives up.
//
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{OptimizerError, Result};
use crate::metrics::SOLVER_POLLS;
use crate::poly::PolyBuilder;
use crate::solver_api::{JobBody, JobResults, JobStatus, PolynomialFile};

/// Transport seam to the external solver. `HttpSolver` in production.
#[async_trait]
pub trait SolverBackend: Send + Sync {
    /// Returns the file id.
    async fn upload(&self, file: &PolynomialFile) -> Result<String>;
    /// Returns the job id.
    async fn submit(&self, body: &JobBody) -> Result<String>;
    async fn status(&self, job_id: &str) -> Result<JobStatus>;
}

#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic time since an arbitrary origin.
    fn now(&self) -> Duration;
    async fn sleep(&self, d: Duration);
}

pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self { Self { origin: tokio::time::Instant::now() } }
}

impl Default for TokioClock {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Duration { self.origin.elapsed() }
    async fn sleep(&self, d: Duration) { tokio::time::sleep(d).await }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub energy: f64,
    pub solution: Vec<f64>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Submitted,
    Running,
    /// Samples ordered by ascending energy.
    Completed(Vec<Sample>),
    Failed(String),
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Submitted | JobState::Running)
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobState::Submitted => "submitted",
            JobState::Running => "running",
            JobState::Completed(_) => "completed",
            JobState::Failed(_) => "failed",
            JobState::TimedOut => "timed_out",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub state: JobState,
    /// Clock reading at submission; the timeout counts from here.
    pub submitted_at: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Pending,
    Completed(Vec<Sample>),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct OrchestratorCfg {
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub num_samples: u32,
    pub relaxation_schedule: u8,
}

impl Default for OrchestratorCfg {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
            num_samples: 10,
            relaxation_schedule: 1,
        }
    }
}

fn samples_from(results: JobResults) -> Vec<Sample> {
    let JobResults { energies, solutions, counts } = results;
    let mut out: Vec<Sample> = energies
        .into_iter()
        .zip(solutions)
        .enumerate()
        .map(|(i, (energy, solution))| Sample {
            energy,
            solution,
            count: counts.get(i).copied().unwrap_or(1),
        })
        .collect();
    out.sort_by(|a, b| a.energy.total_cmp(&b.energy));
    out
}

/// Resolves when the flag is set. Pending forever if the sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub struct Orchestrator<B, C> {
    backend: B,
    clock: C,
    cfg: OrchestratorCfg,
}

impl<B: SolverBackend, C: Clock> Orchestrator<B, C> {
    pub fn new(backend: B, clock: C, cfg: OrchestratorCfg) -> Self {
        Self { backend, clock, cfg }
    }

    pub fn cfg(&self) -> &OrchestratorCfg { &self.cfg }
    pub fn backend(&self) -> &B { &self.backend }

    /// Upload then submit. Failures are returned as-is, never retried here.
    pub async fn submit(
        &self,
        poly: &PolyBuilder,
        num_variables: usize,
        num_samples: u32,
        relaxation_schedule: u8,
        job_name: &str,
    ) -> Result<Job> {
        let file_name = format!("{job_name}_{}", Utc::now().format("%Y%m%d_%H%M%S"));
        let file = PolynomialFile::from_poly(file_name, poly, num_variables);
        let file_id = self.backend.upload(&file).await?;
        debug!(%file_id, terms = poly.len(), "polynomial uploaded");

        let body = JobBody::new(job_name.to_string(), file_id, num_samples, relaxation_schedule);
        let id = self.backend.submit(&body).await?;
        let submitted_at = self.clock.now();
        info!(job_id = %id, num_variables, num_samples, relaxation_schedule, "solver job submitted");
        Ok(Job { id, state: JobState::Submitted, submitted_at })
    }

    /// One status query. Transport errors leave the state untouched.
    pub async fn poll(&self, job: &mut Job) -> Result<PollOutcome> {
        let status = self.backend.status(&job.id).await?;
        let outcome = match status {
            JobStatus::Submitted => PollOutcome::Pending,
            JobStatus::Running => {
                job.state = JobState::Running;
                PollOutcome::Pending
            }
            JobStatus::Completed { results } => {
                let samples = samples_from(results);
                if samples.is_empty() {
                    job.state = JobState::Failed("completed without samples".into());
                    PollOutcome::Failed("completed without samples".into())
                } else {
                    job.state = JobState::Completed(samples.clone());
                    PollOutcome::Completed(samples)
                }
            }
            JobStatus::Failed { error } => {
                let reason = error.unwrap_or_else(|| "solver reported failure".into());
                job.state = JobState::Failed(reason.clone());
                PollOutcome::Failed(reason)
            }
        };
        Ok(outcome)
    }

    /// Poll at the configured interval until a terminal state.
    pub async fn run_to_completion(
        &self,
        job: &mut Job,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<Vec<Sample>> {
        loop {
            if *cancel.borrow() {
                info!(job_id = %job.id, "solver poll cancelled");
                return Err(OptimizerError::Cancelled);
            }

            let elapsed = self.clock.now().saturating_sub(job.submitted_at);
            if elapsed > self.cfg.timeout {
                job.state = JobState::TimedOut;
                SOLVER_POLLS.with_label_values(&["timed_out"]).inc();
                warn!(job_id = %job.id, ?elapsed, "solver job timed out");
                return Err(OptimizerError::SolverTimeout { job_id: job.id.clone(), elapsed });
            }

            match self.poll(job).await {
                Ok(PollOutcome::Completed(samples)) => {
                    SOLVER_POLLS.with_label_values(&["completed"]).inc();
                    info!(job_id = %job.id, ?elapsed, samples = samples.len(), "solver job completed");
                    return Ok(samples);
                }
                Ok(PollOutcome::Failed(reason)) => {
                    SOLVER_POLLS.with_label_values(&["failed"]).inc();
                    warn!(job_id = %job.id, %reason, "solver job failed");
                    return Err(OptimizerError::SolverJobFailed { job_id: job.id.clone(), reason });
                }
                Ok(PollOutcome::Pending) => {
                    SOLVER_POLLS.with_label_values(&["pending"]).inc();
                    debug!(job_id = %job.id, state = job.state.label(), ?elapsed, "solver job pending");
                }
                Err(OptimizerError::SolverTransport(e)) => {
                    SOLVER_POLLS.with_label_values(&["transport_error"]).inc();
                    warn!(job_id = %job.id, error = %e, "status poll failed, retrying");
                }
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = self.clock.sleep(self.cfg.poll_interval) => {}
                _ = cancelled(cancel) => {}
            }
        }
    }
}
