//! Fans candidates out to assembly jobs under the shared budget until the target
//! number of successes is reached or the candidate pool runs dry.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio::task::JoinSet;
use crate::config::defs::PipelineError;
use crate::pipelines::budget::{concurrency_bound, ResourceBudget};
use crate::pipelines::job::{AssemblyJob, JobContext, JobRecord};
use crate::pipelines::models::{Resources, RunCandidate};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    pub target: usize,
    pub per_job: Resources,
    pub max_concurrency: usize,
    /// Dispatch every accession of a biosample instead of the first one only.
    pub get_all: bool,
}

/// What the scheduler did, in completion order.
#[derive(Debug)]
pub struct ScheduleReport {
    pub records: Vec<JobRecord>,
    pub dispatched: usize,
    pub pool_exhausted: bool,
    pub peak_concurrency: usize,
}

/// Skips repeated accessions, and a second run of the same biosample unless get_all is set.
#[derive(Debug, Default)]
struct CandidateFilter {
    get_all: bool,
    accessions: HashSet<String>,
    groups: HashSet<String>,
}

impl CandidateFilter {
    fn admit(&mut self, candidate: &RunCandidate) -> bool {
        if !self.accessions.insert(candidate.accession.clone()) {
            debug!("Skipping repeated accession {}", candidate.accession);
            return false;
        }
        if let (false, Some(group)) = (self.get_all, &candidate.group) {
            if !self.groups.insert(group.clone()) {
                info!(
                    "Skipping {}: biosample {} already has a run queued (use --get_all to keep both)",
                    candidate.accession, group
                );
                return false;
            }
        }
        true
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return s.to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic".to_string()
}

pub struct RunPoolScheduler {
    budget: Arc<ResourceBudget>,
    ctx: Arc<JobContext>,
    config: SchedulerConfig,
    bound: usize,
}

impl RunPoolScheduler {
    /// Validates the configuration against the budget.
    ///
    /// # Arguments
    ///
    /// * `budget` - Shared budget every job leases from.
    /// * `ctx` - Collaborators and settings shared by all jobs.
    /// * `config` - Target, per-job allotment and concurrency cap.
    ///
    /// # Returns
    /// RunPoolScheduler, or InvalidConfig when no job could ever run.
    pub fn new(budget: Arc<ResourceBudget>, ctx: Arc<JobContext>, config: SchedulerConfig) -> Result<Self, PipelineError> {
        if config.target == 0 {
            return Err(PipelineError::InvalidConfig("target success count must be at least 1".to_string()));
        }
        if config.per_job.is_zero() {
            return Err(PipelineError::InvalidConfig(format!(
                "per-job allotment {} has no cores or memory",
                config.per_job
            )));
        }
        let bound = concurrency_bound(budget.total(), config.per_job, config.max_concurrency);
        if bound == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "per-job allotment {} does not fit the budget {}",
                config.per_job,
                budget.total()
            )));
        }
        Ok(Self { budget, ctx, config, bound })
    }

    /// Maximum number of simultaneously active jobs.
    pub fn concurrency_bound(&self) -> usize {
        self.bound
    }

    /// Draws candidates lazily, in order, and runs them until the target is met or the pool ends.
    /// Jobs already running when the target is met are drained, never cancelled.
    pub async fn run<I>(&self, candidates: I) -> Result<ScheduleReport, PipelineError>
    where
        I: IntoIterator<Item = RunCandidate>,
    {
        let mut pool = candidates.into_iter().peekable();
        if pool.peek().is_none() {
            return Err(PipelineError::EmptyCandidatePool);
        }

        let mut filter = CandidateFilter { get_all: self.config.get_all, ..Default::default() };
        let mut running: JoinSet<JobRecord> = JoinSet::new();
        let mut records = Vec::new();
        let mut successes = 0usize;
        let mut dispatched = 0usize;
        let mut peak = 0usize;
        let mut exhausted = false;

        info!(
            "Scheduling toward {} successful runs, at most {} at a time with {} each",
            self.config.target, self.bound, self.config.per_job
        );

        loop {
            while successes < self.config.target && !exhausted && running.len() < self.bound {
                let Some(candidate) = pool.by_ref().find(|c| filter.admit(c)) else {
                    exhausted = true;
                    break;
                };
                let lease = self
                    .budget
                    .acquire(self.config.per_job)
                    .await
                    .map_err(|e| PipelineError::Budget(e.to_string()))?;

                let index = dispatched;
                dispatched += 1;
                info!(
                    "Dispatching {} ({} succeeded of {}, {} running)",
                    candidate.accession,
                    successes,
                    self.config.target,
                    running.len()
                );
                let job = AssemblyJob::new(index, candidate.clone(), lease, Arc::clone(&self.ctx));
                running.spawn(async move {
                    match AssertUnwindSafe(job.run()).catch_unwind().await {
                        Ok(record) => record,
                        Err(payload) => {
                            let message = panic_message(payload);
                            error!("{}: job panicked: {}", candidate.accession, message);
                            JobRecord::panicked(index, candidate, message)
                        }
                    }
                });
                peak = peak.max(running.len());
            }

            match running.join_next().await {
                Some(Ok(record)) => {
                    if record.is_success() {
                        successes += 1;
                    }
                    records.push(record);
                }
                Some(Err(e)) => warn!("Job task ended without a record: {}", e),
                None => break,
            }
        }

        if exhausted && successes < self.config.target {
            warn!(
                "Candidate pool exhausted with {} of {} target successes",
                successes, self.config.target
            );
        }
        Ok(ScheduleReport { records, dispatched, pool_exhausted: exhausted, peak_concurrency: peak })
    }
}
