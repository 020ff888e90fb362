//! Shared core/memory budget. The only mutable state shared by concurrent jobs;
//! every acquire and release happens under one lock.

use std::sync::{Arc, Mutex, MutexGuard};
use log::debug;
use thiserror::Error;
use tokio::sync::Notify;
use crate::pipelines::models::Resources;

/// Default cores handed to each job when --max_concurrency is not given.
pub const DEFAULT_CORES_PER_JOB: usize = 2;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BudgetError {
    #[error("budget exhausted: requested {requested}, available {available}")]
    Exhausted { requested: Resources, available: Resources },

    #[error("request {requested} can never be satisfied by a budget of {total}")]
    Unsatisfiable { requested: Resources, total: Resources },
}

/// Per-job share of the budget and how many jobs may hold one at once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobAllotment {
    pub per_job: Resources,
    pub max_concurrent: usize,
}

/// Number of jobs that can run at once: min(max_concurrency, floor(total / per_job)) per resource.
pub fn concurrency_bound(total: Resources, per_job: Resources, max_concurrency: usize) -> usize {
    if per_job.is_zero() {
        return 0;
    }
    max_concurrency
        .min(total.cores / per_job.cores)
        .min((total.memory_gb / per_job.memory_gb) as usize)
}

pub struct ResourceBudget {
    total: Resources,
    available: Mutex<Resources>,
    released: Notify,
}

/// A granted share of the budget; returned to the budget when dropped.
#[derive(Debug)]
pub struct Lease {
    budget: Arc<ResourceBudget>,
    resources: Resources,
}

impl Lease {
    pub fn resources(&self) -> Resources {
        self.resources
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.budget.release(self.resources);
    }
}

impl std::fmt::Debug for ResourceBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceBudget")
            .field("total", &self.total)
            .field("available", &self.available())
            .finish()
    }
}

impl ResourceBudget {
    pub fn new(total: Resources) -> Result<Arc<Self>, BudgetError> {
        if total.is_zero() {
            return Err(BudgetError::Unsatisfiable { requested: Resources::new(1, 1), total });
        }
        Ok(Arc::new(Self {
            total,
            available: Mutex::new(total),
            released: Notify::new(),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, Resources> {
        // counters stay consistent even if a holder panicked: every update is a single assignment
        self.available.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn total(&self) -> Resources {
        self.total
    }

    pub fn available(&self) -> Resources {
        *self.lock()
    }

    /// Sum of all outstanding leases.
    pub fn outstanding(&self) -> Resources {
        let available = self.available();
        Resources::new(
            self.total.cores - available.cores,
            self.total.memory_gb - available.memory_gb,
        )
    }

    /// Derives the per-job share from the totals.
    ///
    /// # Arguments
    ///
    /// * `max_concurrency` - Requested concurrent jobs; defaults to cores / DEFAULT_CORES_PER_JOB.
    /// * `fraction` - Share of the totals that concurrent jobs divide between them.
    ///
    /// # Returns
    /// JobAllotment with non-zero cores and memory, or Unsatisfiable.
    pub fn allotment(&self, max_concurrency: Option<usize>, fraction: f64) -> Result<JobAllotment, BudgetError> {
        let desired = max_concurrency
            .unwrap_or(self.total.cores / DEFAULT_CORES_PER_JOB)
            .max(1);
        let shared_cores = ((self.total.cores as f64 * fraction).floor() as usize).max(1);
        let shared_memory = ((self.total.memory_gb as f64 * fraction).floor() as u64).max(1);
        let per_job = Resources::new(
            (shared_cores / desired).max(1),
            (shared_memory / desired as u64).max(1),
        );
        if !per_job.fits_within(&self.total) {
            return Err(BudgetError::Unsatisfiable { requested: per_job, total: self.total });
        }
        let max_concurrent = concurrency_bound(self.total, per_job, desired).max(1);
        Ok(JobAllotment { per_job, max_concurrent })
    }

    /// Grants a lease immediately or reports Exhausted.
    pub fn try_acquire(self: &Arc<Self>, requested: Resources) -> Result<Lease, BudgetError> {
        if requested.is_zero() || !requested.fits_within(&self.total) {
            return Err(BudgetError::Unsatisfiable { requested, total: self.total });
        }
        let mut available = self.lock();
        if !requested.fits_within(&available) {
            return Err(BudgetError::Exhausted { requested, available: *available });
        }
        available.cores -= requested.cores;
        available.memory_gb -= requested.memory_gb;
        Ok(Lease { budget: Arc::clone(self), resources: requested })
    }

    /// Grants a lease, waiting for releases while the budget is exhausted.
    pub async fn acquire(self: &Arc<Self>, requested: Resources) -> Result<Lease, BudgetError> {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            // register before checking so a release between check and await is not missed
            notified.as_mut().enable();
            match self.try_acquire(requested) {
                Ok(lease) => return Ok(lease),
                Err(BudgetError::Exhausted { available, .. }) => {
                    debug!("Budget exhausted ({} available, {} requested); waiting", available, requested);
                    notified.await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn release(&self, resources: Resources) {
        {
            let mut available = self.lock();
            available.cores = (available.cores + resources.cores).min(self.total.cores);
            available.memory_gb = (available.memory_gb + resources.memory_gb).min(self.total.memory_gb);
        }
        self.released.notify_waiters();
    }
}
