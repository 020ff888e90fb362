//! One run, driven through acquisition, reference selection, coverage check,
//! assembly and 16S extraction. Failures stop at the job boundary and are
//! returned as a record; nothing here aborts the pipeline.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;
use crate::config::defs::{DOWNSAMPLED_DIR, RAW_READS_DIR, RIBOSEED_DIR, TRIMMED_DIR};
use crate::pipelines::budget::Lease;
use crate::pipelines::collaborators::{Annotator, Assembler, ReadAcquirer, ReadTrimmer};
use crate::pipelines::coverage::{validate_read_length, CoverageEstimator, CoverageReport};
use crate::pipelines::models::{ExtractedSequence, RunCandidate};
use crate::pipelines::reference::ReferenceSelector;
use crate::utils::stats::ContigSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Dispatched, not yet started. Never recorded as a transition.
    Queued,
    Acquiring,
    ReferenceSelection,
    Trimming,
    CoverageCheck,
    Assembling,
    Extracting,
    Succeeded,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Queued => "queued",
            JobState::Acquiring => "acquiring",
            JobState::ReferenceSelection => "reference selection",
            JobState::Trimming => "trimming",
            JobState::CoverageCheck => "coverage check",
            JobState::Assembling => "assembling",
            JobState::Extracting => "extracting",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum FailureReason {
    #[error("fetch error: {0}")]
    FetchError(String),

    #[error("invalid reads: {0}")]
    InvalidReads(String),

    #[error("no reference: {0}")]
    NoReference(String),

    #[error("trimming error: {0}")]
    TrimmingError(String),

    #[error("coverage error: {0}")]
    CoverageError(String),

    #[error("assembly error: {0}")]
    AssemblyError(String),

    #[error("annotation error: {0}")]
    AnnotationError(String),

    #[error("job panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Assembly succeeded; the sequence list may be empty.
    Succeeded { sequences: Vec<ExtractedSequence> },
    Failed { state: JobState, reason: FailureReason },
}

/// Terminal result of one job, with everything learned on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    /// Position of the candidate in dispatch order.
    pub index: usize,
    pub candidate: RunCandidate,
    pub transitions: Vec<JobState>,
    pub reference: Option<String>,
    pub read_length: Option<f64>,
    pub coverage: Option<CoverageReport>,
    pub contigs: Option<ContigSummary>,
    pub outcome: JobOutcome,
    pub elapsed: Duration,
}

impl JobRecord {
    pub fn new(index: usize, candidate: RunCandidate) -> Self {
        Self {
            index,
            candidate,
            transitions: Vec::new(),
            reference: None,
            read_length: None,
            coverage: None,
            contigs: None,
            outcome: JobOutcome::Failed {
                state: JobState::Queued,
                reason: FailureReason::Panicked("job did not finish".to_string()),
            },
            elapsed: Duration::ZERO,
        }
    }

    /// Record for a job whose task panicked before it could report.
    pub fn panicked(index: usize, candidate: RunCandidate, message: String) -> Self {
        let mut record = Self::new(index, candidate);
        record.outcome = JobOutcome::Failed { state: JobState::Failed, reason: FailureReason::Panicked(message) };
        record
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, JobOutcome::Succeeded { .. })
    }

    pub fn accession(&self) -> &str {
        &self.candidate.accession
    }
}

/// Everything shared by the jobs of one pipeline run.
pub struct JobContext {
    pub organism: String,
    pub out_dir: PathBuf,
    pub acquirer: Arc<dyn ReadAcquirer>,
    pub selector: Arc<ReferenceSelector>,
    /// Skipped when None.
    pub trimmer: Option<Arc<dyn ReadTrimmer>>,
    pub coverage: CoverageEstimator,
    pub assembler: Arc<dyn Assembler>,
    pub annotator: Arc<dyn Annotator>,
    pub assembly_timeout: Option<Duration>,
    pub annotation_timeout: Option<Duration>,
    pub keep_reads: bool,
}

/// Removes a job's read directories when the job ends, whatever the outcome.
struct ScratchDir {
    paths: Vec<PathBuf>,
    keep: bool,
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        for path in &self.paths {
            if path.exists() {
                match std::fs::remove_dir_all(path) {
                    Ok(()) => debug!("Removed {}", path.display()),
                    Err(e) => warn!("Could not remove {}: {}", path.display(), e),
                }
            }
        }
    }
}

async fn bounded<T>(limit: Option<Duration>, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| anyhow!("timed out after {} s", limit.as_secs_f64()))?,
        None => fut.await,
    }
}

pub struct AssemblyJob {
    index: usize,
    candidate: RunCandidate,
    lease: Lease,
    ctx: Arc<JobContext>,
    state: JobState,
    record: JobRecord,
}

impl AssemblyJob {
    /// A job owns its lease until it reaches a terminal state.
    pub fn new(index: usize, candidate: RunCandidate, lease: Lease, ctx: Arc<JobContext>) -> Self {
        let record = JobRecord::new(index, candidate.clone());
        Self { index, candidate, lease, ctx, state: JobState::Queued, record }
    }

    fn enter(&mut self, state: JobState) {
        debug!("{}: {} -> {}", self.candidate.accession, self.state, state);
        self.state = state;
        self.record.transitions.push(state);
    }

    /// Runs the job to a terminal state. Budget and scratch space are released on return.
    pub async fn run(mut self) -> JobRecord {
        let started = Instant::now();
        info!(
            "{}: starting job #{} with {}",
            self.candidate.accession,
            self.index + 1,
            self.lease.resources()
        );
        let outcome = match self.drive().await {
            Ok(sequences) => {
                self.enter(JobState::Succeeded);
                info!(
                    "{}: succeeded with {} 16S sequence(s)",
                    self.candidate.accession,
                    sequences.len()
                );
                JobOutcome::Succeeded { sequences }
            }
            Err(reason) => {
                let state = self.state;
                self.enter(JobState::Failed);
                warn!("{}: failed during {}: {}", self.candidate.accession, state, reason);
                JobOutcome::Failed { state, reason }
            }
        };
        let mut record = self.record;
        record.outcome = outcome;
        record.elapsed = started.elapsed();
        record
    }

    async fn drive(&mut self) -> Result<Vec<ExtractedSequence>, FailureReason> {
        let ctx = Arc::clone(&self.ctx);
        let allotment = self.lease.resources();
        let run_dir = ctx.out_dir.join(&self.candidate.accession);
        let reads_dir = run_dir.join(RAW_READS_DIR);
        let _scratch = ScratchDir {
            paths: vec![reads_dir.clone(), run_dir.join(TRIMMED_DIR), run_dir.join(DOWNSAMPLED_DIR)],
            keep: ctx.keep_reads,
        };

        self.enter(JobState::Acquiring);
        tokio::fs::create_dir_all(&reads_dir)
            .await
            .map_err(|e| FailureReason::FetchError(format!("cannot create {}: {}", reads_dir.display(), e)))?;
        let reads = ctx
            .acquirer
            .fetch_reads(&self.candidate, &reads_dir, allotment.cores)
            .await
            .map_err(|e| FailureReason::FetchError(format!("{:#}", e)))?;
        let sample = reads.clone();
        let read_length = tokio::task::spawn_blocking(move || validate_read_length(&sample))
            .await
            .map_err(|e| FailureReason::InvalidReads(e.to_string()))?
            .map_err(|e| FailureReason::InvalidReads(format!("{:#}", e)))?;
        self.record.read_length = Some(read_length);

        self.enter(JobState::ReferenceSelection);
        let reference = ctx
            .selector
            .select(&ctx.organism, &reads, allotment.cores)
            .await
            .map_err(|e| FailureReason::NoReference(e.to_string()))?;
        self.record.reference = Some(reference.identifier.clone());

        let reads = match &ctx.trimmer {
            Some(trimmer) => {
                self.enter(JobState::Trimming);
                trimmer
                    .trim(&reads, &run_dir.join(TRIMMED_DIR))
                    .await
                    .map_err(|e| FailureReason::TrimmingError(format!("{:#}", e)))?
            }
            None => reads,
        };

        self.enter(JobState::CoverageCheck);
        let estimator = ctx.coverage;
        let genome_length = estimator.length_estimate(&reference);
        let coverage_dir = run_dir.clone();
        let (reads, report) =
            tokio::task::spawn_blocking(move || estimator.check(reads, genome_length, &coverage_dir))
                .await
                .map_err(|e| FailureReason::CoverageError(e.to_string()))?
                .map_err(|e| FailureReason::CoverageError(format!("{:#}", e)))?;
        self.record.coverage = Some(report);

        self.enter(JobState::Assembling);
        let contigs = bounded(
            ctx.assembly_timeout,
            ctx.assembler.assemble(&reads, &reference, allotment, &run_dir.join(RIBOSEED_DIR)),
        )
        .await
        .map_err(|e| FailureReason::AssemblyError(format!("{:#}", e)))?;
        info!(
            "{}: assembled {} contigs, {} bp, N50 {}",
            self.candidate.accession, contigs.summary.contigs, contigs.summary.total_length, contigs.summary.n50
        );
        self.record.contigs = Some(contigs.summary.clone());

        self.enter(JobState::Extracting);
        let sequences = bounded(ctx.annotation_timeout, ctx.annotator.annotate(&contigs, &run_dir))
            .await
            .map_err(|e| FailureReason::AnnotationError(format!("{:#}", e)))?;
        Ok(sequences)
    }
}
