//! Merges job records into the final, deduplicated sequence collection and report.

use std::fs;
use std::io::Write;
use std::path::Path;
use anyhow::Result;
use fxhash::{FxHashMap, FxHashSet};
use log::{info, warn};
use serde::Serialize;
use crate::pipelines::coverage::CoverageReport;
use crate::pipelines::job::{FailureReason, JobOutcome, JobRecord, JobState};
use crate::pipelines::models::{CandidateSource, ExtractedSequence, Strand};
use crate::utils::fastx::{create_writer, write_fasta_record};
use crate::utils::stats::ContigSummary;

/// One output sequence with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    pub identifier: String,
    pub accession: String,
    pub contig: String,
    pub start: u64,
    pub end: u64,
    pub strand: Strand,
    pub length: usize,
    #[serde(skip)]
    pub sequence: Vec<u8>,
}

impl OutputRecord {
    pub fn coordinates(&self) -> String {
        format!("{}:{}-{}({})", self.contig, self.start, self.end, self.strand)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub accession: String,
    pub state: JobState,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    /// Finished successfully after the target was already met; kept for audit only.
    Surplus,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub index: usize,
    pub accession: String,
    pub biosample: Option<String>,
    pub source: CandidateSource,
    pub status: JobStatus,
    pub reference: Option<String>,
    pub read_length: Option<f64>,
    pub coverage: Option<CoverageReport>,
    pub contigs: Option<ContigSummary>,
    pub sequences: usize,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TargetStatus {
    Met,
    /// The candidate pool ran out before enough runs succeeded.
    Unreachable { shortfall: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    pub attempted: usize,
    pub succeeded: usize,
    pub target: usize,
    pub status: TargetStatus,
    pub sequences: Vec<OutputRecord>,
    pub failures: Vec<FailureRecord>,
    pub surplus: Vec<String>,
    pub jobs: Vec<JobSummary>,
}

type SequenceKey = (String, String, u64, u64, Strand, Vec<u8>);

fn sequence_key(seq: &ExtractedSequence) -> SequenceKey {
    (
        seq.accession.clone(),
        seq.contig.clone(),
        seq.start,
        seq.end,
        seq.strand,
        seq.sequence.clone(),
    )
}

/// Collects job records as they complete; finalized once.
#[derive(Debug)]
pub struct ResultAggregator {
    target: usize,
    records: Vec<JobRecord>,
}

impl ResultAggregator {
    pub fn new(target: usize) -> Self {
        Self { target, records: Vec::new() }
    }

    pub fn push(&mut self, record: JobRecord) {
        self.records.push(record);
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = JobRecord>) {
        self.records.extend(records);
    }

    /// Builds the PipelineResult.
    /// Records are ordered by dispatch index first, so the result does not depend on completion order.
    /// Only the first `target` successes count; later ones are listed as surplus.
    pub fn finalize(mut self) -> PipelineResult {
        self.records.sort_by_key(|r| r.index);

        let mut seen: FxHashSet<SequenceKey> = FxHashSet::default();
        let mut per_accession: FxHashMap<String, usize> = FxHashMap::default();
        let mut sequences = Vec::new();
        let mut failures = Vec::new();
        let mut surplus = Vec::new();
        let mut jobs = Vec::with_capacity(self.records.len());
        let mut succeeded = 0usize;

        for record in &self.records {
            let (status, yielded) = match &record.outcome {
                JobOutcome::Succeeded { sequences: extracted } if succeeded < self.target => {
                    succeeded += 1;
                    for seq in extracted {
                        if !seen.insert(sequence_key(seq)) {
                            continue;
                        }
                        let k = per_accession.entry(seq.accession.clone()).or_insert(0);
                        *k += 1;
                        sequences.push(OutputRecord {
                            identifier: format!("{}_16S_{}", seq.accession, k),
                            accession: seq.accession.clone(),
                            contig: seq.contig.clone(),
                            start: seq.start,
                            end: seq.end,
                            strand: seq.strand,
                            length: seq.sequence.len(),
                            sequence: seq.sequence.clone(),
                        });
                    }
                    (JobStatus::Succeeded, extracted.len())
                }
                JobOutcome::Succeeded { sequences: extracted } => {
                    surplus.push(record.accession().to_string());
                    (JobStatus::Surplus, extracted.len())
                }
                JobOutcome::Failed { state, reason } => {
                    failures.push(FailureRecord {
                        accession: record.accession().to_string(),
                        state: *state,
                        reason: reason.clone(),
                    });
                    (JobStatus::Failed, 0)
                }
            };
            jobs.push(JobSummary {
                index: record.index,
                accession: record.accession().to_string(),
                biosample: record.candidate.group.clone(),
                source: record.candidate.source,
                status,
                reference: record.reference.clone(),
                read_length: record.read_length,
                coverage: record.coverage.clone(),
                contigs: record.contigs.clone(),
                sequences: yielded,
                elapsed_secs: record.elapsed.as_secs_f64(),
            });
        }

        let status = if succeeded >= self.target {
            TargetStatus::Met
        } else {
            TargetStatus::Unreachable { shortfall: self.target - succeeded }
        };

        PipelineResult {
            attempted: self.records.len(),
            succeeded,
            target: self.target,
            status,
            sequences,
            failures,
            surplus,
            jobs,
        }
    }
}

impl PipelineResult {
    /// Writes the sequences as FASTA: `<accession>_16S_<k> <contig>:<start>-<end>(<strand>)`.
    pub fn write_fasta(&self, path: &Path) -> Result<()> {
        let mut writer = create_writer(path)?;
        for record in &self.sequences {
            write_fasta_record(&mut writer, &record.identifier, Some(&record.coordinates()), &record.sequence)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_report(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn log_summary(&self) {
        let succeeded: Vec<&str> = self
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Succeeded)
            .map(|j| j.accession.as_str())
            .collect();
        info!("Successful runs ({}): {}", succeeded.len(), succeeded.join(", "));
        for failure in &self.failures {
            warn!("Failed run {} during {}: {}", failure.accession, failure.state, failure.reason);
        }
        if !self.surplus.is_empty() {
            info!("Runs finished after the target was met: {}", self.surplus.join(", "));
        }
        info!("{} 16S sequences from {} of {} attempted runs", self.sequences.len(), self.succeeded, self.attempted);
        match self.status {
            TargetStatus::Met => info!("Target of {} successful runs met", self.target),
            TargetStatus::Unreachable { shortfall } => warn!(
                "Target unreachable: {} successful runs, {} short of {}",
                self.succeeded, shortfall, self.target
            ),
        }
    }
}
