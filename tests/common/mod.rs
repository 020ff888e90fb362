// In-memory collaborators for driving the scheduler without external programs.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ribodb_pipelines::pipelines::budget::ResourceBudget;
use ribodb_pipelines::pipelines::collaborators::{Annotator, Assembler, DistanceEstimator, GenomeSource, ReadAcquirer};
use ribodb_pipelines::pipelines::coverage::CoverageEstimator;
use ribodb_pipelines::pipelines::job::JobContext;
use ribodb_pipelines::pipelines::models::{
    CandidateSource, ContigSet, ExtractedSequence, ReadSet, ReferenceGenome, Resources, RunCandidate, Strand,
};
use ribodb_pipelines::pipelines::reference::ReferenceSelector;
use ribodb_pipelines::pipelines::scheduler::{RunPoolScheduler, SchedulerConfig};
use ribodb_pipelines::utils::sequence::write_synthetic_reads;
use ribodb_pipelines::utils::stats::ContigSummary;

pub struct MockAcquirer {
    pub failing: HashSet<String>,
    pub calls: AtomicUsize,
}

impl MockAcquirer {
    pub fn failing(accessions: &[&str]) -> Self {
        Self {
            failing: accessions.iter().map(|a| a.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReadAcquirer for MockAcquirer {
    async fn fetch_reads(&self, candidate: &RunCandidate, dest: &Path, _cores: usize) -> Result<ReadSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&candidate.accession) {
            return Err(anyhow!("{} not found in the SRA", candidate.accession));
        }
        let (f, r) = write_synthetic_reads(dest, &candidate.accession, 50, 100, true, 3)?;
        let r = r.ok_or_else(|| anyhow!("missing mate file"))?;
        Ok(ReadSet::paired(candidate.accession.clone(), f, r))
    }
}

pub struct StaticGenomes;

#[async_trait]
impl GenomeSource for StaticGenomes {
    async fn list_reference_genomes(&self, _organism: &str) -> Result<Vec<ReferenceGenome>> {
        Ok(vec![
            ReferenceGenome::new("refA", PathBuf::from("refA.fna"), 10_000)?,
            ReferenceGenome::new("refB", PathBuf::from("refB.fna"), 12_000)?,
        ])
    }
}

pub struct FlatDistance;

#[async_trait]
impl DistanceEstimator for FlatDistance {
    async fn rank(
        &self,
        _query: &ReadSet,
        candidates: &[ReferenceGenome],
        _cores: usize,
    ) -> Result<Vec<(ReferenceGenome, f64)>> {
        Ok(candidates.iter().map(|g| (g.clone(), 0.02)).collect())
    }
}

/// Tracks how many assemblies run at once.
pub struct MockAssembler {
    pub delay: Duration,
    /// Per-accession delays overriding `delay`.
    pub delays: HashMap<String, Duration>,
    pub panic_on: HashSet<String>,
    pub fail_on: HashSet<String>,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
}

impl MockAssembler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            delays: HashMap::new(),
            panic_on: HashSet::new(),
            fail_on: HashSet::new(),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Assembler for MockAssembler {
    async fn assemble(
        &self,
        reads: &ReadSet,
        _reference: &ReferenceGenome,
        allotment: Resources,
        out_dir: &Path,
    ) -> Result<ContigSet> {
        if allotment.is_zero() {
            return Err(anyhow!("assembler started without resources"));
        }
        if self.panic_on.contains(&reads.accession) {
            panic!("assembler crashed on {}", reads.accession);
        }
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delays.get(&reads.accession).copied().unwrap_or(self.delay)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.fail_on.contains(&reads.accession) {
            return Err(anyhow!("assembly of {} collapsed", reads.accession));
        }
        Ok(ContigSet {
            accession: reads.accession.clone(),
            path: out_dir.join("contigs.fasta"),
            summary: ContigSummary::from_lengths(&[4000, 2500, 900]),
        })
    }
}

/// One 16S sequence per run, none for the accessions in `empty_for`.
pub struct MockAnnotator {
    pub empty_for: HashSet<String>,
}

#[async_trait]
impl Annotator for MockAnnotator {
    async fn annotate(&self, contigs: &ContigSet, _work_dir: &Path) -> Result<Vec<ExtractedSequence>> {
        if self.empty_for.contains(&contigs.accession) {
            return Ok(Vec::new());
        }
        Ok(vec![ExtractedSequence {
            accession: contigs.accession.clone(),
            contig: "contig_1".to_string(),
            start: 101,
            end: 1642,
            strand: Strand::Forward,
            sequence: format!("ACGT{}", contigs.accession).into_bytes(),
        }])
    }
}

pub fn candidates(accessions: &[&str]) -> Vec<RunCandidate> {
    accessions
        .iter()
        .map(|a| RunCandidate::new(*a, CandidateSource::CommandLine))
        .collect()
}

pub fn context(
    out_dir: &Path,
    acquirer: Arc<MockAcquirer>,
    assembler: Arc<MockAssembler>,
    annotator: Arc<MockAnnotator>,
) -> Arc<JobContext> {
    Arc::new(JobContext {
        organism: "Escherichia coli".to_string(),
        out_dir: out_dir.to_path_buf(),
        acquirer,
        selector: Arc::new(ReferenceSelector::new(Arc::new(StaticGenomes), Arc::new(FlatDistance))),
        trimmer: None,
        coverage: CoverageEstimator::new(50.0, None, 17),
        assembler,
        annotator,
        assembly_timeout: None,
        annotation_timeout: None,
        keep_reads: false,
    })
}

pub fn scheduler(
    budget: Resources,
    per_job: Resources,
    max_concurrency: usize,
    target: usize,
    ctx: Arc<JobContext>,
) -> (RunPoolScheduler, Arc<ResourceBudget>) {
    let budget = ResourceBudget::new(budget).expect("budget");
    let scheduler = RunPoolScheduler::new(
        budget.clone(),
        ctx,
        SchedulerConfig { target, per_job, max_concurrency, get_all: false },
    )
    .expect("scheduler");
    (scheduler, budget)
}
