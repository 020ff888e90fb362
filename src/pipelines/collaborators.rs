//! Seams to the external programs a job drives. The real implementations live in
//! `pipelines::external`; tests substitute in-memory ones.

use std::path::Path;
use anyhow::Result;
use async_trait::async_trait;
use crate::pipelines::models::{ContigSet, ExtractedSequence, ReadSet, ReferenceGenome, Resources, RunCandidate};

/// Downloads (or locates) the reads of one run into `dest`.
#[async_trait]
pub trait ReadAcquirer: Send + Sync {
    async fn fetch_reads(&self, candidate: &RunCandidate, dest: &Path, cores: usize) -> Result<ReadSet>;
}

/// Lists the reference genomes available for an organism. May be empty.
#[async_trait]
pub trait GenomeSource: Send + Sync {
    async fn list_reference_genomes(&self, organism: &str) -> Result<Vec<ReferenceGenome>>;
}

/// Genome-to-genome distance between a run's reads and candidate references.
#[async_trait]
pub trait DistanceEstimator: Send + Sync {
    /// Returns each candidate paired with its distance to the query; lower is closer.
    async fn rank(
        &self,
        query: &ReadSet,
        candidates: &[ReferenceGenome],
        cores: usize,
    ) -> Result<Vec<(ReferenceGenome, f64)>>;
}

/// Operon-aware, reference-guided assembler.
#[async_trait]
pub trait Assembler: Send + Sync {
    async fn assemble(
        &self,
        reads: &ReadSet,
        reference: &ReferenceGenome,
        allotment: Resources,
        out_dir: &Path,
    ) -> Result<ContigSet>;
}

/// rRNA annotator returning the 16S intervals found on a contig set.
#[async_trait]
pub trait Annotator: Send + Sync {
    async fn annotate(&self, contigs: &ContigSet, work_dir: &Path) -> Result<Vec<ExtractedSequence>>;
}

/// Quality trimmer run on the raw reads before coverage is checked.
#[async_trait]
pub trait ReadTrimmer: Send + Sync {
    async fn trim(&self, reads: &ReadSet, out_dir: &Path) -> Result<ReadSet>;
}
