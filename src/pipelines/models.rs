use std::fmt;
use std::path::PathBuf;
use anyhow::{anyhow, Result};
use serde::Serialize;
use crate::utils::stats::ContigSummary;

/// Where a candidate accession came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    CommandLine,
    ListFile,
    SraFind,
    LocalReads,
}

/// A sequencing run eligible for processing. Identity is the accession.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunCandidate {
    pub accession: String,
    /// Biosample the run belongs to; runs sharing a group are the same biological sample.
    pub group: Option<String>,
    pub source: CandidateSource,
}

impl RunCandidate {
    pub fn new(accession: impl Into<String>, source: CandidateSource) -> Self {
        Self { accession: accession.into(), group: None, source }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceGenome {
    pub identifier: String,
    pub path: PathBuf,
    /// Total sequence length; an estimate of the run's genome size, never ground truth.
    pub length: u64,
}

impl ReferenceGenome {
    pub fn new(identifier: impl Into<String>, path: PathBuf, length: u64) -> Result<Self> {
        let identifier = identifier.into();
        if length == 0 {
            return Err(anyhow!("Reference genome {} has zero length", identifier));
        }
        Ok(Self { identifier, path, length })
    }
}

/// Reads for one run. Owned by exactly one job at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadSet {
    pub accession: String,
    pub forward: PathBuf,
    pub reverse: Option<PathBuf>,
    pub downsampled: bool,
}

impl ReadSet {
    pub fn single(accession: impl Into<String>, forward: PathBuf) -> Self {
        Self { accession: accession.into(), forward, reverse: None, downsampled: false }
    }

    pub fn paired(accession: impl Into<String>, forward: PathBuf, reverse: PathBuf) -> Self {
        Self { accession: accession.into(), forward, reverse: Some(reverse), downsampled: false }
    }

    pub fn is_paired(&self) -> bool {
        self.reverse.is_some()
    }

    pub fn files(&self) -> Vec<&PathBuf> {
        std::iter::once(&self.forward).chain(self.reverse.iter()).collect()
    }
}

/// Assembled contigs for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ContigSet {
    pub accession: String,
    pub path: PathBuf,
    pub summary: ContigSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Strand {
    #[serde(rename = "+")]
    Forward,
    #[serde(rename = "-")]
    Reverse,
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strand::Forward => write!(f, "+"),
            Strand::Reverse => write!(f, "-"),
        }
    }
}

/// One annotated 16S interval and its sequence, already in gene orientation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtractedSequence {
    pub accession: String,
    pub contig: String,
    /// 1-based inclusive coordinates on the contig.
    pub start: u64,
    pub end: u64,
    pub strand: Strand,
    pub sequence: Vec<u8>,
}

impl ExtractedSequence {
    pub fn coordinates(&self) -> String {
        format!("{}:{}-{}({})", self.contig, self.start, self.end, self.strand)
    }
}

/// Cores and memory, used both for budget totals and per-job leases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resources {
    pub cores: usize,
    pub memory_gb: u64,
}

impl Resources {
    pub fn new(cores: usize, memory_gb: u64) -> Self {
        Self { cores, memory_gb }
    }

    pub fn is_zero(&self) -> bool {
        self.cores == 0 || self.memory_gb == 0
    }

    pub fn fits_within(&self, other: &Resources) -> bool {
        self.cores <= other.cores && self.memory_gb <= other.memory_gb
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cores / {} GB", self.cores, self.memory_gb)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_rejects_zero_length() {
        assert!(ReferenceGenome::new("ref", PathBuf::from("ref.fna"), 0).is_err());
        assert!(ReferenceGenome::new("ref", PathBuf::from("ref.fna"), 10).is_ok());
    }

    #[test]
    fn test_coordinates() {
        let seq = ExtractedSequence {
            accession: "SRR1".to_string(),
            contig: "contig_2".to_string(),
            start: 5,
            end: 1540,
            strand: Strand::Reverse,
            sequence: b"ACGT".to_vec(),
        };
        assert_eq!(seq.coordinates(), "contig_2:5-1540(-)");
    }

    #[test]
    fn test_resources_fit() {
        assert!(Resources::new(2, 4).fits_within(&Resources::new(4, 4)));
        assert!(!Resources::new(2, 8).fits_within(&Resources::new(4, 4)));
        assert!(Resources::new(0, 4).is_zero());
    }
}
