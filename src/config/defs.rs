use std::path::PathBuf;
use std::time::Duration;
use std::collections::HashMap;
use lazy_static::lazy_static;
use thiserror::Error;
use crate::cli::{Arguments, Subassembler};

// External software
pub const FASTERQ_DUMP_TAG: &str = "fasterq-dump";
pub const MASH_TAG: &str = "mash";
pub const RIBO_TAG: &str = "ribo";
pub const BARRNAP_TAG: &str = "barrnap";
pub const WGET_TAG: &str = "wget";
pub const SICKLE_TAG: &str = "sickle";
pub const SPADES_TAG: &str = "spades.py";
pub const SKESA_TAG: &str = "skesa";


lazy_static! {
    pub static ref TOOL_VERSIONS: HashMap<&'static str, f32> = {
        let mut m = HashMap::new();
        m.insert(FASTERQ_DUMP_TAG, 2.9);
        m.insert(MASH_TAG, 2.0);
        m.insert(RIBO_TAG, 0.4);
        m.insert(BARRNAP_TAG, 0.9);
        m.insert(SICKLE_TAG, 1.33);
        m
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MashSubcommand {
    Sketch,
    Dist,
}

// Static Filenames
pub const LOG_FILE: &str = "16db.log";
pub const STATUS_FILE: &str = "status";
pub const OUTPUT_FASTA: &str = "ribo16s.fasta";
pub const REPORT_JSON: &str = "pipeline_report.json";
pub const RAW_READS_DIR: &str = "data";
pub const DOWNSAMPLED_DIR: &str = "downsampled";
pub const TRIMMED_DIR: &str = "sickle";
pub const TRIMMED_F: &str = "trimmed_f.fastq";
pub const TRIMMED_R: &str = "trimmed_r.fastq";
pub const TRIMMED_SINGLES: &str = "trimmed_singles.fastq";
pub const DOWNSAMPLED_F: &str = "downsampledreadsf.fastq";
pub const DOWNSAMPLED_R: &str = "downsampledreadsr.fastq";
pub const RIBOSEED_DIR: &str = "riboSeed";
pub const RIBOSEED_CONTIGS: &[&str] = &["seed", "final_long_reads", "riboSeedContigs.fasta"];
pub const BARRNAP_OUT: &str = "barrnap.gff";
pub const REFERENCE_SKETCH: &str = "references";

// Status markers
pub const SRA_COMPLETE: &str = "SRA COMPLETE";
pub const RIBOSEED_COMPLETE: &str = "RIBOSEED COMPLETE";

// Static Parameters
pub const SRAFIND_URL: &str =
    "https://raw.githubusercontent.com/nickp60/sraFind/master/results/sraFind-All-biosample-with-SRA-hits.txt";
pub const SRAFIND_SHUFFLE_SEED: u64 = 8;
pub const SRAFIND_ORGANISM_COL: usize = 11;
pub const SRAFIND_PLATFORM_COL: usize = 8;
pub const SRAFIND_RUNS_COL: usize = 17;
pub const SRAFIND_PLATFORM: &str = "ILLUMINA";
pub const READ_LENGTH_SAMPLE: usize = 30;
pub const MIN_AVG_READ_LEN: f64 = 65.0;
pub const MAX_AVG_READ_LEN: f64 = 300.0;
pub const RRNA_16S_NAME: &str = "Name=16S";
pub const EXAMPLE_ACCESSION: &str = "example";
pub const ACCESSION_PATTERN: &str = r"^[SED]RR[0-9]+$";

pub const FASTA_TAG : &str = "fasta";
pub const FASTQ_TAG : &str = "fastq";
pub const FASTA_EXTS: &[&'static str] = &["fasta", "fa", "fna", "faa", "ffn", "frn"];
pub const FASTQ_EXTS: &[&'static str] = &["fastq", "fq"];


#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Required program not found on PATH: {0}")]
    MissingTool(String),

    #[error("Tool {tool} failed: {error}")]
    ToolExecution { tool: String, error: String },

    #[error("Candidate pool is empty")]
    EmptyCandidatePool,

    #[error("Resource budget error: {0}")]
    Budget(String),

    #[error("IO error: {0}")]
    IOError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}


/// Validated knobs for one pipeline invocation, derived from the CLI.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub organism: String,
    pub target: usize,
    pub cores: usize,
    pub memory_gb: u64,
    pub max_concurrency: Option<usize>,
    pub job_fraction: f64,
    pub max_coverage: f64,
    pub approx_length: Option<u64>,
    pub subassembler: Subassembler,
    pub seed: u64,
    pub get_all: bool,
    pub min_reference_operons: usize,
    pub assembly_timeout: Option<Duration>,
    pub annotation_timeout: Option<Duration>,
    pub keep_reads: bool,
    pub trim_reads: bool,
}

impl PipelineSettings {
    /// Builds settings from parsed arguments.
    ///
    /// # Arguments
    ///
    /// * `args` - Parsed command-line arguments.
    /// * `explicit_runs` - Number of accessions given on the command line, if any.
    /// * `seed` - Run seed, already resolved (fixed or from entropy).
    ///
    /// # Returns
    /// PipelineSettings, or InvalidConfig for values no run could satisfy.
    pub fn from_args(args: &Arguments, explicit_runs: Option<usize>, seed: u64) -> Result<Self, PipelineError> {
        let target = match (args.nstrains, explicit_runs) {
            (Some(n), _) => n,
            (None, Some(n)) => n,
            (None, None) => {
                return Err(PipelineError::InvalidConfig(
                    "if not running with --SRAs, then --nstrains must be provided!".to_string(),
                ));
            }
        };
        if target == 0 {
            return Err(PipelineError::InvalidConfig("target success count must be at least 1".to_string()));
        }
        if args.cores == 0 {
            return Err(PipelineError::InvalidConfig("--cores must be at least 1".to_string()));
        }
        if args.memory == 0 {
            return Err(PipelineError::InvalidConfig("--memory must be at least 1 GB".to_string()));
        }
        if args.max_concurrency == Some(0) {
            return Err(PipelineError::InvalidConfig("--max_concurrency must be at least 1".to_string()));
        }
        if !(args.job_fraction > 0.0 && args.job_fraction <= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "--job_fraction must be in (0, 1], got {}",
                args.job_fraction
            )));
        }
        if args.maxcov <= 0.0 {
            return Err(PipelineError::InvalidConfig("--maxcov must be positive".to_string()));
        }
        if args.approx_length == Some(0) {
            return Err(PipelineError::InvalidConfig("--approx_length must be positive".to_string()));
        }

        Ok(Self {
            organism: args.organism_name.clone(),
            target,
            cores: args.cores,
            memory_gb: args.memory,
            max_concurrency: args.max_concurrency,
            job_fraction: args.job_fraction,
            max_coverage: args.maxcov,
            approx_length: args.approx_length,
            subassembler: args.subassembler.clone(),
            seed,
            get_all: args.get_all,
            min_reference_operons: args.min_reference_operons,
            assembly_timeout: args.assembly_timeout.map(|m| Duration::from_secs(m * 60)),
            annotation_timeout: args.annotation_timeout.map(|m| Duration::from_secs(m * 60)),
            keep_reads: args.keep_reads,
            trim_reads: !args.skip_trimming,
        })
    }
}


pub struct RunConfig  {
    pub cwd: PathBuf,
    pub out_dir: PathBuf,
    pub args: Arguments,
    pub host_cores: usize,
    pub available_ram: u64,
    pub seed: u64,
}


#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> Arguments {
        let mut argv = vec!["ribodb-pipelines", "-o", "out", "-n", "Escherichia coli", "-g", "genomes"];
        argv.extend_from_slice(extra);
        Arguments::parse_from(argv)
    }

    #[test]
    fn test_settings_require_nstrains_without_sras() {
        let err = PipelineSettings::from_args(&args(&[]), None, 1).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_settings_target_defaults_to_explicit_runs() {
        let settings = PipelineSettings::from_args(&args(&["--SRAs", "SRR1", "SRR2"]), Some(2), 1).unwrap();
        assert_eq!(settings.target, 2);
        assert_eq!(settings.max_coverage, 50.0);
        assert_eq!(settings.memory_gb, 4);
        assert!(settings.trim_reads);
        let untrimmed = PipelineSettings::from_args(&args(&["--skip_trimming"]), Some(1), 1).unwrap();
        assert!(!untrimmed.trim_reads);
    }

    #[test]
    fn test_settings_reject_zero_cores() {
        let err = PipelineSettings::from_args(&args(&["-S", "3", "--cores", "0"]), None, 1).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_settings_reject_bad_fraction() {
        let err = PipelineSettings::from_args(&args(&["-S", "3", "--job_fraction", "1.5"]), None, 1).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_settings_timeouts_in_minutes() {
        let settings = PipelineSettings::from_args(&args(&["-S", "1", "--assembly_timeout", "2"]), None, 1).unwrap();
        assert_eq!(settings.assembly_timeout, Some(Duration::from_secs(120)));
        assert_eq!(settings.annotation_timeout, None);
    }
}
