//! Builds the candidate pool from the command line, a list file, local reads or sraFind.

use std::path::{Path, PathBuf};
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use crate::cli::Arguments;
use crate::config::defs::{PipelineError, ACCESSION_PATTERN, EXAMPLE_ACCESSION, SRAFIND_URL, WGET_TAG};
use crate::pipelines::models::{CandidateSource, RunCandidate};
use crate::utils::command::{check_versions, wget};
use crate::utils::file::read_list_file;
use crate::utils::srafind::{filter_srafind, BiosampleRuns};
use crate::utils::streams::run_tool_checked;

lazy_static! {
    static ref ACCESSION_RE: Regex = Regex::new(ACCESSION_PATTERN).unwrap();
}

/// SRA, ENA or DDBJ run accession.
pub fn is_run_accession(accession: &str) -> bool {
    ACCESSION_RE.is_match(accession)
}

/// Candidate pool in dispatch order, plus how many runs were named explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePool {
    pub candidates: Vec<RunCandidate>,
    /// Set when the user listed the runs; the default target is then the list length.
    pub explicit: Option<usize>,
}

/// Keeps valid accessions in order, logging the rest.
pub fn candidates_from_accessions(accessions: &[String], source: CandidateSource) -> Vec<RunCandidate> {
    accessions
        .iter()
        .map(|a| a.trim())
        .filter(|a| {
            let valid = is_run_accession(a);
            if !valid {
                warn!("Skipping '{}': not a run accession", a);
            }
            valid
        })
        .map(|a| RunCandidate::new(a, source))
        .collect()
}

/// One candidate per run, grouped by biosample, in discovery order.
pub fn candidates_from_srafind(groups: &[BiosampleRuns]) -> Vec<RunCandidate> {
    groups
        .iter()
        .flat_map(|group| {
            group
                .runs
                .iter()
                .filter(|r| is_run_accession(r))
                .map(move |r| RunCandidate::new(r.as_str(), CandidateSource::SraFind).with_group(group.biosample.as_str()))
        })
        .collect()
}

/// The sraFind table path when discovery will need it and it is not on disk yet.
pub fn srafind_to_fetch(args: &Arguments, cwd: &Path) -> Option<PathBuf> {
    if args.example_reads.is_some() || args.sras.is_some() || args.sra_list.is_some() {
        return None;
    }
    let table = cwd.join(&args.sra_path);
    (!table.exists()).then_some(table)
}

/// Downloads the sraFind table when candidate discovery needs it and it is missing.
pub async fn fetch_srafind(args: &Arguments, cwd: &Path) -> Result<(), PipelineError> {
    let Some(table) = srafind_to_fetch(args, cwd) else {
        return Ok(());
    };
    check_versions(vec![WGET_TAG]).await?;
    info!("Downloading the sraFind table to {}", table.display());
    if let Err(e) = run_tool_checked(WGET_TAG, &wget::arg_generator(SRAFIND_URL, &table)).await {
        // wget leaves an empty file behind on failure
        if table.exists() {
            tokio::fs::remove_file(&table).await.map_err(|e| PipelineError::IOError(e.to_string()))?;
        }
        return Err(PipelineError::ToolExecution { tool: WGET_TAG.to_string(), error: e.to_string() });
    }
    Ok(())
}

/// Resolves the candidate pool from the arguments: local reads, then --SRAs, then
/// --SRA_list, then sraFind discovery.
///
/// # Arguments
///
/// * `args` - Parsed command-line arguments.
/// * `cwd` - Base for relative paths.
///
/// # Returns
/// CandidatePool; an unreadable list file or sraFind table is an IOError.
pub fn build_candidate_pool(args: &Arguments, cwd: &Path) -> Result<CandidatePool, PipelineError> {
    if args.example_reads.is_some() {
        info!("Using local example reads");
        return Ok(CandidatePool {
            candidates: vec![RunCandidate::new(EXAMPLE_ACCESSION, CandidateSource::LocalReads)],
            explicit: Some(1),
        });
    }

    if let Some(sras) = &args.sras {
        let candidates = candidates_from_accessions(sras, CandidateSource::CommandLine);
        let n = candidates.len();
        return Ok(CandidatePool { candidates, explicit: Some(n) });
    }

    if let Some(list) = &args.sra_list {
        let path = cwd.join(list);
        let accessions = read_list_file(&path)
            .map_err(|e| PipelineError::IOError(format!("Cannot read {}: {}", path.display(), e)))?;
        let candidates = candidates_from_accessions(&accessions, CandidateSource::ListFile);
        let n = candidates.len();
        return Ok(CandidatePool { candidates, explicit: Some(n) });
    }

    let table = cwd.join(&args.sra_path);
    if !table.exists() {
        return Err(PipelineError::IOError(format!(
            "sraFind table {} not found; pass --SRAs/--SRA_list or let the pipeline download it",
            table.display()
        )));
    }
    let groups = filter_srafind(&table, &args.organism_name)?;
    info!("sraFind lists {} biosamples for {}", groups.len(), args.organism_name);
    Ok(CandidatePool { candidates: candidates_from_srafind(&groups), explicit: None })
}
