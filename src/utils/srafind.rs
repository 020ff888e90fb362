// Parsing for the sraFind biosample table (github.com/nickp60/srafind)
use std::io::{BufRead, BufReader};
use std::path::Path;
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use crate::config::defs::{
    SRAFIND_ORGANISM_COL, SRAFIND_PLATFORM, SRAFIND_PLATFORM_COL, SRAFIND_RUNS_COL, SRAFIND_SHUFFLE_SEED,
};
use crate::utils::file::open_maybe_gz;

/// All sequencing runs deposited for one biosample.
#[derive(Debug, Clone, PartialEq)]
pub struct BiosampleRuns {
    pub biosample: String,
    pub runs: Vec<String>,
}

fn clean_field(field: &str) -> String {
    field.replace('"', "").replace('\'', "")
}

/// Parses one sraFind line; None when the row is not an Illumina run of the organism.
fn parse_line(line: &str, organism: &str) -> Option<BiosampleRuns> {
    let fields: Vec<String> = line.trim_end().split('\t').map(clean_field).collect();
    let organism_field = fields.get(SRAFIND_ORGANISM_COL)?;
    let platform = fields.get(SRAFIND_PLATFORM_COL)?;
    if !organism_field.starts_with(organism) || !platform.starts_with(SRAFIND_PLATFORM) {
        return None;
    }
    let runs: Vec<String> = fields
        .get(SRAFIND_RUNS_COL)?
        .split(',')
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();
    let first = runs.first()?.clone();
    let biosample = fields
        .first()
        .filter(|b| !b.is_empty())
        .cloned()
        .unwrap_or(first);
    Some(BiosampleRuns { biosample, runs })
}

/// Filters the sraFind table for Illumina runs of an organism.
/// Rows are shuffled with a fixed seed so the discovery order is stable between invocations.
///
/// # Arguments
///
/// * `path` - sraFind table, optionally gzipped.
/// * `organism` - Genus or "genus species" prefix.
///
/// # Returns
/// Biosample groups in discovery order.
pub fn filter_srafind(path: &Path, organism: &str) -> Result<Vec<BiosampleRuns>> {
    let reader = BufReader::new(
        open_maybe_gz(path).with_context(|| format!("Cannot open sraFind table {}", path.display()))?,
    );
    let mut results = Vec::new();
    for line in reader.lines() {
        if let Some(group) = parse_line(&line?, organism) {
            results.push(group);
        }
    }
    let mut rng = StdRng::seed_from_u64(SRAFIND_SHUFFLE_SEED);
    results.shuffle(&mut rng);
    Ok(results)
}
