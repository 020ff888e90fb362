//! `build_db`: assemble candidate runs and collect their 16S sequences.
//! `list_candidates`: print the candidate pool without running anything.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{debug, info, warn};
use crate::cli::args::Subassembler;
use crate::config::defs::{
    PipelineError, PipelineSettings, RunConfig, BARRNAP_TAG, FASTERQ_DUMP_TAG, MASH_TAG, OUTPUT_FASTA, REPORT_JSON,
    RIBO_TAG, SICKLE_TAG, SKESA_TAG, SPADES_TAG, WGET_TAG,
};
use crate::pipelines::aggregate::ResultAggregator;
use crate::pipelines::budget::ResourceBudget;
use crate::pipelines::candidates::{build_candidate_pool, fetch_srafind};
use crate::pipelines::collaborators::{ReadAcquirer, ReadTrimmer};
use crate::pipelines::coverage::CoverageEstimator;
use crate::pipelines::external::{Barrnap, FasterqDump, GenomesDirectory, LocalReads, MashDistance, RiboSeed, Sickle};
use crate::pipelines::job::JobContext;
use crate::pipelines::models::Resources;
use crate::pipelines::reference::ReferenceSelector;
use crate::pipelines::scheduler::{RunPoolScheduler, SchedulerConfig};
use crate::utils::command::check_versions;

const MASH_WORK_DIR: &str = "mash";
const REFERENCE_OPERON_DIR: &str = "reference_operons";
const GIB: u64 = 1_073_741_824;

fn resolve_path(cwd: &Path, path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() { path } else { cwd.join(path) }
}

/// Programs the run needs on PATH.
fn required_tools(
    local_reads: bool,
    download_genomes: bool,
    trim_reads: bool,
    subassembler: &Subassembler,
) -> Vec<&'static str> {
    let mut tools = Vec::new();
    if !local_reads {
        tools.push(FASTERQ_DUMP_TAG);
    }
    if trim_reads {
        tools.push(SICKLE_TAG);
    }
    tools.extend([MASH_TAG, RIBO_TAG, BARRNAP_TAG]);
    tools.push(match subassembler {
        Subassembler::Spades => SPADES_TAG,
        Subassembler::Skesa => SKESA_TAG,
    });
    if download_genomes {
        tools.push(WGET_TAG);
    }
    tools
}

pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let args = &config.args;
    fetch_srafind(args, &config.cwd).await?;
    let pool = build_candidate_pool(args, &config.cwd)?;
    if pool.candidates.is_empty() {
        return Err(PipelineError::EmptyCandidatePool);
    }
    let settings = PipelineSettings::from_args(args, pool.explicit, config.seed)?;
    info!(
        "Building a 16S database for {} from {} candidate runs (target {})",
        settings.organism,
        pool.candidates.len(),
        settings.target
    );
    info!("Seed: {}", settings.seed);

    let genomes = GenomesDirectory {
        dir: resolve_path(&config.cwd, &args.genomes_dir),
        prokaryotes: resolve_path(&config.cwd, &args.prokaryotes),
        n_references: args.n_references,
    };
    let download_genomes = genomes.needs_download()?;
    if download_genomes && !genomes.prokaryotes.exists() {
        return Err(PipelineError::IOError(format!(
            "{} is empty and {} does not exist",
            genomes.dir.display(),
            genomes.prokaryotes.display()
        )));
    }
    check_versions(required_tools(
        args.example_reads.is_some(),
        download_genomes,
        settings.trim_reads,
        &settings.subassembler,
    ))
    .await?;

    let available_gb = config.available_ram / GIB;
    if settings.memory_gb > available_gb {
        warn!("--memory {} GB exceeds the {} GB currently available", settings.memory_gb, available_gb);
    }
    let cores = settings.cores.min(config.host_cores).max(1);
    if cores < settings.cores {
        warn!("Using {} cores: only {} detected", cores, config.host_cores);
    }
    let budget = ResourceBudget::new(Resources::new(cores, settings.memory_gb))
        .map_err(|e| PipelineError::Budget(e.to_string()))?;
    let allotment = budget
        .allotment(settings.max_concurrency, settings.job_fraction)
        .map_err(|e| PipelineError::Budget(e.to_string()))?;
    info!(
        "Budget {}: up to {} concurrent runs with {} each",
        budget.total(),
        allotment.max_concurrent,
        allotment.per_job
    );

    let annotator = Arc::new(Barrnap { threads: allotment.per_job.cores });
    let selector = ReferenceSelector::new(
        Arc::new(genomes),
        Arc::new(MashDistance::new(config.out_dir.join(MASH_WORK_DIR))),
    )
    .with_operon_check(annotator.clone(), settings.min_reference_operons, config.out_dir.join(REFERENCE_OPERON_DIR));

    let acquirer: Arc<dyn ReadAcquirer> = match &args.example_reads {
        Some(paths) => Arc::new(LocalReads::from_paths(paths)?),
        None => Arc::new(FasterqDump),
    };
    let trimmer: Option<Arc<dyn ReadTrimmer>> = if settings.trim_reads { Some(Arc::new(Sickle)) } else { None };

    let ctx = Arc::new(JobContext {
        organism: settings.organism.clone(),
        out_dir: config.out_dir.clone(),
        acquirer,
        selector: Arc::new(selector),
        trimmer,
        coverage: CoverageEstimator::new(settings.max_coverage, settings.approx_length, settings.seed),
        assembler: Arc::new(RiboSeed { subassembler: settings.subassembler.clone() }),
        annotator,
        assembly_timeout: settings.assembly_timeout,
        annotation_timeout: settings.annotation_timeout,
        keep_reads: settings.keep_reads,
    });

    let scheduler = RunPoolScheduler::new(
        budget,
        ctx,
        SchedulerConfig {
            target: settings.target,
            per_job: allotment.per_job,
            max_concurrency: allotment.max_concurrent,
            get_all: settings.get_all,
        },
    )?;
    let report = scheduler.run(pool.candidates).await?;
    debug!(
        "Dispatched {} runs, peak concurrency {}, pool exhausted: {}",
        report.dispatched, report.peak_concurrency, report.pool_exhausted
    );

    let mut aggregator = ResultAggregator::new(settings.target);
    aggregator.extend(report.records);
    let result = aggregator.finalize();

    let fasta = config.out_dir.join(OUTPUT_FASTA);
    result.write_fasta(&fasta)?;
    result.write_report(&config.out_dir.join(REPORT_JSON))?;
    result.log_summary();
    info!("Wrote {} sequences to {}", result.sequences.len(), fasta.display());
    Ok(())
}

/// Prints the candidate pool, one run per line with its biosample.
pub async fn list_candidates(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    fetch_srafind(&config.args, &config.cwd).await?;
    let pool = build_candidate_pool(&config.args, &config.cwd)?;
    if pool.candidates.is_empty() {
        return Err(PipelineError::EmptyCandidatePool);
    }
    for candidate in &pool.candidates {
        println!("{}\t{}", candidate.accession, candidate.group.as_deref().unwrap_or("-"));
    }
    info!("{} candidate runs for {}", pool.candidates.len(), config.args.organism_name);
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_tools() {
        assert_eq!(
            required_tools(false, false, true, &Subassembler::Spades),
            vec![FASTERQ_DUMP_TAG, SICKLE_TAG, MASH_TAG, RIBO_TAG, BARRNAP_TAG, SPADES_TAG]
        );
        assert_eq!(
            required_tools(true, true, false, &Subassembler::Skesa),
            vec![MASH_TAG, RIBO_TAG, BARRNAP_TAG, SKESA_TAG, WGET_TAG]
        );
    }

    #[test]
    fn test_resolve_path() {
        let cwd = Path::new("/work");
        assert_eq!(resolve_path(cwd, "genomes"), PathBuf::from("/work/genomes"));
        assert_eq!(resolve_path(cwd, "/data/genomes"), PathBuf::from("/data/genomes"));
    }
}
