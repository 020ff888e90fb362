mod common;

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use common::{candidates, context, scheduler, MockAcquirer, MockAnnotator, MockAssembler};
use ribodb_pipelines::config::defs::PipelineError;
use ribodb_pipelines::pipelines::aggregate::{JobStatus, ResultAggregator, TargetStatus};
use ribodb_pipelines::pipelines::budget::ResourceBudget;
use ribodb_pipelines::pipelines::job::{FailureReason, JobState};
use ribodb_pipelines::pipelines::models::{CandidateSource, Resources, RunCandidate};
use ribodb_pipelines::pipelines::scheduler::{RunPoolScheduler, SchedulerConfig};
use tempfile::tempdir;

fn annotator() -> Arc<MockAnnotator> {
    Arc::new(MockAnnotator { empty_for: HashSet::new() })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_never_exceeds_bound() -> Result<()> {
    let dir = tempdir()?;
    let assembler = Arc::new(MockAssembler::new(Duration::from_millis(40)));
    let ctx = context(dir.path(), Arc::new(MockAcquirer::failing(&[])), assembler.clone(), annotator());
    // 4 cores at 2 per job allows 2 jobs even though 10 were requested
    let (scheduler, budget) = scheduler(Resources::new(4, 16), Resources::new(2, 4), 10, 6, ctx);
    assert_eq!(scheduler.concurrency_bound(), 2);

    let report = scheduler
        .run(candidates(&["SRR1", "SRR2", "SRR3", "SRR4", "SRR5", "SRR6"]))
        .await?;
    assert_eq!(report.records.len(), 6);
    assert_eq!(report.peak_concurrency, 2);
    assert!(assembler.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(budget.available(), Resources::new(4, 16));
    Ok(())
}

#[tokio::test]
async fn test_backfills_after_fetch_errors() -> Result<()> {
    let dir = tempdir()?;
    let acquirer = Arc::new(MockAcquirer::failing(&["SRR2", "SRR4"]));
    let ctx = context(
        dir.path(),
        acquirer.clone(),
        Arc::new(MockAssembler::new(Duration::ZERO)),
        annotator(),
    );
    let (scheduler, _) = scheduler(Resources::new(1, 4), Resources::new(1, 4), 1, 3, ctx);

    let report = scheduler
        .run(candidates(&["SRR1", "SRR2", "SRR3", "SRR4", "SRR5"]))
        .await?;
    let mut aggregator = ResultAggregator::new(3);
    aggregator.extend(report.records);
    let result = aggregator.finalize();

    assert_eq!(result.succeeded, 3);
    assert_eq!(result.attempted, 5);
    assert_eq!(result.status, TargetStatus::Met);
    let failed: Vec<&str> = result.failures.iter().map(|f| f.accession.as_str()).collect();
    assert_eq!(failed, vec!["SRR2", "SRR4"]);
    for failure in &result.failures {
        assert_eq!(failure.state, JobState::Acquiring);
        assert!(matches!(failure.reason, FailureReason::FetchError(_)));
    }
    let ids: Vec<&str> = result.sequences.iter().map(|s| s.identifier.as_str()).collect();
    assert_eq!(ids, vec!["SRR1_16S_1", "SRR3_16S_1", "SRR5_16S_1"]);
    assert_eq!(acquirer.calls.load(Ordering::SeqCst), 5);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_backfill_with_parallel_jobs() -> Result<()> {
    let dir = tempdir()?;
    let ctx = context(
        dir.path(),
        Arc::new(MockAcquirer::failing(&["SRR2", "SRR4"])),
        Arc::new(MockAssembler::new(Duration::from_millis(10))),
        annotator(),
    );
    let (scheduler, _) = scheduler(Resources::new(4, 8), Resources::new(2, 4), 2, 3, ctx);

    let report = scheduler
        .run(candidates(&["SRR1", "SRR2", "SRR3", "SRR4", "SRR5"]))
        .await?;
    let mut aggregator = ResultAggregator::new(3);
    aggregator.extend(report.records);
    let result = aggregator.finalize();

    assert_eq!(result.succeeded, 3);
    let failed: HashSet<&str> = result.failures.iter().map(|f| f.accession.as_str()).collect();
    assert_eq!(failed, ["SRR2", "SRR4"].into_iter().collect());
    Ok(())
}

#[tokio::test]
async fn test_stops_dispatching_once_target_met() -> Result<()> {
    let dir = tempdir()?;
    let acquirer = Arc::new(MockAcquirer::failing(&[]));
    let ctx = context(dir.path(), acquirer.clone(), Arc::new(MockAssembler::new(Duration::ZERO)), annotator());
    let (scheduler, _) = scheduler(Resources::new(1, 1), Resources::new(1, 1), 1, 2, ctx);

    let report = scheduler
        .run(candidates(&["SRR1", "SRR2", "SRR3", "SRR4", "SRR5"]))
        .await?;
    assert_eq!(report.dispatched, 2);
    assert!(!report.pool_exhausted);
    assert_eq!(acquirer.calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_jobs_drain_as_surplus() -> Result<()> {
    let dir = tempdir()?;
    let mut assembler = MockAssembler::new(Duration::ZERO);
    assembler.delays.insert("SRR1".to_string(), Duration::from_millis(300));
    assembler.delays.insert("SRR2".to_string(), Duration::from_millis(10));
    let ctx = context(dir.path(), Arc::new(MockAcquirer::failing(&[])), Arc::new(assembler), annotator());
    let (scheduler, budget) = scheduler(Resources::new(2, 2), Resources::new(1, 1), 2, 1, ctx);

    let report = scheduler.run(candidates(&["SRR1", "SRR2", "SRR3"])).await?;
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.records.len(), 2);
    assert!(report.records.iter().all(|r| r.is_success()));
    // the fast job finishes first, the slow one is waited for rather than dropped
    assert_eq!(report.records[0].accession(), "SRR2");
    assert_eq!(report.records[1].accession(), "SRR1");
    assert_eq!(budget.available(), Resources::new(2, 2));

    let mut aggregator = ResultAggregator::new(1);
    aggregator.extend(report.records);
    let result = aggregator.finalize();
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.status, TargetStatus::Met);
    assert_eq!(result.surplus, vec!["SRR2".to_string()]);
    let ids: Vec<&str> = result.sequences.iter().map(|s| s.accession.as_str()).collect();
    assert_eq!(ids, vec!["SRR1"]);
    assert_eq!(result.jobs[1].status, JobStatus::Surplus);
    Ok(())
}

#[tokio::test]
async fn test_zero_yield_success_counts() -> Result<()> {
    let dir = tempdir()?;
    let annotator = Arc::new(MockAnnotator { empty_for: ["SRR7".to_string()].into_iter().collect() });
    let ctx = context(
        dir.path(),
        Arc::new(MockAcquirer::failing(&[])),
        Arc::new(MockAssembler::new(Duration::ZERO)),
        annotator,
    );
    let (scheduler, _) = scheduler(Resources::new(1, 4), Resources::new(1, 4), 1, 2, ctx);

    let report = scheduler.run(candidates(&["SRR6", "SRR7"])).await?;
    let mut aggregator = ResultAggregator::new(2);
    aggregator.extend(report.records);
    let result = aggregator.finalize();

    assert_eq!(result.succeeded, 2);
    assert!(result.failures.is_empty());
    assert_eq!(result.sequences.len(), 1);
    assert_eq!(result.sequences[0].accession, "SRR6");
    assert_eq!(result.jobs[1].sequences, 0);
    Ok(())
}

#[tokio::test]
async fn test_target_unreachable_is_reported() -> Result<()> {
    let dir = tempdir()?;
    let ctx = context(
        dir.path(),
        Arc::new(MockAcquirer::failing(&[])),
        Arc::new(MockAssembler::new(Duration::ZERO)),
        annotator(),
    );
    let (scheduler, _) = scheduler(Resources::new(2, 4), Resources::new(1, 2), 2, 5, ctx);

    let report = scheduler.run(candidates(&["SRR1", "SRR2"])).await?;
    assert!(report.pool_exhausted);
    let mut aggregator = ResultAggregator::new(5);
    aggregator.extend(report.records);
    let result = aggregator.finalize();

    assert_eq!(result.succeeded, 2);
    assert_eq!(result.status, TargetStatus::Unreachable { shortfall: 3 });
    Ok(())
}

#[tokio::test]
async fn test_empty_pool_is_fatal() {
    let dir = tempdir().unwrap();
    let ctx = context(
        dir.path(),
        Arc::new(MockAcquirer::failing(&[])),
        Arc::new(MockAssembler::new(Duration::ZERO)),
        annotator(),
    );
    let (scheduler, _) = scheduler(Resources::new(1, 1), Resources::new(1, 1), 1, 1, ctx);
    let result = scheduler.run(Vec::new()).await;
    assert!(matches!(result, Err(PipelineError::EmptyCandidatePool)));
}

#[tokio::test]
async fn test_oversized_allotment_rejected() {
    let dir = tempdir().unwrap();
    let ctx = context(
        dir.path(),
        Arc::new(MockAcquirer::failing(&[])),
        Arc::new(MockAssembler::new(Duration::ZERO)),
        annotator(),
    );
    let budget = ResourceBudget::new(Resources::new(2, 2)).unwrap();
    let config = SchedulerConfig { target: 1, per_job: Resources::new(4, 1), max_concurrency: 1, get_all: false };
    assert!(matches!(
        RunPoolScheduler::new(budget, ctx, config),
        Err(PipelineError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn test_failed_assembly_and_panic_are_contained() -> Result<()> {
    let dir = tempdir()?;
    let mut assembler = MockAssembler::new(Duration::ZERO);
    assembler.panic_on.insert("SRR1".to_string());
    assembler.fail_on.insert("SRR2".to_string());
    let ctx = context(dir.path(), Arc::new(MockAcquirer::failing(&[])), Arc::new(assembler), annotator());
    let (scheduler, budget) = scheduler(Resources::new(2, 2), Resources::new(1, 1), 2, 1, ctx);

    let report = scheduler.run(candidates(&["SRR1", "SRR2", "SRR3"])).await?;
    let mut aggregator = ResultAggregator::new(1);
    aggregator.extend(report.records);
    let result = aggregator.finalize();

    assert_eq!(result.succeeded, 1);
    assert_eq!(result.status, TargetStatus::Met);
    let reasons: Vec<(&str, &FailureReason)> =
        result.failures.iter().map(|f| (f.accession.as_str(), &f.reason)).collect();
    assert_eq!(reasons.len(), 2);
    assert!(matches!(reasons[0], ("SRR1", FailureReason::Panicked(_))));
    assert!(matches!(reasons[1], ("SRR2", FailureReason::AssemblyError(_))));
    assert_eq!(budget.available(), Resources::new(2, 2));
    Ok(())
}

#[tokio::test]
async fn test_biosample_runs_deduplicated_unless_get_all() -> Result<()> {
    let pool = vec![
        RunCandidate::new("SRR1", CandidateSource::SraFind).with_group("SAMN1"),
        RunCandidate::new("SRR2", CandidateSource::SraFind).with_group("SAMN1"),
        RunCandidate::new("SRR1", CandidateSource::SraFind).with_group("SAMN1"),
        RunCandidate::new("SRR3", CandidateSource::SraFind).with_group("SAMN2"),
    ];

    for (get_all, expected) in [(false, 2usize), (true, 3usize)] {
        let dir = tempdir()?;
        let acquirer = Arc::new(MockAcquirer::failing(&[]));
        let ctx = context(dir.path(), acquirer.clone(), Arc::new(MockAssembler::new(Duration::ZERO)), annotator());
        let budget = ResourceBudget::new(Resources::new(1, 1))?;
        let scheduler = RunPoolScheduler::new(
            budget,
            ctx,
            SchedulerConfig { target: 10, per_job: Resources::new(1, 1), max_concurrency: 1, get_all },
        )?;
        let report = scheduler.run(pool.clone()).await?;
        assert_eq!(report.dispatched, expected);
        assert_eq!(acquirer.calls.load(Ordering::SeqCst), expected);
    }
    Ok(())
}
