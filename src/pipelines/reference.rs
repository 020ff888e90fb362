//! Per-run reference selection over an organism-scoped genome pool.
//!
//! The pool for an organism is listed once, on first use, and shared read-only by
//! every job afterwards. Concurrent first requests wait on the same initialization.
//! An empty listing is not cached, so a later job asks the source again.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::OnceCell;
use crate::pipelines::collaborators::{Annotator, DistanceEstimator, GenomeSource};
use crate::pipelines::models::{ContigSet, ReadSet, ReferenceGenome};
use crate::utils::stats::ContigSummary;

type PoolCell = Arc<OnceCell<Arc<Vec<ReferenceGenome>>>>;

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("no reference genomes available for {0}")]
    ReferenceUnavailable(String),

    #[error("listing reference genomes failed: {0}")]
    Listing(anyhow::Error),

    #[error("distance estimation failed: {0}")]
    Distance(anyhow::Error),

    #[error("no reference genome carries at least {0} 16S copies")]
    NoEligibleReference(usize),
}

/// Rejects references whose own assembly carries too few annotated 16S copies.
struct OperonCheck {
    annotator: Arc<dyn Annotator>,
    min_operons: usize,
    work_dir: PathBuf,
    counts: RwLock<HashMap<String, Arc<OnceCell<usize>>>>,
}

pub struct ReferenceSelector {
    source: Arc<dyn GenomeSource>,
    estimator: Arc<dyn DistanceEstimator>,
    operon_check: Option<OperonCheck>,
    cache: RwLock<HashMap<String, PoolCell>>,
}

/// Ordering of ranked references: smallest distance first, NaN last,
/// then the longer genome, then identifier.
pub fn compare_ranked(a: &(ReferenceGenome, f64), b: &(ReferenceGenome, f64)) -> Ordering {
    let by_distance = match (a.1.is_nan(), b.1.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal),
    };
    by_distance
        .then_with(|| b.0.length.cmp(&a.0.length))
        .then_with(|| a.0.identifier.cmp(&b.0.identifier))
}

impl ReferenceSelector {
    pub fn new(source: Arc<dyn GenomeSource>, estimator: Arc<dyn DistanceEstimator>) -> Self {
        Self {
            source,
            estimator,
            operon_check: None,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Requires `min_operons` annotated 16S genes on a reference before it is chosen.
    /// Thresholds of 0 or 1 disable the check.
    pub fn with_operon_check(mut self, annotator: Arc<dyn Annotator>, min_operons: usize, work_dir: PathBuf) -> Self {
        self.operon_check = if min_operons > 1 {
            Some(OperonCheck {
                annotator,
                min_operons,
                work_dir,
                counts: RwLock::new(HashMap::new()),
            })
        } else {
            None
        };
        self
    }

    /// Cached reference pool for an organism, listing it on first access.
    pub async fn pool(&self, organism: &str) -> Result<Arc<Vec<ReferenceGenome>>, SelectionError> {
        let existing = {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            cache.get(organism).cloned()
        };
        let cell = match existing {
            Some(cell) => cell,
            None => {
                let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
                cache.entry(organism.to_string()).or_default().clone()
            }
        };

        let pool = cell
            .get_or_try_init(|| async {
                info!("Listing reference genomes for {}", organism);
                let genomes = self
                    .source
                    .list_reference_genomes(organism)
                    .await
                    .map_err(SelectionError::Listing)?;
                if genomes.is_empty() {
                    return Err(SelectionError::ReferenceUnavailable(organism.to_string()));
                }
                info!("Cached {} reference genomes for {}", genomes.len(), organism);
                Ok(Arc::new(genomes))
            })
            .await?;
        Ok(Arc::clone(pool))
    }

    /// Picks the closest reference genome for a run.
    ///
    /// # Arguments
    ///
    /// * `organism` - Organism whose reference pool is searched.
    /// * `query` - The run's reads.
    /// * `cores` - Cores the distance estimator may use.
    ///
    /// # Returns
    /// The minimum-distance eligible reference.
    pub async fn select(&self, organism: &str, query: &ReadSet, cores: usize) -> Result<ReferenceGenome, SelectionError> {
        let pool = self.pool(organism).await?;

        let mut ranked = if pool.len() == 1 {
            debug!("{}: single reference genome, skipping distance estimation", query.accession);
            vec![(pool[0].clone(), 0.0)]
        } else {
            self.estimator
                .rank(query, &pool, cores)
                .await
                .map_err(SelectionError::Distance)?
        };
        if ranked.is_empty() {
            return Err(SelectionError::ReferenceUnavailable(organism.to_string()));
        }
        ranked.sort_by(compare_ranked);

        for (reference, distance) in ranked {
            if self.is_eligible(&reference).await {
                debug!("{}: selected {} at distance {}", query.accession, reference.identifier, distance);
                return Ok(reference);
            }
        }
        Err(SelectionError::NoEligibleReference(
            self.operon_check.as_ref().map(|c| c.min_operons).unwrap_or(0),
        ))
    }

    async fn is_eligible(&self, reference: &ReferenceGenome) -> bool {
        let Some(check) = &self.operon_check else {
            return true;
        };
        let existing = {
            let counts = check.counts.read().unwrap_or_else(|e| e.into_inner());
            counts.get(&reference.identifier).cloned()
        };
        let cell = match existing {
            Some(cell) => cell,
            None => {
                let mut counts = check.counts.write().unwrap_or_else(|e| e.into_inner());
                counts.entry(reference.identifier.clone()).or_default().clone()
            }
        };
        let count = *cell
            .get_or_init(|| async {
                let genome = ContigSet {
                    accession: reference.identifier.clone(),
                    path: reference.path.clone(),
                    summary: ContigSummary::default(),
                };
                let work_dir = check.work_dir.join(&reference.identifier);
                let found = match tokio::fs::create_dir_all(&work_dir).await {
                    Ok(()) => check.annotator.annotate(&genome, &work_dir).await,
                    Err(e) => Err(e.into()),
                };
                match found {
                    Ok(hits) => hits.len(),
                    Err(e) => {
                        warn!("Could not annotate reference {}: {}", reference.identifier, e);
                        0
                    }
                }
            })
            .await;
        if count < check.min_operons {
            info!(
                "Reference {} has {} 16S copies (need {}); skipping",
                reference.identifier, count, check.min_operons
            );
            return false;
        }
        true
    }
}
