//! Read depth estimation and seeded, pair-preserving downsampling.
//! All work here is blocking file IO; jobs call it through spawn_blocking.

use std::fs;
use std::io::Write;
use std::path::Path;
use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use rand::seq::index;
use serde::Serialize;
use crate::config::defs::{
    DOWNSAMPLED_DIR, DOWNSAMPLED_F, DOWNSAMPLED_R, MAX_AVG_READ_LEN, MIN_AVG_READ_LEN, READ_LENGTH_SAMPLE,
};
use crate::pipelines::models::{ReadSet, ReferenceGenome};
use crate::utils::fastx::{average_read_length, compare_read_ids, create_writer, full_header, read_stats, sequence_reader};
use crate::utils::system::keyed_rng;

/// Bases and read records of a ReadSet against a genome length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReadDepth {
    /// Read records per file; pairs for paired data.
    pub records: u64,
    pub bases: u64,
    pub genome_length: u64,
    pub depth: f64,
}

/// Outcome of the coverage stage, kept on the job record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    pub genome_length: u64,
    pub depth: f64,
    pub ceiling: f64,
    pub downsampled_records: Option<u64>,
    pub final_depth: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct CoverageEstimator {
    ceiling: f64,
    approx_length: Option<u64>,
    seed: u64,
}

/// Checks that the run's reads look like short Illumina reads.
///
/// # Arguments
///
/// * `reads` - ReadSet to check; only the forward file is sampled.
///
/// # Returns
/// The average length of the sampled reads, or an error when it falls outside the accepted range.
pub fn validate_read_length(reads: &ReadSet) -> Result<f64> {
    let avg = average_read_length(&reads.forward, READ_LENGTH_SAMPLE)?;
    if !(MIN_AVG_READ_LEN..=MAX_AVG_READ_LEN).contains(&avg) {
        return Err(anyhow!(
            "average read length {:.1} is outside {}-{}",
            avg,
            MIN_AVG_READ_LEN,
            MAX_AVG_READ_LEN
        ));
    }
    Ok(avg)
}

impl CoverageEstimator {
    pub fn new(ceiling: f64, approx_length: Option<u64>, seed: u64) -> Self {
        Self { ceiling, approx_length, seed }
    }

    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    /// Genome length used for depth: the user override when set, else the reference length.
    pub fn length_estimate(&self, reference: &ReferenceGenome) -> u64 {
        self.approx_length.unwrap_or(reference.length)
    }

    /// Depth of a ReadSet: total bases over both mates divided by the genome length.
    pub fn estimate(&self, reads: &ReadSet, genome_length: u64) -> Result<ReadDepth> {
        if genome_length == 0 {
            return Err(anyhow!("genome length estimate must be positive"));
        }
        let forward = read_stats(&reads.forward)
            .with_context(|| format!("Cannot read {}", reads.forward.display()))?;
        let mut bases = forward.bases;
        if let Some(reverse_path) = &reads.reverse {
            let reverse = read_stats(reverse_path)
                .with_context(|| format!("Cannot read {}", reverse_path.display()))?;
            if reverse.records != forward.records {
                return Err(anyhow!(
                    "mate files hold {} and {} reads",
                    forward.records,
                    reverse.records
                ));
            }
            bases += reverse.bases;
        }
        Ok(ReadDepth {
            records: forward.records,
            bases,
            genome_length,
            depth: bases as f64 / genome_length as f64,
        })
    }

    /// Subsamples reads to `target_depth`, keeping mates together.
    ///
    /// # Arguments
    ///
    /// * `reads` - Source ReadSet; left untouched on disk.
    /// * `depth` - Its estimated depth, from `estimate`.
    /// * `target_depth` - Depth to sample down to.
    /// * `out_dir` - Run directory; files land in its downsampled/ subdirectory.
    ///
    /// # Returns
    /// A new ReadSet pointing at the downsampled files.
    pub fn downsample(&self, reads: &ReadSet, depth: &ReadDepth, target_depth: f64, out_dir: &Path) -> Result<ReadSet> {
        let n = depth.records as usize;
        if n == 0 {
            return Err(anyhow!("{} has no reads to downsample", reads.accession));
        }
        let keep = ((n as f64 * target_depth / depth.depth).round() as usize).clamp(1, n);
        let mut rng = keyed_rng(self.seed, &reads.accession);
        let mut wanted = index::sample(&mut rng, n, keep).into_vec();
        wanted.sort_unstable();
        debug!("{}: keeping {} of {} read records", reads.accession, keep, n);

        let dir = out_dir.join(DOWNSAMPLED_DIR);
        fs::create_dir_all(&dir)?;
        let out_f = dir.join(DOWNSAMPLED_F);
        let mut writer_f = create_writer(&out_f)?;
        let mut forward = sequence_reader(&reads.forward)?.into_records();

        match &reads.reverse {
            Some(reverse_path) => {
                let out_r = dir.join(DOWNSAMPLED_R);
                let mut writer_r = create_writer(&out_r)?;
                let mut reverse = sequence_reader(reverse_path)?.into_records();
                let mut next = wanted.iter().peekable();
                let mut i = 0usize;
                while let Some(&&target) = next.peek() {
                    let (Some(rec_f), Some(rec_r)) = (forward.next(), reverse.next()) else {
                        return Err(anyhow!("{}: mate files ended early", reads.accession));
                    };
                    let (rec_f, rec_r) = (rec_f?, rec_r?);
                    if i == target {
                        if !compare_read_ids(&full_header(&rec_f), &full_header(&rec_r)) {
                            return Err(anyhow!(
                                "{}: reads {} and {} are not mates",
                                reads.accession,
                                rec_f.id(),
                                rec_r.id()
                            ));
                        }
                        rec_f.write_to(&mut writer_f)?;
                        rec_r.write_to(&mut writer_r)?;
                        next.next();
                    }
                    i += 1;
                }
                writer_f.flush()?;
                writer_r.flush()?;
                let mut set = ReadSet::paired(reads.accession.clone(), out_f, out_r);
                set.downsampled = true;
                Ok(set)
            }
            None => {
                let mut next = wanted.iter().peekable();
                let mut i = 0usize;
                while let Some(&&target) = next.peek() {
                    let record = forward
                        .next()
                        .ok_or_else(|| anyhow!("{}: read file ended early", reads.accession))??;
                    if i == target {
                        record.write_to(&mut writer_f)?;
                        next.next();
                    }
                    i += 1;
                }
                writer_f.flush()?;
                let mut set = ReadSet::single(reads.accession.clone(), out_f);
                set.downsampled = true;
                Ok(set)
            }
        }
    }

    /// Estimates depth and downsamples to the ceiling when above it.
    /// At or below the ceiling the ReadSet is returned unchanged.
    pub fn check(&self, reads: ReadSet, genome_length: u64, out_dir: &Path) -> Result<(ReadSet, CoverageReport)> {
        let depth = self.estimate(&reads, genome_length)?;
        info!(
            "{}: estimated coverage {:.2}x over {} bp",
            reads.accession, depth.depth, genome_length
        );
        if depth.depth <= self.ceiling {
            let report = CoverageReport {
                genome_length,
                depth: depth.depth,
                ceiling: self.ceiling,
                downsampled_records: None,
                final_depth: depth.depth,
            };
            return Ok((reads, report));
        }

        info!("{}: downsampling to {}x", reads.accession, self.ceiling);
        let downsampled = self.downsample(&reads, &depth, self.ceiling, out_dir)?;
        let after = self.estimate(&downsampled, genome_length)?;
        let report = CoverageReport {
            genome_length,
            depth: depth.depth,
            ceiling: self.ceiling,
            downsampled_records: Some(after.records),
            final_depth: after.depth,
        };
        Ok((downsampled, report))
    }
}
