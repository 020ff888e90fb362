/// Summary statistics for assemblies and read sets
use serde::Serialize;


/// Helper function to compute Nx (e.g., N50, N75)
///
/// # Arguments
///
/// - `lengths`: Contig lengths, any order.
/// - `fraction`: The threshold i.e. the '50' in N50, as 0.5.
///
/// # Returns
///
/// The Nx length, 0 for an empty set.
pub fn compute_nx(lengths: &[u64], fraction: f64) -> u64 {
    let mut sorted = lengths.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    let total: u64 = sorted.iter().sum();
    let target = (total as f64 * fraction).ceil() as u64;
    let mut cumsum = 0;
    for &len in &sorted {
        cumsum += len;
        if cumsum >= target {
            return len;
        }
    }
    0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContigSummary {
    pub contigs: usize,
    pub total_length: u64,
    pub largest_contig: u64,
    pub n50: u64,
}

impl ContigSummary {
    pub fn from_lengths(lengths: &[u64]) -> Self {
        Self {
            contigs: lengths.len(),
            total_length: lengths.iter().sum(),
            largest_contig: lengths.iter().copied().max().unwrap_or(0),
            n50: compute_nx(lengths, 0.5),
        }
    }
}
