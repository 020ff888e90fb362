/// Synthetic reads and genomes, used to exercise the pipeline without real data.
use std::io;
use std::path::{Path, PathBuf};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use crate::utils::fastx::{create_writer, write_fasta_record, write_fastq_record};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DNA {
    A,
    C,
    G,
    T,
}

impl DNA {
    /// Convert nucleotide to its character representation.
    pub fn to_char(&self) -> char {
        match self {
            DNA::A => 'A',
            DNA::C => 'C',
            DNA::G => 'G',
            DNA::T => 'T',
        }
    }

    /// Get all possible nucleotides as a static slice.
    pub fn all() -> &'static [DNA] {
        &[DNA::A, DNA::C, DNA::G, DNA::T]
    }

    /// Generate a random sequence of nucleotides of the given length.
    pub fn random_sequence(length: usize, rng: &mut StdRng) -> String {
        (0..length)
            .map(|_| DNA::random_with_rng(rng).to_char())
            .collect()
    }

    fn random_with_rng(rng: &mut StdRng) -> DNA {
        // all() is a fixed four-element slice
        DNA::all().choose(rng).copied().unwrap_or(DNA::A)
    }
}

fn phred33(score: u8) -> u8 {
    score + 33
}

fn normal_phred_qual(normal: &Normal<f32>, rng: &mut StdRng) -> u8 {
    let mut raw_phred = -1.0;
    while raw_phred < 0.0 || raw_phred > 40.0 {
        raw_phred = normal.sample(rng);
    }
    phred33(raw_phred as u8)
}

/// Quality string with phred scores drawn from N(mean, stdev), clamped to 0..=40.
pub fn normal_phred_qual_string(length: usize, mean: f32, stdev: f32, rng: &mut StdRng) -> String {
    let normal = match Normal::new(mean, stdev.max(f32::MIN_POSITIVE)) {
        Ok(normal) => normal,
        Err(_) => return "I".repeat(length),
    };
    (0..length)
        .map(|_| normal_phred_qual(&normal, rng) as char)
        .collect()
}

/// Writes `records` synthetic reads (pairs when `paired`) of fixed length.
/// Mates share an id and carry `/1` and `/2` suffixes.
///
/// # Arguments
///
/// * `dir` - Output directory.
/// * `name` - File stem; files are `<name>_1.fastq` and `<name>_2.fastq`.
/// * `records` - Reads per file.
/// * `read_len` - Length of every read.
/// * `paired` - Write a reverse file too.
/// * `seed` - RNG seed.
///
/// # Returns
/// Paths of the forward and optional reverse files.
pub fn write_synthetic_reads(
    dir: &Path,
    name: &str,
    records: usize,
    read_len: usize,
    paired: bool,
    seed: u64,
) -> io::Result<(PathBuf, Option<PathBuf>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let path_f = dir.join(format!("{}_1.fastq", name));
    let path_r = dir.join(format!("{}_2.fastq", name));
    let mut writer_f = create_writer(&path_f)?;
    let mut writer_r = if paired { Some(create_writer(&path_r)?) } else { None };

    for i in 0..records {
        let seq = DNA::random_sequence(read_len, &mut rng);
        let qual = normal_phred_qual_string(read_len, 35.0, 3.0, &mut rng);
        write_fastq_record(&mut writer_f, &format!("{}.{}/1", name, i), None, seq.as_bytes(), qual.as_bytes())?;
        if let Some(writer_r) = writer_r.as_mut() {
            let seq = DNA::random_sequence(read_len, &mut rng);
            let qual = normal_phred_qual_string(read_len, 35.0, 3.0, &mut rng);
            write_fastq_record(writer_r, &format!("{}.{}/2", name, i), None, seq.as_bytes(), qual.as_bytes())?;
        }
    }
    writer_f.flush()?;
    if let Some(mut writer_r) = writer_r {
        writer_r.flush()?;
        return Ok((path_f, Some(path_r)));
    }
    Ok((path_f, None))
}

/// Writes a random single-record genome FASTA.
pub fn write_synthetic_genome(path: &Path, id: &str, length: usize, seed: u64) -> io::Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let seq = DNA::random_sequence(length, &mut rng);
    let mut writer = create_writer(path)?;
    write_fasta_record(&mut writer, id, None, seq.as_bytes())?;
    writer.flush()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::fastx::read_stats;
    use tempfile::tempdir;

    #[test]
    fn test_random_sequence() {
        let mut rng = StdRng::seed_from_u64(1);
        let seq = DNA::random_sequence(10, &mut rng);
        assert_eq!(seq.len(), 10);
        assert!(seq.chars().all(|c| "ACGT".contains(c)));
    }

    #[test]
    fn test_quality_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let quals = normal_phred_qual_string(500, 35.0, 10.0, &mut rng);
        assert!(quals.bytes().all(|q| (33..=73).contains(&q)));
    }

    #[test]
    fn test_write_synthetic_reads() {
        let dir = tempdir().unwrap();
        let (f, r) = write_synthetic_reads(dir.path(), "SRR1", 25, 100, true, 3).unwrap();
        let stats = read_stats(&f).unwrap();
        assert_eq!(stats.records, 25);
        assert_eq!(stats.bases, 2500);
        assert_eq!(read_stats(&r.unwrap()).unwrap().records, 25);
    }
}
