//! Collaborators backed by the external programs: fasterq-dump, sickle, mash,
//! riboSeed, barrnap and wget.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::OnceCell;
use crate::cli::Subassembler;
use crate::config::defs::{
    MashSubcommand, PipelineError, BARRNAP_OUT, BARRNAP_TAG, FASTERQ_DUMP_TAG, MASH_TAG, REFERENCE_SKETCH,
    RIBOSEED_COMPLETE, RIBOSEED_CONTIGS, RIBO_TAG, SICKLE_TAG, SRA_COMPLETE, TRIMMED_F, TRIMMED_R, TRIMMED_SINGLES,
    WGET_TAG,
};
use crate::pipelines::collaborators::{Annotator, Assembler, DistanceEstimator, GenomeSource, ReadAcquirer, ReadTrimmer};
use crate::pipelines::models::{ContigSet, ExtractedSequence, ReadSet, ReferenceGenome, Resources, RunCandidate, Strand};
use crate::utils::barrnap::{parse_16s_hits, RrnaHit};
use crate::utils::command::{barrnap, fasterq_dump, mash, ribo, sickle, wget};
use crate::utils::fastx::{load_fasta, read_stats, reverse_complement, sequence_lengths, split_read_paths, SequenceRecord};
use crate::utils::file::{decompress_gz, dir_missing_or_empty, extension_remover, list_fasta_files};
use crate::utils::prokaryotes::select_genomes;
use crate::utils::stats::ContigSummary;
use crate::utils::status::StatusFile;
use crate::utils::streams::{run_tool, run_tool_checked, run_tool_to_file};

/// Run directory that holds the status file for a stage directory.
fn run_dir_of(stage_dir: &Path) -> &Path {
    stage_dir.parent().unwrap_or(stage_dir)
}

/// Reads fasterq-dump left in `dir`, paired when both mate files exist.
fn existing_reads(dir: &Path, accession: &str) -> Option<ReadSet> {
    let (forward, reverse) = split_read_paths(dir, accession);
    let unsplit = dir.join(format!("{}.fastq", accession));
    match (forward.exists(), reverse.exists()) {
        (true, true) => Some(ReadSet::paired(accession, forward, reverse)),
        (true, false) => Some(ReadSet::single(accession, forward)),
        _ if unsplit.exists() => Some(ReadSet::single(accession, unsplit)),
        _ => None,
    }
}

/// Empties a read directory an interrupted download left behind;
/// fasterq-dump will not overwrite its own output.
async fn clear_partial_download(dest: &Path) -> Result<()> {
    if dest.exists() {
        warn!("Clearing partial download in {}", dest.display());
        tokio::fs::remove_dir_all(dest).await?;
    }
    tokio::fs::create_dir_all(dest).await?;
    Ok(())
}

/// Downloads runs from the SRA.
#[derive(Debug, Default)]
pub struct FasterqDump;

#[async_trait]
impl ReadAcquirer for FasterqDump {
    async fn fetch_reads(&self, candidate: &RunCandidate, dest: &Path, cores: usize) -> Result<ReadSet> {
        let accession = &candidate.accession;
        let status = StatusFile::in_dir(run_dir_of(dest));
        if status.contains(SRA_COMPLETE) {
            if let Some(reads) = existing_reads(dest, accession) {
                info!("{}: reads already downloaded, reusing", accession);
                return Ok(reads);
            }
        }

        clear_partial_download(dest).await?;
        info!("{}: downloading reads", accession);
        let args = fasterq_dump::arg_generator(&fasterq_dump::FasterqDumpConfig {
            accession: accession.clone(),
            threads: cores,
            out_dir: dest.to_path_buf(),
        });
        run_tool_checked(FASTERQ_DUMP_TAG, &args)
            .await
            .map_err(|e| PipelineError::ToolExecution { tool: FASTERQ_DUMP_TAG.to_string(), error: e.to_string() })?;

        let reads = existing_reads(dest, accession)
            .ok_or_else(|| anyhow!("fasterq-dump wrote no reads for {}", accession))?;
        status.mark(SRA_COMPLETE)?;
        Ok(reads)
    }
}

/// Quality trimming with sickle, paired or single-end to match the input.
#[derive(Debug, Default)]
pub struct Sickle;

impl Sickle {
    fn config(reads: &ReadSet, out_dir: &Path) -> sickle::SickleConfig {
        sickle::SickleConfig {
            reads_f: reads.forward.clone(),
            reads_r: reads.reverse.clone(),
            out_f: out_dir.join(TRIMMED_F),
            out_r: out_dir.join(TRIMMED_R),
            singles: out_dir.join(TRIMMED_SINGLES),
        }
    }
}

#[async_trait]
impl ReadTrimmer for Sickle {
    async fn trim(&self, reads: &ReadSet, out_dir: &Path) -> Result<ReadSet> {
        tokio::fs::create_dir_all(out_dir).await?;
        let config = Self::config(reads, out_dir);
        run_tool_checked(SICKLE_TAG, &sickle::arg_generator(&config))
            .await
            .map_err(|e| PipelineError::ToolExecution { tool: SICKLE_TAG.to_string(), error: e.to_string() })?;
        debug!("{}: trimmed reads written to {}", reads.accession, out_dir.display());
        Ok(match config.reads_r {
            Some(_) => ReadSet::paired(reads.accession.clone(), config.out_f, config.out_r),
            None => ReadSet::single(reads.accession.clone(), config.out_f),
        })
    }
}

/// Reads supplied on the command line instead of downloaded.
#[derive(Debug, Clone)]
pub struct LocalReads {
    pub forward: PathBuf,
    pub reverse: Option<PathBuf>,
}

impl LocalReads {
    pub fn from_paths(paths: &[String]) -> Result<Self> {
        let mut iter = paths.iter().map(PathBuf::from);
        let forward = iter.next().ok_or_else(|| anyhow!("--example_reads needs at least one file"))?;
        Ok(Self { forward, reverse: iter.next() })
    }
}

#[async_trait]
impl ReadAcquirer for LocalReads {
    async fn fetch_reads(&self, candidate: &RunCandidate, _dest: &Path, _cores: usize) -> Result<ReadSet> {
        let reads = match &self.reverse {
            Some(reverse) => ReadSet::paired(candidate.accession.clone(), self.forward.clone(), reverse.clone()),
            None => ReadSet::single(candidate.accession.clone(), self.forward.clone()),
        };
        if let Some(missing) = reads.files().into_iter().find(|p| !p.is_file()) {
            return Err(anyhow!("read file {} does not exist", missing.display()));
        }
        Ok(reads)
    }
}

/// Reference genomes kept as FASTA files in a directory, downloaded from the
/// NCBI prokaryotes table when the directory is empty.
#[derive(Debug, Clone)]
pub struct GenomesDirectory {
    pub dir: PathBuf,
    pub prokaryotes: PathBuf,
    pub n_references: usize,
}

impl GenomesDirectory {
    pub fn needs_download(&self) -> Result<bool> {
        Ok(dir_missing_or_empty(&self.dir)?)
    }

    async fn download(&self, organism: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let table = self.prokaryotes.clone();
        let wanted = organism.to_string();
        let n = self.n_references;
        let entries = tokio::task::spawn_blocking(move || select_genomes(&table, &wanted, n)).await??;
        if entries.is_empty() {
            warn!("No genomes for {} in {}", organism, self.prokaryotes.display());
        }

        for entry in entries {
            let (Some(url), Some(base)) = (entry.fasta_url(), entry.basename()) else {
                continue;
            };
            let gz = self.dir.join(format!("{}_genomic.fna.gz", base));
            let fna = self.dir.join(format!("{}_genomic.fna", base));
            info!("Downloading reference {} ({})", base, entry.status);
            if let Err(e) = run_tool_checked(WGET_TAG, &wget::arg_generator(&url, &gz)).await {
                warn!("Could not download {}: {}", url, e);
                let _ = tokio::fs::remove_file(&gz).await;
                continue;
            }
            let (src, dest) = (gz.clone(), fna.clone());
            tokio::task::spawn_blocking(move || decompress_gz(&src, &dest)).await??;
            tokio::fs::remove_file(&gz).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl GenomeSource for GenomesDirectory {
    async fn list_reference_genomes(&self, organism: &str) -> Result<Vec<ReferenceGenome>> {
        if self.needs_download()? {
            self.download(organism).await?;
        }
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || {
            let mut genomes = Vec::new();
            for path in list_fasta_files(&dir)? {
                let length = read_stats(&path)
                    .with_context(|| format!("Cannot read genome {}", path.display()))?
                    .bases;
                let identifier = path
                    .file_name()
                    .map(|n| extension_remover(Path::new(n)).0.to_string_lossy().into_owned())
                    .unwrap_or_default();
                match ReferenceGenome::new(identifier, path.clone(), length) {
                    Ok(genome) => genomes.push(genome),
                    Err(e) => warn!("Skipping {}: {}", path.display(), e),
                }
            }
            Ok::<_, anyhow::Error>(genomes)
        })
        .await?
    }
}

/// Parses one line of `mash dist` output into (reference, distance).
pub fn parse_mash_line(line: &str) -> Result<(String, f64)> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 5 {
        return Err(anyhow!("mash dist line has {} fields, expected 5", fields.len()));
    }
    let distance: f64 = fields[2]
        .parse()
        .with_context(|| format!("bad mash distance '{}'", fields[2]))?;
    Ok((fields[0].to_string(), distance))
}

/// Mash distance from a run's reads to each reference. References are sketched once.
pub struct MashDistance {
    work_dir: PathBuf,
    sketch: OnceCell<PathBuf>,
}

impl MashDistance {
    pub fn new(work_dir: PathBuf) -> Self {
        Self { work_dir, sketch: OnceCell::new() }
    }

    async fn reference_sketch(&self, candidates: &[ReferenceGenome], cores: usize) -> Result<&PathBuf> {
        self.sketch
            .get_or_try_init(|| async {
                tokio::fs::create_dir_all(&self.work_dir).await?;
                let prefix = self.work_dir.join(REFERENCE_SKETCH);
                let args = mash::arg_generator(&mash::MashConfig {
                    subcommand: MashSubcommand::Sketch,
                    threads: cores,
                    reference: prefix.clone(),
                    inputs: candidates.iter().map(|g| g.path.clone()).collect(),
                    reads_query: false,
                });
                info!("Sketching {} reference genomes", candidates.len());
                run_tool_checked(MASH_TAG, &args).await?;
                Ok::<PathBuf, anyhow::Error>(prefix.with_extension("msh"))
            })
            .await
    }
}

#[async_trait]
impl DistanceEstimator for MashDistance {
    async fn rank(
        &self,
        query: &ReadSet,
        candidates: &[ReferenceGenome],
        cores: usize,
    ) -> Result<Vec<(ReferenceGenome, f64)>> {
        let sketch = self.reference_sketch(candidates, cores).await?;
        let args = mash::arg_generator(&mash::MashConfig {
            subcommand: MashSubcommand::Dist,
            threads: cores,
            reference: sketch.clone(),
            inputs: vec![query.forward.clone()],
            reads_query: true,
        });
        let output = run_tool_checked(MASH_TAG, &args).await?;

        let by_path: HashMap<String, &ReferenceGenome> = candidates
            .iter()
            .map(|g| (g.path.to_string_lossy().into_owned(), g))
            .collect();
        let mut ranked = Vec::new();
        for line in output.stdout_lines().iter().filter(|l| !l.trim().is_empty()) {
            let (reference, distance) = parse_mash_line(line)?;
            match by_path.get(&reference) {
                Some(genome) => ranked.push(((*genome).clone(), distance)),
                None => debug!("mash reported unknown reference {}", reference),
            }
        }
        Ok(ranked)
    }
}

/// riboSeed de fere novo assembly of the rDNA regions.
#[derive(Debug, Clone)]
pub struct RiboSeed {
    pub subassembler: Subassembler,
}

fn contigs_path(out_dir: &Path) -> PathBuf {
    RIBOSEED_CONTIGS.iter().fold(out_dir.to_path_buf(), |p, part| p.join(part))
}

async fn contig_set(accession: &str, path: PathBuf) -> Result<ContigSet> {
    let lengths_path = path.clone();
    let lengths = tokio::task::spawn_blocking(move || sequence_lengths(&lengths_path)).await??;
    if lengths.is_empty() {
        return Err(anyhow!("assembly {} holds no contigs", path.display()));
    }
    Ok(ContigSet {
        accession: accession.to_string(),
        path,
        summary: ContigSummary::from_lengths(&lengths),
    })
}

#[async_trait]
impl Assembler for RiboSeed {
    async fn assemble(
        &self,
        reads: &ReadSet,
        reference: &ReferenceGenome,
        allotment: Resources,
        out_dir: &Path,
    ) -> Result<ContigSet> {
        let status = StatusFile::in_dir(run_dir_of(out_dir));
        let contigs = contigs_path(out_dir);
        if status.contains(RIBOSEED_COMPLETE) && contigs.exists() {
            info!("{}: assembly already complete, reusing", reads.accession);
            return contig_set(&reads.accession, contigs).await;
        }
        // riboSeed refuses to write into an existing output directory
        if out_dir.exists() {
            tokio::fs::remove_dir_all(out_dir).await?;
        }

        let args = ribo::arg_generator(&ribo::RiboConfig {
            reference: reference.path.clone(),
            reads_f: reads.forward.clone(),
            reads_r: reads.reverse.clone(),
            cores: allotment.cores,
            threads: 1,
            memory_gb: allotment.memory_gb,
            out_dir: out_dir.to_path_buf(),
            subassembler: self.subassembler.clone(),
        });
        info!("{}: assembling against {}", reads.accession, reference.identifier);
        let output = run_tool(RIBO_TAG, &args).await?;
        if !output.success() {
            if !contigs.exists() {
                return Err(PipelineError::ToolExecution {
                    tool: RIBO_TAG.to_string(),
                    error: format!("exited with {}: {}", output.status, output.stderr.trim()),
                }
                .into());
            }
            warn!("{}: riboSeed exited with {} but wrote contigs; keeping them", reads.accession, output.status);
        }
        let set = contig_set(&reads.accession, contigs).await?;
        status.mark(RIBOSEED_COMPLETE)?;
        Ok(set)
    }
}

/// Slices annotated intervals out of their contigs, reverse complementing minus-strand hits.
pub fn extract_hits(accession: &str, hits: &[RrnaHit], contigs: &[SequenceRecord]) -> Result<Vec<ExtractedSequence>> {
    let by_id: HashMap<&str, &[u8]> = contigs.iter().map(|r| (r.id(), r.seq())).collect();
    let mut extracted = Vec::with_capacity(hits.len());
    for hit in hits {
        let seq = by_id
            .get(hit.seqid.as_str())
            .ok_or_else(|| anyhow!("annotated contig {} is not in the assembly", hit.seqid))?;
        let (start, end) = (hit.start as usize, hit.end as usize);
        if end > seq.len() {
            return Err(anyhow!(
                "interval {}..{} runs past the end of {} ({} bp)",
                start,
                end,
                hit.seqid,
                seq.len()
            ));
        }
        let slice = &seq[start - 1..end];
        let (strand, sequence) = if hit.is_reverse() {
            (Strand::Reverse, reverse_complement(slice))
        } else {
            (Strand::Forward, slice.to_vec())
        };
        extracted.push(ExtractedSequence {
            accession: accession.to_string(),
            contig: hit.seqid.clone(),
            start: hit.start,
            end: hit.end,
            strand,
            sequence,
        });
    }
    Ok(extracted)
}

/// barrnap rRNA annotation.
#[derive(Debug, Clone)]
pub struct Barrnap {
    pub threads: usize,
}

#[async_trait]
impl Annotator for Barrnap {
    async fn annotate(&self, contigs: &ContigSet, work_dir: &Path) -> Result<Vec<ExtractedSequence>> {
        let gff = work_dir.join(BARRNAP_OUT);
        let output = run_tool_to_file(BARRNAP_TAG, &barrnap::arg_generator(&contigs.path, self.threads), &gff).await?;
        let hits = parse_16s_hits(&String::from_utf8_lossy(&output.stdout))?;
        debug!("{}: barrnap found {} 16S genes", contigs.accession, hits.len());
        if hits.is_empty() {
            return Ok(Vec::new());
        }
        let path = contigs.path.clone();
        let records = tokio::task::spawn_blocking(move || load_fasta(&path)).await??;
        extract_hits(&contigs.accession, &hits, &records)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use crate::pipelines::models::CandidateSource;
    use crate::utils::sequence::{write_synthetic_genome, write_synthetic_reads};

    #[test]
    fn test_parse_mash_line() {
        let (reference, distance) =
            parse_mash_line("genomes/a.fna\treads_1.fastq\t0.0213\t0\t812/1000").unwrap();
        assert_eq!(reference, "genomes/a.fna");
        assert_eq!(distance, 0.0213);
        assert!(parse_mash_line("a\tb\t0.1").is_err());
    }

    #[test]
    fn test_extract_hits_orients_sequences() {
        let contigs = vec![SequenceRecord::Fasta {
            id: "contig_1".to_string(),
            desc: None,
            seq: b"AAACCCGGGTTT".to_vec(),
        }];
        let hits = parse_16s_hits(
            "contig_1\tbarrnap:0.9\trRNA\t4\t6\t0\t+\t.\tName=16S_rRNA\n\
             contig_1\tbarrnap:0.9\trRNA\t3\t7\t0\t-\t.\tName=16S_rRNA\n",
        )
        .unwrap();
        let extracted = extract_hits("SRR1", &hits, &contigs).unwrap();
        assert_eq!(extracted[0].sequence, b"CCC".to_vec());
        assert_eq!(extracted[0].strand, Strand::Forward);
        assert_eq!(extracted[1].sequence, b"CGGGT".to_vec());
        assert_eq!(extracted[1].strand, Strand::Reverse);
    }

    #[test]
    fn test_extract_hits_out_of_range() {
        let contigs = vec![SequenceRecord::Fasta { id: "c".to_string(), desc: None, seq: b"ACGT".to_vec() }];
        let hits = parse_16s_hits("c\tb\trRNA\t2\t9\t0\t+\t.\tName=16S_rRNA\n").unwrap();
        assert!(extract_hits("SRR1", &hits, &contigs).is_err());
        let missing = parse_16s_hits("d\tb\trRNA\t1\t2\t0\t+\t.\tName=16S_rRNA\n").unwrap();
        assert!(extract_hits("SRR1", &missing, &contigs).is_err());
    }

    #[tokio::test]
    async fn test_genomes_directory_lists_fasta_files() -> Result<()> {
        let dir = tempdir()?;
        write_synthetic_genome(&dir.path().join("GCF_000005845.2_genomic.fna"), "chr", 1200, 1)?;
        write_synthetic_genome(&dir.path().join("other.fasta"), "chr", 800, 2)?;
        fs::write(dir.path().join("README"), "not a genome")?;
        let source = GenomesDirectory {
            dir: dir.path().to_path_buf(),
            prokaryotes: dir.path().join("prokaryotes.txt"),
            n_references: 10,
        };
        let genomes = source.list_reference_genomes("Escherichia").await?;
        assert_eq!(genomes.len(), 2);
        assert_eq!(genomes[0].identifier, "GCF_000005845.2_genomic");
        assert_eq!(genomes[0].length, 1200);
        assert_eq!(genomes[1].length, 800);
        Ok(())
    }

    #[tokio::test]
    async fn test_local_reads() -> Result<()> {
        let dir = tempdir()?;
        let (f, r) = write_synthetic_reads(dir.path(), "ex", 5, 100, true, 1)?;
        let r = r.ok_or_else(|| anyhow!("no reverse"))?;
        let local = LocalReads::from_paths(&[f.to_string_lossy().into_owned(), r.to_string_lossy().into_owned()])?;
        let candidate = RunCandidate::new("example", CandidateSource::LocalReads);
        let reads = local.fetch_reads(&candidate, dir.path(), 1).await?;
        assert!(reads.is_paired());

        let missing = LocalReads { forward: dir.path().join("nope.fq"), reverse: None };
        assert!(missing.fetch_reads(&candidate, dir.path(), 1).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_fasterq_dump_reuses_completed_download() -> Result<()> {
        let run_dir = tempdir()?;
        let data = run_dir.path().join("data");
        fs::create_dir_all(&data)?;
        write_synthetic_reads(&data, "SRR42", 5, 100, true, 1)?;
        StatusFile::in_dir(run_dir.path()).mark(SRA_COMPLETE)?;

        let candidate = RunCandidate::new("SRR42", CandidateSource::CommandLine);
        let reads = FasterqDump.fetch_reads(&candidate, &data, 1).await?;
        assert!(reads.is_paired());
        assert!(reads.forward.ends_with("SRR42_1.fastq"));
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_download_cleared() -> Result<()> {
        let run_dir = tempdir()?;
        let data = run_dir.path().join("data");
        fs::create_dir_all(&data)?;
        write_synthetic_reads(&data, "SRR42", 5, 100, true, 1)?;
        assert!(!StatusFile::in_dir(run_dir.path()).contains(SRA_COMPLETE));

        clear_partial_download(&data).await?;
        assert!(data.is_dir());
        assert_eq!(fs::read_dir(&data)?.count(), 0);
        assert!(existing_reads(&data, "SRR42").is_none());
        Ok(())
    }

    #[test]
    fn test_sickle_outputs_follow_pairing() {
        let out = Path::new("/run/sickle");
        let paired = ReadSet::paired("SRR1", PathBuf::from("f.fq"), PathBuf::from("r.fq"));
        let config = Sickle::config(&paired, out);
        assert_eq!(config.out_f, out.join(TRIMMED_F));
        assert_eq!(config.reads_r, Some(PathBuf::from("r.fq")));

        let single = ReadSet::single("SRR1", PathBuf::from("f.fq"));
        assert!(Sickle::config(&single, out).reads_r.is_none());
    }

    #[tokio::test]
    async fn test_riboseed_reuses_completed_assembly() -> Result<()> {
        let run_dir = tempdir()?;
        let out_dir = run_dir.path().join("riboSeed");
        let contigs = contigs_path(&out_dir);
        fs::create_dir_all(contigs.parent().ok_or_else(|| anyhow!("no parent"))?)?;
        fs::write(&contigs, ">c1\nACGTACGTAC\n>c2\nACGT\n")?;
        StatusFile::in_dir(run_dir.path()).mark(RIBOSEED_COMPLETE)?;

        let reads = ReadSet::single("SRR42", run_dir.path().join("r.fq"));
        let reference = ReferenceGenome::new("ref", run_dir.path().join("ref.fna"), 100)?;
        let assembler = RiboSeed { subassembler: Subassembler::Spades };
        let set = assembler.assemble(&reads, &reference, Resources::new(1, 1), &out_dir).await?;
        assert_eq!(set.summary.contigs, 2);
        assert_eq!(set.summary.total_length, 14);
        assert_eq!(set.summary.n50, 10);
        Ok(())
    }
}
