use seq_io::fasta::{Reader as FastaReader, OwnedRecord as FastaOwnedRecord};
use seq_io::fastq::{Reader as FastqReader, OwnedRecord as FastqOwnedRecord, Record as FastqRecordTrait};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Result};
use crate::config::defs::{FASTA_TAG, FASTQ_TAG};
use crate::utils::file::{is_fasta_path, is_fastq_path, open_maybe_gz, FileReader};

/// Defines FASTA and FASTQ as part of a unified FASTX structure.
#[derive(Clone, Debug, PartialEq)]
pub enum SequenceRecord {
    Fasta {
        id: String,
        desc: Option<String>,
        seq: Vec<u8>,
    },
    Fastq {
        id: String,
        desc: Option<String>,
        seq: Vec<u8>,
        qual: Vec<u8>,
    },
}

/// Maps id and seq to the correct file type.
impl SequenceRecord {
    pub fn id(&self) -> &str {
        match self {
            SequenceRecord::Fasta { id, .. } => id,
            SequenceRecord::Fastq { id, .. } => id,
        }
    }

    pub fn seq(&self) -> &[u8] {
        match self {
            SequenceRecord::Fasta { seq, .. } => seq,
            SequenceRecord::Fastq { seq, .. } => seq,
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            SequenceRecord::Fastq { id, desc, seq, qual } => {
                write_fastq_record(writer, id, desc.as_deref(), seq, qual)
            }
            SequenceRecord::Fasta { id, desc, seq } => {
                write_fasta_record(writer, id, desc.as_deref(), seq)
            }
        }
    }
}

impl From<FastaOwnedRecord> for SequenceRecord {
    fn from(record: FastaOwnedRecord) -> Self {
        let (id, desc) = parse_header(&record.head, '>');
        SequenceRecord::Fasta {
            id,
            desc,
            seq: record.seq,
        }
    }
}

impl From<FastqOwnedRecord> for SequenceRecord {
    fn from(record: FastqOwnedRecord) -> Self {
        let (id, desc) = parse_header(&record.head, '@');
        SequenceRecord::Fastq {
            id,
            desc,
            seq: record.seq,
            qual: record.qual,
        }
    }
}


/// Enum to hold either FASTA or FASTQ reader
pub enum SequenceReader {
    Fasta(FastaReader<FileReader>),
    Fastq(FastqReader<FileReader>),
}

impl SequenceReader {
    /// Owned-record iterator over either format.
    pub fn into_records(self) -> Box<dyn Iterator<Item = Result<SequenceRecord>>> {
        match self {
            SequenceReader::Fasta(reader) => Box::new(
                reader.into_records().map(|r| r.map(SequenceRecord::from).map_err(|e| anyhow!(e))),
            ),
            SequenceReader::Fastq(reader) => Box::new(
                reader.into_records().map(|r| r.map(SequenceRecord::from).map_err(|e| anyhow!(e))),
            ),
        }
    }
}

/// Creates a SequenceReader for either FASTA or FASTQ files.
///
///
/// # Arguments
///
/// * `path`: &Path - Valid path to a fastx file.
///
/// # Returns
/// io::Result<SequenceReader>: Result bearing the correct SequenceReader.
///
pub fn sequence_reader(path: &Path) -> io::Result<SequenceReader> {
    let reader = open_maybe_gz(path)?;
    match fastx_filetype(path)?.as_str() {
        FASTA_TAG => Ok(SequenceReader::Fasta(FastaReader::new(reader))),
        FASTQ_TAG => Ok(SequenceReader::Fastq(FastqReader::new(reader))),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Unsupported file type for path: {:?}", path),
        )),
    }
}


/// Determines if a file path is a FASTA, FASTQ, or neither.
/// Checks extensions first, then the leading byte of the body.
///
/// # Arguments
///
/// * `path` - Path to a FASTX file.
///
/// # Returns
/// Result<String>. Ok fastq or fasta, or err.
///
fn fastx_filetype(path: &Path) -> io::Result<String> {
    if is_fasta_path(path) {
        return Ok(FASTA_TAG.to_string());
    }
    if is_fastq_path(path) {
        return Ok(FASTQ_TAG.to_string());
    }

    let mut first = [0u8; 1];
    let mut reader = open_maybe_gz(path)?;
    if reader.read(&mut first)? == 1 {
        match first[0] {
            b'>' => return Ok(FASTA_TAG.to_string()),
            b'@' => return Ok(FASTQ_TAG.to_string()),
            _ => {}
        }
    }

    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("File '{}' is neither FASTA nor FASTQ.", path.display()),
    ))
}

pub fn write_fasta_record<W: Write>(
    writer: &mut W,
    id: &str,
    desc: Option<&str>,
    seq: &[u8],
) -> io::Result<()> {
    // Write header
    writer.write_all(b">")?;
    writer.write_all(id.as_bytes())?;
    if let Some(desc) = desc {
        writer.write_all(b" ")?;
        writer.write_all(desc.as_bytes())?;
    }
    writer.write_all(b"\n")?;

    // Write sequence (with line wrapping, e.g., 80 chars per line)
    for chunk in seq.chunks(80) {
        writer.write_all(chunk)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

pub fn write_fastq_record<W: Write>(
    writer: &mut W,
    id: &str,
    desc: Option<&str>,
    seq: &[u8],
    qual: &[u8],
) -> io::Result<()> {
    // Write header
    writer.write_all(b"@")?;
    writer.write_all(id.as_bytes())?;
    if let Some(desc) = desc {
        writer.write_all(b" ")?;
        writer.write_all(desc.as_bytes())?;
    }
    writer.write_all(b"\n")?;

    writer.write_all(seq)?;
    writer.write_all(b"\n+\n")?;
    writer.write_all(qual)?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Buffered writer for a new plain-text FASTX file.
pub fn create_writer(path: &Path) -> io::Result<BufWriter<File>> {
    Ok(BufWriter::new(File::create(path)?))
}


/// Parses a FASTX header.
///
///
/// # Arguments
///
/// * `head` - Header line of a FASTX record.
/// * 'prefix' - Leading, defining character of the header. > for FASTA, @ for FASTQ.
///
/// # Returns
/// Tuple: (id, desc) split of header on whitespace.
///
fn parse_header(head: &[u8], prefix: char) -> (String, Option<String>) {
    let head_str = String::from_utf8_lossy(head).into_owned();
    let parts: Vec<&str> = head_str.splitn(2, |c: char| c.is_whitespace()).collect();
    let id = parts[0].trim_start_matches(prefix).to_string();
    let desc = parts.get(1).map(|s| s.to_string()).filter(|s| !s.is_empty());
    (id, desc)
}


/// Record and base totals for one FASTX file.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReadStats {
    pub records: u64,
    pub bases: u64,
}

/// Counts the records and bases of a FASTX file.
///
///
/// # Arguments
///
/// * `path` - Valid path to a fastq or fasta file, optionally gzipped.
///
/// # Returns
/// ReadStats for the file.
///
pub fn read_stats(path: &Path) -> Result<ReadStats> {
    let mut stats = ReadStats::default();
    match sequence_reader(path)? {
        SequenceReader::Fastq(mut reader) => {
            while let Some(record) = reader.next() {
                let record = record?;
                stats.records += 1;
                stats.bases += record.seq().len() as u64;
            }
        }
        SequenceReader::Fasta(mut reader) => {
            while let Some(record) = reader.next() {
                let record = record?;
                stats.records += 1;
                stats.bases += record.seq_lines().map(|l| l.len() as u64).sum::<u64>();
            }
        }
    }
    Ok(stats)
}

/// Length of every record, in file order.
pub fn sequence_lengths(path: &Path) -> Result<Vec<u64>> {
    sequence_reader(path)?
        .into_records()
        .map(|r| r.map(|rec| rec.seq().len() as u64))
        .collect()
}

/// Average read length over the first `n` records of a FASTQ.
///
/// # Arguments
///
/// * `path` - FASTQ path, optionally gzipped.
/// * `n` - Number of leading records to sample.
///
/// # Returns
/// Mean length of the sampled records; error if the file has none.
pub fn average_read_length(path: &Path, n: usize) -> Result<f64> {
    let mut count = 0usize;
    let mut total = 0usize;
    for record in sequence_reader(path)?.into_records().take(n) {
        let record = record?;
        count += 1;
        total += record.seq().len();
    }
    if count == 0 {
        return Err(anyhow!("No reads found in {}", path.display()));
    }
    Ok(total as f64 / count as f64)
}

/// Loads every record of a FASTA file into memory, in file order.
pub fn load_fasta(path: &Path) -> Result<Vec<SequenceRecord>> {
    sequence_reader(path)?.into_records().collect()
}

/// Reverse complement of a nucleotide sequence; IUPAC ambiguity codes map to N.
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|b| match b {
            b'A' => b'T',
            b'T' => b'A',
            b'G' => b'C',
            b'C' => b'G',
            b'a' => b't',
            b't' => b'a',
            b'g' => b'c',
            b'c' => b'g',
            b'n' => b'n',
            _ => b'N',
        })
        .collect()
}


/// Compares the headers of two FASTQ reads.
/// Performs the mate check used while streaming paired files,
/// to ensure each pair of reads is really an R1/R2 pair.
/// # Arguments
///
/// * `id1`: &str - ID string for read 1 (id plus optional description)
/// * `id2`: &str - ID string for read 2
///
/// # Returns
/// bool: true if reads are a matched pair.
///
pub fn compare_read_ids(
    id1: &str,
    id2: &str,
) -> bool {

    // Try Casava 1.8+ format first (space-separated)
    let id1_parts: Vec<&str> = id1.splitn(2, ' ').collect();
    let id2_parts: Vec<&str> = id2.splitn(2, ' ').collect();

    if id1_parts.len() == 2 && id2_parts.len() == 2 {
        let read_id1 = id1_parts[0];
        let read_id2 = id2_parts[0];
        if read_id1 != read_id2 {
            return false;
        }
        let attr1_parts: Vec<&str> = id1_parts[1].split(':').collect();
        let attr2_parts: Vec<&str> = id2_parts[1].split(':').collect();
        let read_num1 = attr1_parts[0];
        let read_num2 = attr2_parts[0];
        let is_mate_num = |n: &str| n == "1" || n == "2";
        if is_mate_num(read_num1) && is_mate_num(read_num2) {
            return read_num1 != read_num2;
        }
        // fasterq-dump style: "SRR123.1 1 length=150"; length differs between trimmed mates
        let spot1 = id1_parts[1].split_whitespace().next();
        let spot2 = id2_parts[1].split_whitespace().next();
        return spot1 == spot2;
    }

    // Fallback to /1 and /2 format
    if id1.ends_with("/1") && id2.ends_with("/2") {
        let base_id1 = id1.trim_end_matches("/1");
        let base_id2 = id2.trim_end_matches("/2");
        return base_id1 == base_id2;
    } else if id1.ends_with("/2") && id2.ends_with("/1") {
        let base_id1 = id1.trim_end_matches("/2");
        let base_id2 = id2.trim_end_matches("/1");
        return base_id1 == base_id2;
    }

    // Bare ids: mates share the id verbatim
    id1 == id2
}

/// Full header (id plus description) as written in the file.
pub fn full_header(record: &SequenceRecord) -> String {
    match record {
        SequenceRecord::Fasta { id, desc, .. } | SequenceRecord::Fastq { id, desc, .. } => match desc {
            Some(desc) => format!("{} {}", id, desc),
            None => id.clone(),
        },
    }
}

/// Path helper for the per-run read files fasterq-dump writes with --split-files.
pub fn split_read_paths(dir: &Path, accession: &str) -> (PathBuf, PathBuf) {
    (
        dir.join(format!("{}_1.fastq", accession)),
        dir.join(format!("{}_2.fastq", accession)),
    )
}
