use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use flate2::read::GzDecoder;
use crate::config::defs::{FASTA_EXTS, FASTQ_EXTS};

pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1F, 0x8B]), // Gzip magic bytes
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Enum to hold either an uncompressed or gzipped file reader
pub enum FileReader {
    Uncompressed(BufReader<File>),
    Gzipped(GzDecoder<File>),
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileReader::Uncompressed(r) => r.read(buf),
            FileReader::Gzipped(r) => r.read(buf),
        }
    }
}

/// Opens a file, transparently decompressing gzip input.
pub fn open_maybe_gz(path: &Path) -> io::Result<FileReader> {
    let file = File::open(path)?;
    if is_gzipped(path)? {
        Ok(FileReader::Gzipped(GzDecoder::new(file)))
    } else {
        Ok(FileReader::Uncompressed(BufReader::new(file)))
    }
}

/// Strips all extensions off a path.
///
/// # Arguments
///
/// * `path` - Any file path.
///
/// # Returns
/// Tuple: (path without extensions, extensions in order). `reads.fastq.gz` gives (`reads`, [`fastq`, `gz`]).
///
pub fn extension_remover(path: &Path) -> (PathBuf, Vec<String>) {
    let mut stem = path.to_path_buf();
    let mut extensions = Vec::new();
    while let Some(ext) = stem.extension().map(|e| e.to_string_lossy().into_owned()) {
        // Only strip short alphanumeric suffixes; accessions like GCF_000005845.2 keep their version.
        if ext.is_empty() || ext.len() > 6 || ext.chars().all(|c| c.is_ascii_digit()) {
            break;
        }
        extensions.insert(0, ext);
        stem.set_extension("");
    }
    (stem, extensions)
}

/// True if the path carries one of the FASTA extensions, gzipped or not.
pub fn is_fasta_path(path: &Path) -> bool {
    let (_, extensions) = extension_remover(path);
    extensions
        .iter()
        .any(|ext| FASTA_EXTS.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// True if the path carries one of the FASTQ extensions, gzipped or not.
pub fn is_fastq_path(path: &Path) -> bool {
    let (_, extensions) = extension_remover(path);
    extensions
        .iter()
        .any(|ext| FASTQ_EXTS.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// Lists FASTA files in a directory, sorted by path so listings are stable.
pub fn list_fasta_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_fasta_path(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// True if the directory is missing or holds no entries.
pub fn dir_missing_or_empty(dir: &Path) -> io::Result<bool> {
    if !dir.exists() {
        return Ok(true);
    }
    Ok(fs::read_dir(dir)?.next().is_none())
}

/// Decompresses a gzip file to `dest`.
pub fn decompress_gz(src: &Path, dest: &Path) -> io::Result<u64> {
    let mut decoder = GzDecoder::new(File::open(src)?);
    let mut out = io::BufWriter::new(File::create(dest)?);
    let written = io::copy(&mut decoder, &mut out)?;
    io::Write::flush(&mut out)?;
    Ok(written)
}

/// Reads a one-column list file, skipping blank lines.
pub fn read_list_file(path: &Path) -> io::Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect())
}
