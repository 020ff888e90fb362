// Parsing for NCBI's prokaryotes.txt genome report
use std::io::{BufRead, BufReader};
use std::path::Path;
use anyhow::{anyhow, Context, Result};
use crate::utils::file::open_maybe_gz;

const ORGANISM_COL: &str = "#Organism/Name";
const STATUS_COL: &str = "Status";
const FTP_COL: &str = "FTP Path";
const COMPLETE_STATUS: &str = "Complete Genome";

#[derive(Debug, Clone, PartialEq)]
pub struct GenomeEntry {
    pub organism: String,
    pub status: String,
    pub ftp_path: String,
}

impl GenomeEntry {
    /// Assembly directory basename, e.g. GCF_000005845.2_ASM584v2.
    pub fn basename(&self) -> Option<&str> {
        self.ftp_path.trim_end_matches('/').rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// Download URL of the genomic FASTA inside the assembly directory.
    pub fn fasta_url(&self) -> Option<String> {
        let base = self.basename()?;
        Some(format!("{}/{}_genomic.fna.gz", self.ftp_path.trim_end_matches('/'), base))
    }
}

/// Picks up to `n` genomes for an organism, complete genomes first, each group in table order.
///
/// # Arguments
///
/// * `path` - prokaryotes.txt, optionally gzipped.
/// * `organism` - Genus or "genus species" prefix.
/// * `n` - Maximum number of genomes.
///
/// # Returns
/// The chosen entries; rows without an FTP path ("-") are skipped.
pub fn select_genomes(path: &Path, organism: &str, n: usize) -> Result<Vec<GenomeEntry>> {
    let reader = BufReader::new(
        open_maybe_gz(path).with_context(|| format!("Cannot open prokaryotes table {}", path.display()))?,
    );
    let mut lines = reader.lines();
    let header = lines
        .next()
        .ok_or_else(|| anyhow!("prokaryotes table {} is empty", path.display()))??;
    let columns: Vec<&str> = header.split('\t').collect();
    let index_of = |name: &str| {
        columns
            .iter()
            .position(|c| *c == name)
            .ok_or_else(|| anyhow!("prokaryotes table lacks column '{}'", name))
    };
    let organism_idx = index_of(ORGANISM_COL)?;
    let status_idx = index_of(STATUS_COL)?;
    let ftp_idx = index_of(FTP_COL)?;

    let mut complete = Vec::new();
    let mut other = Vec::new();
    for line in lines {
        let line = line?;
        let fields: Vec<&str> = line.split('\t').collect();
        let (Some(name), Some(status), Some(ftp)) =
            (fields.get(organism_idx), fields.get(status_idx), fields.get(ftp_idx))
        else {
            continue;
        };
        if !name.starts_with(organism) || ftp.is_empty() || *ftp == "-" {
            continue;
        }
        let entry = GenomeEntry {
            organism: name.to_string(),
            status: status.to_string(),
            ftp_path: ftp.to_string(),
        };
        if entry.status == COMPLETE_STATUS {
            complete.push(entry);
        } else {
            other.push(entry);
        }
    }
    complete.extend(other);
    complete.truncate(n);
    Ok(complete)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_select_genomes_prefers_complete() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("prokaryotes.txt");
        fs::write(
            &path,
            "#Organism/Name\tTaxID\tStatus\tFTP Path\n\
             Escherichia coli A\t562\tScaffold\tftp://x/GCA_1.1_a\n\
             Escherichia coli B\t562\tComplete Genome\tftp://x/GCA_2.1_b/\n\
             Salmonella enterica\t28901\tComplete Genome\tftp://x/GCA_3.1_c\n\
             Escherichia coli C\t562\tComplete Genome\t-\n",
        )?;
        let genomes = select_genomes(&path, "Escherichia coli", 5)?;
        assert_eq!(genomes.len(), 2);
        assert_eq!(genomes[0].organism, "Escherichia coli B");
        assert_eq!(
            genomes[0].fasta_url().as_deref(),
            Some("ftp://x/GCA_2.1_b/GCA_2.1_b_genomic.fna.gz")
        );
        assert_eq!(select_genomes(&path, "Escherichia coli", 1)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_missing_column_is_error() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("prokaryotes.txt");
        fs::write(&path, "#Organism/Name\tStatus\n")?;
        assert!(select_genomes(&path, "E", 1).is_err());
        Ok(())
    }
}
