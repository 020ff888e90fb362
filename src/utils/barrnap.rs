// Functions and definitions for barrnap's GFF3 output
use anyhow::{anyhow, Result};
use crate::config::defs::RRNA_16S_NAME;

#[derive(Debug, Clone, PartialEq)]
pub struct RrnaHit {
    pub seqid: String,
    pub start: u64,
    pub end: u64,
    pub strand: char,
    pub attributes: String,
}

impl RrnaHit {
    pub fn parse_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        if fields.len() < 9 {
            return Err(anyhow!("GFF line has {} fields, expected 9", fields.len()));
        }
        let start: u64 = fields[3].parse()?;
        let end: u64 = fields[4].parse()?;
        if start == 0 || end < start {
            return Err(anyhow!("Invalid GFF interval {}..{}", start, end));
        }
        let strand = fields[6].chars().next().ok_or_else(|| anyhow!("Missing strand"))?;
        Ok(Self {
            seqid: fields[0].to_string(),
            start,
            end,
            strand,
            attributes: fields[8].to_string(),
        })
    }

    pub fn is_16s(&self) -> bool {
        self.attributes.starts_with(RRNA_16S_NAME)
    }

    pub fn is_reverse(&self) -> bool {
        self.strand == '-'
    }
}

/// All 16S hits in a barrnap GFF3 document, in file order.
pub fn parse_16s_hits(gff: &str) -> Result<Vec<RrnaHit>> {
    let mut hits = Vec::new();
    for line in gff.lines() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let hit = RrnaHit::parse_line(line)?;
        if hit.is_16s() {
            hits.push(hit);
        }
    }
    Ok(hits)
}


#[cfg(test)]
mod tests {
    use super::*;

    const GFF: &str = "##gff-version 3\n\
contig_1\tbarrnap:0.9\trRNA\t101\t1637\t0\t+\t.\tName=16S_rRNA;product=16S ribosomal RNA\n\
contig_1\tbarrnap:0.9\trRNA\t1900\t4800\t0\t+\t.\tName=23S_rRNA;product=23S ribosomal RNA\n\
contig_2\tbarrnap:0.9\trRNA\t5\t1540\t0\t-\t.\tName=16S_rRNA;product=16S ribosomal RNA\n";

    #[test]
    fn test_parse_16s_hits() {
        let hits = parse_16s_hits(GFF).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].seqid, "contig_1");
        assert_eq!((hits[0].start, hits[0].end), (101, 1637));
        assert!(hits[1].is_reverse());
    }

    #[test]
    fn test_bad_interval() {
        assert!(RrnaHit::parse_line("c\tb\trRNA\t50\t10\t0\t+\t.\tName=16S_rRNA").is_err());
        assert!(RrnaHit::parse_line("c\tb\trRNA").is_err());
    }
}
