use clap::{Parser, ValueEnum};
use serde::Serialize;

#[derive(Debug, Clone, ValueEnum, Default, PartialEq)]
pub enum Module {
    #[default]
    #[value(name = "build_db")]
    BuildDb,
    #[value(name = "list_candidates")]
    ListCandidates,
}

#[derive(Debug, Clone, ValueEnum, Default, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Subassembler {
    #[default]
    Spades,
    Skesa,
}

impl Subassembler {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subassembler::Spades => "spades",
            Subassembler::Skesa => "skesa",
        }
    }
}

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "ribodb-pipelines", version, about = "Builds species-specific 16S rRNA databases from draft genomes")]
pub struct Arguments {

    #[arg(short, long, default_value = "build_db", value_enum)]
    pub module: Module,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(short = 'o', long = "output_dir", help = "Path to output")]
    pub output_dir: String,

    #[arg(short = 'n', long = "organism_name", help = "Genus or genus species in quotes")]
    pub organism_name: String,

    #[arg(long = "SRA_list", help = "Path to file containing list of SRAs for assembly [one column]")]
    pub sra_list: Option<String>,

    #[arg(long = "SRAs", num_args = 1.., help = "Run pipeline on this (these) SRA(s) only")]
    pub sras: Option<Vec<String>>,

    #[arg(short = 'l', long = "approx_length", help = "Integer for approximate genome length")]
    pub approx_length: Option<u64>,

    #[arg(short = 's', long = "sraFind_path", default_value = "sraFind-All-biosample-with-SRA-hits.txt")]
    pub sra_path: String,

    #[arg(short = 'g', long = "genomes_dir", help = "Directory containing, or empty, candidate genomes for reference")]
    pub genomes_dir: String,

    #[arg(short = 'p', long = "prokaryotes", default_value = "./prokaryotes.txt")]
    pub prokaryotes: String,

    #[arg(long = "n_references", default_value_t = 10, help = "Genomes to download when the genomes directory is empty")]
    pub n_references: usize,

    #[arg(short = 'S', long = "nstrains", help = "Number of SRAs to be assembled successfully")]
    pub nstrains: Option<usize>,

    #[arg(long = "get_all", help = "Get both SRAs if organism has two", action)]
    pub get_all: bool,

    #[arg(long, default_value_t = 1)]
    pub cores: usize,

    #[arg(long, default_value_t = 4, help = "Amount of RAM to be used (GB)")]
    pub memory: u64,

    #[arg(long = "max_concurrency", help = "Maximum simultaneous runs; derived from --cores when unset")]
    pub max_concurrency: Option<usize>,

    #[arg(long = "job_fraction", default_value_t = 1.0, help = "Fraction of the budget shared among concurrent runs")]
    pub job_fraction: f64,

    #[arg(long, default_value_t = 50.0, help = "Maximum coverage of reads")]
    pub maxcov: f64,

    #[arg(long = "example_reads", num_args = 1..=2, help = "Input of example reads")]
    pub example_reads: Option<Vec<String>>,

    #[arg(long, default_value = "spades", value_enum, help = "Which program riboSeed uses for sub assemblies")]
    pub subassembler: Subassembler,

    #[clap(long, help = "Optional fixed seed for reproducibility; defaults to OS entropy")]
    pub seed: Option<u64>,

    #[arg(long = "min_reference_operons", default_value_t = 2)]
    pub min_reference_operons: usize,

    #[arg(long = "assembly_timeout", help = "Minutes before an assembly is abandoned")]
    pub assembly_timeout: Option<u64>,

    #[arg(long = "annotation_timeout", help = "Minutes before 16S extraction is abandoned")]
    pub annotation_timeout: Option<u64>,

    #[arg(long = "keep_reads", action, help = "Keep raw and downsampled reads; enables resuming")]
    pub keep_reads: bool,

    #[arg(long = "skip_trimming", action, help = "Do not quality-trim reads with sickle before downsampling")]
    pub skip_trimming: bool,
}
