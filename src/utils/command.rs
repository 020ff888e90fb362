/// Functions and structs for working with creating command-line arguments

use anyhow::{anyhow, Result};
use log::{debug, warn};
use crate::config::defs::{PipelineError, TOOL_VERSIONS};
use crate::utils::streams::run_tool;


pub mod fasterq_dump {
    use std::path::PathBuf;

    pub struct FasterqDumpConfig {
        pub accession: String,
        pub threads: usize,
        pub out_dir: PathBuf,
    }

    pub fn arg_generator(config: &FasterqDumpConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push(config.accession.clone());
        args_vec.push("--threads".to_string());
        args_vec.push(config.threads.max(1).to_string());
        args_vec.push("-O".to_string());
        args_vec.push(config.out_dir.to_string_lossy().to_string());
        args_vec.push("--split-files".to_string());
        args_vec
    }
}

pub mod mash {
    use std::path::PathBuf;
    use crate::config::defs::MashSubcommand;

    pub struct MashConfig {
        pub subcommand: MashSubcommand,
        pub threads: usize,
        /// Sketch: output prefix. Dist: the reference sketch.
        pub reference: PathBuf,
        /// Sketch: genomes to sketch. Dist: query read files.
        pub inputs: Vec<PathBuf>,
        pub reads_query: bool,
    }

    pub fn arg_generator(config: &MashConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        match config.subcommand {
            MashSubcommand::Sketch => {
                args_vec.push("sketch".to_string());
                args_vec.push("-p".to_string());
                args_vec.push(config.threads.max(1).to_string());
                args_vec.push("-o".to_string());
                args_vec.push(config.reference.to_string_lossy().to_string());
            }
            MashSubcommand::Dist => {
                args_vec.push("dist".to_string());
                args_vec.push("-p".to_string());
                args_vec.push(config.threads.max(1).to_string());
                if config.reads_query {
                    // sketch the query as reads: drop single-copy k-mers
                    args_vec.push("-r".to_string());
                    args_vec.push("-m".to_string());
                    args_vec.push("2".to_string());
                }
                args_vec.push(config.reference.to_string_lossy().to_string());
            }
        }
        for input in &config.inputs {
            args_vec.push(input.to_string_lossy().to_string());
        }
        args_vec
    }
}

pub mod ribo {
    use std::path::PathBuf;
    use crate::cli::Subassembler;

    pub struct RiboConfig {
        pub reference: PathBuf,
        pub reads_f: PathBuf,
        pub reads_r: Option<PathBuf>,
        pub cores: usize,
        pub threads: usize,
        pub memory_gb: u64,
        pub out_dir: PathBuf,
        pub subassembler: Subassembler,
    }

    pub fn arg_generator(config: &RiboConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("run".to_string());
        args_vec.push("-r".to_string());
        args_vec.push(config.reference.to_string_lossy().to_string());
        match &config.reads_r {
            Some(reads_r) => {
                args_vec.push("-F".to_string());
                args_vec.push(config.reads_f.to_string_lossy().to_string());
                args_vec.push("-R".to_string());
                args_vec.push(reads_r.to_string_lossy().to_string());
            }
            None => {
                args_vec.push("-S1".to_string());
                args_vec.push(config.reads_f.to_string_lossy().to_string());
            }
        }
        args_vec.push("--cores".to_string());
        args_vec.push(config.cores.max(1).to_string());
        args_vec.push("--threads".to_string());
        args_vec.push(config.threads.max(1).to_string());
        args_vec.push("-v".to_string());
        args_vec.push("1".to_string());
        args_vec.push("--serialize".to_string());
        args_vec.push("-o".to_string());
        args_vec.push(config.out_dir.to_string_lossy().to_string());
        args_vec.push("--subassembler".to_string());
        args_vec.push(config.subassembler.as_str().to_string());
        args_vec.push("--stages".to_string());
        args_vec.push("score".to_string());
        args_vec.push("--memory".to_string());
        args_vec.push(config.memory_gb.max(1).to_string());
        args_vec
    }
}

pub mod barrnap {
    use std::path::Path;

    pub fn arg_generator(input: &Path, threads: usize) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("--quiet".to_string());
        args_vec.push("--threads".to_string());
        args_vec.push(threads.max(1).to_string());
        args_vec.push(input.to_string_lossy().to_string());
        args_vec
    }
}

pub mod sickle {
    use std::path::PathBuf;

    pub struct SickleConfig {
        pub reads_f: PathBuf,
        pub reads_r: Option<PathBuf>,
        pub out_f: PathBuf,
        pub out_r: PathBuf,
        /// Reads whose mate was discarded; paired mode only.
        pub singles: PathBuf,
    }

    pub fn arg_generator(config: &SickleConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        match &config.reads_r {
            Some(reads_r) => {
                args_vec.push("pe".to_string());
                args_vec.push("-f".to_string());
                args_vec.push(config.reads_f.to_string_lossy().to_string());
                args_vec.push("-r".to_string());
                args_vec.push(reads_r.to_string_lossy().to_string());
                args_vec.push("-t".to_string());
                args_vec.push("sanger".to_string());
                args_vec.push("-o".to_string());
                args_vec.push(config.out_f.to_string_lossy().to_string());
                args_vec.push("-p".to_string());
                args_vec.push(config.out_r.to_string_lossy().to_string());
                args_vec.push("-s".to_string());
                args_vec.push(config.singles.to_string_lossy().to_string());
            }
            None => {
                args_vec.push("se".to_string());
                args_vec.push("-f".to_string());
                args_vec.push(config.reads_f.to_string_lossy().to_string());
                args_vec.push("-t".to_string());
                args_vec.push("sanger".to_string());
                args_vec.push("-o".to_string());
                args_vec.push(config.out_f.to_string_lossy().to_string());
            }
        }
        args_vec
    }
}

pub mod wget {
    use std::path::Path;

    pub fn arg_generator(url: &str, dest: &Path) -> Vec<String> {
        vec![
            "-q".to_string(),
            url.to_string(),
            "-O".to_string(),
            dest.to_string_lossy().to_string(),
        ]
    }
}


/// Pulls the first dotted numeric token out of a version banner.
fn parse_version(text: &str) -> Option<f32> {
    text.split(|c: char| c.is_whitespace() || c == ',' || c == ':')
        .map(|tok| tok.trim_start_matches('v'))
        .filter(|tok| tok.chars().next().map_or(false, |c| c.is_ascii_digit()))
        .find_map(|tok| {
            let mut parts = tok.split('.');
            let major = parts.next()?;
            match parts.next() {
                Some(minor) => {
                    let minor: String = minor.chars().take_while(|c| c.is_ascii_digit()).collect();
                    format!("{}.{}", major, minor).parse().ok()
                }
                None => major.parse().ok(),
            }
        })
}

/// Checks that a tool can be spawned and returns its reported version, if any.
///
/// # Arguments
///
/// * `tool` - Tool tag from config::defs.
///
/// # Returns
/// Some(version) when the banner carried one; Err if the tool cannot be run.
pub async fn check_version(tool: &str) -> Result<Option<f32>> {
    let output = run_tool(tool, &["--version".to_string()])
        .await
        .map_err(|e| anyhow!("{} is not installed: {}", tool, e))?;
    let banner = format!("{}\n{}", String::from_utf8_lossy(&output.stdout), output.stderr);
    let version = parse_version(&banner);
    if let (Some(found), Some(min)) = (version, TOOL_VERSIONS.get(tool)) {
        if found < *min {
            warn!("{} version {} is older than the tested {}", tool, found, min);
        }
    }
    debug!("{} version: {:?}", tool, version);
    Ok(version)
}

/// Checks every listed tool; the first missing one aborts the run.
pub async fn check_versions(tools: Vec<&str>) -> Result<(), PipelineError> {
    for tool in tools {
        check_version(tool)
            .await
            .map_err(|_| PipelineError::MissingTool(tool.to_string()))?;
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use crate::cli::Subassembler;
    use crate::config::defs::MashSubcommand;

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("barrnap 0.9"), Some(0.9));
        assert_eq!(parse_version("fasterq-dump : 3.0.10"), Some(3.0));
        assert_eq!(parse_version("2.3\n"), Some(2.3));
        assert_eq!(parse_version("no digits here"), None);
    }

    #[test]
    fn test_sickle_args() {
        let mut config = sickle::SickleConfig {
            reads_f: PathBuf::from("f.fq"),
            reads_r: Some(PathBuf::from("r.fq")),
            out_f: PathBuf::from("tf.fq"),
            out_r: PathBuf::from("tr.fq"),
            singles: PathBuf::from("s.fq"),
        };
        let args = sickle::arg_generator(&config);
        assert_eq!(args[0], "pe");
        assert!(args.windows(2).any(|w| w[0] == "-p" && w[1] == "tr.fq"));
        assert!(args.windows(2).any(|w| w[0] == "-s" && w[1] == "s.fq"));

        config.reads_r = None;
        let args = sickle::arg_generator(&config);
        assert_eq!(args, vec!["se", "-f", "f.fq", "-t", "sanger", "-o", "tf.fq"]);
    }

    #[test]
    fn test_ribo_args_paired_and_single() {
        let mut config = ribo::RiboConfig {
            reference: PathBuf::from("ref.fna"),
            reads_f: PathBuf::from("f.fq"),
            reads_r: Some(PathBuf::from("r.fq")),
            cores: 2,
            threads: 1,
            memory_gb: 4,
            out_dir: PathBuf::from("riboSeed"),
            subassembler: Subassembler::Skesa,
        };
        let args = ribo::arg_generator(&config);
        assert_eq!(&args[..4], &["run", "-r", "ref.fna", "-F"]);
        assert!(args.windows(2).any(|w| w == ["--subassembler", "skesa"]));
        assert!(args.windows(2).any(|w| w == ["--memory", "4"]));

        config.reads_r = None;
        let args = ribo::arg_generator(&config);
        assert!(args.windows(2).any(|w| w == ["-S1", "f.fq"]));
        assert!(!args.contains(&"-R".to_string()));
    }

    #[test]
    fn test_mash_dist_reads_flags() {
        let config = mash::MashConfig {
            subcommand: MashSubcommand::Dist,
            threads: 3,
            reference: PathBuf::from("refs.msh"),
            inputs: vec![PathBuf::from("reads.fq")],
            reads_query: true,
        };
        let args = mash::arg_generator(&config);
        assert_eq!(args, vec!["dist", "-p", "3", "-r", "-m", "2", "refs.msh", "reads.fq"]);
    }

    #[test]
    fn test_fasterq_dump_args() {
        let args = fasterq_dump::arg_generator(&fasterq_dump::FasterqDumpConfig {
            accession: "SRR123".to_string(),
            threads: 0,
            out_dir: PathBuf::from("data"),
        });
        assert_eq!(args, vec!["SRR123", "--threads", "1", "-O", "data", "--split-files"]);
    }
}
