use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use env_logger::{Builder, Target};
use log::{debug, error, info, LevelFilter};

use ribodb_pipelines::cli::{parse, Arguments, Module};
use ribodb_pipelines::config::defs::{PipelineError, RunConfig, LOG_FILE};
use ribodb_pipelines::pipelines::ribo16s;
use ribodb_pipelines::utils::system::{detect_cores_and_load, detect_ram, resolve_seed};


/// Log sink writing every line to stderr and to the run's log file.
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let dir = env::current_dir()?;
    let out_dir = setup_output_dir(&args, &dir)?;
    let log_file = OpenOptions::new().create(true).append(true).open(out_dir.join(LOG_FILE))?;

    Builder::new()
        .filter_level(log_level)
        .target(Target::Pipe(Box::new(TeeWriter { file: log_file })))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n riboDB\n-------------\n");

    info!("The current directory is {:?}", dir);
    info!("Writing output to {:?}", out_dir);

    let (host_cores, cpu_load) = detect_cores_and_load(args.cores).await?;
    debug!("Using up to {} cores; CPU load {}%", host_cores, cpu_load);

    let (total_ram, available_ram) = detect_ram()?;
    debug!("Available RAM: {} bytes (~{} GiB)", available_ram, available_ram / 1_073_741_824);
    debug!("Total RAM: {} bytes (~{} GiB)", total_ram, total_ram / 1_073_741_824);

    let seed = resolve_seed(args.seed);

    let module = args.module.clone();
    let run_config = Arc::new(RunConfig {
        cwd: dir,
        out_dir,
        args,
        host_cores,
        available_ram,
        seed,
    });

    if let Err(e) = match module {
        Module::BuildDb => build_db_run(run_config).await,
        Module::ListCandidates => list_candidates_run(run_config).await,
    } {
        error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    info!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}


async fn build_db_run(run_config: Arc<RunConfig>) -> Result<(), PipelineError> {
    ribo16s::run(run_config).await
}

async fn list_candidates_run(run_config: Arc<RunConfig>) -> Result<(), PipelineError> {
    ribo16s::list_candidates(run_config).await
}

/// Sets up the output directory, relative to `cwd` unless absolute.
/// Ensures the directory exists.
///
/// # Arguments
/// * `args` - The parsed command-line arguments.
/// * `cwd` - The current working directory.
/// # Returns
/// path to the output directory.
fn setup_output_dir(args: &Arguments, cwd: &Path) -> Result<PathBuf> {
    let path = PathBuf::from(&args.output_dir);
    let out_dir = if path.is_absolute() { path } else { cwd.join(path) };
    fs::create_dir_all(&out_dir)?;
    Ok(out_dir)
}
