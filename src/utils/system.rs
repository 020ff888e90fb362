// src/utils/system.rs: System functions

use std::time::Duration;

use anyhow::{anyhow, Result};
use fxhash::FxHasher64;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::hash::Hasher;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tokio::time::sleep;


/// Determines number of cores that can be used for CPU based tasks
///
/// # Arguments
///
/// * `requested_cores` - Core budget asked for on the command line.
///
/// # Returns
///
/// Result<usize, f32> usable cores (requested, capped at the host's), current cpu usage
pub async fn detect_cores_and_load(requested_cores: usize) -> Result<(usize, f32)> {
    let refresh_kind = RefreshKind::nothing().with_cpu(Default::default());
    let mut system = System::new_with_specifics(refresh_kind);
    system.refresh_cpu_all();
    let logical_cores = system.cpus().len().max(1);
    system.refresh_cpu_specifics(CpuRefreshKind::nothing().with_cpu_usage());
    sleep(Duration::from_millis(100)).await;
    system.refresh_cpu_specifics(CpuRefreshKind::nothing().with_cpu_usage());
    let cpu_load = system.global_cpu_usage();
    let max_cores = logical_cores.min(requested_cores);
    Ok((max_cores, cpu_load))
}


/// Finds the amount of total and available RAM, keyed to OS
///
/// # Returns
///
/// Result<u64, u64> total ram, available ram (bytes)
pub fn detect_ram() -> Result<(u64, u64)> {
    let (total_ram, available_ram) = if cfg!(target_os = "macos") {
        let refresh_kind = RefreshKind::nothing().with_memory(Default::default());
        let mut system = System::new_with_specifics(refresh_kind);
        system.refresh_memory_specifics(MemoryRefreshKind::everything());
        let total = system.total_memory();
        let used = system.used_memory();
        (total, total.saturating_sub(used))
    } else {
        let refresh_kind = RefreshKind::nothing().with_memory(Default::default());
        let mut system = System::new_with_specifics(refresh_kind);
        system.refresh_memory();
        (system.total_memory(), system.available_memory())
    };

    if total_ram == 0 || available_ram == 0 {
        return Err(anyhow!("Failed to detect valid RAM values"));
    }

    Ok((total_ram, available_ram))
}


/// Resolves the project-wide seed: the fixed one if given, otherwise fresh entropy.
///
/// # Arguments
///
///  * `seed` - Seed number that allows reproducible results.
///
/// # Returns
///
/// The seed to log and hand to every component.
pub fn resolve_seed(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(|| StdRng::from_os_rng().next_u64())
}

/// Creates a StdRng from a base seed mixed with a key, so per-run streams are
/// independent of the order runs are processed in.
pub fn keyed_rng(seed: u64, key: &str) -> StdRng {
    let mut hasher = FxHasher64::default();
    hasher.write(key.as_bytes());
    StdRng::seed_from_u64(seed ^ hasher.finish())
}
