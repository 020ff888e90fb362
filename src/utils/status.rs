// Per-run status markers. Downloading and assembling fail for many reasons,
// so completed stages are recorded to allow restarting incomplete runs.
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use crate::config::defs::STATUS_FILE;

#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn in_dir(dir: &Path) -> Self {
        Self { path: dir.join(STATUS_FILE) }
    }

    pub fn markers(&self) -> io::Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        Ok(fs::read_to_string(&self.path)?
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    pub fn contains(&self, marker: &str) -> bool {
        self.markers().map(|m| m.iter().any(|l| l == marker)).unwrap_or(false)
    }

    pub fn mark(&self, marker: &str) -> io::Result<()> {
        if self.contains(marker) {
            return Ok(());
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", marker)
    }
}
