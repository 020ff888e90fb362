// src/utils/streams.rs
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use anyhow::{anyhow, Result};
use log::debug;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// Captured result of one external tool invocation.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn stdout_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.stdout)
            .lines()
            .map(|l| l.to_string())
            .collect()
    }
}


/// Spawns an external tool and waits for it, capturing stdout and stderr.
/// The child is killed if the awaiting future is dropped (e.g. on timeout).
///
/// # Arguments
///
/// * `tool` - Executable name, resolved on PATH.
/// * `args` - Arguments, passed without a shell.
///
/// # Returns
/// ToolOutput; a non-zero exit is not an error here, callers decide.
pub async fn run_tool(tool: &str, args: &[String]) -> Result<ToolOutput> {
    debug!("Running: {} {}", tool, args.join(" "));
    let mut child = Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| anyhow!("Failed to spawn {}: {}. Is {} installed?", tool, e, tool))?;

    let mut stdout = child.stdout.take().ok_or_else(|| anyhow!("Failed to get stdout from {}", tool))?;
    let mut stderr = child.stderr.take().ok_or_else(|| anyhow!("Failed to get stderr from {}", tool))?;

    let stdout_task = async {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).await.map(|_| buf)
    };
    let stderr_task = async {
        let mut buf = Vec::new();
        stderr.read_to_end(&mut buf).await.map(|_| buf)
    };
    let (out, err, status) = tokio::join!(stdout_task, stderr_task, child.wait());

    Ok(ToolOutput {
        status: status?,
        stdout: out?,
        stderr: String::from_utf8_lossy(&err?).into_owned(),
    })
}

/// Runs a tool and fails with its stderr when it exits non-zero.
pub async fn run_tool_checked(tool: &str, args: &[String]) -> Result<ToolOutput> {
    let output = run_tool(tool, args).await?;
    if !output.success() {
        return Err(anyhow!(
            "{} exited with {}: {}",
            tool,
            output.status,
            output.stderr.trim()
        ));
    }
    Ok(output)
}

/// Runs a tool whose stdout is the product, writing it to `out_path`.
pub async fn run_tool_to_file(tool: &str, args: &[String], out_path: &Path) -> Result<ToolOutput> {
    let output = run_tool_checked(tool, args).await?;
    let mut file = File::create(out_path).await?;
    file.write_all(&output.stdout).await?;
    file.flush().await?;
    Ok(output)
}
