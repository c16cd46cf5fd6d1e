// src/batch/command.rs

//! Shell command runner used to talk to the batch system.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::process::Command;
use tracing::debug;

/// Captured result of one shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Run `cmd` through `sh -c`, bounded by `timeout`.
///
/// The child is killed if the timeout elapses.
pub async fn run_shell(cmd: &str, timeout: Duration) -> Result<CommandOutput> {
    debug!(cmd = %cmd, "running batch command");

    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .with_context(|| format!("spawning batch command '{cmd}'"))?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| anyhow!("batch command timed out after {:?}: {cmd}", timeout))?
        .with_context(|| format!("waiting for batch command '{cmd}'"))?;

    let result = CommandOutput {
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    debug!(cmd = %cmd, exit_code = result.code, "batch command exited");
    Ok(result)
}

/// Like [`run_shell`] but a non-zero exit is an error.
pub async fn run_checked(cmd: &str, timeout: Duration) -> Result<String> {
    let out = run_shell(cmd, timeout).await?;
    if !out.success() {
        return Err(anyhow!(
            "batch command exited with {}: {cmd}: {}",
            out.code,
            out.stderr.trim()
        ));
    }
    Ok(out.stdout)
}
