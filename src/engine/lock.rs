// src/engine/lock.rs

//! On-disk advisory lock, one per phase.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::{Result, SchedError};
use crate::fs::FileSystem;
use crate::types::Phase;

/// Identity written into a lock file as `<host>-<pid>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOwner {
    pub host: String,
    pub pid: u32,
}

impl LockOwner {
    pub fn current() -> Self {
        Self {
            host: current_host(),
            pid: std::process::id(),
        }
    }

    /// Parse `<host>-<pid>`; the host itself may contain dashes.
    pub fn parse(text: &str) -> Option<Self> {
        let (host, pid) = text.trim().rsplit_once('-')?;
        if host.is_empty() {
            return None;
        }
        Some(Self {
            host: host.to_string(),
            pid: pid.parse().ok()?,
        })
    }

    /// A lock is stale only when it was taken on this host by a process
    /// that no longer exists. Locks from other hosts are always honoured.
    pub fn is_stale(&self) -> bool {
        self.host == current_host() && !pid_alive(self.pid)
    }
}

impl std::fmt::Display for LockOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.host, self.pid)
    }
}

fn current_host() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()))
        .unwrap_or_else(|| "localhost".to_string())
}

fn pid_alive(pid: u32) -> bool {
    let proc_root = Path::new("/proc");
    if proc_root.is_dir() {
        return proc_root.join(pid.to_string()).exists();
    }
    // Unknown means alive: never steal a lock we cannot judge.
    Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(true)
}

/// Held phase lock; the file is removed on drop.
#[derive(Debug)]
pub struct PhaseLock {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl PhaseLock {
    /// Lock file path: `<lock_dir>/<prefix>_<phase>.pid`.
    pub fn path_for(lock_dir: &Path, prefix: &str, phase: Phase) -> PathBuf {
        lock_dir.join(format!("{prefix}_{}.pid", phase.as_str()))
    }

    pub fn acquire(fs: Arc<dyn FileSystem>, lock_dir: &Path, prefix: &str, phase: Phase) -> Result<Self> {
        Self::acquire_as(fs, lock_dir, prefix, phase, &LockOwner::current())
    }

    /// Take the lock for `owner`. A stale lock is removed and the attempt
    /// repeated once; a live one fails with [`SchedError::LockHeld`].
    pub fn acquire_as(
        fs: Arc<dyn FileSystem>,
        lock_dir: &Path,
        prefix: &str,
        phase: Phase,
        owner: &LockOwner,
    ) -> Result<Self> {
        let path = Self::path_for(lock_dir, prefix, phase);
        let contents = owner.to_string();

        for attempt in 0..2 {
            if fs.create_new(&path, contents.as_bytes())? {
                debug!(phase = %phase, path = %path.display(), owner = %contents, "phase lock acquired");
                return Ok(Self { fs, path });
            }
            if attempt > 0 {
                break;
            }
            let holder = fs
                .read_to_string(&path)
                .ok()
                .and_then(|text| LockOwner::parse(&text));
            match holder {
                Some(holder) if holder.is_stale() => {
                    warn!(phase = %phase, path = %path.display(), holder = %holder, "removing stale phase lock");
                    fs.remove_file(&path)?;
                }
                _ => break,
            }
        }

        Err(SchedError::LockHeld {
            phase: phase.to_string(),
            path: path.display().to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PhaseLock {
    fn drop(&mut self) {
        if let Err(e) = self.fs.remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release phase lock");
        }
    }
}
