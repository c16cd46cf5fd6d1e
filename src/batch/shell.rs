// src/batch/shell.rs

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::batch::command::{run_checked, run_shell};
use crate::batch::retry::RetryPolicy;
use crate::batch::script::{substitute_dollar, JobScript};
use crate::batch::{BatchScheduler, BoxFuture, JobCounts, JobStatus, JobUsage};
use crate::config::Config;
use crate::errors::{Result, SchedError};
use crate::fs::FileSystem;

/// Batch scheduler driven by configurable shell command templates
/// (SLURM defaults).
#[derive(Debug, Clone)]
pub struct ShellBatchScheduler {
    config: Arc<Config>,
    fs: Arc<dyn FileSystem>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl ShellBatchScheduler {
    pub fn new(config: Arc<Config>, fs: Arc<dyn FileSystem>) -> Self {
        let sched = &config.scheduler;
        let retry = RetryPolicy::new(sched.retries, Duration::from_millis(sched.retry_delay_ms));
        let timeout = Duration::from_secs(sched.command_timeout_secs.max(1));
        Self {
            config,
            fs,
            retry,
            timeout,
        }
    }

    fn render(&self, template: &str, job_id: &str, days: i64) -> Result<String> {
        let mut vars = BTreeMap::new();
        vars.insert("jobid".to_string(), job_id.to_string());
        vars.insert("numberofdays".to_string(), days.to_string());
        substitute_dollar(template, &vars)
    }

    /// Run a command expected to print a single count.
    async fn count(&self, what: &str, cmd: &str) -> Result<usize> {
        self.retry
            .run(what, || async {
                let out = run_checked(cmd, self.timeout).await?;
                out.trim()
                    .parse::<usize>()
                    .map_err(|e| anyhow!("unexpected {what} output '{}': {e}", out.trim()))
            })
            .await
            .map_err(|e| SchedError::BatchError(format!("{what}: {e:#}")))
    }

    /// Entries in the external upload queue directory; a missing
    /// directory counts as empty.
    fn pending_uploads(&self) -> Result<usize> {
        let dir = &self.config.paths.upload_dir;
        if !self.fs.exists(dir) {
            return Ok(0);
        }
        self.fs
            .read_dir(dir)
            .map(|entries| entries.len())
            .map_err(|e| SchedError::BatchError(format!("upload queue {}: {e:#}", dir.display())))
    }

    async fn usage_value(&self, what: &str, template: &str, job_id: &str, days: i64) -> Option<String> {
        let cmd = match self.render(template, job_id, days) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!(job_id, error = %e, "cannot render usage command");
                return None;
            }
        };
        match self.retry.run(what, || run_checked(&cmd, self.timeout)).await {
            Ok(out) => out
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(|l| l.to_string()),
            Err(e) => {
                warn!(job_id, what, error = %e, "usage lookup failed");
                None
            }
        }
    }
}

impl BatchScheduler for ShellBatchScheduler {
    fn submit<'a>(&'a self, script: &'a JobScript) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let cmd = format!("{} '{}'", self.config.scheduler.submit_cmd, script.path.display());
            let pattern = self.config.job_id_pattern();
            let fail = |reason: String| SchedError::SubmissionFailed {
                task: script.task_label.clone(),
                reason,
            };
            // Only the command is retried; once it exits 0 the job is queued.
            let out = self
                .retry
                .run("submit", || run_checked(&cmd, self.timeout))
                .await
                .map_err(|e| fail(format!("{e:#}")))?;
            let job_id = pattern
                .captures(&out)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| fail(format!("no job id in submit output: {}", out.trim())))?;
            info!(task = %script.task_label, job_id = %job_id, "job submitted");
            Ok(job_id)
        })
    }

    fn status<'a>(&'a self, job_id: &'a str) -> BoxFuture<'a, JobStatus> {
        Box::pin(async move {
            let sched = &self.config.scheduler;
            let cmd = match self.render(&sched.status_cmd, job_id, 0) {
                Ok(cmd) => cmd,
                Err(e) => {
                    warn!(job_id, error = %e, "cannot render status command");
                    return JobStatus::Unknown;
                }
            };
            let out = self
                .retry
                .run("status", || async {
                    let out = run_shell(&cmd, self.timeout).await?;
                    if out.success() {
                        Ok(out.stdout)
                    } else {
                        Err(anyhow!("status command exited with {}: {}", out.code, out.stderr.trim()))
                    }
                })
                .await;
            match out {
                Ok(text) => {
                    let state = text.trim();
                    let status = if state == sched.running_status {
                        JobStatus::Running
                    } else if state == sched.queued_status {
                        JobStatus::Queued
                    } else {
                        JobStatus::Absent
                    };
                    debug!(job_id, state, ?status, "job status");
                    status
                }
                Err(e) => {
                    warn!(job_id, error = %e, "job status unknown");
                    JobStatus::Unknown
                }
            }
        })
    }

    fn usage<'a>(&'a self, job_id: &'a str, age_days: i64) -> BoxFuture<'a, JobUsage> {
        Box::pin(async move {
            let sched = &self.config.scheduler;
            JobUsage {
                mem_used: self.usage_value("memory", &sched.mem_used_cmd, job_id, age_days).await,
                walltime: self.usage_value("walltime", &sched.walltime_cmd, job_id, age_days).await,
                node: self.usage_value("node", &sched.node_cmd, job_id, age_days).await,
            }
        })
    }

    fn count_jobs(&self) -> BoxFuture<'_, Result<JobCounts>> {
        Box::pin(async move {
            let sched = &self.config.scheduler;
            let running = self.count("running jobs", &sched.count_running_cmd).await?;
            let pending = self.count("pending jobs", &sched.count_pending_cmd).await?;
            let counts = JobCounts {
                running,
                pending,
                pending_uploads: self.pending_uploads()?,
            };
            debug!(?counts, "batch system counters");
            Ok(counts)
        })
    }
}
