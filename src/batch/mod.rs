// src/batch/mod.rs

//! Batch-job adapter.
//!
//! The engine talks to a [`BatchScheduler`] instead of shelling out
//! directly, so tests can plug in a scripted fake while production uses
//! [`ShellBatchScheduler`].

pub mod command;
pub mod retry;
pub mod script;
pub mod shell;

use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;

pub use retry::RetryPolicy;
pub use script::{build_job_script, substitute_braces, substitute_dollar, JobScript};
pub use shell::ShellBatchScheduler;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Status of a job as seen by the batch system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    /// No longer known to the batch system.
    Absent,
    /// The status query kept failing.
    Unknown,
}

/// Resource usage of a finished job; `None` when not found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobUsage {
    pub mem_used: Option<String>,
    pub walltime: Option<String>,
    pub node: Option<String>,
}

/// Live capacity counters used for backpressure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub running: usize,
    pub pending: usize,
    pub pending_uploads: usize,
}

/// Trait abstracting the external batch scheduler.
pub trait BatchScheduler: Send + Sync {
    /// Submit a written job script and return its job id.
    ///
    /// Errors are fatal for the current launch pass.
    fn submit<'a>(&'a self, script: &'a JobScript) -> BoxFuture<'a, Result<String>>;

    /// Never fails; persistent errors become [`JobStatus::Unknown`].
    fn status<'a>(&'a self, job_id: &'a str) -> BoxFuture<'a, JobStatus>;

    /// Never fails; missing values stay `None`.
    fn usage<'a>(&'a self, job_id: &'a str, age_days: i64) -> BoxFuture<'a, JobUsage>;

    fn count_jobs(&self) -> BoxFuture<'_, Result<JobCounts>>;
}
