use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use procsched::batch::{BatchScheduler, BoxFuture, JobCounts, JobScript, JobStatus, JobUsage};
use procsched::errors::{Result, SchedError};

/// A fake batch scheduler that:
/// - hands out sequential job ids and counts each submission as running
/// - reports scripted statuses and usage per job id
/// - can be told to reject submissions or capacity queries.
#[derive(Debug, Default)]
pub struct FakeBatchScheduler {
    state: Mutex<FakeState>,
}

#[derive(Debug, Default)]
struct FakeState {
    next_id: u64,
    counts: JobCounts,
    statuses: HashMap<String, JobStatus>,
    usage: HashMap<String, JobUsage>,
    submitted: Vec<JobScript>,
    fail_submit: bool,
    fail_count: bool,
    usage_queries: Vec<(String, i64)>,
}

impl FakeBatchScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn with_counts(self, running: usize, pending: usize, pending_uploads: usize) -> Self {
        self.state().counts = JobCounts {
            running,
            pending,
            pending_uploads,
        };
        self
    }

    pub fn fail_submissions(&self, fail: bool) {
        self.state().fail_submit = fail;
    }

    pub fn fail_counts(&self, fail: bool) {
        self.state().fail_count = fail;
    }

    pub fn set_status(&self, job_id: &str, status: JobStatus) {
        self.state().statuses.insert(job_id.to_string(), status);
    }

    pub fn set_usage(&self, job_id: &str, usage: JobUsage) {
        self.state().usage.insert(job_id.to_string(), usage);
    }

    pub fn submitted(&self) -> Vec<JobScript> {
        self.state().submitted.clone()
    }

    pub fn submitted_labels(&self) -> Vec<String> {
        self.state().submitted.iter().map(|s| s.task_label.clone()).collect()
    }

    pub fn usage_queries(&self) -> Vec<(String, i64)> {
        self.state().usage_queries.clone()
    }

    pub fn counts(&self) -> JobCounts {
        self.state().counts
    }
}

impl BatchScheduler for FakeBatchScheduler {
    fn submit<'a>(&'a self, script: &'a JobScript) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let mut state = self.state();
            if state.fail_submit {
                return Err(SchedError::SubmissionFailed {
                    task: script.task_label.clone(),
                    reason: "scripted failure".to_string(),
                });
            }
            state.next_id += 1;
            let job_id = (1000 + state.next_id).to_string();
            state.counts.running += 1;
            state.statuses.insert(job_id.clone(), JobStatus::Running);
            state.submitted.push(script.clone());
            Ok(job_id)
        })
    }

    fn status<'a>(&'a self, job_id: &'a str) -> BoxFuture<'a, JobStatus> {
        Box::pin(async move {
            self.state()
                .statuses
                .get(job_id)
                .copied()
                .unwrap_or(JobStatus::Absent)
        })
    }

    fn usage<'a>(&'a self, job_id: &'a str, age_days: i64) -> BoxFuture<'a, JobUsage> {
        Box::pin(async move {
            let mut state = self.state();
            state.usage_queries.push((job_id.to_string(), age_days));
            state.usage.get(job_id).cloned().unwrap_or_default()
        })
    }

    fn count_jobs(&self) -> BoxFuture<'_, Result<JobCounts>> {
        Box::pin(async move {
            let state = self.state();
            if state.fail_count {
                return Err(SchedError::BatchError("scripted count failure".to_string()));
            }
            Ok(state.counts)
        })
    }
}
