// src/engine/update.rs

//! Update phase: poll running jobs, finish completed ones, and apply
//! operator restart requests.

use tracing::{debug, error, info, warn};

use crate::batch::JobStatus;
use crate::errors::Result;
use crate::task::{restart_on_request, ProcStatus, Task};
use crate::types::Phase;

use super::runtime::Engine;
use super::{PhaseReport, ScopeFilter, NOT_FOUND};

impl Engine {
    pub(super) async fn update_pass(&self, filter: &ScopeFilter) -> Result<PhaseReport> {
        let mut report = PhaseReport::new(Phase::Update);
        let tasks: Vec<Task> = self
            .store
            .all_tasks()?
            .into_iter()
            .filter(|t| filter.admits(&t.scope))
            .collect();

        for task in tasks {
            let scope = task.scope.clone();
            let label = task.label.clone();
            match self.update_task(task).await {
                Ok(0) => {}
                Ok(n) => report.scope_mut(&scope).transitioned += n,
                Err(e) => {
                    error!(task = %label, error = %e, "update failed for task");
                    report.scope_mut(&scope).errors += 1;
                }
            }
        }
        Ok(report)
    }

    /// Advance one task as far as its current evidence allows; returns the
    /// number of committed transitions.
    async fn update_task(&self, mut task: Task) -> Result<usize> {
        let mut transitions = 0;

        if task.proc_status == ProcStatus::JobRunning && self.poll_job(&mut task).await? {
            transitions += 1;
        }
        if task.proc_status == ProcStatus::ReadyToComplete {
            self.harvest_usage(&mut task).await;
            task.transition(ProcStatus::Complete)?;
            self.store.save(&task)?;
            info!(scope = %task.scope, task = %task.label, "task complete");
            transitions += 1;
        }
        if task.proc_status.is_terminal() && task.qc_status.is_restart_request() && self.restart(&mut task)? {
            transitions += 1;
        }
        Ok(transitions)
    }

    /// Map the batch status of a running job onto the task.
    async fn poll_job(&self, task: &mut Task) -> Result<bool> {
        let status = match task.job_id.as_deref() {
            Some(job_id) => self.batch.status(job_id).await,
            None => {
                warn!(task = %task.label, "running task has no job id");
                JobStatus::Absent
            }
        };
        debug!(task = %task.label, ?status, "polled job");

        match status {
            JobStatus::Queued | JobStatus::Running | JobStatus::Unknown => Ok(false),
            JobStatus::Absent => {
                if self.fs.exists(&self.config.sentinel_path(&task.label)) {
                    task.transition(ProcStatus::ReadyToComplete)?;
                    info!(scope = %task.scope, task = %task.label, "job finished");
                } else {
                    task.transition(ProcStatus::JobFailed)?;
                    self.harvest_usage(task).await;
                    warn!(scope = %task.scope, task = %task.label, job_id = ?task.job_id, "job ended without completion sentinel");
                }
                self.store.save(task)?;
                Ok(true)
            }
        }
    }

    /// Best-effort usage lookup; missing values become [`NOT_FOUND`].
    pub(super) async fn harvest_usage(&self, task: &mut Task) {
        if task.wall_used.is_some() {
            task.mem_used.get_or_insert_with(|| NOT_FOUND.to_string());
            task.job_node.get_or_insert_with(|| NOT_FOUND.to_string());
            return;
        }

        let today = chrono::Local::now().date_naive();
        let age_days = task
            .job_start_date
            .map(|start| (today - start).num_days().max(0))
            .unwrap_or(0);

        let usage = match task.job_id.as_deref() {
            Some(job_id) if age_days <= self.config.update.trace_window_days => {
                self.batch.usage(job_id, age_days + 1).await
            }
            _ => {
                debug!(task = %task.label, age_days, "usage lookup outside the trace window");
                Default::default()
            }
        };

        let or_not_found = |v: Option<String>| Some(v.unwrap_or_else(|| NOT_FOUND.to_string()));
        task.mem_used = or_not_found(usage.mem_used);
        task.wall_used = or_not_found(usage.walltime);
        task.job_node = or_not_found(usage.node);
    }

    /// Apply a RERUN / REPROC request and drop the stale completion sentinel.
    fn restart(&self, task: &mut Task) -> Result<bool> {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        if !restart_on_request(task, self.store.as_ref(), &self.config.task, &stamp)? {
            return Ok(false);
        }
        let sentinel = self.config.sentinel_path(&task.label);
        if self.fs.exists(&sentinel) {
            self.fs.remove_file(&sentinel)?;
        }
        self.store.save(task)?;
        Ok(true)
    }
}
