// src/engine/launch.rs

//! Launch phase: submit `NEED_TO_RUN` tasks while the batch system has
//! capacity.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::batch::{build_job_script, JobCounts, JobScript};
use crate::errors::{Result, SchedError};
use crate::processor::ProcessorSpec;
use crate::task::{ProcStatus, Task};
use crate::types::Phase;

use super::runtime::Engine;
use super::{PhaseReport, ScopeFilter};

/// Result of preparing one candidate.
enum Prepared {
    Ready(Box<Task>, JobScript),
    Skip(&'static str),
}

impl Engine {
    /// `NEED_TO_RUN` tasks in launch order: tasks of priority projects
    /// first (in list order), then the rest by label.
    pub fn launch_candidates(&self, filter: &ScopeFilter) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .store
            .all_tasks()?
            .into_iter()
            .filter(|t| t.proc_status == ProcStatus::NeedToRun && filter.admits(&t.scope))
            .collect();

        let priorities = &self.config.build.priority_projects;
        let rank = |t: &Task| {
            priorities
                .iter()
                .position(|p| *p == t.scope.project)
                .unwrap_or(priorities.len())
        };
        tasks.sort_by(|a, b| rank(a).cmp(&rank(b)).then_with(|| a.label.cmp(&b.label)));
        Ok(tasks)
    }

    /// First ceiling reached by `counts`, if any.
    pub fn capacity_reached(&self, counts: &JobCounts) -> Option<&'static str> {
        let limits = &self.config.limits;
        if counts.running >= limits.max_running {
            Some("max_running")
        } else if counts.pending >= limits.max_pending {
            Some("max_pending")
        } else if counts.pending_uploads >= limits.max_pending_uploads {
            Some("max_pending_uploads")
        } else {
            None
        }
    }

    pub(super) async fn launch_pass(&self, filter: &ScopeFilter, dry_run: bool) -> Result<PhaseReport> {
        let mut report = PhaseReport::new(Phase::Launch);
        let candidates = self.launch_candidates(filter)?;
        info!(candidates = candidates.len(), dry_run, "launch candidates selected");

        let delay = Duration::from_millis(self.config.limits.submit_delay_ms);
        let mut submitted_any = false;

        for candidate in candidates {
            let _gate = self.launch_gate.lock().await;

            if !dry_run {
                let counts = match self.batch.count_jobs().await {
                    Ok(counts) => counts,
                    Err(e) => {
                        error!(error = %e, "cannot read batch capacity; stopping launch pass");
                        report.aborted = Some(format!("capacity check failed: {e}"));
                        break;
                    }
                };
                if let Some(limit) = self.capacity_reached(&counts) {
                    info!(
                        limit,
                        running = counts.running,
                        pending = counts.pending,
                        pending_uploads = counts.pending_uploads,
                        "capacity ceiling reached; stopping launch pass"
                    );
                    break;
                }
            }

            let (mut task, script) = match self.prepare_launch(&candidate) {
                Ok(Prepared::Ready(task, script)) => (*task, script),
                Ok(Prepared::Skip(reason)) => {
                    info!(task = %candidate.label, reason, "task not launched");
                    report.scope_mut(&candidate.scope).skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(task = %candidate.label, error = %e, "cannot prepare job");
                    report.scope_mut(&candidate.scope).errors += 1;
                    continue;
                }
            };

            if dry_run {
                info!(task = %task.label, script = %script.path.display(), "dry run: job script written");
                report.scope_mut(&task.scope).launched += 1;
                continue;
            }

            if submitted_any && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            // Fail fast: a partially recorded launch risks double submission.
            if let Err(e) = self.submit_task(&mut task, &script).await {
                error!(task = %task.label, error = %e, "submission failed; stopping launch pass");
                report.scope_mut(&task.scope).errors += 1;
                report.aborted = Some(e.to_string());
                break;
            }
            submitted_any = true;
            report.scope_mut(&task.scope).launched += 1;
        }

        Ok(report)
    }

    /// Re-read the record, check the completion sentinel, and write the
    /// job script.
    fn prepare_launch(&self, candidate: &Task) -> Result<Prepared> {
        let Some(task) = self.store.get(&candidate.key())? else {
            return Ok(Prepared::Skip("task record vanished"));
        };
        if task.proc_status != ProcStatus::NeedToRun {
            return Ok(Prepared::Skip("status changed since selection"));
        }
        if self.fs.exists(&self.config.sentinel_path(&task.label)) {
            warn!(task = %task.label, "completion sentinel already present");
            return Ok(Prepared::Skip("job output already present"));
        }
        let Some(processor) = self.processor(&task.proctype) else {
            return Ok(Prepared::Skip("no processor loaded for proctype"));
        };
        let Some(params) = task.parameters() else {
            return Ok(Prepared::Skip("unparsable fingerprint"));
        };

        let sessions = self.repo.sessions(&task.scope.project, &task.scope.subject)?;
        let pool = self.scope_pool(processor, &task.scope, &sessions)?;
        let script = build_job_script(&self.config, &task, processor.definition(), &params, &pool)?;

        self.fs.create_dir_all(&self.config.paths.jobs_dir)?;
        self.fs.write(&script.path, script.text.as_bytes())?;
        debug!(task = %task.label, script = %script.path.display(), "job script written");
        Ok(Prepared::Ready(Box::new(task), script))
    }

    async fn submit_task(&self, task: &mut Task, script: &JobScript) -> Result<()> {
        let job_id = self.batch.submit(script).await?;
        task.job_id = Some(job_id.clone());
        task.job_start_date = Some(chrono::Local::now().date_naive());
        task.transition(ProcStatus::JobRunning)?;
        self.store.save(task).map_err(|e| SchedError::SubmissionFailed {
            task: task.label.clone(),
            reason: format!("job {job_id} submitted but the task record was not saved: {e}"),
        })?;
        info!(scope = %task.scope, task = %task.label, job_id = %job_id, "task launched");
        Ok(())
    }
}
