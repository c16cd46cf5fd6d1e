// src/task/lifecycle.rs

//! procStatus state machine.
//!
//! ```text
//! NEED_INPUTS -> NEED_TO_RUN | NO_DATA
//! NEED_TO_RUN -> JOB_RUNNING -> READY_TO_COMPLETE -> COMPLETE
//!                           \-> JOB_FAILED
//! COMPLETE | JOB_FAILED --(qc RERUN / REPROC)--> NEED_TO_RUN
//! ```

use tracing::info;

use crate::config::TaskSection;
use crate::errors::{Result, SchedError};
use crate::task::model::Task;
use crate::task::status::{ProcStatus, QcStatus};
use crate::task::store::TaskStore;

/// Forward edges. The operator back-edge goes through [`restart_on_request`].
pub fn can_transition(from: ProcStatus, to: ProcStatus) -> bool {
    use ProcStatus::*;
    matches!(
        (from, to),
        (NeedInputs, NeedToRun)
            | (NeedInputs, NoData)
            | (NeedToRun, JobRunning)
            | (JobRunning, ReadyToComplete)
            | (JobRunning, JobFailed)
            | (ReadyToComplete, Complete)
    )
}

impl Task {
    /// Move procStatus along a forward edge.
    ///
    /// Entering `JOB_RUNNING` sets qc to `JOB_PENDING`; entering `COMPLETE`
    /// always sets qc to `NEEDS_QA`.
    pub fn transition(&mut self, to: ProcStatus) -> Result<()> {
        if self.proc_status == to {
            return Ok(());
        }
        if !can_transition(self.proc_status, to) {
            return Err(SchedError::InvalidTransition {
                task: self.label.clone(),
                from: self.proc_status.to_string(),
                to: to.to_string(),
            });
        }
        self.proc_status = to;
        match to {
            ProcStatus::JobRunning => self.qc_status = QcStatus::JobPending,
            ProcStatus::Complete => self.qc_status = QcStatus::NeedsQa,
            _ => {}
        }
        Ok(())
    }
}

/// Apply an operator RERUN / REPROC request on a terminal task.
///
/// Non-exempt outputs are purged (REPROC archives them first under
/// `<archive resource>/<stamp>/`), job bookkeeping is cleared, and the task
/// returns to `NEED_TO_RUN` with qc `JOB_PENDING`. Returns `Ok(false)` when
/// the task is not eligible.
pub fn restart_on_request(
    task: &mut Task,
    store: &dyn TaskStore,
    settings: &TaskSection,
    stamp: &str,
) -> Result<bool> {
    if !task.proc_status.is_terminal() || !task.qc_status.is_restart_request() {
        return Ok(false);
    }
    let exempt = |r: &str| settings.exempt_resources.iter().any(|e| e == r);

    let purge: Vec<String> = store
        .outputs(task)?
        .into_keys()
        .filter(|r| !exempt(r))
        .collect();

    if task.qc_status == QcStatus::Reproc && !purge.is_empty() {
        store.archive_outputs(task, &purge, &settings.archive_resource, stamp)?;
    }
    for resource in store.outputs(task)?.into_keys().filter(|r| !exempt(r)) {
        store.remove_output(task, &resource)?;
    }

    let request = task.qc_status.clone();
    task.clear_job();
    task.proc_status = ProcStatus::NeedToRun;
    task.qc_status = QcStatus::JobPending;
    info!(task = %task.label, %request, purged = purge.len(), "task restarted by operator request");
    Ok(true)
}
