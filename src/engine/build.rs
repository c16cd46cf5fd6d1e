// src/engine/build.rs

//! Build phase: match every processor against every admitted scope and
//! create the missing tasks.

use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::processor::{Processor, ProcessorSpec};
use crate::task::{
    evaluate_readiness, initial_statuses, reconcile, ProcStatus, QcStatus, SchedulingOutcome, Task,
};
use crate::types::{Phase, Scope};

use super::runtime::Engine;
use super::{PhaseReport, ScopeFilter, ScopeSummary};

impl Engine {
    pub(super) fn build_pass(&self, filter: &ScopeFilter) -> PhaseReport {
        let mut report = PhaseReport::new(Phase::Build);
        report.cycles = self.cycles.clone();

        let projects = match self.repo.projects() {
            Ok(projects) => projects,
            Err(e) => {
                error!(error = %e, "cannot list projects");
                report.aborted = Some(format!("cannot list projects: {e}"));
                return report;
            }
        };

        for project in projects.iter().filter(|p| filter.admits_project(p)) {
            let subjects = match self.repo.subjects(project) {
                Ok(subjects) => subjects,
                Err(e) => {
                    error!(project = %project, error = %e, "cannot list subjects");
                    continue;
                }
            };
            for subject in subjects.iter() {
                self.build_subject(project, subject, filter, &mut report);
            }
        }
        report
    }

    fn build_subject(&self, project: &str, subject: &str, filter: &ScopeFilter, report: &mut PhaseReport) {
        let sessions = match self.repo.sessions(project, subject) {
            Ok(sessions) => sessions,
            Err(e) => {
                error!(project, subject, error = %e, "cannot list sessions");
                report.scope_mut(&Scope::subject(project, subject)).errors += 1;
                return;
            }
        };

        // Dependency order: upstream tasks created here are visible to the
        // processors that consume them in the same pass.
        for processor in self.processors.iter() {
            for scope in processor.scopes(project, subject, &sessions) {
                if !filter.admits(&scope) {
                    continue;
                }
                match self.build_scope(processor, &scope, &sessions) {
                    Ok(summary) => {
                        let entry = report.scope_mut(&scope);
                        entry.created += summary.created;
                        entry.unchanged += summary.unchanged;
                        entry.reevaluated += summary.reevaluated;
                        entry.skipped += summary.skipped;
                    }
                    Err(e) => {
                        error!(scope = %scope, proctype = %processor.proctype(), error = %e, "build failed for scope");
                        report.scope_mut(&scope).errors += 1;
                    }
                }
            }
        }
    }

    /// Match, reconcile, create, then re-evaluate waiting tasks.
    pub(super) fn build_scope(&self, processor: &Processor, scope: &Scope, sessions: &[String]) -> Result<ScopeSummary> {
        let def = processor.definition();
        let proctype = processor.proctype();
        let mut summary = ScopeSummary::default();

        let pool = self.scope_pool(processor, scope, sessions)?;
        let sets = self.matcher.match_spec(def, &pool)?;
        let diff = reconcile(self.store.as_ref(), scope, proctype, sets)?;
        summary.unchanged = diff.unchanged.len();
        if diff.ambiguous {
            summary.skipped += 1;
            return Ok(summary);
        }

        for params in diff.to_create.iter() {
            let readiness = evaluate_readiness(def, params, &pool);
            let (proc_status, qc_status) = initial_statuses(&readiness);
            let task = Task::new(
                scope.clone(),
                proctype,
                processor.procversion(),
                params,
                proc_status,
                qc_status,
            );
            self.store.create(&task)?;
            info!(scope = %scope, proctype, task = %task.label, status = %task.proc_status, "task created");
            summary.created += 1;
        }

        for mut task in self.store.tasks_for(scope, proctype)? {
            if task.proc_status != ProcStatus::NeedInputs {
                continue;
            }
            let Some(params) = task.parameters() else {
                warn!(task = %task.label, "cannot re-evaluate task without parameters");
                continue;
            };
            let changed = match evaluate_readiness(def, &params, &pool) {
                Ok(()) => {
                    task.transition(ProcStatus::NeedToRun)?;
                    task.qc_status = QcStatus::JobPending;
                    true
                }
                Err(SchedulingOutcome::NoData(reason)) => {
                    task.transition(ProcStatus::NoData)?;
                    task.qc_status = QcStatus::Note(reason);
                    true
                }
                Err(SchedulingOutcome::NeedInputs(reason)) => {
                    let note = QcStatus::Note(reason);
                    if task.qc_status == note {
                        false
                    } else {
                        task.qc_status = note;
                        true
                    }
                }
            };
            if changed {
                self.store.save(&task)?;
                debug!(task = %task.label, status = %task.proc_status, qc = %task.qc_status, "readiness re-evaluated");
                summary.reevaluated += 1;
            }
        }

        Ok(summary)
    }
}
