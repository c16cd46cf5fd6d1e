// src/task/model.rs

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::matcher::{Fingerprint, ParameterSet};
use crate::repo::{Artefact, UpstreamStatus};
use crate::task::status::{ProcStatus, QcStatus};
use crate::types::{ArtefactKind, Scope};

/// Store key: exactly one task per (scope, proctype, fingerprint).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub scope: Scope,
    pub proctype: String,
    pub fingerprint: Fingerprint,
}

/// Persisted unit of work for one parameter set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub label: String,
    pub scope: Scope,
    pub proctype: String,
    pub procversion: String,
    pub fingerprint: Fingerprint,
    pub proc_status: ProcStatus,
    pub qc_status: QcStatus,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub job_node: Option<String>,
    #[serde(default)]
    pub mem_used: Option<String>,
    #[serde(default)]
    pub wall_used: Option<String>,
    #[serde(default)]
    pub job_start_date: Option<NaiveDate>,
    pub created_date: NaiveDate,
}

impl Task {
    pub fn new(
        scope: Scope,
        proctype: impl Into<String>,
        procversion: impl Into<String>,
        params: &ParameterSet,
        proc_status: ProcStatus,
        qc_status: QcStatus,
    ) -> Self {
        let proctype = proctype.into();
        let fingerprint = params.fingerprint();
        let label = Task::label_for(&scope, &proctype, &fingerprint);
        Self {
            label,
            scope,
            proctype,
            procversion: procversion.into(),
            fingerprint,
            proc_status,
            qc_status,
            job_id: None,
            job_node: None,
            mem_used: None,
            wall_used: None,
            job_start_date: None,
            created_date: chrono::Local::now().date_naive(),
        }
    }

    /// `<project>-x-<subject>-x-<session>-x-<proctype>-x-<digest8>`.
    pub fn label_for(scope: &Scope, proctype: &str, fingerprint: &Fingerprint) -> String {
        format!(
            "{}-x-{}-x-{}-x-{}-x-{}",
            scope.project,
            scope.subject,
            scope.session_label(),
            proctype,
            fingerprint.short_digest()
        )
    }

    pub fn key(&self) -> TaskKey {
        TaskKey {
            scope: self.scope.clone(),
            proctype: self.proctype.clone(),
            fingerprint: self.fingerprint.clone(),
        }
    }

    pub fn parameters(&self) -> Option<ParameterSet> {
        self.fingerprint.parse()
    }

    /// Forget everything about the previous job.
    pub fn clear_job(&mut self) {
        self.job_id = None;
        self.job_node = None;
        self.mem_used = None;
        self.wall_used = None;
        self.job_start_date = None;
    }

    /// View of this task as an assessor artefact for downstream matching.
    ///
    /// Usable unless its qc is a bad status; resources are the outputs
    /// currently present; fields are the task's own input bindings.
    pub fn as_artefact(&self, outputs: &BTreeMap<String, Vec<String>>, location: Option<String>) -> Artefact {
        let mut artefact = Artefact::new(self.label.clone(), ArtefactKind::Assessor, self.proctype.clone());
        artefact.usable = !self.qc_status.is_bad();
        artefact.resources = outputs.clone();
        artefact.session = self.scope.session.clone();
        artefact.location = location;
        if let Some(params) = self.parameters() {
            for (slot, binding) in params.iter() {
                let ids = binding.ids();
                if !ids.is_empty() {
                    artefact.fields.insert(slot.clone(), ids.join(","));
                }
            }
        }
        artefact.status = Some(UpstreamStatus {
            proc_status: self.proc_status,
            qc_status: self.qc_status.clone(),
        });
        artefact
    }
}
