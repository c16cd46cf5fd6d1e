// src/task/status.rs

//! The two orthogonal status axes of a task.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Execution lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcStatus {
    /// A required input is structurally impossible for this scope. Dead end.
    NoData,
    /// Inputs exist but are not ready yet; re-evaluated every build cycle.
    NeedInputs,
    NeedToRun,
    JobRunning,
    /// The job left the batch system and wrote its completion sentinel.
    ReadyToComplete,
    Complete,
    JobFailed,
}

impl ProcStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcStatus::NoData => "NO_DATA",
            ProcStatus::NeedInputs => "NEED_INPUTS",
            ProcStatus::NeedToRun => "NEED_TO_RUN",
            ProcStatus::JobRunning => "JOB_RUNNING",
            ProcStatus::ReadyToComplete => "READY_TO_COMPLETE",
            ProcStatus::Complete => "COMPLETE",
            ProcStatus::JobFailed => "JOB_FAILED",
        }
    }

    /// Work is queued, in flight, or awaiting completion.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            ProcStatus::NeedToRun
                | ProcStatus::JobRunning
                | ProcStatus::ReadyToComplete
                | ProcStatus::JobFailed
        )
    }

    /// States an operator RERUN/REPROC can restart from.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcStatus::Complete | ProcStatus::JobFailed)
    }
}

impl fmt::Display for ProcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace(' ', "_").as_str() {
            "NO_DATA" => Ok(ProcStatus::NoData),
            "NEED_INPUTS" => Ok(ProcStatus::NeedInputs),
            "NEED_TO_RUN" => Ok(ProcStatus::NeedToRun),
            "JOB_RUNNING" => Ok(ProcStatus::JobRunning),
            "READY_TO_COMPLETE" => Ok(ProcStatus::ReadyToComplete),
            "COMPLETE" => Ok(ProcStatus::Complete),
            "JOB_FAILED" => Ok(ProcStatus::JobFailed),
            other => Err(format!("invalid procStatus: {other}")),
        }
    }
}

/// Human quality-review axis.
///
/// Besides the known values a free-text note can be stored, which is how
/// readiness reasons ("Not Ready: ...") are surfaced to operators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum QcStatus {
    JobPending,
    NeedsQa,
    Passed,
    Failed,
    Bad,
    Poor,
    DoNotRun,
    Rerun,
    Reproc,
    Note(String),
}

impl QcStatus {
    /// Review outcomes that make an artefact unusable downstream.
    pub fn is_bad(&self) -> bool {
        matches!(
            self,
            QcStatus::Failed | QcStatus::Bad | QcStatus::Poor | QcStatus::DoNotRun
        )
    }

    /// Operator asked for the task to be run again.
    pub fn is_restart_request(&self) -> bool {
        matches!(self, QcStatus::Rerun | QcStatus::Reproc)
    }

    /// Downstream consumers must wait while the upstream qc is in one of these.
    pub fn blocks_downstream(&self) -> bool {
        matches!(self, QcStatus::JobPending | QcStatus::Rerun | QcStatus::Reproc)
    }
}

impl fmt::Display for QcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QcStatus::JobPending => "JOB_PENDING",
            QcStatus::NeedsQa => "NEEDS_QA",
            QcStatus::Passed => "PASSED",
            QcStatus::Failed => "FAILED",
            QcStatus::Bad => "BAD",
            QcStatus::Poor => "POOR",
            QcStatus::DoNotRun => "DO_NOT_RUN",
            QcStatus::Rerun => "RERUN",
            QcStatus::Reproc => "REPROC",
            QcStatus::Note(note) => note.as_str(),
        };
        f.write_str(s)
    }
}

impl From<String> for QcStatus {
    fn from(s: String) -> Self {
        match s.trim().to_uppercase().replace(' ', "_").as_str() {
            "JOB_PENDING" => QcStatus::JobPending,
            "NEEDS_QA" => QcStatus::NeedsQa,
            "PASSED" => QcStatus::Passed,
            "FAILED" => QcStatus::Failed,
            "BAD" => QcStatus::Bad,
            "POOR" => QcStatus::Poor,
            "DO_NOT_RUN" => QcStatus::DoNotRun,
            "RERUN" => QcStatus::Rerun,
            "REPROC" => QcStatus::Reproc,
            _ => QcStatus::Note(s),
        }
    }
}

impl From<QcStatus> for String {
    fn from(status: QcStatus) -> Self {
        status.to_string()
    }
}

impl FromStr for QcStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(QcStatus::from(s.to_string()))
    }
}
