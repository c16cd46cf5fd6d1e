// src/types.rs

//! Small shared vocabulary types used across the scheduler.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of an artefact inside a scope.
///
/// - `Scan`: primary acquired data, produced outside the scheduler.
/// - `Assessor`: derived data, produced by a processor run (i.e. a task).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtefactKind {
    Scan,
    Assessor,
}

impl FromStr for ArtefactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "scan" => Ok(ArtefactKind::Scan),
            "assessor" => Ok(ArtefactKind::Assessor),
            other => Err(format!(
                "invalid artefact kind: {other} (expected \"scan\" or \"assessor\")"
            )),
        }
    }
}

impl fmt::Display for ArtefactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtefactKind::Scan => write!(f, "scan"),
            ArtefactKind::Assessor => write!(f, "assessor"),
        }
    }
}

/// Level at which a processor produces tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorLevel {
    /// One task set per session (the common case).
    #[default]
    Session,
    /// One task set per subject, pooling artefacts from all sessions.
    Subject,
}

impl FromStr for ProcessorLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "session" => Ok(ProcessorLevel::Session),
            "subject" => Ok(ProcessorLevel::Subject),
            other => Err(format!(
                "invalid processor level: {other} (expected \"session\" or \"subject\")"
            )),
        }
    }
}

/// The three scheduler phases. Each one is guarded by its own advisory lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Build,
    Launch,
    Update,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Build => "build",
            Phase::Launch => "launch",
            Phase::Update => "update",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position in the project hierarchy a task set is computed for.
///
/// Session-level processors get a scope with `session = Some(..)`,
/// subject-level processors a scope with `session = None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    pub project: String,
    pub subject: String,
    #[serde(default)]
    pub session: Option<String>,
}

impl Scope {
    pub fn session(
        project: impl Into<String>,
        subject: impl Into<String>,
        session: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            subject: subject.into(),
            session: Some(session.into()),
        }
    }

    pub fn subject(project: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            subject: subject.into(),
            session: None,
        }
    }

    /// Label segment used in task labels; subject scopes use `_subject`.
    pub fn session_label(&self) -> &str {
        self.session.as_deref().unwrap_or("_subject")
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.session {
            Some(session) => write!(f, "{}/{}/{}", self.project, self.subject, session),
            None => write!(f, "{}/{}", self.project, self.subject),
        }
    }
}
