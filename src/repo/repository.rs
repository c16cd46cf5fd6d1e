// src/repo/repository.rs

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::errors::{Result, SchedError};
use crate::fs::FileSystem;
use crate::repo::artefact::Artefact;

/// Read side of the artefact repository.
///
/// Task-bearing assessors are not served from here; the build phase merges
/// them in from the task store.
pub trait ArtefactRepository: Send + Sync {
    fn projects(&self) -> Result<Vec<String>>;
    fn subjects(&self, project: &str) -> Result<Vec<String>>;
    fn sessions(&self, project: &str, subject: &str) -> Result<Vec<String>>;
    fn artefacts(&self, project: &str, subject: &str, session: &str) -> Result<Vec<Artefact>>;
}

type SessionMap = BTreeMap<String, Vec<Artefact>>;
type SubjectMap = BTreeMap<String, SessionMap>;

/// JSON snapshot layout: `{ "projects": { P: { SUBJ: { SESS: [artefact, ...] } } } }`.
#[derive(Debug, Default, Deserialize)]
struct Snapshot {
    #[serde(default)]
    projects: BTreeMap<String, SubjectMap>,
}

/// Repository held fully in memory, optionally loaded from a JSON snapshot.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    projects: BTreeMap<String, SubjectMap>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_str(text)?;
        let mut repo = Self::new();
        for (project, subjects) in snapshot.projects {
            for (subject, sessions) in subjects {
                for (session, artefacts) in sessions {
                    repo.add_session(&project, &subject, &session);
                    for artefact in artefacts {
                        repo.add_artefact(&project, &subject, &session, artefact);
                    }
                }
            }
        }
        Ok(repo)
    }

    pub fn load_snapshot(fs: &Arc<dyn FileSystem>, path: &Path) -> Result<Self> {
        let text = fs.read_to_string(path).map_err(|e| {
            SchedError::RepositoryError(format!("reading snapshot {}: {e:#}", path.display()))
        })?;
        Self::from_json(&text)
    }

    pub fn add_session(&mut self, project: &str, subject: &str, session: &str) {
        self.projects
            .entry(project.to_string())
            .or_default()
            .entry(subject.to_string())
            .or_default()
            .entry(session.to_string())
            .or_default();
    }

    /// Add an artefact under a session, stamping the owning session on it.
    pub fn add_artefact(&mut self, project: &str, subject: &str, session: &str, mut artefact: Artefact) {
        artefact.session = Some(session.to_string());
        self.projects
            .entry(project.to_string())
            .or_default()
            .entry(subject.to_string())
            .or_default()
            .entry(session.to_string())
            .or_default()
            .push(artefact);
    }

    fn subject_map(&self, project: &str, subject: &str) -> Result<&SessionMap> {
        self.projects
            .get(project)
            .and_then(|subjects| subjects.get(subject))
            .ok_or_else(|| {
                SchedError::RepositoryError(format!("unknown subject {project}/{subject}"))
            })
    }
}

impl ArtefactRepository for MemoryRepository {
    fn projects(&self) -> Result<Vec<String>> {
        Ok(self.projects.keys().cloned().collect())
    }

    fn subjects(&self, project: &str) -> Result<Vec<String>> {
        self.projects
            .get(project)
            .map(|subjects| subjects.keys().cloned().collect())
            .ok_or_else(|| SchedError::RepositoryError(format!("unknown project {project}")))
    }

    fn sessions(&self, project: &str, subject: &str) -> Result<Vec<String>> {
        Ok(self.subject_map(project, subject)?.keys().cloned().collect())
    }

    fn artefacts(&self, project: &str, subject: &str, session: &str) -> Result<Vec<Artefact>> {
        self.subject_map(project, subject)?
            .get(session)
            .cloned()
            .ok_or_else(|| {
                SchedError::RepositoryError(format!(
                    "unknown session {project}/{subject}/{session}"
                ))
            })
    }
}
