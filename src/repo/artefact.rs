// src/repo/artefact.rs

//! Artefacts and the per-scope pool the matcher works on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::task::status::{ProcStatus, QcStatus};
use crate::types::ArtefactKind;

pub type ArtefactId = String;

/// Lifecycle state of the task behind an assessor artefact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamStatus {
    pub proc_status: ProcStatus,
    pub qc_status: QcStatus,
}

/// One scan or derived result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artefact {
    pub id: ArtefactId,
    pub kind: ArtefactKind,
    #[serde(rename = "type")]
    pub artefact_type: String,
    #[serde(default = "default_usable")]
    pub usable: bool,
    /// Resource name to the file names it contains.
    #[serde(default)]
    pub resources: BTreeMap<String, Vec<String>>,
    /// Owning session; `None` for subject-level artefacts.
    #[serde(default)]
    pub session: Option<String>,
    /// Directory holding the resources, used to materialise commands.
    #[serde(default)]
    pub location: Option<String>,
    /// Nested attributes compared by `slot/field` match filters.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Present only on task-bearing assessors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<UpstreamStatus>,
}

fn default_usable() -> bool {
    true
}

impl Artefact {
    pub fn new(id: impl Into<String>, kind: ArtefactKind, artefact_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            artefact_type: artefact_type.into(),
            usable: true,
            resources: BTreeMap::new(),
            session: None,
            location: None,
            fields: BTreeMap::new(),
            status: None,
        }
    }

    pub fn has_resource(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    pub fn resource_files(&self, name: &str) -> &[String] {
        self.resources.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Path of a resource: `<location>/<resource>`, or `<id>/<resource>`
    /// when the artefact has no location.
    pub fn resource_path(&self, name: &str) -> String {
        let root = self.location.as_deref().unwrap_or(&self.id);
        format!("{}/{}", root.trim_end_matches('/'), name)
    }
}

/// Artefacts visible to one matching run, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ArtefactPool {
    artefacts: Vec<Artefact>,
    index: BTreeMap<ArtefactId, usize>,
}

impl ArtefactPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an artefact; a later artefact with the same id replaces the earlier one.
    pub fn insert(&mut self, artefact: Artefact) {
        match self.index.get(&artefact.id) {
            Some(&pos) => self.artefacts[pos] = artefact,
            None => {
                self.index.insert(artefact.id.clone(), self.artefacts.len());
                self.artefacts.push(artefact);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Artefact> {
        self.index.get(id).map(|&pos| &self.artefacts[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artefact> {
        self.artefacts.iter()
    }

    pub fn len(&self) -> usize {
        self.artefacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artefacts.is_empty()
    }
}

impl FromIterator<Artefact> for ArtefactPool {
    fn from_iter<I: IntoIterator<Item = Artefact>>(iter: I) -> Self {
        let mut pool = ArtefactPool::new();
        for artefact in iter {
            pool.insert(artefact);
        }
        pool
    }
}
