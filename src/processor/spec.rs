// src/processor/spec.rs

//! Processor specification: raw TOML model plus the validated form.
//!
//! ```toml
//! name = "fs_recon"
//! version = "2.1.0"
//! level = "session"
//! command = "recon.sh --t1 {t1} --out {outdir}"
//!
//! [requirements]
//! walltime = "08:00:00"
//! memory_mb = 8192
//!
//! [[inputs]]
//! name = "t1"
//! kind = "scan"
//! types = ["T1*", "MPRAGE"]
//! needs_qc = true
//! select = "first"
//! resources = [{ name = "NIFTI", filter = "*.nii.gz" }]
//!
//! [[filters]]
//! match = ["t1", "mask/t1"]
//! ```

use std::path::PathBuf;

use globset::{GlobMatcher, GlobSet};
use serde::Deserialize;

use crate::processor::selection::SelectionPolicy;
use crate::types::{ArtefactKind, ProcessorLevel, Scope};

#[derive(Debug, Clone, Deserialize)]
pub struct RawProcessorSpec {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub level: ProcessorLevel,
    pub command: String,
    #[serde(default)]
    pub requirements: Requirements,
    #[serde(default)]
    pub containers: Vec<ContainerRef>,
    #[serde(default)]
    pub inputs: Vec<RawInputSlot>,
    #[serde(default)]
    pub filters: Vec<RawMatchFilter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInputSlot {
    pub name: String,
    pub kind: ArtefactKind,
    pub types: Vec<String>,
    #[serde(default)]
    pub resources: Vec<RawResource>,
    #[serde(default)]
    pub needs_qc: bool,
    #[serde(default)]
    pub skip_unusable: bool,
    /// `all` (default), `first`, `last` or `nth(k)`.
    #[serde(default)]
    pub select: Option<String>,
    /// `source` or `single`.
    #[serde(default)]
    pub iterate: Option<String>,
    /// Name of the iteration source this slot is zipped with.
    #[serde(default)]
    pub map_to: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawResource {
    pub name: String,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default = "default_required")]
    pub required: bool,
    /// Command placeholder bound to this resource's path.
    #[serde(default)]
    pub varname: Option<String>,
}

fn default_required() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMatchFilter {
    #[serde(rename = "match")]
    pub inputs: Vec<String>,
}

/// Declared job resources; taken as given, never estimated.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Requirements {
    pub walltime: String,
    pub memory_mb: u64,
    pub ppn: u32,
}

impl Default for Requirements {
    fn default() -> Self {
        Self {
            walltime: "01:00:00".to_string(),
            memory_mb: 2048,
            ppn: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContainerRef {
    pub name: String,
    pub path: String,
}

/// How a slot takes part in the parameter matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Iteration {
    /// Drives combinatorial expansion.
    Source,
    /// Zipped one-to-one (modulo) with the named source slot.
    MappedTo(String),
    /// Attached unchanged to every row.
    Single,
}

#[derive(Debug, Clone)]
pub struct ResourceFilter {
    pub name: String,
    pub pattern: Option<String>,
    pub matcher: Option<GlobMatcher>,
    pub required: bool,
    pub varname: Option<String>,
}

impl ResourceFilter {
    pub fn matches_file(&self, file: &str) -> bool {
        self.matcher.as_ref().is_none_or(|m| m.is_match(file))
    }
}

#[derive(Debug, Clone)]
pub struct InputSlot {
    pub name: String,
    pub kind: ArtefactKind,
    pub type_patterns: Vec<String>,
    pub type_matcher: GlobSet,
    pub resources: Vec<ResourceFilter>,
    pub needs_qc: bool,
    pub skip_unusable: bool,
    pub selection: SelectionPolicy,
    pub iteration: Iteration,
    pub optional: bool,
}

impl InputSlot {
    pub fn matches_type(&self, artefact_type: &str) -> bool {
        self.type_matcher.is_match(artefact_type)
    }

    pub fn is_source(&self) -> bool {
        self.iteration == Iteration::Source
    }
}

/// One operand of a match filter: a slot, optionally narrowed to a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterTerm {
    pub slot: String,
    pub field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchFilter {
    pub terms: Vec<FilterTerm>,
}

/// Validated, immutable processor definition shared by both levels.
#[derive(Debug, Clone)]
pub struct SpecDefinition {
    pub name: String,
    pub version: String,
    /// `<name>_v<major>`.
    pub proctype: String,
    pub command: String,
    pub requirements: Requirements,
    pub containers: Vec<ContainerRef>,
    pub slots: Vec<InputSlot>,
    pub filters: Vec<MatchFilter>,
    pub source: Option<PathBuf>,
}

impl SpecDefinition {
    pub fn slot(&self, name: &str) -> Option<&InputSlot> {
        self.slots.iter().find(|s| s.name == name)
    }

    /// Assessor types this processor consumes.
    pub fn assessor_inputs(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .slots
            .iter()
            .filter(|s| s.kind == ArtefactKind::Assessor)
            .flat_map(|s| s.type_patterns.iter().cloned())
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

/// Behaviour common to every processor variant.
pub trait ProcessorSpec: Send + Sync {
    fn definition(&self) -> &SpecDefinition;

    fn level(&self) -> ProcessorLevel;

    /// Scopes this processor produces tasks for within one subject.
    fn scopes(&self, project: &str, subject: &str, sessions: &[String]) -> Vec<Scope>;

    /// Sessions whose artefacts are visible when matching `scope`.
    fn pool_sessions(&self, scope: &Scope, sessions: &[String]) -> Vec<String>;

    fn proctype(&self) -> &str {
        &self.definition().proctype
    }

    fn procversion(&self) -> &str {
        &self.definition().version
    }
}

/// Runs once per session on that session's artefacts.
#[derive(Debug, Clone)]
pub struct SessionProcessor {
    def: SpecDefinition,
}

impl SessionProcessor {
    pub fn new(def: SpecDefinition) -> Self {
        Self { def }
    }

    pub(crate) fn definition_mut(&mut self) -> &mut SpecDefinition {
        &mut self.def
    }
}

impl ProcessorSpec for SessionProcessor {
    fn definition(&self) -> &SpecDefinition {
        &self.def
    }

    fn level(&self) -> ProcessorLevel {
        ProcessorLevel::Session
    }

    fn scopes(&self, project: &str, subject: &str, sessions: &[String]) -> Vec<Scope> {
        sessions
            .iter()
            .map(|s| Scope::session(project, subject, s.as_str()))
            .collect()
    }

    fn pool_sessions(&self, scope: &Scope, _sessions: &[String]) -> Vec<String> {
        scope.session.iter().cloned().collect()
    }
}

/// Runs once per subject, pooling artefacts across all its sessions.
#[derive(Debug, Clone)]
pub struct SubjectProcessor {
    def: SpecDefinition,
}

impl SubjectProcessor {
    pub fn new(def: SpecDefinition) -> Self {
        Self { def }
    }

    pub(crate) fn definition_mut(&mut self) -> &mut SpecDefinition {
        &mut self.def
    }
}

impl ProcessorSpec for SubjectProcessor {
    fn definition(&self) -> &SpecDefinition {
        &self.def
    }

    fn level(&self) -> ProcessorLevel {
        ProcessorLevel::Subject
    }

    fn scopes(&self, project: &str, subject: &str, _sessions: &[String]) -> Vec<Scope> {
        vec![Scope::subject(project, subject)]
    }

    fn pool_sessions(&self, _scope: &Scope, sessions: &[String]) -> Vec<String> {
        sessions.to_vec()
    }
}

/// Closed set of processor variants.
#[derive(Debug, Clone)]
pub enum Processor {
    Session(SessionProcessor),
    Subject(SubjectProcessor),
}

impl Processor {
    pub fn from_definition(level: ProcessorLevel, def: SpecDefinition) -> Self {
        match level {
            ProcessorLevel::Session => Processor::Session(SessionProcessor::new(def)),
            ProcessorLevel::Subject => Processor::Subject(SubjectProcessor::new(def)),
        }
    }

    fn inner(&self) -> &dyn ProcessorSpec {
        match self {
            Processor::Session(p) => p,
            Processor::Subject(p) => p,
        }
    }
}

impl ProcessorSpec for Processor {
    fn definition(&self) -> &SpecDefinition {
        self.inner().definition()
    }

    fn level(&self) -> ProcessorLevel {
        self.inner().level()
    }

    fn scopes(&self, project: &str, subject: &str, sessions: &[String]) -> Vec<Scope> {
        self.inner().scopes(project, subject, sessions)
    }

    fn pool_sessions(&self, scope: &Scope, sessions: &[String]) -> Vec<String> {
        self.inner().pool_sessions(scope, sessions)
    }
}
