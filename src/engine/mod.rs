// src/engine/mod.rs

//! Phase engine.
//!
//! Each invocation runs exactly one phase:
//! - `build`: match processors against the repository and create tasks
//! - `launch`: submit runnable tasks under capacity backpressure
//! - `update`: poll running jobs and apply operator restart requests
//!
//! Every phase holds its own [`lock::PhaseLock`] for its whole run and
//! returns a [`PhaseReport`] with per-scope counters.

use std::collections::BTreeMap;
use std::fmt;

use crate::types::{Phase, Scope};

pub mod build;
pub mod launch;
pub mod lock;
pub mod runtime;
pub mod update;

pub use lock::{LockOwner, PhaseLock};
pub use runtime::Engine;

/// Value recorded for usage fields the batch system could not report.
pub const NOT_FOUND: &str = "NotFound";

/// Restricts a phase to some projects and sessions; empty lists admit all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeFilter {
    pub projects: Vec<String>,
    pub sessions: Vec<String>,
}

impl ScopeFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn admits_project(&self, project: &str) -> bool {
        self.projects.is_empty() || self.projects.iter().any(|p| p == project)
    }

    /// Subject-level scopes are excluded as soon as a session list is given.
    pub fn admits(&self, scope: &Scope) -> bool {
        if !self.admits_project(&scope.project) {
            return false;
        }
        if self.sessions.is_empty() {
            return true;
        }
        match &scope.session {
            Some(session) => self.sessions.iter().any(|s| s == session),
            None => false,
        }
    }
}

/// Counters for one scope within a phase run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeSummary {
    pub created: usize,
    pub unchanged: usize,
    /// NEED_INPUTS tasks whose readiness changed.
    pub reevaluated: usize,
    pub launched: usize,
    pub transitioned: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl ScopeSummary {
    pub fn is_empty(&self) -> bool {
        *self == ScopeSummary::default()
    }
}

impl fmt::Display for ScopeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created={} unchanged={} reevaluated={} launched={} transitioned={} skipped={} errors={}",
            self.created,
            self.unchanged,
            self.reevaluated,
            self.launched,
            self.transitioned,
            self.skipped,
            self.errors
        )
    }
}

/// Outcome of one phase run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    /// Keyed by the scope's display form (`project/subject[/session]`).
    pub scopes: BTreeMap<String, ScopeSummary>,
    /// Set when the pass stopped early on a fatal condition.
    pub aborted: Option<String>,
    /// Dependency cycles among the loaded processors.
    pub cycles: Vec<Vec<String>>,
}

impl PhaseReport {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            scopes: BTreeMap::new(),
            aborted: None,
            cycles: Vec::new(),
        }
    }

    pub fn scope_mut(&mut self, scope: &Scope) -> &mut ScopeSummary {
        self.scopes.entry(scope.to_string()).or_default()
    }

    pub fn scope(&self, scope: &Scope) -> Option<&ScopeSummary> {
        self.scopes.get(&scope.to_string())
    }

    /// Sum of all scope counters.
    pub fn totals(&self) -> ScopeSummary {
        self.scopes.values().fold(ScopeSummary::default(), |mut acc, s| {
            acc.created += s.created;
            acc.unchanged += s.unchanged;
            acc.reevaluated += s.reevaluated;
            acc.launched += s.launched;
            acc.transitioned += s.transitioned;
            acc.skipped += s.skipped;
            acc.errors += s.errors;
            acc
        })
    }
}
