// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::batch::BatchScheduler;
use crate::config::Config;
use crate::dag::order;
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::matcher::Matcher;
use crate::processor::{Processor, ProcessorSpec};
use crate::repo::{ArtefactPool, ArtefactRepository};
use crate::task::TaskStore;
use crate::types::{Phase, Scope};

use super::lock::PhaseLock;
use super::{PhaseReport, ScopeFilter};

/// Owns the collaborators shared by the three phases.
///
/// Processors are kept in dependency order so that, within one build pass,
/// upstream tasks exist before their consumers are matched.
pub struct Engine {
    pub(super) config: Arc<Config>,
    pub(super) processors: Vec<Processor>,
    pub(super) cycles: Vec<Vec<String>>,
    pub(super) repo: Arc<dyn ArtefactRepository>,
    pub(super) store: Arc<dyn TaskStore>,
    pub(super) batch: Arc<dyn BatchScheduler>,
    pub(super) fs: Arc<dyn FileSystem>,
    pub(super) matcher: Matcher,
    /// Serialises "check capacity, then submit" within this process.
    pub(super) launch_gate: Mutex<()>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("processors", &self.processor_names())
            .field("cycles", &self.cycles)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(
        config: Arc<Config>,
        processors: Vec<Processor>,
        repo: Arc<dyn ArtefactRepository>,
        store: Arc<dyn TaskStore>,
        batch: Arc<dyn BatchScheduler>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        let ordered = order(processors);
        info!(
            processors = ordered.ordered.len(),
            unordered = ordered.leftovers().len(),
            cycles = ordered.cycles.len(),
            "engine initialised"
        );
        Self {
            config,
            processors: ordered.ordered,
            cycles: ordered.cycles,
            repo,
            store,
            batch,
            fs,
            matcher: Matcher::new(),
            launch_gate: Mutex::new(()),
        }
    }

    /// Replace the ordering key used by `first` / `last` / `nth(k)` slots.
    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn processor_names(&self) -> Vec<&str> {
        self.processors.iter().map(|p| p.proctype()).collect()
    }

    pub fn cycles(&self) -> &[Vec<String>] {
        &self.cycles
    }

    pub async fn build(&self, filter: &ScopeFilter) -> Result<PhaseReport> {
        let _lock = self.lock(Phase::Build)?;
        let report = self.build_pass(filter);
        log_report(&report);
        Ok(report)
    }

    /// With `dry_run`, job scripts are written but nothing is submitted.
    pub async fn launch(&self, filter: &ScopeFilter, dry_run: bool) -> Result<PhaseReport> {
        let _lock = self.lock(Phase::Launch)?;
        let report = self.launch_pass(filter, dry_run).await?;
        log_report(&report);
        Ok(report)
    }

    pub async fn update(&self, filter: &ScopeFilter) -> Result<PhaseReport> {
        let _lock = self.lock(Phase::Update)?;
        let report = self.update_pass(filter).await?;
        log_report(&report);
        Ok(report)
    }

    fn lock(&self, phase: Phase) -> Result<PhaseLock> {
        PhaseLock::acquire(
            self.fs.clone(),
            &self.config.paths.lock_dir,
            &self.config.build.lock_prefix,
            phase,
        )
    }

    pub(super) fn processor(&self, proctype: &str) -> Option<&Processor> {
        self.processors.iter().find(|p| p.proctype() == proctype)
    }

    /// Artefacts visible when matching `processor` at `scope`: repository
    /// artefacts of the pooled sessions plus the subject's existing tasks
    /// as assessors.
    pub(super) fn scope_pool(
        &self,
        processor: &Processor,
        scope: &Scope,
        sessions: &[String],
    ) -> Result<ArtefactPool> {
        let pool_sessions = processor.pool_sessions(scope, sessions);
        let mut pool = ArtefactPool::new();

        for session in pool_sessions.iter() {
            for artefact in self.repo.artefacts(&scope.project, &scope.subject, session)? {
                pool.insert(artefact);
            }
        }

        for task in self.store.tasks_in_subject(&scope.project, &scope.subject)? {
            let visible = match &task.scope.session {
                None => true,
                Some(session) => pool_sessions.contains(session),
            };
            if !visible {
                continue;
            }
            let outputs = self.store.outputs(&task)?;
            let location = self.config.results_dir_for(&task.label).display().to_string();
            pool.insert(task.as_artefact(&outputs, Some(location)));
        }

        debug!(scope = %scope, proctype = %processor.proctype(), artefacts = pool.len(), "artefact pool");
        Ok(pool)
    }
}

fn log_report(report: &PhaseReport) {
    let totals = report.totals();
    info!(
        phase = %report.phase,
        scopes = report.scopes.len(),
        created = totals.created,
        launched = totals.launched,
        transitioned = totals.transitioned,
        errors = totals.errors,
        aborted = report.aborted.as_deref().unwrap_or(""),
        "phase finished"
    );
}
