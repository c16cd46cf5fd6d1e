// src/task/reconcile.rs

use std::collections::BTreeSet;

use tracing::{debug, error};

use crate::errors::{Result, SchedError};
use crate::matcher::{Fingerprint, ParameterSet};
use crate::task::store::TaskStore;
use crate::types::Scope;

/// Difference between the matched parameter sets and the stored tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileDiff {
    /// Fingerprints present both in the store and in the new sets.
    pub unchanged: Vec<Fingerprint>,
    /// New parameter sets, in match order, without duplicates.
    pub to_create: Vec<ParameterSet>,
    /// An existing task had an empty or unparsable fingerprint, or could
    /// not be read; nothing is created for this (proctype, scope).
    pub ambiguous: bool,
}

/// Compare `sets` against the tasks stored for `(scope, proctype)`.
pub fn reconcile(
    store: &dyn TaskStore,
    scope: &Scope,
    proctype: &str,
    sets: Vec<ParameterSet>,
) -> Result<ReconcileDiff> {
    let existing = match store.tasks_for(scope, proctype) {
        Ok(existing) => existing,
        Err(SchedError::StoreError(reason)) => {
            error!(
                scope = %scope,
                proctype = %proctype,
                reason = %reason,
                "existing tasks cannot be read; refusing to create tasks"
            );
            return Ok(ReconcileDiff {
                ambiguous: true,
                ..ReconcileDiff::default()
            });
        }
        Err(e) => return Err(e),
    };

    if let Some(bad) = existing.iter().find(|t| t.parameters().is_none()) {
        error!(
            scope = %scope,
            proctype = %proctype,
            task = %bad.label,
            "existing task has an empty or unparsable fingerprint; refusing to create tasks"
        );
        return Ok(ReconcileDiff {
            ambiguous: true,
            ..ReconcileDiff::default()
        });
    }

    let known: BTreeSet<Fingerprint> = existing.iter().map(|t| t.fingerprint.clone()).collect();
    let mut seen = BTreeSet::new();
    let mut diff = ReconcileDiff::default();
    for set in sets {
        let fp = set.fingerprint();
        if !seen.insert(fp.clone()) {
            continue;
        }
        if known.contains(&fp) {
            diff.unchanged.push(fp);
        } else {
            diff.to_create.push(set);
        }
    }

    debug!(
        scope = %scope,
        proctype = %proctype,
        unchanged = diff.unchanged.len(),
        to_create = diff.to_create.len(),
        "reconciled"
    );
    Ok(diff)
}
