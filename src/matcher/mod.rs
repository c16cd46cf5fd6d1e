// src/matcher/mod.rs

//! Artefact matching: spec + artefact pool -> parameter sets.
//!
//! - [`candidates`]: per-slot candidate collection and selection.
//! - [`matrix`]: required-slot short-circuit and the parameter matrix.
//! - [`filter`]: match-filter pass over matrix rows.
//! - [`params`]: parameter sets, bindings and fingerprints.

pub mod candidates;
pub mod filter;
pub mod matrix;
pub mod params;

use std::sync::Arc;

use tracing::debug;

use crate::errors::Result;
use crate::processor::SpecDefinition;
use crate::repo::ArtefactPool;

pub use candidates::{has_required_resources, natural_cmp, natural_id_order, OrderingKey};
pub use matrix::SlotCandidates;
pub use params::{Binding, Fingerprint, ParameterSet};

/// Turns a processor definition and an artefact pool into parameter sets.
///
/// Output order is the Cartesian enumeration order and is stable for a
/// fixed spec and pool.
#[derive(Clone)]
pub struct Matcher {
    ordering: OrderingKey,
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher").finish_non_exhaustive()
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Matcher {
    /// Matcher using natural id ordering for `first` / `last` / `nth(k)`.
    pub fn new() -> Self {
        Self {
            ordering: Arc::new(natural_id_order),
        }
    }

    pub fn with_ordering(ordering: OrderingKey) -> Self {
        Self { ordering }
    }

    /// Selected candidate ids per slot.
    pub fn slot_candidates(&self, spec: &SpecDefinition, pool: &ArtefactPool) -> Result<SlotCandidates> {
        let mut out = SlotCandidates::new();
        for slot in spec.slots.iter() {
            let selected = candidates::select_candidates(slot, pool, &self.ordering)?;
            debug!(
                proctype = %spec.proctype,
                slot = %slot.name,
                count = selected.len(),
                "slot candidates"
            );
            out.insert(
                slot.name.clone(),
                selected.into_iter().map(|a| a.id.clone()).collect(),
            );
        }
        Ok(out)
    }

    /// Errors only on selection failures such as `nth(k)` past the match count.
    pub fn match_spec(&self, spec: &SpecDefinition, pool: &ArtefactPool) -> Result<Vec<ParameterSet>> {
        let candidates = self.slot_candidates(spec, pool)?;
        let rows = matrix::build_matrix(spec, &candidates);
        let rows = filter::apply_filters(rows, &spec.filters, pool);
        debug!(proctype = %spec.proctype, rows = rows.len(), "parameter matrix built");
        Ok(rows)
    }
}
