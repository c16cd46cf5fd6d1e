// src/matcher/filter.rs

use tracing::trace;

use crate::matcher::params::{Binding, ParameterSet};
use crate::processor::{FilterTerm, MatchFilter};
use crate::repo::ArtefactPool;

/// Comparison value of one filter term in a row.
///
/// `None` when the slot is unbound or absent, bound to several artefacts
/// while a field is requested, or the field is missing.
fn term_value(term: &FilterTerm, row: &ParameterSet, pool: &ArtefactPool) -> Option<String> {
    let binding = row.get(&term.slot)?;
    match (&term.field, binding) {
        (_, Binding::Absent) => None,
        (None, Binding::One(id)) => Some(id.clone()),
        (None, Binding::Many(ids)) => Some(ids.join(",")),
        (Some(field), Binding::One(id)) => pool.get(id)?.fields.get(field).cloned(),
        (Some(_), Binding::Many(_)) => None,
    }
}

/// A row passes a filter group when every term resolves to the same value.
fn row_passes(filter: &MatchFilter, row: &ParameterSet, pool: &ArtefactPool) -> bool {
    let mut values = filter.terms.iter().map(|t| term_value(t, row, pool));
    let Some(Some(first)) = values.next() else {
        return false;
    };
    values.all(|v| v.as_deref() == Some(first.as_str()))
}

/// Drop rows that fail any match-filter group, keeping order.
pub fn apply_filters(
    rows: Vec<ParameterSet>,
    filters: &[MatchFilter],
    pool: &ArtefactPool,
) -> Vec<ParameterSet> {
    if filters.is_empty() {
        return rows;
    }
    rows.into_iter()
        .filter(|row| {
            let keep = filters.iter().all(|f| row_passes(f, row, pool));
            if !keep {
                trace!(row = %row.fingerprint(), "row dropped by match filter");
            }
            keep
        })
        .collect()
}
