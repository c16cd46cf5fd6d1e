// src/matcher/candidates.rs

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::trace;

use crate::errors::Result;
use crate::processor::InputSlot;
use crate::repo::{Artefact, ArtefactPool};

/// Deterministic ordering applied before `first` / `last` / `nth(k)`.
pub type OrderingKey = Arc<dyn Fn(&Artefact, &Artefact) -> Ordering + Send + Sync>;

/// Natural ordering of ids: digit runs compare numerically.
///
/// `scan2 < scan10`, `1 < 2 < 3`.
pub fn natural_id_order(a: &Artefact, b: &Artefact) -> Ordering {
    natural_cmp(&a.id, &b.id)
}

pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();
    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let ln = take_digits(&mut left);
                let rn = take_digits(&mut right);
                let lt = ln.trim_start_matches('0');
                let rt = rn.trim_start_matches('0');
                let ord = lt.len().cmp(&rt.len()).then_with(|| lt.cmp(rt));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(l), Some(r)) => {
                if l != r {
                    return l.cmp(&r);
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut out = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        out.push(c);
        chars.next();
    }
    out
}

/// Every listed resource that is required is present, with at least one
/// file matching its filter when a filter is given.
pub fn has_required_resources(slot: &InputSlot, artefact: &Artefact) -> bool {
    slot.resources.iter().filter(|r| r.required).all(|r| {
        artefact.has_resource(&r.name)
            && (r.matcher.is_none()
                || artefact
                    .resource_files(&r.name)
                    .iter()
                    .any(|f| r.matches_file(f)))
    })
}

/// Artefacts of the slot's kind whose type matches, minus unusable ones for
/// QC-gated slots and those lacking a required resource; ordered by `key`.
pub fn collect_candidates<'a>(
    slot: &InputSlot,
    pool: &'a ArtefactPool,
    key: &OrderingKey,
) -> Vec<&'a Artefact> {
    let mut out: Vec<&Artefact> = pool
        .iter()
        .filter(|a| a.kind == slot.kind && slot.matches_type(&a.artefact_type))
        .filter(|a| !((slot.needs_qc || slot.skip_unusable) && !a.usable))
        .filter(|a| {
            let ok = has_required_resources(slot, a);
            if !ok {
                trace!(slot = %slot.name, artefact = %a.id, "missing required resource");
            }
            ok
        })
        .collect();
    out.sort_by(|a, b| key(a, b));
    out
}

/// Candidates after the slot's selection policy.
pub fn select_candidates<'a>(
    slot: &InputSlot,
    pool: &'a ArtefactPool,
    key: &OrderingKey,
) -> Result<Vec<&'a Artefact>> {
    let candidates = collect_candidates(slot, pool, key);
    slot.selection.apply(&slot.name, candidates)
}
