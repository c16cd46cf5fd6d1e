// src/matcher/matrix.rs

use std::collections::BTreeMap;

use crate::matcher::params::{Binding, ParameterSet};
use crate::processor::{Iteration, SpecDefinition};
use crate::repo::ArtefactId;

/// Selected candidate ids per slot, after the selection policy.
pub type SlotCandidates = BTreeMap<String, Vec<ArtefactId>>;

/// Build the parameter matrix for one spec.
///
/// - Any required slot without candidates yields no rows at all.
/// - Each iteration source contributes one dimension; its mapped slots ride
///   along at the same index, wrapping modulo their own length.
/// - Dimensions combine as a Cartesian product in slot declaration order,
///   the last dimension varying fastest.
/// - Singleton slots are attached to every row.
pub fn build_matrix(spec: &SpecDefinition, candidates: &SlotCandidates) -> Vec<ParameterSet> {
    let empty = Vec::new();
    let cands = |slot: &str| candidates.get(slot).unwrap_or(&empty);

    if spec
        .slots
        .iter()
        .any(|s| !s.optional && cands(&s.name).is_empty())
    {
        return Vec::new();
    }

    let mut dimensions: Vec<Vec<Vec<(String, Binding)>>> = Vec::new();
    for source in spec.slots.iter().filter(|s| s.is_source()) {
        let mapped: Vec<&str> = spec
            .slots
            .iter()
            .filter(|s| matches!(&s.iteration, Iteration::MappedTo(t) if *t == source.name))
            .map(|s| s.name.as_str())
            .collect();

        let source_ids = cands(&source.name);
        let dimension = if source_ids.is_empty() {
            // Optional source with nothing to iterate: one row, all absent.
            vec![
                std::iter::once((source.name.clone(), Binding::Absent))
                    .chain(mapped.iter().map(|m| (m.to_string(), Binding::Absent)))
                    .collect(),
            ]
        } else {
            source_ids
                .iter()
                .enumerate()
                .map(|(i, id)| {
                    let mut entry = vec![(source.name.clone(), Binding::One(id.clone()))];
                    for m in mapped.iter() {
                        let ids = cands(m);
                        let binding = if ids.is_empty() {
                            Binding::Absent
                        } else {
                            Binding::One(ids[i % ids.len()].clone())
                        };
                        entry.push((m.to_string(), binding));
                    }
                    entry
                })
                .collect()
        };
        dimensions.push(dimension);
    }

    let mut rows: Vec<ParameterSet> = vec![ParameterSet::new()];
    for dimension in dimensions.iter() {
        let mut next = Vec::with_capacity(rows.len() * dimension.len());
        for row in rows.iter() {
            for entry in dimension.iter() {
                let mut combined = row.clone();
                for (slot, binding) in entry.iter() {
                    combined.insert(slot.clone(), binding.clone());
                }
                next.push(combined);
            }
        }
        rows = next;
    }

    for slot in spec.slots.iter().filter(|s| s.iteration == Iteration::Single) {
        let ids = cands(&slot.name);
        let binding = match ids.first() {
            None => Binding::Absent,
            Some(_) if slot.selection.keeps_all() => Binding::Many(ids.clone()),
            Some(first) => Binding::One(first.clone()),
        };
        for row in rows.iter_mut() {
            row.insert(slot.name.clone(), binding.clone());
        }
    }

    rows
}
