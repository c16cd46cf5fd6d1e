// src/processor/validate.rs

use std::collections::HashSet;

use globset::{Glob, GlobSetBuilder};

use crate::errors::{Result, SchedError};
use crate::processor::selection::SelectionPolicy;
use crate::processor::spec::{
    FilterTerm, InputSlot, Iteration, MatchFilter, Processor, RawInputSlot, RawMatchFilter,
    RawProcessorSpec, ResourceFilter, SpecDefinition,
};

impl TryFrom<RawProcessorSpec> for Processor {
    type Error = crate::errors::SchedError;

    fn try_from(raw: RawProcessorSpec) -> std::result::Result<Self, Self::Error> {
        let level = raw.level;
        let def = build_definition(raw)?;
        Ok(Processor::from_definition(level, def))
    }
}

/// `<name>_v<major>`; the major version is the leading dotted component.
pub fn derive_proctype(name: &str, version: &str) -> Option<String> {
    let name = name.trim();
    let major = version.trim().split('.').next().unwrap_or("").trim_start_matches('v');
    if name.is_empty() || major.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some(format!("{name}_v{major}"))
}

fn build_definition(raw: RawProcessorSpec) -> Result<SpecDefinition> {
    let proctype = derive_proctype(&raw.name, &raw.version).ok_or_else(|| {
        SchedError::spec(
            &raw.name,
            format!("cannot derive a proctype from name '{}' and version '{}'", raw.name, raw.version),
        )
    })?;

    ensure_has_inputs(&proctype, &raw)?;
    ensure_unique_slot_names(&proctype, &raw)?;

    let slots = raw
        .inputs
        .iter()
        .map(|slot| build_slot(&proctype, slot))
        .collect::<Result<Vec<_>>>()?;
    resolve_mappings(&proctype, &slots)?;

    let filters = raw
        .filters
        .iter()
        .map(|f| build_filter(&proctype, f, &slots))
        .collect::<Result<Vec<_>>>()?;

    if raw.command.trim().is_empty() {
        return Err(SchedError::spec(&proctype, "command must not be empty"));
    }

    Ok(SpecDefinition {
        name: raw.name,
        version: raw.version,
        proctype,
        command: raw.command,
        requirements: raw.requirements,
        containers: raw.containers,
        slots,
        filters,
        source: None,
    })
}

fn ensure_has_inputs(proctype: &str, raw: &RawProcessorSpec) -> Result<()> {
    if raw.inputs.is_empty() {
        return Err(SchedError::spec(
            proctype,
            "spec must declare at least one [[inputs]] slot",
        ));
    }
    Ok(())
}

fn ensure_unique_slot_names(proctype: &str, raw: &RawProcessorSpec) -> Result<()> {
    let mut seen = HashSet::new();
    for slot in raw.inputs.iter() {
        if slot.name.trim().is_empty() || slot.name.contains('/') {
            return Err(SchedError::spec(
                proctype,
                format!("invalid input name '{}'", slot.name),
            ));
        }
        if !seen.insert(slot.name.as_str()) {
            return Err(SchedError::spec(
                proctype,
                format!("input '{}' is declared more than once", slot.name),
            ));
        }
    }
    Ok(())
}

fn build_slot(proctype: &str, raw: &RawInputSlot) -> Result<InputSlot> {
    if raw.types.is_empty() {
        return Err(SchedError::spec(
            proctype,
            format!("input '{}' must list at least one type pattern", raw.name),
        ));
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in raw.types.iter() {
        let glob = Glob::new(pattern).map_err(|e| {
            SchedError::spec(proctype, format!("input '{}': bad type pattern: {e}", raw.name))
        })?;
        builder.add(glob);
    }
    let type_matcher = builder.build().map_err(|e| {
        SchedError::spec(proctype, format!("input '{}': bad type patterns: {e}", raw.name))
    })?;

    let resources = raw
        .resources
        .iter()
        .map(|r| {
            let matcher = match r.filter.as_deref() {
                Some(f) => Some(
                    Glob::new(f)
                        .map_err(|e| {
                            SchedError::spec(
                                proctype,
                                format!("input '{}': bad filter for resource '{}': {e}", raw.name, r.name),
                            )
                        })?
                        .compile_matcher(),
                ),
                None => None,
            };
            Ok(ResourceFilter {
                name: r.name.clone(),
                pattern: r.filter.clone(),
                matcher,
                required: r.required,
                varname: r.varname.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let selection = match raw.select.as_deref() {
        Some(statement) => statement
            .parse::<SelectionPolicy>()
            .map_err(|e| SchedError::spec(proctype, format!("input '{}': {e}", raw.name)))?,
        None => SelectionPolicy::All,
    };

    let iteration = match (raw.iterate.as_deref(), raw.map_to.as_ref()) {
        (Some(_), Some(_)) => {
            return Err(SchedError::spec(
                proctype,
                format!("input '{}': `iterate` and `map_to` are mutually exclusive", raw.name),
            ));
        }
        (None, Some(target)) => Iteration::MappedTo(target.clone()),
        (Some(mode), None) => match mode.trim().to_lowercase().as_str() {
            "source" => Iteration::Source,
            "single" => Iteration::Single,
            other => {
                return Err(SchedError::spec(
                    proctype,
                    format!(
                        "input '{}': invalid iterate value '{other}' (expected \"source\" or \"single\")",
                        raw.name
                    ),
                ));
            }
        },
        (None, None) if selection.keeps_all() => Iteration::Source,
        (None, None) => Iteration::Single,
    };

    // A slot whose listed resources are all optional is itself optional.
    let optional = raw.optional || (!resources.is_empty() && resources.iter().all(|r| !r.required));

    Ok(InputSlot {
        name: raw.name.clone(),
        kind: raw.kind,
        type_patterns: raw.types.clone(),
        type_matcher,
        resources,
        needs_qc: raw.needs_qc,
        skip_unusable: raw.skip_unusable,
        selection,
        iteration,
        optional,
    })
}

fn resolve_mappings(proctype: &str, slots: &[InputSlot]) -> Result<()> {
    for slot in slots.iter() {
        let Iteration::MappedTo(target) = &slot.iteration else {
            continue;
        };
        if target == &slot.name {
            return Err(SchedError::spec(
                proctype,
                format!("input '{}' cannot be mapped to itself", slot.name),
            ));
        }
        let Some(target_slot) = slots.iter().find(|s| &s.name == target) else {
            return Err(SchedError::spec(
                proctype,
                format!("input '{}' is mapped to unknown input '{target}'", slot.name),
            ));
        };
        if !target_slot.is_source() {
            return Err(SchedError::spec(
                proctype,
                format!(
                    "input '{}' is mapped to '{target}', which is not an iteration source",
                    slot.name
                ),
            ));
        }
    }
    Ok(())
}

fn build_filter(proctype: &str, raw: &RawMatchFilter, slots: &[InputSlot]) -> Result<MatchFilter> {
    if raw.inputs.len() < 2 {
        return Err(SchedError::spec(
            proctype,
            "a match filter must compare at least two inputs",
        ));
    }
    let terms = raw
        .inputs
        .iter()
        .map(|entry| {
            let (slot, field) = match entry.split_once('/') {
                Some((slot, field)) => (slot.trim(), Some(field.trim().to_string())),
                None => (entry.trim(), None),
            };
            if !slots.iter().any(|s| s.name == slot) {
                return Err(SchedError::spec(
                    proctype,
                    format!("match filter references unknown input '{slot}'"),
                ));
            }
            Ok(FilterTerm {
                slot: slot.to_string(),
                field: field.filter(|f| !f.is_empty()),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(MatchFilter { terms })
}
