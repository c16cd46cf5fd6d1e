// src/task/readiness.rs

//! Whether the inputs bound in a parameter set are ready for processing.
//!
//! Readiness is data, not an error: the evaluation returns a
//! [`SchedulingOutcome`] that maps onto `NEED_INPUTS` / `NO_DATA`.

use std::fmt;

use crate::matcher::{has_required_resources, Binding, ParameterSet};
use crate::processor::{InputSlot, SpecDefinition};
use crate::repo::{Artefact, ArtefactPool};
use crate::task::status::{ProcStatus, QcStatus};
use crate::types::ArtefactKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulingOutcome {
    /// Recoverable; re-evaluated every build cycle.
    NeedInputs(String),
    /// Structurally impossible for this scope; dead end.
    NoData(String),
}

impl SchedulingOutcome {
    pub fn reason(&self) -> &str {
        match self {
            SchedulingOutcome::NeedInputs(r) | SchedulingOutcome::NoData(r) => r,
        }
    }

    /// Status pair a task takes for this outcome; the reason becomes a qc note.
    pub fn statuses(&self) -> (ProcStatus, QcStatus) {
        match self {
            SchedulingOutcome::NeedInputs(r) => (ProcStatus::NeedInputs, QcStatus::Note(r.clone())),
            SchedulingOutcome::NoData(r) => (ProcStatus::NoData, QcStatus::Note(r.clone())),
        }
    }
}

impl fmt::Display for SchedulingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulingOutcome::NeedInputs(r) => write!(f, "NEED_INPUTS ({r})"),
            SchedulingOutcome::NoData(r) => write!(f, "NO_DATA ({r})"),
        }
    }
}

/// Status pair for a freshly evaluated parameter set.
pub fn initial_statuses(readiness: &Result<(), SchedulingOutcome>) -> (ProcStatus, QcStatus) {
    match readiness {
        Ok(()) => (ProcStatus::NeedToRun, QcStatus::JobPending),
        Err(outcome) => outcome.statuses(),
    }
}

/// Check every bound input against the current pool.
pub fn evaluate_readiness(
    spec: &SpecDefinition,
    params: &ParameterSet,
    pool: &ArtefactPool,
) -> Result<(), SchedulingOutcome> {
    for slot in spec.slots.iter() {
        let binding = params.get(&slot.name).unwrap_or(&Binding::Absent);
        if binding.is_absent() {
            if slot.optional {
                continue;
            }
            return Err(SchedulingOutcome::NoData(format!("{}: No Data", slot.name)));
        }
        for id in binding.ids() {
            let Some(artefact) = pool.get(id) else {
                return Err(SchedulingOutcome::NoData(format!("{}: Missing {id}", slot.name)));
            };
            check_artefact(slot, artefact)?;
        }
    }
    Ok(())
}

fn check_artefact(slot: &InputSlot, artefact: &Artefact) -> Result<(), SchedulingOutcome> {
    let name = &slot.name;
    match artefact.kind {
        ArtefactKind::Scan => {
            if slot.needs_qc && !artefact.usable {
                return Err(SchedulingOutcome::NeedInputs(format!("{name}: Not Usable")));
            }
        }
        ArtefactKind::Assessor => {
            if let Some(status) = artefact.status.as_ref() {
                if status.proc_status == ProcStatus::NoData {
                    return Err(SchedulingOutcome::NoData(format!("{name}: No Data")));
                }
                if status.proc_status.is_open()
                    || status.proc_status == ProcStatus::NeedInputs
                    || status.qc_status.blocks_downstream()
                {
                    return Err(SchedulingOutcome::NeedInputs(format!("{name}: Not Ready")));
                }
                if slot.needs_qc {
                    if status.qc_status == QcStatus::NeedsQa {
                        return Err(SchedulingOutcome::NeedInputs(format!("{name}: Needs QC")));
                    }
                    if status.qc_status.is_bad() {
                        return Err(SchedulingOutcome::NeedInputs(format!("{name}: Bad QC")));
                    }
                }
            } else if slot.needs_qc && !artefact.usable {
                return Err(SchedulingOutcome::NeedInputs(format!("{name}: Bad QC")));
            }
        }
    }

    if !has_required_resources(slot, artefact) {
        return Err(SchedulingOutcome::NeedInputs(format!("{name}: No Resource")));
    }
    Ok(())
}
