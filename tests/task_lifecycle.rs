// tests/task_lifecycle.rs

mod common;
use crate::common::init_tracing;

use procsched::config::TaskSection;
use procsched::errors::SchedError;
use procsched::matcher::{Binding, Fingerprint, ParameterSet};
use procsched::processor::ProcessorSpec;
use procsched::repo::ArtefactPool;
use procsched::task::{
    can_transition, evaluate_readiness, reconcile, restart_on_request, MemoryTaskStore, ProcStatus,
    QcStatus, SchedulingOutcome, Task, TaskStore,
};
use procsched::types::Scope;
use procsched_test_utils::builders::{ArtefactBuilder, SlotBuilder, SpecBuilder};

fn scope() -> Scope {
    Scope::session("PROJ", "SUBJ1", "SESS1")
}

fn params(id: &str) -> ParameterSet {
    ParameterSet::new().with("t1", Binding::One(id.to_string()))
}

fn task_with(status: ProcStatus, qc: QcStatus) -> Task {
    Task::new(scope(), "recon_v1", "1.0.0", &params("1"), status, qc)
}

#[test]
fn reconcile_twice_creates_nothing_the_second_time() {
    init_tracing();
    let store = MemoryTaskStore::new();
    let sets = vec![params("1"), params("2"), params("1")];

    let first = reconcile(&store, &scope(), "recon_v1", sets.clone()).unwrap();
    assert_eq!(first.to_create.len(), 2);
    assert!(first.unchanged.is_empty());
    for set in first.to_create.iter() {
        let task = Task::new(scope(), "recon_v1", "1.0.0", set, ProcStatus::NeedToRun, QcStatus::JobPending);
        store.create(&task).unwrap();
    }

    let second = reconcile(&store, &scope(), "recon_v1", sets).unwrap();
    assert!(second.to_create.is_empty());
    assert_eq!(second.unchanged.len(), 2);
    assert!(!second.ambiguous);
}

#[test]
fn reconcile_is_scoped_by_proctype_and_scope() {
    let store = MemoryTaskStore::new();
    store.create(&task_with(ProcStatus::NeedToRun, QcStatus::JobPending)).unwrap();

    let other_type = reconcile(&store, &scope(), "seg_v1", vec![params("1")]).unwrap();
    assert_eq!(other_type.to_create.len(), 1);

    let other_scope = reconcile(&store, &Scope::session("PROJ", "SUBJ1", "SESS2"), "recon_v1", vec![params("1")]).unwrap();
    assert_eq!(other_scope.to_create.len(), 1);
}

#[test]
fn unparsable_existing_fingerprint_blocks_creation() {
    init_tracing();
    let store = MemoryTaskStore::new();
    let mut broken = task_with(ProcStatus::Complete, QcStatus::Passed);
    broken.fingerprint = Fingerprint::from_raw("");
    store.create(&broken).unwrap();

    let diff = reconcile(&store, &scope(), "recon_v1", vec![params("7"), params("8")]).unwrap();

    assert!(diff.ambiguous);
    assert!(diff.to_create.is_empty());
}

#[test]
fn forward_edges_only() {
    assert!(can_transition(ProcStatus::NeedInputs, ProcStatus::NeedToRun));
    assert!(can_transition(ProcStatus::NeedInputs, ProcStatus::NoData));
    assert!(can_transition(ProcStatus::NeedToRun, ProcStatus::JobRunning));
    assert!(can_transition(ProcStatus::JobRunning, ProcStatus::JobFailed));
    assert!(can_transition(ProcStatus::ReadyToComplete, ProcStatus::Complete));

    assert!(!can_transition(ProcStatus::Complete, ProcStatus::NeedToRun));
    assert!(!can_transition(ProcStatus::NoData, ProcStatus::NeedToRun));
    assert!(!can_transition(ProcStatus::NeedToRun, ProcStatus::Complete));
}

#[test]
fn completing_forces_needs_qa() {
    let mut task = task_with(ProcStatus::NeedToRun, QcStatus::JobPending);
    task.transition(ProcStatus::JobRunning).unwrap();
    assert_eq!(task.qc_status, QcStatus::JobPending);
    task.transition(ProcStatus::ReadyToComplete).unwrap();
    task.qc_status = QcStatus::Passed;
    task.transition(ProcStatus::Complete).unwrap();
    assert_eq!(task.qc_status, QcStatus::NeedsQa);
}

#[test]
fn invalid_transition_is_rejected_and_leaves_task_unchanged() {
    let mut task = task_with(ProcStatus::NeedToRun, QcStatus::JobPending);
    let err = task.transition(ProcStatus::Complete).unwrap_err();
    assert!(matches!(err, SchedError::InvalidTransition { .. }));
    assert_eq!(task.proc_status, ProcStatus::NeedToRun);
}

#[test]
fn rerun_purges_non_exempt_outputs_only() {
    init_tracing();
    let store = MemoryTaskStore::new();
    let mut task = task_with(ProcStatus::Complete, QcStatus::Rerun);
    task.job_id = Some("42".to_string());
    task.wall_used = Some("00:10:00".to_string());
    store.create(&task).unwrap();
    store.add_output(&task.label, "STATS", &["stats.txt"]);
    store.add_output(&task.label, "PDF", &["report.pdf"]);
    store.add_output(&task.label, "EDITS", &["brainmask.mgz"]);
    store.add_output(&task.label, "OLD", &["20240101-000000/STATS/stats.txt"]);

    let restarted = restart_on_request(&mut task, &store, &TaskSection::default(), "20250101-120000").unwrap();

    assert!(restarted);
    assert_eq!(task.proc_status, ProcStatus::NeedToRun);
    assert_eq!(task.qc_status, QcStatus::JobPending);
    assert_eq!(task.job_id, None);
    assert_eq!(task.wall_used, None);
    let left: Vec<String> = store.outputs(&task).unwrap().into_keys().collect();
    assert_eq!(left, vec!["EDITS".to_string(), "OLD".to_string()]);
}

#[test]
fn reproc_archives_before_purging() {
    let store = MemoryTaskStore::new();
    let mut task = task_with(ProcStatus::JobFailed, QcStatus::Reproc);
    store.create(&task).unwrap();
    store.add_output(&task.label, "STATS", &["stats.txt"]);
    store.add_output(&task.label, "EDITS", &["brainmask.mgz"]);

    assert!(restart_on_request(&mut task, &store, &TaskSection::default(), "stamp").unwrap());

    let outputs = store.outputs(&task).unwrap();
    assert!(!outputs.contains_key("STATS"));
    assert_eq!(outputs["EDITS"], vec!["brainmask.mgz".to_string()]);
    assert_eq!(outputs["OLD"], vec!["stamp/STATS/stats.txt".to_string()]);
}

#[test]
fn restart_requires_terminal_state_and_request() {
    let store = MemoryTaskStore::new();
    let settings = TaskSection::default();

    let mut running = task_with(ProcStatus::JobRunning, QcStatus::Rerun);
    assert!(!restart_on_request(&mut running, &store, &settings, "s").unwrap());
    assert_eq!(running.proc_status, ProcStatus::JobRunning);

    let mut passed = task_with(ProcStatus::Complete, QcStatus::Passed);
    assert!(!restart_on_request(&mut passed, &store, &settings, "s").unwrap());
    assert_eq!(passed.proc_status, ProcStatus::Complete);
}

#[test]
fn qc_status_strings_normalise() {
    assert_eq!(QcStatus::from("rerun".to_string()), QcStatus::Rerun);
    assert_eq!(QcStatus::from("Do Not Run".to_string()), QcStatus::DoNotRun);
    assert_eq!(
        QcStatus::from("t1: Not Ready".to_string()),
        QcStatus::Note("t1: Not Ready".to_string())
    );
    assert_eq!(QcStatus::NeedsQa.to_string(), "NEEDS_QA");
}

#[test]
fn task_record_round_trips_through_json() {
    let task = task_with(ProcStatus::NeedInputs, QcStatus::Note("t1: Not Usable".to_string()));
    let text = serde_json::to_string(&task).unwrap();
    assert!(text.contains("\"NEED_INPUTS\""));
    let back: Task = serde_json::from_str(&text).unwrap();
    assert_eq!(back, task);
}

#[test]
fn labels_embed_scope_proctype_and_digest() {
    let task = task_with(ProcStatus::NeedToRun, QcStatus::JobPending);
    let digest = task.fingerprint.short_digest();
    assert_eq!(task.label, format!("PROJ-x-SUBJ1-x-SESS1-x-recon_v1-x-{digest}"));

    let subject_task = Task::new(
        Scope::subject("PROJ", "SUBJ1"),
        "long_v1",
        "1.0.0",
        &params("1"),
        ProcStatus::NeedToRun,
        QcStatus::JobPending,
    );
    assert!(subject_task.label.starts_with("PROJ-x-SUBJ1-x-_subject-x-long_v1-x-"));
}

mod readiness {
    use super::*;

    fn qc_spec() -> procsched::processor::Processor {
        SpecBuilder::new("post", "1.0.0")
            .input(SlotBuilder::scan("t1", &["T1"]).needs_qc())
            .input(SlotBuilder::assessor("recon", &["recon_v1"]).needs_qc())
            .build()
    }

    fn bound() -> ParameterSet {
        ParameterSet::new()
            .with("t1", Binding::One("s1".to_string()))
            .with("recon", Binding::One("a1".to_string()))
    }

    fn pool_with(upstream: ArtefactBuilder) -> ArtefactPool {
        vec![ArtefactBuilder::scan("s1", "T1").build(), upstream.build()]
            .into_iter()
            .collect()
    }

    fn check(upstream: ArtefactBuilder) -> Result<(), SchedulingOutcome> {
        let spec = qc_spec();
        evaluate_readiness(spec.definition(), &bound(), &pool_with(upstream))
    }

    #[test]
    fn passed_upstream_is_ready() {
        let upstream = ArtefactBuilder::assessor("a1", "recon_v1").status(ProcStatus::Complete, QcStatus::Passed);
        assert_eq!(check(upstream), Ok(()));
    }

    #[test]
    fn running_upstream_is_not_ready() {
        let upstream = ArtefactBuilder::assessor("a1", "recon_v1").status(ProcStatus::JobRunning, QcStatus::JobPending);
        assert_eq!(check(upstream), Err(SchedulingOutcome::NeedInputs("recon: Not Ready".to_string())));
    }

    #[test]
    fn unreviewed_upstream_needs_qc() {
        let upstream = ArtefactBuilder::assessor("a1", "recon_v1").status(ProcStatus::Complete, QcStatus::NeedsQa);
        assert_eq!(check(upstream), Err(SchedulingOutcome::NeedInputs("recon: Needs QC".to_string())));
    }

    #[test]
    fn failed_upstream_is_bad_qc() {
        let upstream = ArtefactBuilder::assessor("a1", "recon_v1").status(ProcStatus::Complete, QcStatus::Failed);
        assert_eq!(check(upstream), Err(SchedulingOutcome::NeedInputs("recon: Bad QC".to_string())));
    }

    #[test]
    fn upstream_without_data_is_no_data() {
        let upstream = ArtefactBuilder::assessor("a1", "recon_v1").status(ProcStatus::NoData, QcStatus::Note("x".to_string()));
        assert_eq!(check(upstream), Err(SchedulingOutcome::NoData("recon: No Data".to_string())));
    }

    #[test]
    fn vanished_artefact_is_no_data() {
        let spec = qc_spec();
        let pool: ArtefactPool = vec![ArtefactBuilder::scan("s1", "T1").build()].into_iter().collect();
        let outcome = evaluate_readiness(spec.definition(), &bound(), &pool);
        assert_eq!(outcome, Err(SchedulingOutcome::NoData("recon: Missing a1".to_string())));
    }

    #[test]
    fn unusable_scan_needs_inputs() {
        let spec = qc_spec();
        let pool: ArtefactPool = vec![
            ArtefactBuilder::scan("s1", "T1").unusable().build(),
            ArtefactBuilder::assessor("a1", "recon_v1")
                .status(ProcStatus::Complete, QcStatus::Passed)
                .build(),
        ]
        .into_iter()
        .collect();
        let outcome = evaluate_readiness(spec.definition(), &bound(), &pool);
        assert_eq!(outcome, Err(SchedulingOutcome::NeedInputs("t1: Not Usable".to_string())));
        assert_eq!(
            outcome.unwrap_err().statuses(),
            (ProcStatus::NeedInputs, QcStatus::Note("t1: Not Usable".to_string()))
        );
    }
}
