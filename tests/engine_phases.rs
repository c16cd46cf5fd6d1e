// tests/engine_phases.rs

mod common;
use crate::common::{init_tracing, Harness};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use procsched::batch::{JobStatus, JobUsage};
use procsched::engine::{Engine, ScopeFilter, NOT_FOUND};
use procsched::fs::mock::MockFileSystem;
use procsched::fs::FileSystem;
use procsched::processor::Processor;
use procsched::repo::MemoryRepository;
use procsched::task::{FileTaskStore, ProcStatus, QcStatus, Task, TaskStore};
use procsched_test_utils::builders::{ArtefactBuilder, ConfigBuilder, SlotBuilder, SpecBuilder};
use procsched_test_utils::{with_timeout, FakeBatchScheduler};

fn recon() -> Processor {
    SpecBuilder::new("recon", "1.0.0")
        .input(SlotBuilder::scan("t1", &["T1"]))
        .build()
}

/// One T1 scan per session.
fn t1_repo(project: &str, sessions: &[&str]) -> MemoryRepository {
    let mut repo = MemoryRepository::new();
    add_t1_sessions(&mut repo, project, sessions);
    repo
}

fn add_t1_sessions(repo: &mut MemoryRepository, project: &str, sessions: &[&str]) {
    for session in sessions {
        repo.add_session(project, "S1", session);
        repo.add_artefact(
            project,
            "S1",
            session,
            ArtefactBuilder::scan(&format!("{session}-t1"), "T1").build(),
        );
    }
}

fn tasks_of(h: &Harness, proctype: &str) -> Vec<Task> {
    let mut tasks: Vec<Task> = h
        .store
        .all_tasks()
        .unwrap()
        .into_iter()
        .filter(|t| t.proctype == proctype)
        .collect();
    tasks.sort_by(|a, b| a.label.cmp(&b.label));
    tasks
}

fn only_task(h: &Harness) -> Task {
    let tasks = h.store.all_tasks().unwrap();
    assert_eq!(tasks.len(), 1, "expected exactly one task");
    tasks.into_iter().next().unwrap()
}

fn count_status(h: &Harness, status: ProcStatus) -> usize {
    h.store
        .all_tasks()
        .unwrap()
        .iter()
        .filter(|t| t.proc_status == status)
        .count()
}

/// Build and launch a single task, returning it in `JOB_RUNNING`.
async fn launched_single(h: &Harness) -> Task {
    let all = ScopeFilter::all();
    h.engine.build(&all).await.unwrap();
    let report = h.engine.launch(&all, false).await.unwrap();
    assert_eq!(report.totals().launched, 1);
    only_task(h)
}

// ---------------------------------------------------------------------------
// build
// ---------------------------------------------------------------------------

#[tokio::test]
async fn build_creates_one_task_per_session_and_is_idempotent() {
    init_tracing();
    let h = Harness::new(ConfigBuilder::new(), vec![recon()], t1_repo("P", &["E1", "E2", "E3"]));
    let all = ScopeFilter::all();

    let first = with_timeout(h.engine.build(&all)).await.unwrap();
    assert_eq!(first.totals().created, 3);
    assert!(first.aborted.is_none());
    assert_eq!(count_status(&h, ProcStatus::NeedToRun), 3);

    let second = with_timeout(h.engine.build(&all)).await.unwrap();
    assert_eq!(second.totals().created, 0);
    assert_eq!(second.totals().unchanged, 3);
    assert_eq!(h.store.all_tasks().unwrap().len(), 3);
}

#[tokio::test]
async fn session_filter_limits_the_build() {
    let h = Harness::new(ConfigBuilder::new(), vec![recon()], t1_repo("P", &["E1", "E2"]));
    let filter = ScopeFilter {
        projects: vec![],
        sessions: vec!["E2".to_string()],
    };

    let report = h.engine.build(&filter).await.unwrap();

    assert_eq!(report.totals().created, 1);
    assert_eq!(only_task(&h).scope.session.as_deref(), Some("E2"));
}

#[tokio::test]
async fn missing_required_input_creates_nothing() {
    let h = Harness::new(ConfigBuilder::new(), vec![recon()], {
        let mut repo = MemoryRepository::new();
        repo.add_session("P", "S1", "E1");
        repo.add_artefact("P", "S1", "E1", ArtefactBuilder::scan("x", "T2").build());
        repo
    });

    let report = h.engine.build(&ScopeFilter::all()).await.unwrap();

    assert_eq!(report.totals().created, 0);
    assert!(h.store.all_tasks().unwrap().is_empty());
}

#[tokio::test]
async fn downstream_task_waits_for_upstream_qc_then_becomes_runnable() {
    init_tracing();
    let seg = SpecBuilder::new("seg", "1.0.0")
        .input(SlotBuilder::assessor("recon", &["recon_v1"]).needs_qc())
        .build();
    // Listed out of dependency order on purpose.
    let h = Harness::new(ConfigBuilder::new(), vec![seg, recon()], t1_repo("P", &["E1"]));
    let all = ScopeFilter::all();

    let report = h.engine.build(&all).await.unwrap();
    assert_eq!(report.totals().created, 2);
    assert_eq!(h.engine.processor_names(), vec!["recon_v1", "seg_v1"]);

    let seg_task = &tasks_of(&h, "seg_v1")[0];
    assert_eq!(seg_task.proc_status, ProcStatus::NeedInputs);
    assert_eq!(seg_task.qc_status, QcStatus::Note("recon: Not Ready".to_string()));

    let mut upstream = tasks_of(&h, "recon_v1").remove(0);
    upstream.proc_status = ProcStatus::Complete;
    upstream.qc_status = QcStatus::NeedsQa;
    h.store.save(&upstream).unwrap();

    let report = h.engine.build(&all).await.unwrap();
    assert_eq!(report.totals().reevaluated, 1);
    let seg_task = &tasks_of(&h, "seg_v1")[0];
    assert_eq!(seg_task.proc_status, ProcStatus::NeedInputs);
    assert_eq!(seg_task.qc_status, QcStatus::Note("recon: Needs QC".to_string()));

    // Unchanged reason: nothing to re-save.
    let report = h.engine.build(&all).await.unwrap();
    assert_eq!(report.totals().reevaluated, 0);

    upstream.qc_status = QcStatus::Passed;
    h.store.save(&upstream).unwrap();

    let report = h.engine.build(&all).await.unwrap();
    assert_eq!(report.totals().reevaluated, 1);
    assert_eq!(report.totals().created, 0);
    let seg_task = &tasks_of(&h, "seg_v1")[0];
    assert_eq!(seg_task.proc_status, ProcStatus::NeedToRun);
    assert_eq!(seg_task.qc_status, QcStatus::JobPending);
}

// ---------------------------------------------------------------------------
// launch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn launch_stops_at_the_running_ceiling() {
    init_tracing();
    let h = Harness::new(
        ConfigBuilder::new().max_running(2),
        vec![recon()],
        t1_repo("P", &["E1", "E2", "E3", "E4", "E5"]),
    );
    let all = ScopeFilter::all();
    h.engine.build(&all).await.unwrap();

    let report = with_timeout(h.engine.launch(&all, false)).await.unwrap();

    assert_eq!(report.totals().launched, 2);
    assert!(report.aborted.is_none());
    assert_eq!(h.batch.submitted_labels().len(), 2);
    assert_eq!(count_status(&h, ProcStatus::JobRunning), 2);
    assert_eq!(count_status(&h, ProcStatus::NeedToRun), 3);

    let running: Vec<Task> = h
        .store
        .all_tasks()
        .unwrap()
        .into_iter()
        .filter(|t| t.proc_status == ProcStatus::JobRunning)
        .collect();
    for task in running {
        assert!(task.job_id.is_some());
        assert!(task.job_start_date.is_some());
        assert_eq!(task.qc_status, QcStatus::JobPending);
    }
}

#[tokio::test]
async fn pending_upload_ceiling_blocks_every_launch() {
    let batch = FakeBatchScheduler::new().with_counts(0, 0, 5);
    let h = Harness::with_batch(
        ConfigBuilder::new().max_pending_uploads(5),
        vec![recon()],
        t1_repo("P", &["E1"]),
        batch,
    );
    let all = ScopeFilter::all();
    h.engine.build(&all).await.unwrap();

    let report = h.engine.launch(&all, false).await.unwrap();

    assert_eq!(report.totals().launched, 0);
    assert!(report.aborted.is_none());
    assert!(h.batch.submitted().is_empty());
}

#[tokio::test]
async fn submission_failure_aborts_the_pass_and_keeps_the_task_runnable() {
    init_tracing();
    let h = Harness::new(ConfigBuilder::new(), vec![recon()], t1_repo("P", &["E1", "E2"]));
    let all = ScopeFilter::all();
    h.engine.build(&all).await.unwrap();
    h.batch.fail_submissions(true);

    let report = h.engine.launch(&all, false).await.unwrap();

    assert!(report.aborted.is_some());
    assert_eq!(report.totals().launched, 0);
    assert_eq!(report.totals().errors, 1);
    assert_eq!(count_status(&h, ProcStatus::NeedToRun), 2);
    assert!(h.batch.submitted().is_empty());
}

#[tokio::test]
async fn capacity_query_failure_aborts_before_submitting() {
    let h = Harness::new(ConfigBuilder::new(), vec![recon()], t1_repo("P", &["E1"]));
    let all = ScopeFilter::all();
    h.engine.build(&all).await.unwrap();
    h.batch.fail_counts(true);

    let report = h.engine.launch(&all, false).await.unwrap();

    assert!(report.aborted.is_some());
    assert_eq!(count_status(&h, ProcStatus::NeedToRun), 1);
    assert!(h.batch.submitted().is_empty());
}

#[tokio::test]
async fn existing_completion_sentinel_skips_the_task() {
    let h = Harness::new(ConfigBuilder::new(), vec![recon()], t1_repo("P", &["E1", "E2"]));
    let all = ScopeFilter::all();
    h.engine.build(&all).await.unwrap();
    let tasks = tasks_of(&h, "recon_v1");
    h.write_sentinel(&tasks[0].label);

    let report = h.engine.launch(&all, false).await.unwrap();

    assert_eq!(report.totals().launched, 1);
    assert_eq!(report.totals().skipped, 1);
    assert_eq!(h.batch.submitted_labels(), vec![tasks[1].label.clone()]);
    assert_eq!(
        h.store.get(&tasks[0].key()).unwrap().unwrap().proc_status,
        ProcStatus::NeedToRun
    );
}

#[tokio::test]
async fn priority_projects_launch_first() {
    let mut repo = t1_repo("ALPHA", &["E1", "E2"]);
    add_t1_sessions(&mut repo, "BETA", &["E1"]);
    let h = Harness::new(
        ConfigBuilder::new().priority_projects(&["BETA"]),
        vec![recon()],
        repo,
    );
    let all = ScopeFilter::all();
    h.engine.build(&all).await.unwrap();

    let order: Vec<String> = h
        .engine
        .launch_candidates(&all)
        .unwrap()
        .into_iter()
        .map(|t| t.scope.project)
        .collect();
    assert_eq!(order, vec!["BETA", "ALPHA", "ALPHA"]);

    h.engine.launch(&all, false).await.unwrap();
    let submitted = h.batch.submitted_labels();
    assert_eq!(submitted.len(), 3);
    assert!(submitted[0].starts_with("BETA-x-"));
}

#[tokio::test]
async fn dry_run_writes_scripts_without_submitting() {
    let h = Harness::new(ConfigBuilder::new(), vec![recon()], t1_repo("P", &["E1"]));
    let all = ScopeFilter::all();
    h.engine.build(&all).await.unwrap();

    let report = h.engine.launch(&all, true).await.unwrap();

    let task = only_task(&h);
    assert_eq!(report.totals().launched, 1);
    assert!(h.batch.submitted().is_empty());
    assert_eq!(task.proc_status, ProcStatus::NeedToRun);

    let script_path = h.config.paths.jobs_dir.join(format!("{}.slurm", task.label));
    let script = procsched::fs::FileSystem::read_to_string(h.fs.as_ref(), &script_path).unwrap();
    assert!(script.contains("echo recon"));
    assert!(script.contains(&h.config.sentinel_path(&task.label).display().to_string()));
}

// ---------------------------------------------------------------------------
// update
// ---------------------------------------------------------------------------

#[tokio::test]
async fn running_job_is_left_alone() {
    let h = Harness::new(ConfigBuilder::new(), vec![recon()], t1_repo("P", &["E1"]));
    launched_single(&h).await;

    let report = h.engine.update(&ScopeFilter::all()).await.unwrap();

    assert_eq!(report.totals().transitioned, 0);
    assert_eq!(only_task(&h).proc_status, ProcStatus::JobRunning);
}

#[tokio::test]
async fn vanished_job_without_sentinel_fails_with_unknown_usage() {
    init_tracing();
    let h = Harness::new(ConfigBuilder::new(), vec![recon()], t1_repo("P", &["E1"]));
    let task = launched_single(&h).await;
    let job_id = task.job_id.clone().unwrap();
    h.batch.set_status(&job_id, JobStatus::Absent);

    let report = h.engine.update(&ScopeFilter::all()).await.unwrap();

    let task = only_task(&h);
    assert_eq!(report.totals().transitioned, 1);
    assert_eq!(task.proc_status, ProcStatus::JobFailed);
    assert_eq!(task.mem_used.as_deref(), Some(NOT_FOUND));
    assert_eq!(task.wall_used.as_deref(), Some(NOT_FOUND));
    assert_eq!(task.job_node.as_deref(), Some(NOT_FOUND));
    assert_eq!(h.batch.usage_queries(), vec![(job_id, 1)]);
}

#[tokio::test]
async fn finished_job_with_sentinel_completes_in_one_pass() {
    let h = Harness::new(ConfigBuilder::new(), vec![recon()], t1_repo("P", &["E1"]));
    let task = launched_single(&h).await;
    let job_id = task.job_id.clone().unwrap();
    h.batch.set_status(&job_id, JobStatus::Absent);
    h.batch.set_usage(
        &job_id,
        JobUsage {
            mem_used: Some("2048K".to_string()),
            walltime: Some("01:02:03".to_string()),
            node: None,
        },
    );
    h.write_sentinel(&task.label);

    let report = h.engine.update(&ScopeFilter::all()).await.unwrap();

    let task = only_task(&h);
    assert_eq!(report.totals().transitioned, 2);
    assert_eq!(task.proc_status, ProcStatus::Complete);
    assert_eq!(task.qc_status, QcStatus::NeedsQa);
    assert_eq!(task.mem_used.as_deref(), Some("2048K"));
    assert_eq!(task.wall_used.as_deref(), Some("01:02:03"));
    assert_eq!(task.job_node.as_deref(), Some(NOT_FOUND));
}

#[tokio::test]
async fn usage_is_not_traced_beyond_the_window() {
    let h = Harness::new(
        ConfigBuilder::new().trace_window_days(30),
        vec![recon()],
        t1_repo("P", &["E1"]),
    );
    let mut task = launched_single(&h).await;
    task.job_start_date = Some(chrono::Local::now().date_naive() - chrono::Duration::days(40));
    h.store.save(&task).unwrap();
    h.batch.set_status(task.job_id.as_deref().unwrap(), JobStatus::Absent);

    h.engine.update(&ScopeFilter::all()).await.unwrap();

    let task = only_task(&h);
    assert_eq!(task.proc_status, ProcStatus::JobFailed);
    assert_eq!(task.wall_used.as_deref(), Some(NOT_FOUND));
    assert!(h.batch.usage_queries().is_empty());
}

#[tokio::test]
async fn rerun_request_purges_outputs_and_drops_the_sentinel() {
    init_tracing();
    let h = Harness::new(ConfigBuilder::new(), vec![recon()], t1_repo("P", &["E1"]));
    let task = launched_single(&h).await;
    h.batch.set_status(task.job_id.as_deref().unwrap(), JobStatus::Absent);
    h.write_sentinel(&task.label);
    h.engine.update(&ScopeFilter::all()).await.unwrap();

    let mut task = only_task(&h);
    assert_eq!(task.proc_status, ProcStatus::Complete);
    task.qc_status = QcStatus::Rerun;
    h.store.save(&task).unwrap();
    h.store.add_output(&task.label, "STATS", &["aseg.stats"]);
    h.store.add_output(&task.label, "EDITS", &["brainmask.mgz"]);

    let report = h.engine.update(&ScopeFilter::all()).await.unwrap();

    let task = only_task(&h);
    assert_eq!(report.totals().transitioned, 1);
    assert_eq!(task.proc_status, ProcStatus::NeedToRun);
    assert_eq!(task.qc_status, QcStatus::JobPending);
    assert!(task.job_id.is_none());
    assert!(task.wall_used.is_none());
    assert!(!procsched::fs::FileSystem::exists(h.fs.as_ref(), &h.config.sentinel_path(&task.label)));
    let outputs = h.store.outputs(&task).unwrap();
    assert_eq!(outputs.keys().cloned().collect::<Vec<_>>(), vec!["EDITS"]);

    // Runnable again.
    let report = h.engine.launch(&ScopeFilter::all(), false).await.unwrap();
    assert_eq!(report.totals().launched, 1);
}

#[tokio::test(start_paused = true)]
async fn launches_are_spaced_by_the_submit_delay() {
    let h = Harness::new(
        ConfigBuilder::new().submit_delay_ms(500),
        vec![recon()],
        t1_repo("P", &["E1", "E2", "E3"]),
    );
    let all = ScopeFilter::all();
    h.engine.build(&all).await.unwrap();

    let started = tokio::time::Instant::now();
    let report = h.engine.launch(&all, false).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(report.totals().launched, 3);
    assert!(elapsed >= Duration::from_millis(1000), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1500), "elapsed {elapsed:?}");
}

// ---------------------------------------------------------------------------
// disk store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn corrupt_task_record_only_affects_its_own_scope() {
    init_tracing();
    let config = ConfigBuilder::new().root(Path::new("/work")).build_arc();
    let fs = Arc::new(MockFileSystem::new());
    let store = Arc::new(FileTaskStore::new(
        fs.clone() as Arc<dyn FileSystem>,
        "/work/tasks",
        "/work/results",
    ));
    let batch = Arc::new(FakeBatchScheduler::new());
    let mut repo = t1_repo("P", &["E1"]);
    add_t1_sessions(&mut repo, "Q", &["E9"]);
    fs.add_file("/work/tasks/Q/S1/E9/recon_v1/deadbeef.json", "{ not a task");
    let engine = Engine::new(
        config,
        vec![recon()],
        Arc::new(repo),
        store.clone(),
        batch.clone(),
        fs.clone() as Arc<dyn FileSystem>,
    );
    let all = ScopeFilter::all();

    let built = engine.build(&all).await.unwrap();
    assert_eq!(built.totals().created, 1);
    assert_eq!(built.totals().skipped, 1);
    assert_eq!(built.totals().errors, 0);

    let launched = engine.launch(&all, false).await.unwrap();
    assert_eq!(launched.totals().launched, 1);
    assert_eq!(batch.submitted().len(), 1);
    assert!(batch.submitted_labels()[0].starts_with("P-x-S1-x-E1-x-recon_v1"));

    let updated = engine.update(&all).await.unwrap();
    assert!(updated.aborted.is_none());
    let tasks = store.all_tasks().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].proc_status, ProcStatus::JobRunning);
}
