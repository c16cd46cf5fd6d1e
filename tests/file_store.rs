// tests/file_store.rs

mod common;
use crate::common::init_tracing;

use std::path::Path;
use std::sync::Arc;

use procsched::config::TaskSection;
use procsched::errors::SchedError;
use procsched::fs::mock::MockFileSystem;
use procsched::fs::{FileSystem, RealFileSystem};
use procsched::matcher::{Binding, ParameterSet};
use procsched::task::{restart_on_request, FileTaskStore, ProcStatus, QcStatus, Task, TaskStore};
use procsched::types::Scope;

fn task(scope: Scope, proctype: &str, id: &str) -> Task {
    let params = ParameterSet::new().with("t1", Binding::One(id.to_string()));
    Task::new(scope, proctype, "1.0.0", &params, ProcStatus::NeedToRun, QcStatus::JobPending)
}

fn mock_store() -> (Arc<MockFileSystem>, FileTaskStore) {
    let fs = Arc::new(MockFileSystem::new());
    let store = FileTaskStore::new(fs.clone() as Arc<dyn FileSystem>, "/data/tasks", "/data/results");
    (fs, store)
}

#[test]
fn records_live_under_scope_and_proctype() {
    init_tracing();
    let (fs, store) = mock_store();
    let t = task(Scope::session("P", "S", "E1"), "recon_v1", "1");

    store.create(&t).unwrap();

    let expected = Path::new("/data/tasks/P/S/E1/recon_v1").join(format!("{}.json", t.fingerprint.digest()));
    assert_eq!(store.record_path(&t.key()), expected);
    assert!(fs.is_file(&expected));
    assert_eq!(store.get(&t.key()).unwrap(), Some(t));
}

#[test]
fn create_refuses_duplicates_and_save_refuses_unknown_tasks() {
    let (_fs, store) = mock_store();
    let t = task(Scope::session("P", "S", "E1"), "recon_v1", "1");

    assert!(matches!(store.save(&t), Err(SchedError::StoreError(_))));
    store.create(&t).unwrap();
    assert!(matches!(store.create(&t), Err(SchedError::StoreError(_))));
}

#[test]
fn save_overwrites_the_record() {
    let (_fs, store) = mock_store();
    let mut t = task(Scope::session("P", "S", "E1"), "recon_v1", "1");
    store.create(&t).unwrap();

    t.transition(ProcStatus::JobRunning).unwrap();
    t.job_id = Some("77".to_string());
    store.save(&t).unwrap();

    let back = store.get(&t.key()).unwrap().unwrap();
    assert_eq!(back.proc_status, ProcStatus::JobRunning);
    assert_eq!(back.job_id.as_deref(), Some("77"));
}

#[test]
fn listing_by_scope_subject_and_everything() {
    let (_fs, store) = mock_store();
    let a = task(Scope::session("P", "S", "E1"), "recon_v1", "1");
    let b = task(Scope::session("P", "S", "E2"), "recon_v1", "2");
    let c = task(Scope::subject("P", "S"), "long_v1", "3");
    let d = task(Scope::session("P", "T", "E9"), "recon_v1", "4");
    for t in [&a, &b, &c, &d] {
        store.create(t).unwrap();
    }

    assert_eq!(store.tasks_for(&Scope::session("P", "S", "E1"), "recon_v1").unwrap(), vec![a]);
    assert_eq!(store.tasks_for(&Scope::subject("P", "S"), "long_v1").unwrap(), vec![c]);
    assert_eq!(store.tasks_in_subject("P", "S").unwrap().len(), 3);
    assert_eq!(store.all_tasks().unwrap().len(), 4);
    assert!(store.tasks_for(&Scope::session("Q", "S", "E1"), "recon_v1").unwrap().is_empty());
}

#[test]
fn outputs_are_result_subdirectories() {
    let (fs, store) = mock_store();
    let t = task(Scope::session("P", "S", "E1"), "recon_v1", "1");
    let base = Path::new("/data/results").join(&t.label);
    fs.add_file(base.join("STATS/aseg.stats"), "x");
    fs.add_file(base.join("STATS/wm.stats"), "x");
    fs.add_file(base.join("PDF/report.pdf"), "x");
    fs.add_file(base.join("READY_TO_UPLOAD.txt"), "");

    let outputs = store.outputs(&t).unwrap();

    assert_eq!(outputs.keys().cloned().collect::<Vec<_>>(), vec!["PDF", "STATS"]);
    assert_eq!(outputs["STATS"], vec!["aseg.stats".to_string(), "wm.stats".to_string()]);
}

#[test]
fn reproc_moves_outputs_into_the_archive_resource() {
    init_tracing();
    let (fs, store) = mock_store();
    let mut t = task(Scope::session("P", "S", "E1"), "recon_v1", "1");
    t.proc_status = ProcStatus::Complete;
    t.qc_status = QcStatus::Reproc;
    store.create(&t).unwrap();
    let base = Path::new("/data/results").join(&t.label);
    fs.add_file(base.join("STATS/aseg.stats"), "x");
    fs.add_file(base.join("EDITS/brainmask.mgz"), "x");

    assert!(restart_on_request(&mut t, &store, &TaskSection::default(), "20250102-030405").unwrap());

    assert!(!fs.exists(&base.join("STATS")));
    assert!(fs.is_file(&base.join("EDITS/brainmask.mgz")));
    assert!(fs.is_file(&base.join("OLD/20250102-030405/STATS/aseg.stats")));
    let outputs = store.outputs(&t).unwrap();
    assert_eq!(outputs.keys().cloned().collect::<Vec<_>>(), vec!["EDITS", "OLD"]);
}

#[test]
fn real_filesystem_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let store = FileTaskStore::new(fs.clone(), dir.path().join("tasks"), dir.path().join("results"));
    let t = task(Scope::session("P", "S", "E1"), "recon_v1", "1");

    store.create(&t).unwrap();
    assert!(store.create(&t).is_err());

    let results = dir.path().join("results").join(&t.label).join("STATS");
    std::fs::create_dir_all(&results).unwrap();
    std::fs::write(results.join("aseg.stats"), "x").unwrap();

    assert_eq!(store.all_tasks().unwrap(), vec![t.clone()]);
    assert_eq!(store.outputs(&t).unwrap()["STATS"], vec!["aseg.stats".to_string()]);

    store.remove_output(&t, "STATS").unwrap();
    assert!(store.outputs(&t).unwrap().is_empty());
}

#[test]
fn listings_skip_unreadable_records_but_scoped_reads_fail() {
    let (fs, store) = mock_store();
    let good = task(Scope::session("P", "S", "E1"), "recon_v1", "s1");
    store.create(&good).unwrap();
    fs.add_file("/data/tasks/Q/S9/E9/recon_v1/deadbeef.json", "garbage");

    let all = store.all_tasks().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].label, good.label);
    assert!(store.tasks_in_subject("Q", "S9").unwrap().is_empty());

    let err = store
        .tasks_for(&Scope::session("Q", "S9", "E9"), "recon_v1")
        .unwrap_err();
    assert!(matches!(err, SchedError::StoreError(_)));
}
