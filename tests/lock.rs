// tests/lock.rs

mod common;
use crate::common::{init_tracing, Harness};

use std::path::Path;
use std::sync::Arc;

use procsched::engine::{LockOwner, PhaseLock, ScopeFilter};
use procsched::errors::SchedError;
use procsched::fs::mock::MockFileSystem;
use procsched::fs::FileSystem;
use procsched::repo::MemoryRepository;
use procsched::types::Phase;
use procsched_test_utils::builders::ConfigBuilder;

const LOCK_DIR: &str = "/work/locks";

fn fs() -> Arc<MockFileSystem> {
    Arc::new(MockFileSystem::new())
}

fn take(fs: &Arc<MockFileSystem>, phase: Phase) -> procsched::errors::Result<PhaseLock> {
    PhaseLock::acquire(fs.clone() as Arc<dyn FileSystem>, Path::new(LOCK_DIR), "procsched", phase)
}

#[test]
fn owner_round_trips_through_its_text_form() {
    let owner = LockOwner {
        host: "node-07.cluster".to_string(),
        pid: 4242,
    };
    assert_eq!(owner.to_string(), "node-07.cluster-4242");
    assert_eq!(LockOwner::parse("node-07.cluster-4242\n"), Some(owner));
    assert_eq!(LockOwner::parse("no-pid-here-x"), None);
    assert_eq!(LockOwner::parse("-12"), None);
}

#[test]
fn lock_file_names_the_phase() {
    let fs = fs();
    let lock = take(&fs, Phase::Launch).unwrap();

    assert_eq!(lock.path(), Path::new("/work/locks/procsched_launch.pid"));
    let text = fs.read_to_string(lock.path()).unwrap();
    assert_eq!(LockOwner::parse(&text), Some(LockOwner::current()));
}

#[test]
fn second_acquire_of_a_live_lock_fails() {
    init_tracing();
    let fs = fs();
    let _held = take(&fs, Phase::Build).unwrap();

    let err = take(&fs, Phase::Build).unwrap_err();
    assert!(matches!(err, SchedError::LockHeld { ref phase, .. } if phase == "build"));
}

#[test]
fn phases_lock_independently() {
    let fs = fs();
    let _build = take(&fs, Phase::Build).unwrap();
    let _launch = take(&fs, Phase::Launch).unwrap();
    let _update = take(&fs, Phase::Update).unwrap();
}

#[test]
fn lock_held_from_another_host_is_honoured() {
    let fs = fs();
    let path = PhaseLock::path_for(Path::new(LOCK_DIR), "procsched", Phase::Update);
    fs.add_file(&path, "some-other-host.invalid-1");

    assert!(matches!(take(&fs, Phase::Update), Err(SchedError::LockHeld { .. })));
    assert!(fs.exists(&path));
}

#[test]
fn stale_lock_from_a_dead_local_process_is_taken_over() {
    init_tracing();
    let fs = fs();
    let path = PhaseLock::path_for(Path::new(LOCK_DIR), "procsched", Phase::Update);
    let dead = LockOwner {
        host: LockOwner::current().host,
        pid: u32::MAX,
    };
    fs.add_file(&path, dead.to_string());

    let lock = take(&fs, Phase::Update).unwrap();

    let text = fs.read_to_string(lock.path()).unwrap();
    assert_eq!(LockOwner::parse(&text), Some(LockOwner::current()));
}

#[test]
fn unreadable_lock_contents_are_treated_as_held() {
    let fs = fs();
    let path = PhaseLock::path_for(Path::new(LOCK_DIR), "procsched", Phase::Build);
    fs.add_file(&path, "garbage");

    assert!(take(&fs, Phase::Build).is_err());
}

#[test]
fn dropping_the_lock_releases_it() {
    let fs = fs();
    let lock = take(&fs, Phase::Build).unwrap();
    let path = lock.path().to_path_buf();
    drop(lock);

    assert!(!fs.exists(&path));
    assert!(take(&fs, Phase::Build).is_ok());
}

#[tokio::test]
async fn engine_phase_refuses_to_run_while_its_lock_is_held() {
    init_tracing();
    let h = Harness::new(ConfigBuilder::new(), vec![], MemoryRepository::new());
    let _held = PhaseLock::acquire(
        h.fs.clone() as Arc<dyn FileSystem>,
        &h.config.paths.lock_dir,
        &h.config.build.lock_prefix,
        Phase::Launch,
    )
    .unwrap();

    let err = h.engine.launch(&ScopeFilter::all(), false).await.unwrap_err();
    assert!(matches!(err, SchedError::LockHeld { .. }));

    // Other phases are unaffected.
    assert!(h.engine.build(&ScopeFilter::all()).await.is_ok());
}
