#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use procsched::config::Config;
use procsched::engine::Engine;
use procsched::fs::mock::MockFileSystem;
use procsched::fs::FileSystem;
use procsched::processor::Processor;
use procsched::repo::MemoryRepository;
use procsched::task::MemoryTaskStore;
use procsched_test_utils::builders::ConfigBuilder;
use procsched_test_utils::FakeBatchScheduler;

pub use procsched_test_utils::init_tracing;

/// Everything an engine test needs to inspect after a phase run.
pub struct Harness {
    pub config: Arc<Config>,
    pub fs: Arc<MockFileSystem>,
    pub store: Arc<MemoryTaskStore>,
    pub batch: Arc<FakeBatchScheduler>,
    pub engine: Engine,
}

impl Harness {
    pub fn new(config: ConfigBuilder, processors: Vec<Processor>, repo: MemoryRepository) -> Self {
        Self::with_batch(config, processors, repo, FakeBatchScheduler::new())
    }

    pub fn with_batch(
        config: ConfigBuilder,
        processors: Vec<Processor>,
        repo: MemoryRepository,
        batch: FakeBatchScheduler,
    ) -> Self {
        let config = config.root(Path::new("/work")).build_arc();
        let fs = Arc::new(MockFileSystem::new());
        let store = Arc::new(MemoryTaskStore::new());
        let batch = Arc::new(batch);
        let engine = Engine::new(
            config.clone(),
            processors,
            Arc::new(repo),
            store.clone(),
            batch.clone(),
            fs.clone() as Arc<dyn FileSystem>,
        );
        Self {
            config,
            fs,
            store,
            batch,
            engine,
        }
    }

    /// Simulate the job writing its completion sentinel.
    pub fn write_sentinel(&self, label: &str) {
        self.fs.add_file(self.config.sentinel_path(label), "");
    }
}
