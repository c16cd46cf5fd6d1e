// src/task/store.rs

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use crate::errors::{Result, SchedError};
use crate::task::model::{Task, TaskKey};
use crate::types::Scope;

/// Resource name to the files it holds.
pub type Outputs = BTreeMap<String, Vec<String>>;

/// Persistence of task records and their derived outputs.
///
/// Every mutation is committed on its own; callers never rely on
/// multi-record atomicity.
pub trait TaskStore: Send + Sync {
    /// Tasks of one proctype in exactly this scope.
    fn tasks_for(&self, scope: &Scope, proctype: &str) -> Result<Vec<Task>>;

    /// Every task of a subject: its session scopes and its subject scope.
    fn tasks_in_subject(&self, project: &str, subject: &str) -> Result<Vec<Task>>;

    fn all_tasks(&self) -> Result<Vec<Task>>;

    fn get(&self, key: &TaskKey) -> Result<Option<Task>>;

    /// Persist a new task; fails if one with the same key exists.
    fn create(&self, task: &Task) -> Result<()>;

    /// Overwrite an existing task record.
    fn save(&self, task: &Task) -> Result<()>;

    fn outputs(&self, task: &Task) -> Result<Outputs>;

    fn remove_output(&self, task: &Task, resource: &str) -> Result<()>;

    /// Move `resources` under `<archive>/<stamp>/` of the same task.
    fn archive_outputs(&self, task: &Task, resources: &[String], archive: &str, stamp: &str) -> Result<()>;
}

/// Task store kept in memory; used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<BTreeMap<TaskKey, Task>>,
    outputs: Mutex<BTreeMap<String, Outputs>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an output resource to a task label.
    pub fn add_output(&self, label: &str, resource: &str, files: &[&str]) {
        lock(&self.outputs)
            .entry(label.to_string())
            .or_default()
            .insert(resource.to_string(), files.iter().map(|f| f.to_string()).collect());
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl TaskStore for MemoryTaskStore {
    fn tasks_for(&self, scope: &Scope, proctype: &str) -> Result<Vec<Task>> {
        Ok(lock(&self.tasks)
            .values()
            .filter(|t| &t.scope == scope && t.proctype == proctype)
            .cloned()
            .collect())
    }

    fn tasks_in_subject(&self, project: &str, subject: &str) -> Result<Vec<Task>> {
        Ok(lock(&self.tasks)
            .values()
            .filter(|t| t.scope.project == project && t.scope.subject == subject)
            .cloned()
            .collect())
    }

    fn all_tasks(&self) -> Result<Vec<Task>> {
        Ok(lock(&self.tasks).values().cloned().collect())
    }

    fn get(&self, key: &TaskKey) -> Result<Option<Task>> {
        Ok(lock(&self.tasks).get(key).cloned())
    }

    fn create(&self, task: &Task) -> Result<()> {
        let mut tasks = lock(&self.tasks);
        let key = task.key();
        if tasks.contains_key(&key) {
            return Err(SchedError::StoreError(format!("task {} already exists", task.label)));
        }
        tasks.insert(key, task.clone());
        Ok(())
    }

    fn save(&self, task: &Task) -> Result<()> {
        let mut tasks = lock(&self.tasks);
        match tasks.get_mut(&task.key()) {
            Some(existing) => {
                *existing = task.clone();
                Ok(())
            }
            None => Err(SchedError::StoreError(format!("task {} does not exist", task.label))),
        }
    }

    fn outputs(&self, task: &Task) -> Result<Outputs> {
        Ok(lock(&self.outputs).get(&task.label).cloned().unwrap_or_default())
    }

    fn remove_output(&self, task: &Task, resource: &str) -> Result<()> {
        if let Some(outputs) = lock(&self.outputs).get_mut(&task.label) {
            outputs.remove(resource);
        }
        Ok(())
    }

    fn archive_outputs(&self, task: &Task, resources: &[String], archive: &str, stamp: &str) -> Result<()> {
        let mut all = lock(&self.outputs);
        let outputs = all.entry(task.label.clone()).or_default();
        let mut archived: BTreeSet<String> = outputs
            .get(archive)
            .map(|files| files.iter().cloned().collect())
            .unwrap_or_default();
        for resource in resources {
            if let Some(files) = outputs.remove(resource) {
                for file in files {
                    archived.insert(format!("{stamp}/{resource}/{file}"));
                }
            }
        }
        outputs.insert(archive.to_string(), archived.into_iter().collect());
        Ok(())
    }
}
