// src/task/file_store.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::{Result, SchedError};
use crate::fs::{file_name_string, FileSystem};
use crate::task::model::{Task, TaskKey};
use crate::task::store::{Outputs, TaskStore};
use crate::types::Scope;

/// Disk-backed task store.
///
/// Layout:
/// - records: `<store>/<project>/<subject>/<session|_subject>/<proctype>/<digest>.json`
/// - outputs: `<results>/<task label>/<resource>/...`
#[derive(Debug, Clone)]
pub struct FileTaskStore {
    fs: Arc<dyn FileSystem>,
    store_dir: PathBuf,
    results_dir: PathBuf,
}

fn store_err(context: &str, e: anyhow::Error) -> SchedError {
    SchedError::StoreError(format!("{context}: {e:#}"))
}

impl FileTaskStore {
    pub fn new(fs: Arc<dyn FileSystem>, store_dir: impl Into<PathBuf>, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            store_dir: store_dir.into(),
            results_dir: results_dir.into(),
        }
    }

    fn scope_dir(&self, scope: &Scope) -> PathBuf {
        self.store_dir
            .join(&scope.project)
            .join(&scope.subject)
            .join(scope.session_label())
    }

    pub fn record_path(&self, key: &TaskKey) -> PathBuf {
        self.scope_dir(&key.scope)
            .join(&key.proctype)
            .join(format!("{}.json", key.fingerprint.digest()))
    }

    fn output_dir(&self, task: &Task) -> PathBuf {
        self.results_dir.join(&task.label)
    }

    fn subdirs(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !self.fs.is_dir(dir) {
            return Ok(Vec::new());
        }
        let entries = self
            .fs
            .read_dir(dir)
            .map_err(|e| store_err("listing task store", e))?;
        Ok(entries.into_iter().filter(|p| self.fs.is_dir(p)).collect())
    }

    fn read_record(&self, path: &Path) -> Result<Task> {
        let text = self
            .fs
            .read_to_string(path)
            .map_err(|e| store_err("reading task record", e))?;
        serde_json::from_str(&text).map_err(|e| {
            SchedError::StoreError(format!("corrupt task record {}: {e}", path.display()))
        })
    }

    fn read_proctype_dir(&self, dir: &Path) -> Result<Vec<Task>> {
        if !self.fs.is_dir(dir) {
            return Ok(Vec::new());
        }
        let entries = self
            .fs
            .read_dir(dir)
            .map_err(|e| store_err("listing task records", e))?;
        entries
            .iter()
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .map(|p| self.read_record(p))
            .collect()
    }

    /// Listing across scopes: an unreadable record is logged and left
    /// out so one bad file does not hide every other task.
    fn collect_proctype_dir(&self, dir: &Path, out: &mut Vec<Task>) -> Result<()> {
        if !self.fs.is_dir(dir) {
            return Ok(());
        }
        let entries = self
            .fs
            .read_dir(dir)
            .map_err(|e| store_err("listing task records", e))?;
        for path in entries
            .iter()
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        {
            match self.read_record(path) {
                Ok(task) => out.push(task),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable task record"),
            }
        }
        Ok(())
    }

    fn read_subject_dir(&self, dir: &Path) -> Result<Vec<Task>> {
        let mut out = Vec::new();
        for scope_dir in self.subdirs(dir)? {
            for proctype_dir in self.subdirs(&scope_dir)? {
                self.collect_proctype_dir(&proctype_dir, &mut out)?;
            }
        }
        Ok(out)
    }

    fn serialise(task: &Task) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(task)?)
    }
}

impl TaskStore for FileTaskStore {
    fn tasks_for(&self, scope: &Scope, proctype: &str) -> Result<Vec<Task>> {
        self.read_proctype_dir(&self.scope_dir(scope).join(proctype))
    }

    fn tasks_in_subject(&self, project: &str, subject: &str) -> Result<Vec<Task>> {
        self.read_subject_dir(&self.store_dir.join(project).join(subject))
    }

    fn all_tasks(&self) -> Result<Vec<Task>> {
        let mut out = Vec::new();
        for project_dir in self.subdirs(&self.store_dir)? {
            for subject_dir in self.subdirs(&project_dir)? {
                out.extend(self.read_subject_dir(&subject_dir)?);
            }
        }
        Ok(out)
    }

    fn get(&self, key: &TaskKey) -> Result<Option<Task>> {
        let path = self.record_path(key);
        if !self.fs.is_file(&path) {
            return Ok(None);
        }
        self.read_record(&path).map(Some)
    }

    fn create(&self, task: &Task) -> Result<()> {
        let path = self.record_path(&task.key());
        let created = self
            .fs
            .create_new(&path, &Self::serialise(task)?)
            .map_err(|e| store_err("creating task record", e))?;
        if !created {
            return Err(SchedError::StoreError(format!("task {} already exists", task.label)));
        }
        debug!(task = %task.label, path = %path.display(), "task record created");
        Ok(())
    }

    fn save(&self, task: &Task) -> Result<()> {
        let path = self.record_path(&task.key());
        if !self.fs.is_file(&path) {
            return Err(SchedError::StoreError(format!("task {} does not exist", task.label)));
        }
        self.fs
            .write(&path, &Self::serialise(task)?)
            .map_err(|e| store_err("writing task record", e))
    }

    fn outputs(&self, task: &Task) -> Result<Outputs> {
        let mut outputs = Outputs::new();
        for resource_dir in self.subdirs(&self.output_dir(task))? {
            let Some(name) = file_name_string(&resource_dir) else {
                continue;
            };
            let files = self
                .fs
                .read_dir(&resource_dir)
                .map_err(|e| store_err("listing task outputs", e))?
                .iter()
                .filter_map(|p| file_name_string(p))
                .collect();
            outputs.insert(name, files);
        }
        Ok(outputs)
    }

    fn remove_output(&self, task: &Task, resource: &str) -> Result<()> {
        let path = self.output_dir(task).join(resource);
        if self.fs.is_dir(&path) {
            self.fs
                .remove_dir_all(&path)
                .map_err(|e| store_err("removing task output", e))?;
        }
        Ok(())
    }

    fn archive_outputs(&self, task: &Task, resources: &[String], archive: &str, stamp: &str) -> Result<()> {
        let base = self.output_dir(task);
        let target = base.join(archive).join(stamp);
        for resource in resources {
            let from = base.join(resource);
            if !self.fs.is_dir(&from) {
                continue;
            }
            self.fs
                .rename(&from, &target.join(resource))
                .map_err(|e| store_err("archiving task output", e))?;
        }
        Ok(())
    }
}
