// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir,
}

/// In-memory filesystem for tests.
///
/// Entries are kept in a flat ordered map; directory listings are derived
/// from the keys, so `read_dir` output is always sorted.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<BTreeMap<PathBuf, MockEntry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut files = BTreeMap::new();
        files.insert(PathBuf::from("."), MockEntry::Dir);

        Self {
            files: Arc::new(Mutex::new(files)),
        }
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut files = self.entries();
        if let Some(parent) = path.parent() {
            ensure_dir_entry(&mut files, parent);
        }
        files.insert(path, MockEntry::File(content.into()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut files = self.entries();
        ensure_dir_entry(&mut files, path.as_ref());
    }

    /// All paths currently stored, for assertions.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries().keys().cloned().collect()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<PathBuf, MockEntry>> {
        // A poisoned lock only means another test thread panicked.
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn normalise(path: &Path) -> &Path {
    if path.as_os_str().is_empty() {
        Path::new(".")
    } else {
        path
    }
}

fn ensure_dir_entry(files: &mut BTreeMap<PathBuf, MockEntry>, path: &Path) {
    let path = normalise(path);
    if files.contains_key(path) {
        return;
    }
    files.insert(path.to_path_buf(), MockEntry::Dir);
    if let Some(parent) = path.parent() {
        let parent = normalise(parent);
        if parent != path {
            ensure_dir_entry(files, parent);
        }
    }
}

fn descendants(files: &BTreeMap<PathBuf, MockEntry>, root: &Path) -> Vec<PathBuf> {
    files
        .keys()
        .filter(|p| p.as_path() != root && p.starts_with(root))
        .cloned()
        .collect()
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let files = self.entries();
        match files.get(path) {
            Some(MockEntry::File(content)) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn create_new(&self, path: &Path, contents: &[u8]) -> Result<bool> {
        let mut files = self.entries();
        if files.contains_key(path) {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            ensure_dir_entry(&mut files, parent);
        }
        files.insert(path.to_path_buf(), MockEntry::File(contents.to_vec()));
        Ok(true)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut files = self.entries();
        match files.get(path) {
            Some(MockEntry::File(_)) => {
                files.remove(path);
                Ok(())
            }
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let mut files = self.entries();
        if !matches!(files.get(path), Some(MockEntry::Dir)) {
            return Err(anyhow!("Not a directory or not found: {:?}", path));
        }
        for child in descendants(&files, path) {
            files.remove(&child);
        }
        files.remove(path);
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut files = self.entries();
        if let Some(MockEntry::File(_)) = files.get(path) {
            return Err(anyhow!("File exists: {:?}", path));
        }
        ensure_dir_entry(&mut files, path);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut files = self.entries();
        let Some(entry) = files.remove(from) else {
            return Err(anyhow!("File not found: {:?}", from));
        };
        let moved: Vec<(PathBuf, MockEntry)> = descendants(&files, from)
            .into_iter()
            .filter_map(|p| {
                let rel = p.strip_prefix(from).ok()?.to_path_buf();
                files.remove(&p).map(|e| (to.join(rel), e))
            })
            .collect();
        if let Some(parent) = to.parent() {
            ensure_dir_entry(&mut files, parent);
        }
        files.insert(to.to_path_buf(), entry);
        files.extend(moved);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.entries().contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.entries().get(path), Some(MockEntry::File(_)))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.entries().get(path), Some(MockEntry::Dir))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let files = self.entries();
        match files.get(path) {
            Some(MockEntry::Dir) => Ok(files
                .keys()
                .filter(|p| p.parent().map(normalise) == Some(path) && p.as_path() != path)
                .cloned()
                .collect()),
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }
}
