use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use crate::core::error::{Error, Result};
use crate::fs::{clean_path, FileSystem};

#[derive(Debug, Clone)]
struct MemoryFile {
    bytes: Vec<u8>,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
}

/// Filesystem held in memory. Used by tests and by page providers that
/// generate content.
pub struct MemoryFileSystem {
    name: String,
    files: RwLock<BTreeMap<String, MemoryFile>>,
}

impl MemoryFileSystem {
    pub fn new(name: impl Into<String>) -> Self {
        MemoryFileSystem {
            name: name.into(),
            files: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn insert(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        let now = Utc::now();
        self.insert_with_times(path, bytes, now, now);
    }

    pub fn insert_with_times(
        &self,
        path: &str,
        bytes: impl Into<Vec<u8>>,
        created: DateTime<Utc>,
        modified: DateTime<Utc>,
    ) {
        self.files.write().insert(
            clean_path(path),
            MemoryFile { bytes: bytes.into(), created, modified },
        );
    }

    pub fn remove(&self, path: &str) -> bool {
        self.files.write().remove(&clean_path(path)).is_some()
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    fn file(&self, path: &str) -> Result<MemoryFile> {
        self.files
            .read()
            .get(&clean_path(path))
            .cloned()
            .ok_or_else(|| Error::not_found(format!("{}: no file {}", self.name, path)))
    }
}

impl FileSystem for MemoryFileSystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_all_files(&self) -> Result<Vec<String>> {
        Ok(self.files.read().keys().cloned().collect())
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        Ok(self.file(path)?.bytes)
    }

    fn file_created(&self, path: &str) -> Result<DateTime<Utc>> {
        Ok(self.file(path)?.created)
    }

    fn last_modified(&self, path: &str) -> Result<DateTime<Utc>> {
        Ok(self.file(path)?.modified)
    }
}
