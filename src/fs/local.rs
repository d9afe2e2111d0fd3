use std::path::PathBuf;
use chrono::{DateTime, Utc};
use tracing::warn;
use walkdir::WalkDir;
use crate::core::error::{Error, ErrorKind, Result};
use crate::fs::{clean_path, FileSystem};

/// Files skipped while walking a directory tree
pub const IGNORED_FILES: &[&str] = &[".DS_Store", "Thumbs.db"];

/// Directory on the local disk.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
    name: String,
}

impl LocalFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("{} is not a directory", root.display()),
            ));
        }
        let name = root.display().to_string();
        Ok(LocalFileSystem { root, name })
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let clean = clean_path(path);
        if clean.split('/').any(|part| part == "..") {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("path {} escapes {}", path, self.name),
            ));
        }
        Ok(self.root.join(clean))
    }
}

impl FileSystem for LocalFileSystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_all_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(root = %self.name, error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_str().unwrap_or_default();
            if IGNORED_FILES.contains(&file_name) {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                files.push(clean_path(&rel.to_string_lossy()));
            }
        }
        files.sort();
        Ok(files)
    }

    fn list_dirs(&self) -> Result<Vec<String>> {
        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                dirs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.resolve(path)?)?)
    }

    fn file_created(&self, path: &str) -> Result<DateTime<Utc>> {
        let meta = std::fs::metadata(self.resolve(path)?)?;
        // not every platform records birth time
        let created = meta.created().or_else(|_| meta.modified())?;
        Ok(DateTime::<Utc>::from(created))
    }

    fn last_modified(&self, path: &str) -> Result<DateTime<Utc>> {
        let meta = std::fs::metadata(self.resolve(path)?)?;
        Ok(DateTime::<Utc>::from(meta.modified()?))
    }
}
