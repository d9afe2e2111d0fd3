//! Filesystems pages are discovered on.
//!
//! Paths are relative, `/`-separated and never start with `/`.

pub mod local;
pub mod memory;
pub mod overlay;

use std::collections::BTreeSet;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use crate::core::error::Result;

pub trait FileSystem: Send + Sync {
    /// Label used in logs and error reports.
    fn name(&self) -> &str;

    /// Every regular file below the root, sorted.
    fn list_all_files(&self) -> Result<Vec<String>>;

    /// Immediate subdirectories of the root, sorted.
    fn list_dirs(&self) -> Result<Vec<String>> {
        let dirs: BTreeSet<String> = self
            .list_all_files()?
            .into_iter()
            .filter_map(|path| path.split_once('/').map(|(dir, _)| dir.to_string()))
            .collect();
        Ok(dirs.into_iter().collect())
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Hex SHA-256 of the file's bytes.
    fn shasum(&self, path: &str) -> Result<String> {
        Ok(shasum_bytes(&self.read_file(path)?))
    }

    fn file_created(&self, path: &str) -> Result<DateTime<Utc>>;

    fn last_modified(&self, path: &str) -> Result<DateTime<Utc>>;
}

pub fn shasum_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Normalises separators and strips leading `./` and `/`.
pub fn clean_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}
