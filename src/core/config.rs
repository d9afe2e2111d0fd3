use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, ErrorKind, Result};

/// Storage driver behind the attribute and keyword postings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Redb,
    Sqlite,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Redb => "redb",
            BackendKind::Sqlite => "sqlite",
        }
    }

    pub fn is_file_backed(&self) -> bool {
        !matches!(self, BackendKind::Memory)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendKind,
    pub storage_path: Option<PathBuf>,

    pub query_cache_size: usize,    // compiled statements/selections kept
    pub regex_cache_size: usize,    // compiled patterns kept

    pub batch_size: usize,          // buffered writes before a flush
    pub compact_every: usize,       // flushed writes between compactions

    pub read_only: bool,            // reject writes on file-backed stores
    pub durable: bool,              // sync every committed write

    pub default_language: String,
    pub search_page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: BackendKind::Memory,
            storage_path: None,
            query_cache_size: 256,
            regex_cache_size: 256,
            batch_size: 1000,
            compact_every: 10_000,
            read_only: false,
            durable: false,
            default_language: "en".to_string(),
            search_page_size: 10,
        }
    }
}

impl Config {
    /// Serving configuration for an already-built file-backed index.
    pub fn serving(backend: BackendKind, path: impl Into<PathBuf>) -> Self {
        Config {
            backend,
            storage_path: Some(path.into()),
            read_only: backend.is_file_backed(),
            ..Config::default()
        }
    }

    /// Offline rebuild: writable and synced on every commit.
    pub fn precache(backend: BackendKind, path: Option<PathBuf>) -> Self {
        Config {
            backend,
            storage_path: path,
            read_only: false,
            durable: true,
            ..Config::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("config: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend.is_file_backed() && self.storage_path.is_none() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("{} backend requires a storage path", self.backend.name()),
            ));
        }
        if self.query_cache_size == 0 || self.regex_cache_size == 0 {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "cache sizes must be greater than zero".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_toml_fills_defaults() {
        let config = Config::from_toml_str(
            r#"
            backend = "redb"
            storage_path = "/tmp/pages.redb"
            batch_size = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::Redb);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.query_cache_size, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_backend_requires_path() {
        let config = Config { backend: BackendKind::Sqlite, ..Config::default() };
        assert_eq!(config.validate().unwrap_err().kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_precache_is_durable_and_writable() {
        let config = Config::precache(BackendKind::Redb, Some(PathBuf::from("x")));
        assert!(config.durable);
        assert!(!config.read_only);
        let serving = Config::serving(BackendKind::Redb, "x");
        assert!(serving.read_only);
    }
}
