pub mod keys;
pub mod memory;
pub mod redb_store;
pub mod sqlite_store;
pub mod buffered;

use std::sync::Arc;
use tracing::info;
use crate::core::config::{BackendKind, Config};
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::buffered::BufferedStore;
use crate::storage::memory::MemoryStore;
use crate::storage::redb_store::RedbStore;
use crate::storage::sqlite_store::SqliteStore;

/// One pending mutation of a batched write.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Set(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StoreOptions {
    pub read_only: bool,
    pub durable: bool,
}

impl StoreOptions {
    pub fn from_config(config: &Config) -> Self {
        StoreOptions { read_only: config.read_only, durable: config.durable }
    }

    pub(crate) fn check_writable(&self, driver: &str) -> Result<()> {
        if self.read_only {
            return Err(Error::new(
                ErrorKind::ReadOnly,
                format!("{} store is opened read-only", driver),
            ));
        }
        Ok(())
    }
}

/// Ordered byte-key store behind every postings table.
///
/// `get` reports a missing key as `ErrorKind::NotFound` so callers can tell
/// "create it" apart from I/O failure.
pub trait PostingsStore: Send + Sync {
    fn name(&self) -> &str;

    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    fn delete(&self, key: &[u8]) -> Result<()>;

    /// All pairs whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Applies `ops` in order; drivers with transactions commit them as one.
    fn write_batch(&self, ops: &[BatchOp]) -> Result<()> {
        for op in ops {
            match op {
                BatchOp::Set(k, v) => self.set(k, v)?,
                BatchOp::Delete(k) => self.delete(k)?,
            }
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Reclaims space left by rewritten postings.
    fn compact(&self) -> Result<()> {
        Ok(())
    }

    fn get_opt(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.get(key) {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Opens the configured driver, wrapped in a write buffer when writable.
pub fn open_store(config: &Config) -> Result<Arc<dyn PostingsStore>> {
    config.validate()?;
    let options = StoreOptions::from_config(config);

    let driver: Arc<dyn PostingsStore> = match config.backend {
        BackendKind::Memory => Arc::new(MemoryStore::with_options(options)),
        BackendKind::Redb => {
            let path = storage_path(config)?;
            Arc::new(RedbStore::open(path, options)?)
        }
        BackendKind::Sqlite => {
            let path = storage_path(config)?;
            Arc::new(SqliteStore::open(path, options)?)
        }
    };
    info!(
        backend = config.backend.name(),
        read_only = options.read_only,
        durable = options.durable,
        "opened postings store"
    );

    if options.read_only || !config.backend.is_file_backed() {
        return Ok(driver);
    }
    Ok(Arc::new(BufferedStore::new(driver, config.batch_size, config.compact_every)))
}

fn storage_path(config: &Config) -> Result<&std::path::Path> {
    config.storage_path.as_deref().ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidArgument,
            format!("{} backend requires a storage path", config.backend.name()),
        )
    })
}
