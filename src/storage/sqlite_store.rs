use std::path::Path;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use crate::core::error::{Error, Result};
use crate::storage::keys::prefix_upper_bound;
use crate::storage::{BatchOp, PostingsStore, StoreOptions};

const UPSERT: &str = "INSERT INTO postings (key, value) VALUES (?1, ?2)
     ON CONFLICT(key) DO UPDATE SET value = excluded.value";
const DELETE: &str = "DELETE FROM postings WHERE key = ?1";

/// SQLite table used as an ordered key-value store (BLOB keys compare
/// bytewise, so range scans follow key order).
pub struct SqliteStore {
    conn: Mutex<Connection>,
    options: StoreOptions,
}

impl SqliteStore {
    pub fn open(path: &Path, options: StoreOptions) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::configure(&conn, options)?;
        debug!(path = %path.display(), "sqlite store ready");
        Ok(SqliteStore { conn: Mutex::new(conn), options })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory(options: StoreOptions) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn, options)?;
        Ok(SqliteStore { conn: Mutex::new(conn), options })
    }

    fn configure(conn: &Connection, options: StoreOptions) -> Result<()> {
        let synchronous = if options.durable { "FULL" } else { "NORMAL" };
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = {};
             PRAGMA temp_store = MEMORY;
             CREATE TABLE IF NOT EXISTS postings (
                 key BLOB PRIMARY KEY,
                 value BLOB NOT NULL
             ) WITHOUT ROWID;",
            synchronous
        ))?;
        Ok(())
    }
}

impl PostingsStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let conn = self.conn.lock();
        let found: Option<Vec<u8>> = conn
            .query_row("SELECT value FROM postings WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        found.ok_or_else(|| Error::not_found(format!("key {}", hex::encode(key))))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.options.check_writable(self.name())?;
        self.conn.lock().execute(UPSERT, params![key, value])?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.options.check_writable(self.name())?;
        self.conn.lock().execute(DELETE, params![key])?;
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let conn = self.conn.lock();
        let mut out = Vec::new();
        match prefix_upper_bound(prefix) {
            Some(upper) => {
                let mut stmt = conn.prepare_cached(
                    "SELECT key, value FROM postings WHERE key >= ?1 AND key < ?2 ORDER BY key",
                )?;
                let rows = stmt.query_map(params![prefix, upper], |row| Ok((row.get(0)?, row.get(1)?)))?;
                for row in rows {
                    out.push(row?);
                }
            }
            None => {
                let mut stmt =
                    conn.prepare_cached("SELECT key, value FROM postings WHERE key >= ?1 ORDER BY key")?;
                let rows = stmt.query_map(params![prefix], |row| Ok((row.get(0)?, row.get(1)?)))?;
                for row in rows {
                    out.push(row?);
                }
            }
        }
        Ok(out)
    }

    fn write_batch(&self, ops: &[BatchOp]) -> Result<()> {
        self.options.check_writable(self.name())?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut upsert = tx.prepare_cached(UPSERT)?;
            let mut delete = tx.prepare_cached(DELETE)?;
            for op in ops {
                match op {
                    BatchOp::Set(k, v) => {
                        upsert.execute(params![k, v])?;
                    }
                    BatchOp::Delete(k) => {
                        delete.execute(params![k])?;
                    }
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        if self.options.read_only {
            return Ok(());
        }
        self.conn.lock().execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }

    fn compact(&self) -> Result<()> {
        if self.options.read_only {
            return Ok(());
        }
        self.conn.lock().execute_batch("VACUUM;")?;
        debug!("sqlite vacuum complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use tempfile::tempdir;

    #[test]
    fn test_upsert_overwrites() {
        let store = SqliteStore::open_in_memory(StoreOptions::default()).unwrap();
        store.set(b"k", b"1").unwrap();
        store.set(b"k", b"2").unwrap();
        assert_eq!(store.get(b"k").unwrap(), b"2".to_vec());
        assert!(store.get(b"missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_scan_prefix_binary_keys() {
        let store = SqliteStore::open_in_memory(StoreOptions::default()).unwrap();
        store
            .write_batch(&[
                BatchOp::Set(vec![1, 0xFF, 2], b"a".to_vec()),
                BatchOp::Set(vec![1, 0xFF, 1], b"b".to_vec()),
                BatchOp::Set(vec![2, 0], b"c".to_vec()),
                BatchOp::Delete(vec![2, 0]),
            ])
            .unwrap();
        let found = store.scan_prefix(&[1, 0xFF]).unwrap();
        assert_eq!(found, vec![(vec![1, 0xFF, 1], b"b".to_vec()), (vec![1, 0xFF, 2], b"a".to_vec())]);
        assert!(store.scan_prefix(&[2]).unwrap().is_empty());
    }

    #[test]
    fn test_file_store_vacuum_and_read_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("idx.sqlite");
        {
            let store = SqliteStore::open(&path, StoreOptions { read_only: false, durable: true }).unwrap();
            store.set(b"k", b"v").unwrap();
            store.flush().unwrap();
            store.compact().unwrap();
        }
        let store = SqliteStore::open(&path, StoreOptions { read_only: true, durable: false }).unwrap();
        assert_eq!(store.get(b"k").unwrap(), b"v".to_vec());
        assert_eq!(store.delete(b"k").unwrap_err().kind, ErrorKind::ReadOnly);
    }
}
