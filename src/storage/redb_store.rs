use std::path::{Path, PathBuf};
use parking_lot::RwLock;
use redb::{Database, Durability, ReadableTable, TableDefinition};
use tracing::debug;
use crate::core::error::{Error, Result};
use crate::storage::{BatchOp, PostingsStore, StoreOptions};

const POSTINGS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("postings");

fn db_err<E: Into<redb::Error>>(err: E) -> Error {
    Error::from(err.into())
}

/// Single-file B-tree store; compaction needs exclusive access, hence the
/// outer lock.
pub struct RedbStore {
    db: RwLock<Database>,
    path: PathBuf,
    options: StoreOptions,
}

impl RedbStore {
    pub fn open(path: &Path, options: StoreOptions) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path).map_err(db_err)?;

        // the table has to exist before the first read transaction opens it
        let txn = db.begin_write().map_err(db_err)?;
        txn.open_table(POSTINGS).map_err(db_err)?;
        txn.commit().map_err(db_err)?;

        debug!(path = %path.display(), "redb store ready");
        Ok(RedbStore {
            db: RwLock::new(db),
            path: path.to_path_buf(),
            options,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut redb::Table<'_, &'static [u8], &'static [u8]>) -> Result<()>,
    {
        self.options.check_writable(self.name())?;
        let db = self.db.read();
        let mut txn = db.begin_write().map_err(db_err)?;
        txn.set_durability(if self.options.durable {
            Durability::Immediate
        } else {
            Durability::Eventual
        });
        {
            let mut table = txn.open_table(POSTINGS).map_err(db_err)?;
            apply(&mut table)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }
}

impl PostingsStore for RedbStore {
    fn name(&self) -> &str {
        "redb"
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let db = self.db.read();
        let txn = db.begin_read().map_err(db_err)?;
        let table = txn.open_table(POSTINGS).map_err(db_err)?;
        match table.get(key).map_err(db_err)? {
            Some(guard) => Ok(guard.value().to_vec()),
            None => Err(Error::not_found(format!("key {}", hex::encode(key)))),
        }
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write(|table| {
            table.insert(key, value).map_err(db_err)?;
            Ok(())
        })
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.write(|table| {
            table.remove(key).map_err(db_err)?;
            Ok(())
        })
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let db = self.db.read();
        let txn = db.begin_read().map_err(db_err)?;
        let table = txn.open_table(POSTINGS).map_err(db_err)?;
        let mut out = Vec::new();
        for item in table.range(prefix..).map_err(db_err)? {
            let (k, v) = item.map_err(db_err)?;
            let key = k.value();
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), v.value().to_vec()));
        }
        Ok(out)
    }

    fn write_batch(&self, ops: &[BatchOp]) -> Result<()> {
        self.write(|table| {
            for op in ops {
                match op {
                    BatchOp::Set(k, v) => {
                        table.insert(k.as_slice(), v.as_slice()).map_err(db_err)?;
                    }
                    BatchOp::Delete(k) => {
                        table.remove(k.as_slice()).map_err(db_err)?;
                    }
                }
            }
            Ok(())
        })
    }

    fn compact(&self) -> Result<()> {
        if self.options.read_only {
            return Ok(());
        }
        let compacted = self.db.write().compact().map_err(db_err)?;
        debug!(path = %self.path.display(), compacted, "redb compaction");
        Ok(())
    }
}
