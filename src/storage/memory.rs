use std::collections::BTreeMap;
use std::ops::Bound;
use parking_lot::RwLock;
use crate::core::error::{Error, Result};
use crate::storage::keys::prefix_upper_bound;
use crate::storage::{BatchOp, PostingsStore, StoreOptions};

/// Process-local ordered map; the default driver and the one tests use.
pub struct MemoryStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    options: StoreOptions,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_options(StoreOptions::default())
    }

    pub fn with_options(options: StoreOptions) -> Self {
        MemoryStore {
            map: RwLock::new(BTreeMap::new()),
            options,
        }
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PostingsStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.map
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("key {}", hex::encode(key))))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.options.check_writable(self.name())?;
        self.map.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.options.check_writable(self.name())?;
        self.map.write().remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let map = self.map.read();
        let upper = match prefix_upper_bound(prefix) {
            Some(upper) => Bound::Excluded(upper),
            None => Bound::Unbounded,
        };
        Ok(map
            .range((Bound::Included(prefix.to_vec()), upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn write_batch(&self, ops: &[BatchOp]) -> Result<()> {
        self.options.check_writable(self.name())?;
        let mut map = self.map.write();
        for op in ops {
            match op {
                BatchOp::Set(k, v) => {
                    map.insert(k.clone(), v.clone());
                }
                BatchOp::Delete(k) => {
                    map.remove(k);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn test_missing_key_is_not_found() {
        let store = MemoryStore::new();
        assert!(store.get(b"nope").unwrap_err().is_not_found());
        assert_eq!(store.get_opt(b"nope").unwrap(), None);
    }

    #[test]
    fn test_scan_prefix_is_ordered_and_bounded() {
        let store = MemoryStore::new();
        store.set(b"ab2", b"2").unwrap();
        store.set(b"ab1", b"1").unwrap();
        store.set(b"ac", b"x").unwrap();
        store.set(b"a", b"y").unwrap();
        let keys: Vec<Vec<u8>> = store.scan_prefix(b"ab").unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"ab1".to_vec(), b"ab2".to_vec()]);
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let store = MemoryStore::with_options(StoreOptions { read_only: true, durable: false });
        assert_eq!(store.set(b"k", b"v").unwrap_err().kind, ErrorKind::ReadOnly);
        assert_eq!(store.delete(b"k").unwrap_err().kind, ErrorKind::ReadOnly);
    }
}
