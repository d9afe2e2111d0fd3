use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use parking_lot::Mutex;
use tracing::{debug, info};
use crate::core::error::{Error, Result};
use crate::storage::keys::prefix_upper_bound;
use crate::storage::{BatchOp, PostingsStore};

/// Write-back buffer in front of a file-backed driver.
///
/// Writes collect in an ordered overlay and reach the driver as one batch
/// every `batch_size` mutations; reads see the overlay first. After
/// `compact_every` flushed writes the driver is compacted.
pub struct BufferedStore {
    inner: Arc<dyn PostingsStore>,
    state: Mutex<BufferState>,
    batch_size: usize,
    compact_every: usize,
}

#[derive(Default)]
struct BufferState {
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    since_compact: usize,
}

impl BufferedStore {
    pub fn new(inner: Arc<dyn PostingsStore>, batch_size: usize, compact_every: usize) -> Self {
        BufferedStore {
            inner,
            state: Mutex::new(BufferState::default()),
            batch_size: batch_size.max(1),
            compact_every,
        }
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn flush_locked(&self, state: &mut BufferState) -> Result<()> {
        if state.pending.is_empty() {
            return Ok(());
        }
        let ops: Vec<BatchOp> = state
            .pending
            .iter()
            .map(|(k, v)| match v {
                Some(v) => BatchOp::Set(k.clone(), v.clone()),
                None => BatchOp::Delete(k.clone()),
            })
            .collect();
        // the overlay stays authoritative until the driver accepts the batch
        self.inner.write_batch(&ops)?;
        state.pending.clear();
        state.since_compact += ops.len();
        debug!(store = self.inner.name(), ops = ops.len(), "flushed write batch");

        if self.compact_every > 0 && state.since_compact >= self.compact_every {
            info!(store = self.inner.name(), writes = state.since_compact, "compacting store");
            self.inner.compact()?;
            state.since_compact = 0;
        }
        Ok(())
    }

    fn stage(&self, key: &[u8], value: Option<Vec<u8>>) -> Result<()> {
        let mut state = self.state.lock();
        state.pending.insert(key.to_vec(), value);
        if state.pending.len() >= self.batch_size {
            self.flush_locked(&mut state)?;
        }
        Ok(())
    }
}

impl PostingsStore for BufferedStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let state = self.state.lock();
        match state.pending.get(key) {
            Some(Some(v)) => Ok(v.clone()),
            Some(None) => Err(Error::not_found(format!("key {}", hex::encode(key)))),
            None => self.inner.get(key),
        }
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.stage(key, Some(value.to_vec()))
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.stage(key, None)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let state = self.state.lock();
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self.inner.scan_prefix(prefix)?.into_iter().collect();

        let upper = match prefix_upper_bound(prefix) {
            Some(upper) => Bound::Excluded(upper),
            None => Bound::Unbounded,
        };
        for (k, v) in state.pending.range((Bound::Included(prefix.to_vec()), upper)) {
            match v {
                Some(v) => {
                    merged.insert(k.clone(), v.clone());
                }
                None => {
                    merged.remove(k);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    fn write_batch(&self, ops: &[BatchOp]) -> Result<()> {
        for op in ops {
            match op {
                BatchOp::Set(k, v) => self.stage(k, Some(v.clone()))?,
                BatchOp::Delete(k) => self.stage(k, None)?,
            }
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.flush_locked(&mut state)?;
        self.inner.flush()
    }

    fn compact(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.flush_locked(&mut state)?;
        state.since_compact = 0;
        self.inner.compact()
    }
}

impl Drop for BufferedStore {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if let Err(err) = self.flush_locked(&mut state) {
            tracing::warn!(store = self.inner.name(), error = %err, "dropping unflushed writes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;

    #[test]
    fn test_reads_see_pending_writes() {
        let inner = Arc::new(MemoryStore::new());
        let store = BufferedStore::new(inner.clone(), 100, 0);
        store.set(b"a", b"1").unwrap();
        assert_eq!(store.get(b"a").unwrap(), b"1".to_vec());
        assert!(inner.get(b"a").unwrap_err().is_not_found());
        store.flush().unwrap();
        assert_eq!(inner.get(b"a").unwrap(), b"1".to_vec());
    }

    #[test]
    fn test_flushes_at_batch_size() {
        let inner = Arc::new(MemoryStore::new());
        let store = BufferedStore::new(inner.clone(), 2, 0);
        store.set(b"a", b"1").unwrap();
        assert_eq!(inner.len(), 0);
        store.set(b"b", b"2").unwrap();
        assert_eq!(inner.len(), 2);
        assert_eq!(store.pending(), 0);
    }

    #[test]
    fn test_scan_merges_overlay_and_deletes() {
        let inner = Arc::new(MemoryStore::new());
        inner.set(b"p1", b"old").unwrap();
        inner.set(b"p2", b"keep").unwrap();
        let store = BufferedStore::new(inner, 100, 0);
        store.set(b"p1", b"new").unwrap();
        store.delete(b"p2").unwrap();
        store.set(b"p3", b"added").unwrap();
        let found = store.scan_prefix(b"p").unwrap();
        assert_eq!(found, vec![(b"p1".to_vec(), b"new".to_vec()), (b"p3".to_vec(), b"added".to_vec())]);
        assert!(store.get(b"p2").unwrap_err().is_not_found());
    }

    struct FailOnce {
        inner: MemoryStore,
        failed: std::sync::atomic::AtomicBool,
    }

    impl PostingsStore for FailOnce {
        fn name(&self) -> &str {
            "fail-once"
        }

        fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
            self.inner.get(key)
        }

        fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
            self.inner.set(key, value)
        }

        fn delete(&self, key: &[u8]) -> Result<()> {
            self.inner.delete(key)
        }

        fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
            self.inner.scan_prefix(prefix)
        }

        fn write_batch(&self, ops: &[BatchOp]) -> Result<()> {
            if !self.failed.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return Err(Error::backend("disk full"));
            }
            self.inner.write_batch(ops)
        }
    }

    #[test]
    fn test_failed_batch_keeps_pending_writes() {
        let inner = Arc::new(FailOnce {
            inner: MemoryStore::new(),
            failed: std::sync::atomic::AtomicBool::new(false),
        });
        let store = BufferedStore::new(inner.clone(), 2, 0);
        store.set(b"a", b"1").unwrap();
        let err = store.set(b"b", b"2").unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::Backend);

        assert_eq!(store.pending(), 2);
        assert_eq!(store.get(b"a").unwrap(), b"1".to_vec());
        assert_eq!(store.get(b"b").unwrap(), b"2".to_vec());

        store.flush().unwrap();
        assert_eq!(store.pending(), 0);
        assert_eq!(inner.get(b"a").unwrap(), b"1".to_vec());
        assert_eq!(inner.get(b"b").unwrap(), b"2".to_vec());
    }

    #[test]
    fn test_drop_flushes() {
        let inner = Arc::new(MemoryStore::new());
        {
            let store = BufferedStore::new(inner.clone(), 100, 0);
            store.set(b"a", b"1").unwrap();
        }
        assert_eq!(inner.get(b"a").unwrap(), b"1".to_vec());
    }
}
