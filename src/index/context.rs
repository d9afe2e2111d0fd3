use std::sync::Arc;
use parking_lot::{RwLock, RwLockReadGuard};
use tracing::debug;
use crate::core::error::Result;
use crate::core::types::Value;
use crate::index::tables::PostingsTables;
use crate::page::{Page, Stub, UNINDEXED_KEYS};
use crate::storage::keys::Namespace;
use crate::storage::PostingsStore;

/// One attribute value and the stubs carrying it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueStubs {
    pub value: Value,
    pub stubs: Vec<String>,
}

/// Attribute postings: `key → value → stubs`, the index PQL runs against.
pub struct ContextIndex {
    tables: RwLock<PostingsTables>,
}

impl ContextIndex {
    pub fn new(store: Arc<dyn PostingsStore>) -> Self {
        ContextIndex {
            tables: RwLock::new(PostingsTables::new(store, Namespace::Context)),
        }
    }

    /// Shared view for query evaluation; held for the whole query.
    pub fn read(&self) -> RwLockReadGuard<'_, PostingsTables> {
        self.tables.read()
    }

    /// Posts every attribute of `page` except content and frontmatter; list
    /// values post once per element. Returns the number of new postings.
    pub fn add_to_index(&self, stub: &Stub, page: &Page) -> Result<usize> {
        let tables = self.tables.write();
        if tables.stub_index(&stub.shasum)?.is_some() {
            debug!(shasum = %stub.shasum, "context already indexed");
            return Ok(0);
        }
        let index = tables.ensure_stub_index(&stub.shasum)?;

        let mut added = 0;
        for (key, value) in &page.context {
            if UNINDEXED_KEYS.contains(&key.as_str()) {
                continue;
            }
            for scalar in value.fan_out() {
                if tables.add_value(key, scalar, index)? {
                    added += 1;
                }
            }
        }
        debug!(shasum = %stub.shasum, postings = added, "context indexed");
        Ok(added)
    }

    /// Removes the stub from every value of every attribute.
    pub fn remove_from_index(&self, stub: &Stub) -> Result<usize> {
        let tables = self.tables.write();
        let Some(index) = tables.stub_index(&stub.shasum)? else {
            return Ok(0);
        };

        let mut removed = 0;
        for key in tables.attributes()? {
            for entry in tables.values(&key)? {
                if entry.postings.contains(index) && tables.remove_value(&key, &entry.value, index)? {
                    removed += 1;
                }
            }
        }
        tables.forget_stub(&stub.shasum)?;
        debug!(shasum = %stub.shasum, postings = removed, "context removed");
        Ok(removed)
    }

    /// Every value of `key` with the stubs carrying it, in first-seen order.
    pub fn get_page_context_value_stubs(&self, key: &str) -> Result<Vec<ValueStubs>> {
        let tables = self.tables.read();
        tables
            .values(key)?
            .into_iter()
            .map(|entry| {
                Ok(ValueStubs {
                    value: entry.value,
                    stubs: tables.shasums(entry.postings.iter())?,
                })
            })
            .collect()
    }

    /// Drops every attribute posting and stub assignment.
    pub fn clear(&self) -> Result<usize> {
        let removed = self.tables.write().clear()?;
        debug!(keys = removed, "context index cleared");
        Ok(removed)
    }

    /// Attribute keys that have been indexed.
    pub fn keys(&self) -> Result<Vec<String>> {
        self.tables.read().attributes()
    }
}
