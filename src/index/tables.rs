use std::sync::Arc;
use sha2::{Digest, Sha256};
use crate::core::error::Result;
use crate::core::types::Value;
use crate::index::posting::PostingList;
use crate::storage::keys::{self, Namespace, Table, VALUE_HASH_LEN};
use crate::storage::{BatchOp, PostingsStore};

/// Typed view of the three logical tables (stub index, token postings,
/// attribute-value postings) inside one namespace of a postings store.
///
/// Callers serialise mutation through their own index lock; the counters here
/// are read-modify-write.
#[derive(Clone)]
pub struct PostingsTables {
    store: Arc<dyn PostingsStore>,
    ns: Namespace,
}

/// One distinct value of an attribute with the stubs that carry it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuePostings {
    pub slot: u32,
    pub value: Value,
    pub postings: PostingList,
}

impl PostingsTables {
    pub fn new(store: Arc<dyn PostingsStore>, ns: Namespace) -> Self {
        PostingsTables { store, ns }
    }

    pub fn store(&self) -> &Arc<dyn PostingsStore> {
        &self.store
    }

    // ---- stub index ----

    pub fn stub_index(&self, shasum: &str) -> Result<Option<u32>> {
        match self.store.get_opt(&keys::stub_index_key(self.ns, shasum))? {
            Some(bytes) => Ok(Some(keys::decode_u32(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Existing index for `shasum`, or the next sequential one.
    pub fn ensure_stub_index(&self, shasum: &str) -> Result<u32> {
        if let Some(index) = self.stub_index(shasum)? {
            return Ok(index);
        }
        let counter = keys::next_stub_key(self.ns);
        let index = match self.store.get_opt(&counter)? {
            Some(bytes) => keys::decode_u32(&bytes)?,
            None => 0,
        };
        self.store.set(&keys::stub_index_key(self.ns, shasum), &keys::encode_u32(index))?;
        self.store.set(&keys::stub_shasum_key(self.ns, index), shasum.as_bytes())?;
        self.store.set(&counter, &keys::encode_u32(index + 1))?;
        Ok(index)
    }

    /// Drops both directions of the mapping; a later `ensure_stub_index`
    /// hands out a fresh index.
    pub fn forget_stub(&self, shasum: &str) -> Result<Option<u32>> {
        let Some(index) = self.stub_index(shasum)? else {
            return Ok(None);
        };
        self.store.delete(&keys::stub_index_key(self.ns, shasum))?;
        self.store.delete(&keys::stub_shasum_key(self.ns, index))?;
        Ok(Some(index))
    }

    /// Deletes every key of this namespace, counters included.
    pub fn clear(&self) -> Result<usize> {
        let ops: Vec<BatchOp> = self
            .store
            .scan_prefix(&keys::namespace_prefix(self.ns))?
            .into_iter()
            .map(|(key, _)| BatchOp::Delete(key))
            .collect();
        self.store.write_batch(&ops)?;
        Ok(ops.len())
    }

    pub fn shasum(&self, index: u32) -> Result<String> {
        let bytes = self.store.get(&keys::stub_shasum_key(self.ns, index))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn shasums(&self, indices: impl IntoIterator<Item = u32>) -> Result<Vec<String>> {
        indices.into_iter().map(|i| self.shasum(i)).collect()
    }

    // ---- token postings ----

    pub fn token_postings(&self, token: &str) -> Result<PostingList> {
        self.read_postings(&keys::token_key(self.ns, token)?)
    }

    pub fn add_token(&self, token: &str, stub: u32) -> Result<bool> {
        let key = keys::token_key(self.ns, token)?;
        let mut postings = self.read_postings(&key)?;
        if !postings.insert(stub) {
            return Ok(false);
        }
        self.write_postings(&key, &postings)?;
        Ok(true)
    }

    pub fn remove_token(&self, token: &str, stub: u32) -> Result<bool> {
        let key = keys::token_key(self.ns, token)?;
        let mut postings = self.read_postings(&key)?;
        if !postings.remove(stub) {
            return Ok(false);
        }
        self.write_postings(&key, &postings)?;
        Ok(true)
    }

    pub fn tokens(&self) -> Result<Vec<String>> {
        let prefix = keys::table_prefix(self.ns, Table::Token);
        self.store
            .scan_prefix(&prefix)?
            .into_iter()
            .map(|(key, _)| keys::decode_name(&key, &prefix))
            .collect()
    }

    /// Every token whose postings contain `stub`.
    pub fn tokens_of(&self, stub: u32) -> Result<Vec<String>> {
        let prefix = keys::table_prefix(self.ns, Table::Token);
        let mut out = Vec::new();
        for (key, blob) in self.store.scan_prefix(&prefix)? {
            if PostingList::decode(&blob)?.contains(stub) {
                out.push(keys::decode_name(&key, &prefix)?);
            }
        }
        Ok(out)
    }

    // ---- summaries ----

    pub fn set_summary(&self, shasum: &str, summary: &[u8]) -> Result<()> {
        self.store.set(&keys::summary_key(self.ns, shasum), summary)
    }

    pub fn summary(&self, shasum: &str) -> Result<Option<Vec<u8>>> {
        self.store.get_opt(&keys::summary_key(self.ns, shasum))
    }

    pub fn remove_summary(&self, shasum: &str) -> Result<()> {
        self.store.delete(&keys::summary_key(self.ns, shasum))
    }

    // ---- attribute value postings ----

    /// Posts `stub` under `value` of `attr`, allocating a slot for a value the
    /// attribute has not seen before.
    pub fn add_value(&self, attr: &str, value: &Value, stub: u32) -> Result<bool> {
        let hash = value_hash(value)?;
        let slot_key = keys::value_slot_key(self.ns, attr, &hash)?;
        let slot = match self.store.get_opt(&slot_key)? {
            Some(bytes) => keys::decode_u32(&bytes)?,
            None => {
                let counter = keys::next_slot_key(self.ns, attr)?;
                let slot = match self.store.get_opt(&counter)? {
                    Some(bytes) => keys::decode_u32(&bytes)?,
                    None => 0,
                };
                self.store.set(&slot_key, &keys::encode_u32(slot))?;
                self.store.set(&keys::slot_value_key(self.ns, attr, slot)?, &bincode::serialize(value)?)?;
                self.store.set(&counter, &keys::encode_u32(slot + 1))?;
                slot
            }
        };

        let postings_key = keys::slot_postings_key(self.ns, attr, slot)?;
        let mut postings = self.read_postings(&postings_key)?;
        if !postings.insert(stub) {
            return Ok(false);
        }
        self.write_postings(&postings_key, &postings)?;
        Ok(true)
    }

    /// Drops `stub` from `value`'s postings; a value left without stubs loses
    /// its slot entries (slot numbers are never reused).
    pub fn remove_value(&self, attr: &str, value: &Value, stub: u32) -> Result<bool> {
        let hash = value_hash(value)?;
        let slot_key = keys::value_slot_key(self.ns, attr, &hash)?;
        let Some(bytes) = self.store.get_opt(&slot_key)? else {
            return Ok(false);
        };
        let slot = keys::decode_u32(&bytes)?;
        let postings_key = keys::slot_postings_key(self.ns, attr, slot)?;
        let mut postings = self.read_postings(&postings_key)?;
        if !postings.remove(stub) {
            return Ok(false);
        }
        if postings.is_empty() {
            self.store.delete(&postings_key)?;
            self.store.delete(&keys::slot_value_key(self.ns, attr, slot)?)?;
            self.store.delete(&slot_key)?;
        } else {
            self.write_postings(&postings_key, &postings)?;
        }
        Ok(true)
    }

    /// All live values of `attr` in slot (first-seen) order.
    pub fn values(&self, attr: &str) -> Result<Vec<ValuePostings>> {
        let value_prefix = keys::attribute_prefix(self.ns, Table::SlotValue, attr)?;
        let postings_prefix = keys::attribute_prefix(self.ns, Table::SlotPostings, attr)?;
        let postings: Vec<(Vec<u8>, Vec<u8>)> = self.store.scan_prefix(&postings_prefix)?;

        let mut out = Vec::new();
        let mut cursor = postings.iter().peekable();
        for (key, encoded) in self.store.scan_prefix(&value_prefix)? {
            let slot = keys::decode_trailing_u32(&key, &value_prefix)?;
            let value: Value = bincode::deserialize(&encoded)?;

            // both scans are in slot order
            let mut list = PostingList::new();
            while let Some((pkey, blob)) = cursor.peek() {
                let pslot = keys::decode_trailing_u32(pkey, &postings_prefix)?;
                if pslot < slot {
                    cursor.next();
                    continue;
                }
                if pslot == slot {
                    list = PostingList::decode(blob)?;
                    cursor.next();
                }
                break;
            }
            if !list.is_empty() {
                out.push(ValuePostings { slot, value, postings: list });
            }
        }
        Ok(out)
    }

    /// Attribute keys that ever received a value.
    pub fn attributes(&self) -> Result<Vec<String>> {
        let prefix = keys::table_prefix(self.ns, Table::NextSlot);
        self.store
            .scan_prefix(&prefix)?
            .into_iter()
            .map(|(key, _)| keys::decode_name(&key, &prefix))
            .collect()
    }

    fn read_postings(&self, key: &[u8]) -> Result<PostingList> {
        match self.store.get_opt(key)? {
            Some(blob) => PostingList::decode(&blob),
            None => Ok(PostingList::new()),
        }
    }

    fn write_postings(&self, key: &[u8], postings: &PostingList) -> Result<()> {
        if postings.is_empty() {
            return self.store.delete(key);
        }
        self.store.set(key, &postings.encode()?)
    }
}

/// First 16 bytes of SHA-256 over the bincode form; distinct variants never
/// share a hash because the variant tag is part of the encoding.
pub fn value_hash(value: &Value) -> Result<[u8; VALUE_HASH_LEN]> {
    let digest = Sha256::digest(bincode::serialize(value)?);
    let mut hash = [0u8; VALUE_HASH_LEN];
    hash.copy_from_slice(&digest[..VALUE_HASH_LEN]);
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;

    fn tables() -> PostingsTables {
        PostingsTables::new(Arc::new(MemoryStore::new()), Namespace::Context)
    }

    #[test]
    fn test_stub_index_is_stable_and_sequential() {
        let t = tables();
        assert_eq!(t.ensure_stub_index("aaa").unwrap(), 0);
        assert_eq!(t.ensure_stub_index("bbb").unwrap(), 1);
        assert_eq!(t.ensure_stub_index("aaa").unwrap(), 0);
        assert_eq!(t.shasum(1).unwrap(), "bbb");
        assert_eq!(t.stub_index("zzz").unwrap(), None);

        assert_eq!(t.forget_stub("aaa").unwrap(), Some(0));
        assert_eq!(t.stub_index("aaa").unwrap(), None);
        assert_eq!(t.ensure_stub_index("aaa").unwrap(), 2);
    }

    #[test]
    fn test_values_keep_first_seen_order() {
        let t = tables();
        t.add_value("type", &Value::from("post"), 0).unwrap();
        t.add_value("type", &Value::from("page"), 2).unwrap();
        t.add_value("type", &Value::from("post"), 1).unwrap();

        let values = t.values("type").unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].value, Value::from("post"));
        assert_eq!(values[0].postings.stubs, vec![0, 1]);
        assert_eq!(values[1].value, Value::from("page"));
    }

    #[test]
    fn test_removing_last_stub_drops_value() {
        let t = tables();
        t.add_value("type", &Value::from("post"), 0).unwrap();
        t.add_value("type", &Value::from("page"), 1).unwrap();
        assert!(t.remove_value("type", &Value::from("post"), 0).unwrap());
        assert!(!t.remove_value("type", &Value::from("post"), 0).unwrap());

        let values = t.values("type").unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].slot, 1);

        // a re-added value gets a fresh slot
        t.add_value("type", &Value::from("post"), 3).unwrap();
        assert_eq!(t.values("type").unwrap()[1].slot, 2);
    }

    #[test]
    fn test_same_text_different_variant_are_distinct_values() {
        let t = tables();
        t.add_value("weight", &Value::Int(1), 0).unwrap();
        t.add_value("weight", &Value::from("1"), 1).unwrap();
        assert_eq!(t.values("weight").unwrap().len(), 2);
    }

    #[test]
    fn test_clear_stays_in_namespace() {
        let store: Arc<dyn PostingsStore> = Arc::new(MemoryStore::new());
        let context = PostingsTables::new(store.clone(), Namespace::Context);
        let keyword = PostingsTables::new(store, Namespace::Keyword);
        context.ensure_stub_index("aaa").unwrap();
        context.add_value("type", &Value::from("post"), 0).unwrap();
        keyword.add_token("rust", 0).unwrap();

        assert!(context.clear().unwrap() > 0);
        assert!(context.attributes().unwrap().is_empty());
        assert_eq!(context.stub_index("aaa").unwrap(), None);
        assert_eq!(context.ensure_stub_index("bbb").unwrap(), 0);
        assert_eq!(keyword.tokens().unwrap(), vec!["rust".to_string()]);
    }

    #[test]
    fn test_tokens() {
        let t = PostingsTables::new(Arc::new(MemoryStore::new()), Namespace::Keyword);
        assert!(t.add_token("rust", 0).unwrap());
        assert!(!t.add_token("rust", 0).unwrap());
        t.add_token("index", 1).unwrap();
        assert_eq!(t.tokens().unwrap(), vec!["index".to_string(), "rust".to_string()]);
        assert_eq!(t.tokens_of(1).unwrap(), vec!["index".to_string()]);
        assert!(t.remove_token("index", 1).unwrap());
        assert_eq!(t.tokens().unwrap(), vec!["rust".to_string()]);
    }
}
