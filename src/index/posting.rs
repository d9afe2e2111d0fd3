use roaring::RoaringBitmap;
use crate::compression::delta::DeltaEncoder;
use crate::core::error::Result;

/// Posting list for a token or attribute value.
/// Note: sorted by stub index and free of duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingList {
    pub stubs: Vec<u32>,
}

impl PostingList {
    pub fn new() -> Self {
        PostingList { stubs: Vec::new() }
    }

    /// Returns false when the stub was already posted.
    pub fn insert(&mut self, stub: u32) -> bool {
        match self.stubs.binary_search(&stub) {
            Ok(_) => false,
            Err(pos) => {
                self.stubs.insert(pos, stub);
                true
            }
        }
    }

    pub fn remove(&mut self, stub: u32) -> bool {
        match self.stubs.binary_search(&stub) {
            Ok(pos) => {
                self.stubs.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    pub fn contains(&self, stub: u32) -> bool {
        self.stubs.binary_search(&stub).is_ok()
    }

    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.stubs.iter().copied()
    }

    pub fn intersects(&self, bitmap: &RoaringBitmap) -> bool {
        self.stubs.iter().any(|s| bitmap.contains(*s))
    }

    pub fn to_bitmap(&self) -> RoaringBitmap {
        self.stubs.iter().copied().collect()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        DeltaEncoder::encode_sorted(&self.stubs)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(PostingList { stubs: DeltaEncoder::decode_sorted(data)? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_sorted_set() {
        let mut list = PostingList::new();
        assert!(list.insert(5));
        assert!(list.insert(1));
        assert!(!list.insert(5));
        assert_eq!(list.stubs, vec![1, 5]);
        assert!(list.remove(1));
        assert!(!list.remove(1));
        assert_eq!(list.stubs, vec![5]);
    }

    #[test]
    fn test_encoded_blob_decodes() {
        let list = PostingList { stubs: vec![2, 300, 70_000] };
        let decoded = PostingList::decode(&list.encode().unwrap()).unwrap();
        assert_eq!(decoded, list);
    }

    #[test]
    fn test_bitmap_view() {
        let list = PostingList { stubs: vec![1, 9] };
        let mut other = RoaringBitmap::new();
        other.insert(9);
        assert!(list.intersects(&other));
        assert_eq!(list.to_bitmap().len(), 2);
    }
}
