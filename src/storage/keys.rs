//! Composite key encoding shared by every storage driver.
//!
//! Layout: `[namespace][table][payload...]`. Attribute keys and tokens never
//! contain `0x00`, which separates them from the trailing fixed-width parts.
//! Integers are big-endian so prefix scans come back in numeric order.

use crate::core::error::{Error, ErrorKind, Result};

/// Logical index a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Context,
    Keyword,
}

impl Namespace {
    fn byte(self) -> u8 {
        match self {
            Namespace::Context => b'c',
            Namespace::Keyword => b'k',
        }
    }
}

/// Table tags within a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Table {
    StubIndex = 0x01,     // shasum -> stub index
    StubShasum = 0x02,    // stub index -> shasum
    NextStub = 0x03,      // counter
    Token = 0x10,         // token -> postings
    Summary = 0x11,       // shasum -> document summary
    ValueSlot = 0x20,     // key \0 value-hash -> slot
    SlotPostings = 0x21,  // key \0 slot -> postings
    SlotValue = 0x22,     // key \0 slot -> encoded value
    NextSlot = 0x23,      // key -> counter
}

const SEP: u8 = 0x00;

pub const VALUE_HASH_LEN: usize = 16;

fn head(ns: Namespace, table: Table, capacity: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + capacity);
    key.push(ns.byte());
    key.push(table as u8);
    key
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.as_bytes().contains(&SEP) {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("invalid index key name {:?}", name),
        ));
    }
    Ok(())
}

/// Prefix shared by every key of one logical index.
pub fn namespace_prefix(ns: Namespace) -> Vec<u8> {
    vec![ns.byte()]
}

pub fn table_prefix(ns: Namespace, table: Table) -> Vec<u8> {
    head(ns, table, 0)
}

pub fn stub_index_key(ns: Namespace, shasum: &str) -> Vec<u8> {
    let mut key = head(ns, Table::StubIndex, shasum.len());
    key.extend_from_slice(shasum.as_bytes());
    key
}

pub fn stub_shasum_key(ns: Namespace, index: u32) -> Vec<u8> {
    let mut key = head(ns, Table::StubShasum, 4);
    key.extend_from_slice(&index.to_be_bytes());
    key
}

pub fn next_stub_key(ns: Namespace) -> Vec<u8> {
    head(ns, Table::NextStub, 0)
}

pub fn token_key(ns: Namespace, token: &str) -> Result<Vec<u8>> {
    check_name(token)?;
    let mut key = head(ns, Table::Token, token.len());
    key.extend_from_slice(token.as_bytes());
    Ok(key)
}

pub fn summary_key(ns: Namespace, shasum: &str) -> Vec<u8> {
    let mut key = head(ns, Table::Summary, shasum.len());
    key.extend_from_slice(shasum.as_bytes());
    key
}

/// `[ns][table] key \0` - the prefix every per-attribute table shares.
pub fn attribute_prefix(ns: Namespace, table: Table, attr: &str) -> Result<Vec<u8>> {
    check_name(attr)?;
    let mut key = head(ns, table, attr.len() + 1);
    key.extend_from_slice(attr.as_bytes());
    key.push(SEP);
    Ok(key)
}

pub fn value_slot_key(ns: Namespace, attr: &str, value_hash: &[u8; VALUE_HASH_LEN]) -> Result<Vec<u8>> {
    let mut key = attribute_prefix(ns, Table::ValueSlot, attr)?;
    key.extend_from_slice(value_hash);
    Ok(key)
}

pub fn slot_postings_key(ns: Namespace, attr: &str, slot: u32) -> Result<Vec<u8>> {
    let mut key = attribute_prefix(ns, Table::SlotPostings, attr)?;
    key.extend_from_slice(&slot.to_be_bytes());
    Ok(key)
}

pub fn slot_value_key(ns: Namespace, attr: &str, slot: u32) -> Result<Vec<u8>> {
    let mut key = attribute_prefix(ns, Table::SlotValue, attr)?;
    key.extend_from_slice(&slot.to_be_bytes());
    Ok(key)
}

pub fn next_slot_key(ns: Namespace, attr: &str) -> Result<Vec<u8>> {
    check_name(attr)?;
    let mut key = head(ns, Table::NextSlot, attr.len());
    key.extend_from_slice(attr.as_bytes());
    Ok(key)
}

/// Strips a known prefix and returns the UTF-8 remainder.
pub fn decode_name(key: &[u8], prefix: &[u8]) -> Result<String> {
    let rest = key.strip_prefix(prefix).ok_or_else(|| corrupt(key))?;
    String::from_utf8(rest.to_vec()).map_err(|_| corrupt(key))
}

/// Trailing big-endian u32 after a known prefix.
pub fn decode_trailing_u32(key: &[u8], prefix: &[u8]) -> Result<u32> {
    let rest = key.strip_prefix(prefix).ok_or_else(|| corrupt(key))?;
    let bytes: [u8; 4] = rest.try_into().map_err(|_| corrupt(key))?;
    Ok(u32::from_be_bytes(bytes))
}

pub fn encode_u32(value: u32) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

pub fn decode_u32(bytes: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = bytes.try_into().map_err(|_| {
        Error::new(ErrorKind::Parse, format!("expected 4-byte counter, got {} bytes", bytes.len()))
    })?;
    Ok(u32::from_be_bytes(bytes))
}

/// Smallest key strictly greater than every key starting with `prefix`,
/// or `None` when the prefix is all `0xFF`.
pub fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < u8::MAX {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}

fn corrupt(key: &[u8]) -> Error {
    Error::new(ErrorKind::Parse, format!("malformed index key {}", hex::encode(key)))
}
