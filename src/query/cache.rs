use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use parking_lot::Mutex;
use regex::Regex;
use crate::core::error::{ParseError, Result};
use crate::query::ast::{RegexLiteral, Selection, Statement};
use crate::query::parser::{parse_selection, parse_statement};

fn capacity(size_limit: usize) -> NonZeroUsize {
    NonZeroUsize::new(size_limit).unwrap_or(NonZeroUsize::MIN)
}

/// Compiled statements and selections keyed by their trimmed source text.
/// Bounded and owned by one engine; failed compilations are not cached.
pub struct QueryCache {
    statements: Mutex<LruCache<String, Arc<Statement>>>,
    selections: Mutex<LruCache<String, Arc<Selection>>>,
    pub size_limit: usize,
    hit_count: AtomicUsize,
    miss_count: AtomicUsize,
}

impl QueryCache {
    pub fn new(size_limit: usize) -> Self {
        QueryCache {
            statements: Mutex::new(LruCache::new(capacity(size_limit))),
            selections: Mutex::new(LruCache::new(capacity(size_limit))),
            size_limit,
            hit_count: AtomicUsize::new(0),
            miss_count: AtomicUsize::new(0),
        }
    }

    pub fn statement(&self, text: &str) -> std::result::Result<Arc<Statement>, ParseError> {
        let key = text.trim();
        if let Some(hit) = self.statements.lock().get(key) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return Ok(hit.clone());
        }
        self.miss_count.fetch_add(1, Ordering::Relaxed);
        let compiled = Arc::new(parse_statement(key)?);
        self.statements.lock().put(key.to_string(), compiled.clone());
        Ok(compiled)
    }

    pub fn selection(&self, text: &str) -> std::result::Result<Arc<Selection>, ParseError> {
        let key = text.trim();
        if let Some(hit) = self.selections.lock().get(key) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return Ok(hit.clone());
        }
        self.miss_count.fetch_add(1, Ordering::Relaxed);
        let compiled = Arc::new(parse_selection(key)?);
        self.selections.lock().put(key.to_string(), compiled.clone());
        Ok(compiled)
    }

    pub fn clear(&self) {
        self.statements.lock().clear();
        self.selections.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            size: self.statements.lock().len() + self.selections.lock().len(),
            capacity: self.size_limit * 2,
        }
    }
}

/// Compiled regular expressions keyed by pattern and flags.
pub struct RegexCache {
    cache: Mutex<LruCache<String, Regex>>,
    pub size_limit: usize,
}

impl RegexCache {
    pub fn new(size_limit: usize) -> Self {
        RegexCache {
            cache: Mutex::new(LruCache::new(capacity(size_limit))),
            size_limit,
        }
    }

    pub fn get(&self, literal: &RegexLiteral) -> Result<Regex> {
        let source = literal.source();
        if let Some(re) = self.cache.lock().get(&source) {
            return Ok(re.clone());
        }
        let re = Regex::new(&source)?;
        self.cache.lock().put(source, re.clone());
        Ok(re)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hit_count: usize,
    pub miss_count: usize,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_text_compiles_once() {
        let cache = QueryCache::new(8);
        let a = cache.statement(r#"(.Type == "post")"#).unwrap();
        let b = cache.statement(r#"  (.Type == "post")  "#).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let stats = cache.stats();
        assert_eq!((stats.hit_count, stats.miss_count), (1, 1));
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_errors_not_cached() {
        let cache = QueryCache::new(8);
        assert!(cache.statement("(.Type = 1)").is_err());
        assert!(cache.statement("(.Type = 1)").is_err());
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn test_bounded() {
        let cache = QueryCache::new(2);
        for i in 0..5 {
            cache.statement(&format!("(.N == \"{}\")", i)).unwrap();
        }
        assert_eq!(cache.stats().size, 2);
    }

    #[test]
    fn test_regex_cache() {
        let cache = RegexCache::new(1);
        let lit = RegexLiteral { pattern: "^a".to_string(), flags: "i".to_string() };
        assert!(cache.get(&lit).unwrap().is_match("Abc"));
        assert_eq!(cache.len(), 1);
        let other = RegexLiteral { pattern: "b$".to_string(), flags: String::new() };
        cache.get(&other).unwrap();
        assert_eq!(cache.len(), 1);
    }
}
