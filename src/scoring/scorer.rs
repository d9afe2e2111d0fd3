use std::collections::{HashMap, HashSet};
use roaring::RoaringBitmap;
use crate::analysis::token::{Occur, QueryTerm};
use crate::core::error::Result;
use crate::index::tables::PostingsTables;

/// Weight added to every must-term hit so required matches always dominate.
pub const MUST_BOOST: f64 = 100.0;

/// Stub index with its accumulated relevance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredStub {
    pub index: u32,
    pub score: f64,
}

/// Scorer trait
pub trait Scorer: Send + Sync {
    /// Scores every qualifying stub; order is unspecified.
    fn score(&self, tables: &PostingsTables, terms: &[QueryTerm]) -> Result<Vec<ScoredStub>>;

    fn name(&self) -> &str;
}

/// Boolean must/should/not scorer.
///
/// With `n` terms, the term at position `i` weighs `n - i`: a should hit adds
/// `(n - i) / n`, a must hit adds `(n - i) * (1/n + 100)`. Not terms exclude
/// outright. When must terms exist only stubs hitting all of them qualify and
/// should hits merely add to their score.
#[derive(Debug, Default)]
pub struct BooleanScorer;

impl Scorer for BooleanScorer {
    fn score(&self, tables: &PostingsTables, terms: &[QueryTerm]) -> Result<Vec<ScoredStub>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let n = terms.len() as f64;
        let base = 1.0 / n;
        let multiplier = |i: usize| n - i as f64;

        let mut excluded = RoaringBitmap::new();
        for term in terms.iter().filter(|t| t.occur == Occur::MustNot) {
            excluded |= tables.token_postings(&term.text)?.to_bitmap();
        }

        let mut scores: HashMap<u32, f64> = HashMap::new();
        let must: Vec<(usize, &QueryTerm)> =
            terms.iter().enumerate().filter(|(_, t)| t.occur == Occur::Must).collect();

        let qualified: Option<HashSet<u32>> = if must.is_empty() {
            None
        } else {
            let mut hits: HashMap<u32, HashSet<&str>> = HashMap::new();
            for (i, term) in &must {
                for stub in tables.token_postings(&term.text)?.iter() {
                    if excluded.contains(stub) {
                        continue;
                    }
                    if hits.entry(stub).or_default().insert(term.text.as_str()) {
                        *scores.entry(stub).or_default() += multiplier(*i) * (base + MUST_BOOST);
                    }
                }
            }
            let distinct: HashSet<&str> = must.iter().map(|(_, t)| t.text.as_str()).collect();
            Some(
                hits.into_iter()
                    .filter(|(_, seen)| seen.len() == distinct.len())
                    .map(|(stub, _)| stub)
                    .collect(),
            )
        };
        if let Some(qualified) = &qualified {
            scores.retain(|stub, _| qualified.contains(stub));
        }

        for (i, term) in terms.iter().enumerate().filter(|(_, t)| t.occur == Occur::Should) {
            for stub in tables.token_postings(&term.text)?.iter() {
                let admitted = match &qualified {
                    Some(qualified) => qualified.contains(&stub),
                    None => !excluded.contains(stub),
                };
                if admitted {
                    *scores.entry(stub).or_default() += multiplier(i) * base;
                }
            }
        }

        Ok(scores.into_iter().map(|(index, score)| ScoredStub { index, score }).collect())
    }

    fn name(&self) -> &str {
        "boolean"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::analysis::tokenizer::StandardTokenizer;
    use crate::storage::keys::Namespace;
    use crate::storage::memory::MemoryStore;

    fn tables(docs: &[(&str, &[&str])]) -> PostingsTables {
        let tables = PostingsTables::new(Arc::new(MemoryStore::new()), Namespace::Keyword);
        for (shasum, words) in docs {
            let index = tables.ensure_stub_index(shasum).unwrap();
            for word in words.iter() {
                tables.add_token(word, index).unwrap();
            }
        }
        tables
    }

    fn scored(tables: &PostingsTables, query: &str) -> HashMap<String, f64> {
        let terms = StandardTokenizer::default().query_terms(query);
        BooleanScorer
            .score(tables, &terms)
            .unwrap()
            .into_iter()
            .map(|s| (tables.shasum(s.index).unwrap(), s.score))
            .collect()
    }

    #[test]
    fn test_must_outranks_should() {
        let tables = tables(&[
            ("both", &["required", "optional"]),
            ("should", &["optional"]),
            ("banned", &["required", "optional", "excluded"]),
        ]);
        let scores = scored(&tables, "+required optional -excluded");
        assert_eq!(scores.len(), 1);
        assert!(scores["both"] > 100.0);
        assert!(!scores.contains_key("banned"));

        let scores = scored(&tables, "required optional -excluded");
        assert!(scores["both"] > scores["should"]);
        assert!(!scores.contains_key("banned"));
    }

    #[test]
    fn test_should_weights_by_position() {
        let tables = tables(&[("a", &["first"]), ("b", &["second"])]);
        let scores = scored(&tables, "first second");
        assert_eq!(scores["a"], 1.0);
        assert_eq!(scores["b"], 0.5);
    }

    #[test]
    fn test_every_must_term_required() {
        let tables = tables(&[("doc1", &["foo"]), ("doc2", &["foo", "bar"]), ("doc3", &[])]);
        let scores = scored(&tables, "+foo -bar");
        assert_eq!(scores.keys().collect::<Vec<_>>(), vec!["doc1"]);
        assert!(scores["doc1"] > 0.0);

        let scores = scored(&tables, "+foo +bar");
        assert_eq!(scores.keys().collect::<Vec<_>>(), vec!["doc2"]);
        // 2 * (0.5 + 100) + 1 * (0.5 + 100)
        assert_eq!(scores["doc2"], 301.5);
    }

    #[test]
    fn test_only_not_terms_match_nothing() {
        let tables = tables(&[("a", &["x"])]);
        assert!(scored(&tables, "-x").is_empty());
        assert!(scored(&tables, "").is_empty());
    }
}
