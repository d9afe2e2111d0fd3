use std::cmp::Ordering;
use std::collections::HashMap;
use roaring::RoaringBitmap;
use tracing::trace;
use crate::core::error::{Error, Result};
use crate::core::types::{PageContext, Value};
use crate::core::utils::{natural_cmp, window};
use crate::index::tables::{PostingsTables, ValuePostings};
use crate::query::ast::{Condition, ConditionKind, Expression, Operand, Operation, SortDir, Statement};
use crate::query::cache::RegexCache;

/// One matching stub with the snapshot of the attributes its statement reads.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub index: u32,
    pub shasum: String,
    pub context: PageContext,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchResult {
    pub matches: Vec<Match>,
    /// Matches before the LIMIT/OFFSET window was applied.
    pub total: usize,
}

impl MatchResult {
    pub fn shasums(&self) -> Vec<String> {
        self.matches.iter().map(|m| m.shasum.clone()).collect()
    }

    pub fn bitmap(&self) -> RoaringBitmap {
        self.matches.iter().map(|m| m.index).collect()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Evaluates compiled statements against attribute postings.
///
/// Holds a borrowed view of the tables, so the caller's read guard spans the
/// whole evaluation.
pub struct Matcher<'a> {
    tables: &'a PostingsTables,
    regexes: &'a RegexCache,
}

impl<'a> Matcher<'a> {
    pub fn new(tables: &'a PostingsTables, regexes: &'a RegexCache) -> Self {
        Matcher { tables, regexes }
    }

    /// Runs `statement`: match, snapshot, sort, then window.
    pub fn run(&self, statement: &Statement) -> Result<MatchResult> {
        let hits = self.evaluate(&statement.expression)?;
        let mut snapshots = self.snapshot(&hits, &statement.context_keys)?;

        let indices: Vec<u32> = hits.iter().collect();
        let shasums = self.tables.shasums(indices.iter().copied())?;
        let mut matches: Vec<Match> = indices
            .into_iter()
            .zip(shasums)
            .map(|(index, shasum)| Match {
                index,
                shasum,
                context: snapshots.remove(&index).unwrap_or_default(),
            })
            .collect();

        sort_matches(&mut matches, statement.order_key(), statement.sort_dir);
        let total = matches.len();
        let matches = window(matches, statement.offset.unwrap_or(0), statement.limit);
        trace!(total, returned = matches.len(), "statement matched");
        Ok(MatchResult { matches, total })
    }

    /// Stub indices matching `expression`, unordered.
    pub fn evaluate(&self, expression: &Expression) -> Result<RoaringBitmap> {
        match expression {
            Expression::Condition(condition) => self.condition(condition),
            Expression::Operation(operation) => self.operation(operation),
        }
    }

    fn condition(&self, condition: &Condition) -> Result<RoaringBitmap> {
        let left = self.evaluate(&condition.left)?;
        let right = self.evaluate(&condition.right)?;
        Ok(match condition.kind {
            ConditionKind::And => left & right,
            ConditionKind::Or => left | right,
        })
    }

    fn operation(&self, operation: &Operation) -> Result<RoaringBitmap> {
        let entries = self.tables.values(&operation.left)?;
        let mut universe = RoaringBitmap::new();
        for entry in &entries {
            universe |= entry.postings.to_bitmap();
        }

        let hits = match &operation.right {
            Operand::Literal(text) => literal_hits(&entries, text)?,
            Operand::Regex(literal) => {
                let re = self.regexes.get(literal)?;
                let mut hits = RoaringBitmap::new();
                for entry in &entries {
                    match &entry.value {
                        Value::Text(text) => {
                            if re.is_match(text) {
                                hits |= entry.postings.to_bitmap();
                            }
                        }
                        other => {
                            return Err(Error::type_mismatch(format!(
                                "regular expression applied to {} value of .{}",
                                other.type_name(),
                                operation.left
                            )));
                        }
                    }
                }
                hits
            }
            Operand::Reference(key) => self.reference_hits(&entries, key)?,
        };

        Ok(if operation.op.is_negated() { universe - hits } else { hits })
    }

    /// Stubs whose value for the operation's key equals one of their own
    /// values for `key`. A stub without `key` never matches.
    fn reference_hits(&self, entries: &[ValuePostings], key: &str) -> Result<RoaringBitmap> {
        let mut other: HashMap<u32, Vec<Value>> = HashMap::new();
        for entry in self.tables.values(key)? {
            for stub in entry.postings.iter() {
                other.entry(stub).or_default().push(entry.value.clone());
            }
        }

        let mut hits = RoaringBitmap::new();
        for entry in entries {
            for stub in entry.postings.iter() {
                let Some(values) = other.get(&stub) else {
                    continue;
                };
                for value in values {
                    if entry.value.strict_eq(value)? {
                        hits.insert(stub);
                        break;
                    }
                }
            }
        }
        Ok(hits)
    }

    /// Values of `keys` for every hit; a fanned-out list keeps its first
    /// element.
    fn snapshot(&self, hits: &RoaringBitmap, keys: &[String]) -> Result<HashMap<u32, PageContext>> {
        let mut snapshots: HashMap<u32, PageContext> = HashMap::new();
        for key in keys {
            for entry in self.tables.values(key)? {
                for stub in entry.postings.iter().filter(|s| hits.contains(*s)) {
                    snapshots
                        .entry(stub)
                        .or_default()
                        .entry(key.clone())
                        .or_insert_with(|| entry.value.clone());
                }
            }
        }
        Ok(snapshots)
    }
}

fn literal_hits(entries: &[ValuePostings], text: &str) -> Result<RoaringBitmap> {
    let mut hits = RoaringBitmap::new();
    for entry in entries {
        let literal = entry.value.coerce_literal(text)?;
        if entry.value.strict_eq(&literal)? {
            hits |= entry.postings.to_bitmap();
        }
    }
    Ok(hits)
}

/// Orders by `key` with missing values last in either direction; ties fall
/// back to natural shasum order.
pub fn sort_matches(matches: &mut [Match], key: &str, dir: SortDir) {
    matches.sort_by(|a, b| natural_cmp(&a.shasum, &b.shasum));
    matches.sort_by(|a, b| match (a.context.get(key), b.context.get(key)) {
        (Some(x), Some(y)) => match dir {
            SortDir::Asc => x.sort_cmp(y),
            SortDir::Desc => y.sort_cmp(x),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use chrono::Utc;
    use crate::core::error::ErrorKind;
    use crate::fs::memory::MemoryFileSystem;
    use crate::index::context::ContextIndex;
    use crate::page::{Page, Stub};
    use crate::query::parser::parse_statement;
    use crate::storage::memory::MemoryStore;

    fn index(pages: &[(&str, &[(&str, Value)])]) -> ContextIndex {
        let index = ContextIndex::new(Arc::new(MemoryStore::new()));
        let fs = Arc::new(MemoryFileSystem::new("t"));
        for (shasum, fields) in pages {
            let stub = Stub::new(*shasum, format!("{}.md", shasum), "/", "en", "en", fs.clone());
            let now = Utc::now();
            let mut page = Page::assemble(&stub, "", now, now, None).unwrap();
            for (k, v) in fields.iter() {
                page.context.insert(k.to_string(), v.clone());
            }
            index.add_to_index(&stub, &page).unwrap();
        }
        index
    }

    fn run(index: &ContextIndex, pql: &str) -> Result<Vec<String>> {
        let regexes = RegexCache::new(8);
        let tables = index.read();
        let statement = parse_statement(pql).unwrap();
        Ok(Matcher::new(&tables, &regexes).run(&statement)?.shasums())
    }

    fn blog() -> ContextIndex {
        index(&[
            ("p1", &[("type", Value::from("post")), ("section", Value::from("blog")), ("weight", Value::Int(3))]),
            ("p2", &[("type", Value::from("post")), ("section", Value::from("news")), ("weight", Value::Int(1))]),
            ("p3", &[("type", Value::from("page")), ("section", Value::from("blog")), ("weight", Value::Int(2))]),
            ("p10", &[("type", Value::from("page"))]),
        ])
    }

    #[test]
    fn test_equality_and_complement() {
        let index = blog();
        assert_eq!(run(&index, r#"(.Type == "post")"#).unwrap(), vec!["p1", "p2"]);
        assert_eq!(run(&index, r#"(.Type != "post")"#).unwrap(), vec!["p10", "p3"]);
    }

    #[test]
    fn test_and_or() {
        let index = blog();
        let and = run(&index, r#"((.Type == "post") AND (.Section == "blog"))"#).unwrap();
        assert_eq!(and, vec!["p1"]);
        let or = run(&index, r#"((.Type == "post") OR (.Section == "blog")) ORDER BY .Weight"#).unwrap();
        assert_eq!(or, vec!["p2", "p3", "p1"]);
    }

    #[test]
    fn test_sort_missing_last_both_ways() {
        let index = blog();
        let asc = run(&index, r#"(.Url =~ m/^\//) ORDER BY .Weight"#).unwrap();
        assert_eq!(asc, vec!["p2", "p3", "p1", "p10"]);
        let desc = run(&index, r#"(.Url =~ m/^\//) ORDER BY .Weight DESC"#).unwrap();
        assert_eq!(desc, vec!["p1", "p3", "p2", "p10"]);
    }

    #[test]
    fn test_typed_literal_and_mismatch() {
        let index = blog();
        assert_eq!(run(&index, r#"(.Weight == "2")"#).unwrap(), vec!["p3"]);
        let err = run(&index, r#"(.Weight == "heavy")"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        let err = run(&index, r#"(.Weight =~ m/2/)"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_oversized_duration_literal_is_mismatch() {
        let index = index(&[("d1", &[("timeout", Value::Duration(std::time::Duration::from_secs(5)))])]);
        assert_eq!(run(&index, r#"(.Timeout == "5s")"#).unwrap(), vec!["d1"]);
        let err = run(&index, r#"(.Timeout == "99999999999999999999h")"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_regex_flags() {
        let index = blog();
        assert_eq!(run(&index, r#"(.Section =~ m/^BLOG$/i)"#).unwrap(), vec!["p1", "p3"]);
        // p10 lives at the root, so its section is empty
        assert_eq!(run(&index, r#"(.Section !~ m/^blog$/)"#).unwrap(), vec!["p10", "p2"]);
    }

    #[test]
    fn test_reference_operand() {
        let index = index(&[
            ("a", &[("title", Value::from("x")), ("linkTitle", Value::from("x"))]),
            ("b", &[("title", Value::from("y")), ("linkTitle", Value::from("z"))]),
            ("c", &[("title", Value::from("x"))]),
        ]);
        assert_eq!(run(&index, "(.Title == .LinkTitle)").unwrap(), vec!["a"]);
        assert_eq!(run(&index, "(.Title != .LinkTitle)").unwrap(), vec!["b", "c"]);
    }

    #[test]
    fn test_window() {
        let index = blog();
        let all = run(&index, r#"(.Url =~ m/./)"#).unwrap();
        // urls compare as plain strings
        assert_eq!(all, vec!["p1", "p10", "p2", "p3"]);
        assert_eq!(run(&index, r#"(.Url =~ m/./) LIMIT 2 OFFSET 1"#).unwrap(), vec!["p10", "p2"]);
        assert_eq!(run(&index, r#"(.Url =~ m/./) OFFSET 3"#).unwrap(), vec!["p3"]);
        assert!(run(&index, r#"(.Url =~ m/./) LIMIT 2 OFFSET 9"#).unwrap().is_empty());
        assert!(run(&index, r#"(.Url =~ m/./) LIMIT 0"#).unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_holds_context_keys() {
        let index = blog();
        let regexes = RegexCache::new(8);
        let tables = index.read();
        let statement = parse_statement(r#"(.Type == "post") ORDER BY .Weight"#).unwrap();
        let result = Matcher::new(&tables, &regexes).run(&statement).unwrap();
        assert_eq!(result.total, 2);
        let first = &result.matches[0].context;
        assert_eq!(first.get("weight"), Some(&Value::Int(1)));
        assert_eq!(first.get("type"), Some(&Value::from("post")));
        assert!(!first.contains_key("section"));
    }
}
