use std::collections::BTreeMap;
use rand::Rng;
use roaring::RoaringBitmap;
use tracing::trace;
use crate::core::error::Result;
use crate::core::types::Value;
use crate::core::utils::natural_cmp;
use crate::index::tables::{PostingsTables, ValuePostings};
use crate::query::ast::{Selecting, Selection};
use crate::query::cache::RegexCache;
use crate::query::matcher::Matcher;

/// Projection of one selected attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Selected {
    Null,
    Scalar(Value),
    Count(usize),
    Values(Vec<Value>),
    /// One slot per row, aligned with every other plain column.
    Column(Vec<Option<Value>>),
}

impl Selected {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Selected::Null => serde_json::Value::Null,
            Selected::Scalar(v) => v.to_json(),
            Selected::Count(n) => serde_json::Value::from(*n),
            Selected::Values(values) => values.iter().map(Value::to_json).collect(),
            Selected::Column(slots) => slots
                .iter()
                .map(|slot| slot.as_ref().map_or(serde_json::Value::Null, Value::to_json))
                .collect(),
        }
    }
}

/// Selected attributes keyed by camelCase name.
pub type SelectResult = BTreeMap<String, Selected>;

pub struct Selector<'a> {
    tables: &'a PostingsTables,
    regexes: &'a RegexCache,
}

impl<'a> Selector<'a> {
    pub fn new(tables: &'a PostingsTables, regexes: &'a RegexCache) -> Self {
        Selector { tables, regexes }
    }

    pub fn run<R: Rng>(&self, selection: &Selection, rng: &mut R) -> Result<SelectResult> {
        let (rows, scope) = match &selection.within {
            Some(statement) => {
                let matched = Matcher::new(self.tables, self.regexes).run(statement)?;
                let rows: Vec<u32> = matched.matches.iter().map(|m| m.index).collect();
                (rows, Some(matched.bitmap()))
            }
            None => (self.unscoped_rows(&selection.terms)?, None),
        };

        let mut result = SelectResult::new();
        for term in &selection.terms {
            let mut entries = self.tables.values(&term.key)?;
            if let Some(scope) = &scope {
                entries.retain(|entry| entry.postings.intersects(scope));
            }
            let selected = project(term, entries, &rows, rng);
            trace!(key = %term.key, "selected");
            result.insert(term.key.clone(), selected);
        }
        Ok(result)
    }

    /// Every stub posted under any selected key, in natural shasum order.
    fn unscoped_rows(&self, terms: &[Selecting]) -> Result<Vec<u32>> {
        let mut all = RoaringBitmap::new();
        for term in terms {
            for entry in self.tables.values(&term.key)? {
                all |= entry.postings.to_bitmap();
            }
        }
        let shasums = self.tables.shasums(all.iter())?;
        let mut rows: Vec<(u32, String)> = all.iter().zip(shasums).collect();
        rows.sort_by(|a, b| natural_cmp(&a.1, &b.1));
        Ok(rows.into_iter().map(|(index, _)| index).collect())
    }
}

fn project<R: Rng>(
    term: &Selecting,
    entries: Vec<ValuePostings>,
    rows: &[u32],
    rng: &mut R,
) -> Selected {
    if term.is_plain() {
        let column = rows
            .iter()
            .map(|row| {
                entries
                    .iter()
                    .find(|entry| entry.postings.contains(*row))
                    .map(|entry| entry.value.clone())
            })
            .collect();
        return Selected::Column(column);
    }

    let mut candidates: Vec<Value> = entries.into_iter().map(|entry| entry.value).collect();
    if term.count {
        // a random pick counts as one value at most
        let count = if term.random { candidates.len().min(1) } else { candidates.len() };
        return Selected::Count(count);
    }
    if term.random {
        if candidates.is_empty() {
            return Selected::Null;
        }
        let pick = rng.gen_range(0..candidates.len());
        return Selected::Scalar(candidates.swap_remove(pick));
    }
    if candidates.len() == 1 {
        return Selected::Scalar(candidates.swap_remove(0));
    }
    Selected::Values(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use chrono::Utc;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use crate::fs::memory::MemoryFileSystem;
    use crate::index::context::ContextIndex;
    use crate::page::{Page, Stub};
    use crate::query::parser::parse_selection;
    use crate::storage::memory::MemoryStore;

    fn index() -> ContextIndex {
        let index = ContextIndex::new(Arc::new(MemoryStore::new()));
        let fs = Arc::new(MemoryFileSystem::new("t"));
        let pages: [(&str, &str, Option<&str>); 3] =
            [("s1", "post", Some("rust")), ("s2", "post", None), ("s3", "page", Some("go"))];
        for (shasum, kind, tag) in pages {
            let stub = Stub::new(shasum, format!("{}.md", shasum), "/", "en", "en", fs.clone());
            let now = Utc::now();
            let mut page = Page::assemble(&stub, "", now, now, None).unwrap();
            page.context.insert("type".into(), Value::from(kind));
            if let Some(tag) = tag {
                page.context.insert("tag".into(), Value::from(tag));
            }
            index.add_to_index(&stub, &page).unwrap();
        }
        index
    }

    fn select(index: &ContextIndex, text: &str) -> SelectResult {
        let regexes = RegexCache::new(8);
        let tables = index.read();
        let selection = parse_selection(text).unwrap();
        let mut rng = SmallRng::seed_from_u64(7);
        Selector::new(&tables, &regexes).run(&selection, &mut rng).unwrap()
    }

    #[test]
    fn test_distinct_and_count() {
        let index = index();
        let result = select(&index, "SELECT DISTINCT .Type, COUNT .Tag");
        assert_eq!(
            result["type"],
            Selected::Values(vec![Value::from("post"), Value::from("page")])
        );
        assert_eq!(result["tag"], Selected::Count(2));
    }

    #[test]
    fn test_within_restricts_values() {
        let index = index();
        let result = select(&index, r#"SELECT DISTINCT .Type, COUNT .Tag WITHIN (.Tag == "go")"#);
        assert_eq!(result["type"], Selected::Scalar(Value::from("page")));
        assert_eq!(result["tag"], Selected::Count(1));
    }

    #[test]
    fn test_plain_columns_align() {
        let index = index();
        let result = select(&index, "SELECT .Type, .Tag");
        assert_eq!(
            result["type"],
            Selected::Column(vec![Some(Value::from("post")), Some(Value::from("post")), Some(Value::from("page"))])
        );
        assert_eq!(
            result["tag"],
            Selected::Column(vec![Some(Value::from("rust")), None, Some(Value::from("go"))])
        );
    }

    #[test]
    fn test_random_picks_candidate() {
        let index = index();
        let result = select(&index, "SELECT RANDOM .Type, RANDOM COUNT .Tag");
        match &result["type"] {
            Selected::Scalar(v) => assert!(*v == Value::from("post") || *v == Value::from("page")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(result["tag"], Selected::Count(1));
        let empty = select(&index, "SELECT RANDOM .Missing, DISTINCT .Nothing");
        assert_eq!(empty["missing"], Selected::Null);
        assert_eq!(empty["nothing"], Selected::Values(Vec::new()));
    }

    #[test]
    fn test_json_shape() {
        let index = index();
        let result = select(&index, "SELECT COUNT .Type, .Tag");
        assert_eq!(result["type"].to_json(), serde_json::json!(2));
        assert_eq!(result["tag"].to_json(), serde_json::json!(["rust", null, "go"]));
    }
}
