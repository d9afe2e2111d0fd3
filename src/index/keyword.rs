use std::sync::Arc;
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::analysis::tokenizer::StandardTokenizer;
use crate::core::error::Result;
use crate::index::tables::PostingsTables;
use crate::page::{FormatProvider, Page, Stub};
use crate::storage::keys::Namespace;
use crate::storage::PostingsStore;

/// Fields a search hit shows without materialising the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub url: String,
    pub title: String,
    pub description: String,
    pub language: String,
}

/// Token postings over the visible text of every page.
pub struct KeywordIndex {
    tables: RwLock<PostingsTables>,
    tokenizer: StandardTokenizer,
    formats: Arc<FormatProvider>,
}

impl KeywordIndex {
    pub fn new(store: Arc<dyn PostingsStore>, formats: Arc<FormatProvider>) -> Self {
        KeywordIndex {
            tables: RwLock::new(PostingsTables::new(store, Namespace::Keyword)),
            tokenizer: StandardTokenizer::default(),
            formats,
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, PostingsTables> {
        self.tables.read()
    }

    pub fn tokenizer(&self) -> &StandardTokenizer {
        &self.tokenizer
    }

    /// Posts each distinct word of the page's title, description and body
    /// once, and stores the page summary. Returns the number of tokens.
    pub fn add_to_search_index(&self, stub: &Stub, page: &Page) -> Result<usize> {
        let tables = self.tables.write();
        if tables.stub_index(&stub.shasum)?.is_some() {
            debug!(shasum = %stub.shasum, "keywords already indexed");
            return Ok(0);
        }

        let body = match self.formats.indexer(&page.format) {
            Some(indexer) => indexer.extract_text(&page.content),
            None => page.content.clone(),
        };
        let text = format!("{}\n{}\n{}", page.title, page.description, body);
        let terms = self.tokenizer.unique_terms(&text);

        let index = tables.ensure_stub_index(&stub.shasum)?;
        for term in &terms {
            tables.add_token(term, index)?;
        }
        let summary = DocumentSummary {
            url: page.url.clone(),
            title: page.title.clone(),
            description: page.description.clone(),
            language: page.language.clone(),
        };
        tables.set_summary(&stub.shasum, &serde_json::to_vec(&summary)?)?;

        debug!(shasum = %stub.shasum, tokens = terms.len(), "keywords indexed");
        Ok(terms.len())
    }

    pub fn remove_from_search_index(&self, stub: &Stub) -> Result<usize> {
        let tables = self.tables.write();
        let Some(index) = tables.stub_index(&stub.shasum)? else {
            return Ok(0);
        };
        let tokens = tables.tokens_of(index)?;
        for token in &tokens {
            tables.remove_token(token, index)?;
        }
        tables.remove_summary(&stub.shasum)?;
        tables.forget_stub(&stub.shasum)?;
        debug!(shasum = %stub.shasum, tokens = tokens.len(), "keywords removed");
        Ok(tokens.len())
    }

    pub fn clear(&self) -> Result<usize> {
        let removed = self.tables.write().clear()?;
        debug!(keys = removed, "keyword index cleared");
        Ok(removed)
    }

    /// Every indexed token, sorted.
    pub fn known_keywords(&self) -> Result<Vec<String>> {
        self.tables.read().tokens()
    }

    /// Stubs whose text contains `word` (matched lowercase).
    pub fn keyword_stubs(&self, word: &str) -> Result<Vec<String>> {
        let word = word.trim().to_lowercase();
        if word.is_empty() {
            return Ok(Vec::new());
        }
        let tables = self.tables.read();
        let postings = tables.token_postings(&word)?;
        tables.shasums(postings.iter())
    }
}

pub fn load_summary(tables: &PostingsTables, shasum: &str) -> Result<Option<DocumentSummary>> {
    match tables.summary(shasum)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}
