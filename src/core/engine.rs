use std::sync::Arc;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::{debug, info};
use crate::core::config::Config;
use crate::core::error::Result;
use crate::index::context::{ContextIndex, ValueStubs};
use crate::index::keyword::KeywordIndex;
use crate::page::{FormatProvider, Page, PageIndexer, Stub};
use crate::query::cache::{CacheStats, QueryCache, RegexCache};
use crate::query::matcher::{MatchResult, Matcher};
use crate::query::selector::{SelectResult, Selector};
use crate::scoring::scorer::{BooleanScorer, Scorer};
use crate::search::executor::SearchEngine;
use crate::search::results::{SearchRequest, SearchResults};
use crate::storage::{open_store, PostingsStore};

/// Page index: attribute postings for PQL, token postings for keyword
/// search, and the bounded compile caches, all over one postings store.
///
/// Every engine owns its caches, so two engines never share compiled state.
pub struct IndexEngine {
    config: Config,
    store: Arc<dyn PostingsStore>,
    formats: Arc<FormatProvider>,

    context: ContextIndex,
    keywords: KeywordIndex,

    queries: QueryCache,
    regexes: RegexCache,
    scorer: Box<dyn Scorer>,
    rng: Mutex<SmallRng>,
}

impl IndexEngine {
    /// Opens the configured backend with the built-in formats.
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with_formats(config, Arc::new(FormatProvider::with_defaults()))
    }

    pub fn open_with_formats(config: Config, formats: Arc<FormatProvider>) -> Result<Self> {
        let store = open_store(&config)?;
        Ok(Self::with_store(config, store, formats))
    }

    pub fn with_store(config: Config, store: Arc<dyn PostingsStore>, formats: Arc<FormatProvider>) -> Self {
        info!(
            backend = store.name(),
            query_cache = config.query_cache_size,
            regex_cache = config.regex_cache_size,
            "index engine ready"
        );
        IndexEngine {
            context: ContextIndex::new(store.clone()),
            keywords: KeywordIndex::new(store.clone(), formats.clone()),
            queries: QueryCache::new(config.query_cache_size),
            regexes: RegexCache::new(config.regex_cache_size),
            scorer: Box::new(BooleanScorer),
            rng: Mutex::new(SmallRng::from_entropy()),
            store,
            formats,
            config,
        }
    }

    /// Swaps the keyword scorer.
    pub fn with_scorer(mut self, scorer: Box<dyn Scorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Reseeds the generator behind `RANDOM` selections.
    pub fn seed(&self, seed: u64) {
        *self.rng.lock() = SmallRng::seed_from_u64(seed);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn PostingsStore> {
        &self.store
    }

    pub fn formats(&self) -> &Arc<FormatProvider> {
        &self.formats
    }

    pub fn context(&self) -> &ContextIndex {
        &self.context
    }

    pub fn keywords(&self) -> &KeywordIndex {
        &self.keywords
    }

    pub fn add_to_index(&self, stub: &Stub, page: &Page) -> Result<usize> {
        self.context.add_to_index(stub, page)
    }

    pub fn remove_from_index(&self, stub: &Stub) -> Result<usize> {
        self.context.remove_from_index(stub)
    }

    pub fn add_to_search_index(&self, stub: &Stub, page: &Page) -> Result<usize> {
        self.keywords.add_to_search_index(stub, page)
    }

    pub fn remove_from_search_index(&self, stub: &Stub) -> Result<usize> {
        self.keywords.remove_from_search_index(stub)
    }

    /// Empties both indexes so a full rebuild starts from nothing.
    pub fn clear(&self) -> Result<()> {
        let context = self.context.clear()?;
        let keywords = self.keywords.clear()?;
        info!(context, keywords, "index cleared");
        Ok(())
    }

    pub fn get_page_context_value_stubs(&self, key: &str) -> Result<Vec<ValueStubs>> {
        self.context.get_page_context_value_stubs(key)
    }

    pub fn known_keywords(&self) -> Result<Vec<String>> {
        self.keywords.known_keywords()
    }

    pub fn keyword_stubs(&self, word: &str) -> Result<Vec<String>> {
        self.keywords.keyword_stubs(word)
    }

    /// Shasums matching a PQL statement, sorted and windowed.
    pub fn perform_query(&self, text: &str) -> Result<Vec<String>> {
        Ok(self.match_query(text)?.shasums())
    }

    /// Like [`perform_query`](Self::perform_query), keeping the per-match
    /// snapshots and the pre-window total.
    pub fn match_query(&self, text: &str) -> Result<MatchResult> {
        let statement = self.queries.statement(text)?;
        let tables = self.context.read();
        let result = Matcher::new(&tables, &self.regexes).run(&statement)?;
        debug!(query = %text.trim(), total = result.total, returned = result.len(), "query performed");
        Ok(result)
    }

    pub fn perform_select(&self, text: &str) -> Result<SelectResult> {
        let selection = self.queries.selection(text)?;
        let tables = self.context.read();
        let mut rng = self.rng.lock();
        let result = Selector::new(&tables, &self.regexes).run(&selection, &mut *rng)?;
        debug!(select = %text.trim(), keys = result.len(), "select performed");
        Ok(result)
    }

    pub fn perform_search(&self, request: &SearchRequest) -> Result<SearchResults> {
        SearchEngine::new(&self.keywords, self.scorer.as_ref(), self.config.search_page_size).search(request)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.queries.stats()
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    pub fn compact(&self) -> Result<()> {
        self.store.compact()
    }
}

impl PageIndexer for IndexEngine {
    fn name(&self) -> &str {
        "index-engine"
    }

    /// Posts the page to both indexes; a read-only engine serves what was
    /// precached and ignores cache rebuilds.
    fn add_page(&self, stub: &Stub, page: &Page) -> Result<()> {
        if self.config.read_only {
            return Ok(());
        }
        self.add_to_index(stub, page)?;
        self.add_to_search_index(stub, page)?;
        Ok(())
    }

    fn remove_page(&self, stub: &Stub) -> Result<()> {
        if self.config.read_only {
            return Ok(());
        }
        self.remove_from_index(stub)?;
        self.remove_from_search_index(stub)?;
        Ok(())
    }
}
