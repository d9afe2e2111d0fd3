use serde::{Deserialize, Serialize};

/// Keyword search input: free text with `+must` / `-not` sigils.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    /// Restricts hits to pages of this language when set.
    pub locale: Option<String>,
    pub query: String,
    /// Hits per page; zero takes the engine's configured page size.
    pub size: usize,
    /// Zero-based page number.
    pub page: usize,
}

impl Default for SearchRequest {
    fn default() -> Self {
        SearchRequest { locale: None, query: String::new(), size: 0, page: 0 }
    }
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        SearchRequest { query: query.into(), ..SearchRequest::default() }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_page(mut self, size: usize, page: usize) -> Self {
        self.size = size;
        self.page = page;
        self
    }
}

/// Engine-agnostic result envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub status: SearchStatus,
    pub hits: Vec<SearchHit>,
    /// Ranked hits before pagination.
    pub total: usize,
    pub max_score: f64,
}

/// Index partitions consulted for a search and how many answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStatus {
    pub total: usize,
    pub failed: usize,
    pub successful: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// Stub shasum.
    pub id: String,
    pub url: String,
    pub score: f64,
    /// 1-based rank across all pages of the result.
    pub hit_number: usize,
    pub fields: HitFields,
    pub fragments: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitFields {
    pub url: String,
    pub title: String,
    pub description: String,
}

impl SearchResults {
    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|hit| hit.id.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}
