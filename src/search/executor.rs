use std::collections::HashSet;
use tracing::debug;
use crate::analysis::token::Occur;
use crate::analysis::tokenizer::StandardTokenizer;
use crate::core::error::Result;
use crate::core::utils::{natural_cmp, window};
use crate::index::keyword::{load_summary, DocumentSummary, KeywordIndex};
use crate::scoring::scorer::Scorer;
use crate::search::results::{HitFields, SearchHit, SearchRequest, SearchResults, SearchStatus};

/// Runs keyword requests against one keyword index.
pub struct SearchEngine<'a> {
    keywords: &'a KeywordIndex,
    scorer: &'a dyn Scorer,
    default_size: usize,
}

impl<'a> SearchEngine<'a> {
    pub fn new(keywords: &'a KeywordIndex, scorer: &'a dyn Scorer, default_size: usize) -> Self {
        SearchEngine { keywords, scorer, default_size: default_size.max(1) }
    }

    pub fn search(&self, request: &SearchRequest) -> Result<SearchResults> {
        let tokenizer = self.keywords.tokenizer();
        let terms = tokenizer.query_terms(&request.query);
        let positive: HashSet<String> = terms
            .iter()
            .filter(|t| t.occur != Occur::MustNot)
            .map(|t| t.text.clone())
            .collect();

        let tables = self.keywords.read();
        let scored = self.scorer.score(&tables, &terms)?;

        let mut ranked: Vec<(String, f64, DocumentSummary)> = Vec::with_capacity(scored.len());
        for hit in scored {
            let shasum = tables.shasum(hit.index)?;
            let summary = load_summary(&tables, &shasum)?.unwrap_or_else(|| DocumentSummary {
                url: String::new(),
                title: String::new(),
                description: String::new(),
                language: String::new(),
            });
            if let Some(locale) = request.locale.as_deref().filter(|l| !l.is_empty()) {
                if !summary.language.eq_ignore_ascii_case(locale) {
                    continue;
                }
            }
            ranked.push((shasum, hit.score, summary));
        }
        drop(tables);

        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| natural_cmp(&a.0, &b.0)));
        let total = ranked.len();
        let max_score = ranked.first().map_or(0.0, |r| r.1);

        let size = if request.size == 0 { self.default_size } else { request.size };
        let offset = request.page.saturating_mul(size);
        let hits = window(ranked, offset, Some(size))
            .into_iter()
            .enumerate()
            .map(|(i, (id, score, summary))| SearchHit {
                fragments: fragments(tokenizer, &summary.description, &positive),
                id,
                url: summary.url.clone(),
                score,
                hit_number: offset + i + 1,
                fields: HitFields {
                    url: summary.url,
                    title: summary.title,
                    description: summary.description,
                },
            })
            .collect::<Vec<_>>();

        debug!(
            scorer = self.scorer.name(),
            query = %request.query,
            total,
            returned = hits.len(),
            "keyword search"
        );
        Ok(SearchResults {
            status: SearchStatus { total: 1, failed: 0, successful: 1 },
            hits,
            total,
            max_score,
        })
    }
}

/// Sentences of `text` containing at least one of `terms`.
fn fragments(tokenizer: &StandardTokenizer, text: &str, terms: &HashSet<String>) -> Vec<String> {
    text.split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .filter(|sentence| {
            tokenizer
                .unique_terms(sentence)
                .iter()
                .any(|word| terms.contains(word))
        })
        .map(str::to_string)
        .collect()
}
