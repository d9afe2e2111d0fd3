use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;
use crate::analysis::token::{Occur, QueryTerm, Token};

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<Token>;

    fn name(&self) -> &str;
}

/// Word-boundary tokenizer producing lowercase words
#[derive(Debug, Clone)]
pub struct StandardTokenizer {
    pub max_token_length: usize,
}

impl Default for StandardTokenizer {
    fn default() -> Self {
        StandardTokenizer {
            max_token_length: 255,
        }
    }
}

impl StandardTokenizer {
    /// Distinct lowercase words in first-occurrence order.
    pub fn unique_terms(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.tokenize(text)
            .into_iter()
            .filter(|t| seen.insert(t.text.clone()))
            .map(|t| t.text)
            .collect()
    }

    /// Splits a keyword query into terms. A leading `+` marks a must term,
    /// a leading `-` a must-not term. A word repeated later in the query is
    /// dropped; its first occurrence decides the sigil.
    pub fn query_terms(&self, query: &str) -> Vec<QueryTerm> {
        let mut seen = HashSet::new();
        let mut terms = Vec::new();

        for chunk in query.split_whitespace() {
            let (occur, body) = if let Some(rest) = chunk.strip_prefix('+') {
                (Occur::Must, rest)
            } else if let Some(rest) = chunk.strip_prefix('-') {
                (Occur::MustNot, rest)
            } else {
                (Occur::Should, chunk)
            };

            for token in self.tokenize(body) {
                if seen.insert(token.text.clone()) {
                    terms.push(QueryTerm::new(token.text, occur));
                }
            }
        }
        terms
    }
}

impl Tokenizer for StandardTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut position = 0u32;

        for (offset, word) in text.unicode_word_indices() {
            if word.len() > self.max_token_length {
                continue;
            }
            tokens.push(Token::new(word.to_lowercase(), position, offset, word.len()));
            position += 1;
        }

        tokens
    }

    fn name(&self) -> &str {
        "standard"
    }
}
