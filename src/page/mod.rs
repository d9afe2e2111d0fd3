pub mod cache;
pub mod format;
pub mod frontmatter;
pub mod language;
pub mod stub;

use chrono::{DateTime, Utc};
use crate::core::error::Result;
use crate::core::types::{parse_time, PageContext, Value};
use crate::fs::clean_path;
use crate::page::format::DocumentIndexer;
use crate::page::frontmatter::split_frontmatter;

pub use cache::{Mount, PageCache, PageIndexer, RebuildReport};
pub use format::FormatProvider;
pub use stub::Stub;

/// Context keys that never become attribute postings.
pub const UNINDEXED_KEYS: &[&str] = &["content", "frontmatter"];

const DESCRIPTION_WORDS: usize = 30;

/// A page materialised from its stub.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub shasum: String,
    pub source: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub language: String,
    pub format: String,
    pub section: String,
    pub permalink: Option<String>,
    /// Old URLs that resolve to this page.
    pub redirects: Vec<String>,
    /// URL of the page this one translates.
    pub translates: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub content: String,
    /// Raw frontmatter fields, camelCase keys.
    pub frontmatter: PageContext,
    /// Frontmatter plus the built-in attributes, camelCase keys.
    pub context: PageContext,
}

impl Page {
    pub(crate) fn assemble(
        stub: &Stub,
        raw: &str,
        created: DateTime<Utc>,
        modified: DateTime<Utc>,
        indexer: Option<&dyn DocumentIndexer>,
    ) -> Result<Page> {
        let split = split_frontmatter(raw)?;
        let fm = split.fields;
        let content = split.body.to_string();
        let text_of = |key: &str| fm.get(key).and_then(Value::as_text).map(str::to_string);

        let url = match text_of("url") {
            Some(url) => normalize_url(&url),
            None => url_for_path(&stub.mount, &stub.source),
        };
        let title = text_of("title")
            .or_else(|| indexer.and_then(|i| i.extract_title(&content)))
            .unwrap_or_else(|| default_title(&stub.source));
        let description = text_of("description").unwrap_or_else(|| {
            let text = match indexer {
                Some(indexer) => indexer.extract_text(&content),
                None => content.clone(),
            };
            text.split_whitespace().take(DESCRIPTION_WORDS).collect::<Vec<_>>().join(" ")
        });
        let section = text_of("section").unwrap_or_else(|| section_of(&stub.source));
        let permalink = text_of("permalink").map(|p| normalize_url(&p));
        let translates = text_of("translates").map(|t| normalize_url(&t));
        let redirects = match fm.get("redirect") {
            Some(value) => value
                .fan_out()
                .into_iter()
                .filter_map(Value::as_text)
                .map(normalize_url)
                .collect(),
            None => Vec::new(),
        };
        let created = time_field(&fm, "created").unwrap_or(created);
        let updated = time_field(&fm, "updated").unwrap_or(modified);
        let format = stub.format();

        let mut context = fm.clone();
        context.insert("url".into(), Value::from(url.as_str()));
        context.insert("title".into(), Value::from(title.as_str()));
        context.insert("description".into(), Value::from(description.as_str()));
        context.insert("language".into(), Value::from(stub.language.as_str()));
        context.insert("format".into(), Value::from(format.as_str()));
        context.insert("section".into(), Value::from(section.as_str()));
        context.insert("created".into(), Value::Time(created));
        context.insert("updated".into(), Value::Time(updated));
        context.insert("shasum".into(), Value::from(stub.shasum.as_str()));
        if let Some(permalink) = &permalink {
            context.insert("permalink".into(), Value::from(permalink.as_str()));
        }
        context.insert("content".into(), Value::from(content.as_str()));

        Ok(Page {
            shasum: stub.shasum.clone(),
            source: stub.source.clone(),
            url,
            title,
            description,
            language: stub.language.clone(),
            format,
            section,
            permalink,
            redirects,
            translates,
            created,
            updated,
            content,
            frontmatter: fm,
            context,
        })
    }
}

fn time_field(fm: &PageContext, key: &str) -> Option<DateTime<Utc>> {
    match fm.get(key)? {
        Value::Time(t) => Some(*t),
        Value::Text(s) => parse_time(s),
        _ => None,
    }
}

fn default_title(source: &str) -> String {
    let file = source.rsplit('/').next().unwrap_or(source);
    let stem = file.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(file);
    stem.to_string()
}

fn section_of(source: &str) -> String {
    match clean_path(source).split_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => String::new(),
    }
}

/// `/`-rooted URL without a trailing slash (except the root itself).
pub fn normalize_url(url: &str) -> String {
    let clean = clean_path(url);
    if clean.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", clean)
    }
}

/// URL of a file: its path under the mount point without the extension,
/// with `index` collapsing to the directory.
pub fn url_for_path(mount: &str, source: &str) -> String {
    let mut parts: Vec<String> = clean_path(mount).split('/').filter(|p| !p.is_empty()).map(str::to_string).collect();
    let path = clean_path(source);
    let mut segments: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if let Some(last) = segments.pop() {
        let stem = match last.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => last,
        };
        parts.extend(segments.iter().map(|s| s.to_string()));
        if stem != "index" {
            parts.push(stem.to_string());
        }
    }
    normalize_url(&parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use chrono::TimeZone;
    use crate::fs::memory::MemoryFileSystem;
    use crate::page::format::MarkdownIndexer;

    fn stub(source: &str) -> Stub {
        Stub::new("abc", source, "/", "en", "en", Arc::new(MemoryFileSystem::new("t")))
    }

    #[test]
    fn test_url_for_path() {
        assert_eq!(url_for_path("/", "index.md"), "/");
        assert_eq!(url_for_path("/", "blog/index.md"), "/blog");
        assert_eq!(url_for_path("/", "blog/post.md"), "/blog/post");
        assert_eq!(url_for_path("docs", "guide/intro.html"), "/docs/guide/intro");
        assert_eq!(normalize_url("blog/"), "/blog");
    }

    #[test]
    fn test_assemble_builtins_and_frontmatter() {
        let raw = "---\nType: post\ncreated: 2024-03-01\nredirect: [/old, /older/]\ntranslates: /fr/post\n---\n# Heading\n\nFirst words here.";
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let page = Page::assemble(&stub("blog/post.md"), raw, t, t, Some(&MarkdownIndexer)).unwrap();

        assert_eq!(page.url, "/blog/post");
        assert_eq!(page.title, "Heading");
        assert_eq!(page.section, "blog");
        assert_eq!(page.description, "Heading First words here.");
        assert_eq!(page.redirects, vec!["/old", "/older"]);
        assert_eq!(page.translates.as_deref(), Some("/fr/post"));
        assert_eq!(page.created, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(page.updated, t);
        assert_eq!(page.context["type"], Value::from("post"));
        assert_eq!(page.context["format"], Value::from("md"));
        assert!(page.context.contains_key("content"));
        assert!(!page.context.contains_key("permalink"));
    }

    #[test]
    fn test_frontmatter_url_and_permalink() {
        let raw = "+++\nurl = \"custom/\"\npermalink = \"/p/1\"\n+++\n";
        let t = Utc::now();
        let page = Page::assemble(&stub("x.md"), raw, t, t, None).unwrap();
        assert_eq!(page.url, "/custom");
        assert_eq!(page.permalink.as_deref(), Some("/p/1"));
        assert_eq!(page.title, "x");
    }
}
