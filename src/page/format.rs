use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use quick_xml::Reader;
use quick_xml::events::{BytesRef, Event};
use regex::Regex;
use tracing::debug;

/// Extracts indexable text from the body of a page in one format.
pub trait DocumentIndexer: Send + Sync {
    fn format(&self) -> &str;

    /// Text a reader sees, markup removed.
    fn extract_text(&self, content: &str) -> String;

    /// First heading of the body, if the format has headings.
    fn extract_title(&self, _content: &str) -> Option<String> {
        None
    }
}

fn pattern(cell: &'static OnceLock<Regex>, source: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(source).expect("valid markup pattern"))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct MarkdownIndexer;

impl DocumentIndexer for MarkdownIndexer {
    fn format(&self) -> &str {
        "md"
    }

    fn extract_text(&self, content: &str) -> String {
        static FENCE: OnceLock<Regex> = OnceLock::new();
        static IMAGE: OnceLock<Regex> = OnceLock::new();
        static LINK: OnceLock<Regex> = OnceLock::new();
        static MARKS: OnceLock<Regex> = OnceLock::new();
        static LINE_MARKS: OnceLock<Regex> = OnceLock::new();

        let text = pattern(&FENCE, r"(?m)^\s*(```|~~~).*$").replace_all(content, "");
        let text = pattern(&IMAGE, r"!\[([^\]]*)\]\([^)]*\)").replace_all(&text, "$1");
        let text = pattern(&LINK, r"\[([^\]]*)\]\([^)]*\)").replace_all(&text, "$1");
        let text = pattern(&LINE_MARKS, r"(?m)^\s*(#{1,6}|>|[-*+]|\d+\.)\s+").replace_all(&text, "");
        let text = pattern(&MARKS, r"[*_`~]+").replace_all(&text, "");
        collapse_whitespace(&HtmlIndexer.extract_text(&text))
    }

    fn extract_title(&self, content: &str) -> Option<String> {
        static HEADING: OnceLock<Regex> = OnceLock::new();
        pattern(&HEADING, r"(?m)^#\s+(.+?)\s*#*\s*$")
            .captures(content)
            .map(|caps| caps[1].replace(['*', '_', '`'], "").trim().to_string())
    }
}

pub struct HtmlIndexer;

fn html_reader(content: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(false);
    reader.config_mut().enable_all_checks(false);
    reader.config_mut().allow_unmatched_ends = true;
    reader.config_mut().allow_dangling_amp = true;
    reader
}

fn resolve_entity(entity: &BytesRef<'_>, out: &mut String) {
    if let Ok(Some(ch)) = entity.resolve_char_ref() {
        out.push(ch);
        return;
    }
    let Ok(name) = entity.decode() else {
        return;
    };
    let resolved = match name.as_ref() {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" | "rsquo" | "lsquo" => "'",
        "ldquo" | "rdquo" => "\"",
        "nbsp" => " ",
        "ndash" | "mdash" => "-",
        "hellip" => "...",
        "copy" => "\u{a9}",
        other => {
            out.push('&');
            out.push_str(other);
            out.push(';');
            return;
        }
    };
    out.push_str(resolved);
}

impl DocumentIndexer for HtmlIndexer {
    fn format(&self) -> &str {
        "html"
    }

    fn extract_text(&self, content: &str) -> String {
        let mut reader = html_reader(content);
        let mut out = String::with_capacity(content.len());
        // element whose body is code, not prose
        let mut skipping: Option<Vec<u8>> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(elem)) => {
                    let name = elem.name().as_ref().to_ascii_lowercase();
                    if skipping.is_none() && (name == b"script" || name == b"style") {
                        skipping = Some(name);
                    }
                    out.push(' ');
                }
                Ok(Event::End(elem)) => {
                    let name = elem.name().as_ref().to_ascii_lowercase();
                    if skipping.as_deref() == Some(name.as_slice()) {
                        skipping = None;
                    }
                    out.push(' ');
                }
                Ok(Event::Empty(_)) => out.push(' '),
                Ok(Event::Eof) => break,
                Ok(_) if skipping.is_some() => {}
                Ok(Event::Text(text)) => {
                    if let Ok(text) = text.decode() {
                        out.push_str(&text);
                    }
                }
                Ok(Event::CData(data)) => {
                    if let Ok(data) = data.decode() {
                        out.push_str(&data);
                    }
                }
                Ok(Event::GeneralRef(entity)) => resolve_entity(&entity, &mut out),
                Ok(_) => {}
                Err(err) => {
                    // markup too broken to tokenize; keep the rest as plain text
                    let position = usize::try_from(reader.buffer_position()).unwrap_or(content.len());
                    debug!(error = %err, position, "html tokenizer stopped");
                    if skipping.is_none() {
                        out.push_str(content.get(position..).unwrap_or_default());
                    }
                    break;
                }
            }
        }
        collapse_whitespace(&out)
    }

    fn extract_title(&self, content: &str) -> Option<String> {
        static TITLE: OnceLock<Regex> = OnceLock::new();
        pattern(&TITLE, r"(?is)<(?:title|h1)[^>]*>(.*?)</(?:title|h1)>")
            .captures(content)
            .map(|caps| self.extract_text(&caps[1]))
            .filter(|title| !title.is_empty())
    }
}

pub struct TextIndexer;

impl DocumentIndexer for TextIndexer {
    fn format(&self) -> &str {
        "txt"
    }

    fn extract_text(&self, content: &str) -> String {
        collapse_whitespace(content)
    }
}

/// Maps format names (file extensions) to document indexers.
#[derive(Clone, Default)]
pub struct FormatProvider {
    indexers: HashMap<String, Arc<dyn DocumentIndexer>>,
}

impl FormatProvider {
    pub fn new() -> Self {
        FormatProvider { indexers: HashMap::new() }
    }

    /// Markdown (`md`, `markdown`), HTML (`html`, `htm`) and text (`txt`).
    pub fn with_defaults() -> Self {
        let mut provider = Self::new();
        let markdown: Arc<dyn DocumentIndexer> = Arc::new(MarkdownIndexer);
        let html: Arc<dyn DocumentIndexer> = Arc::new(HtmlIndexer);
        provider.register("md", markdown.clone());
        provider.register("markdown", markdown);
        provider.register("html", html.clone());
        provider.register("htm", html);
        provider.register("txt", Arc::new(TextIndexer));
        provider
    }

    pub fn register(&mut self, format: &str, indexer: Arc<dyn DocumentIndexer>) {
        self.indexers.insert(format.to_ascii_lowercase(), indexer);
    }

    pub fn indexer(&self, format: &str) -> Option<Arc<dyn DocumentIndexer>> {
        self.indexers.get(&format.to_ascii_lowercase()).cloned()
    }

    pub fn knows(&self, format: &str) -> bool {
        self.indexers.contains_key(&format.to_ascii_lowercase())
    }
}

/// Lowercased extension of `path`, empty when there is none.
pub fn format_of(path: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_text() {
        let md = "# Hello *World*\n\nSee [the docs](http://x.y) and ![logo](l.png).\n\n```rust\nfn main() {}\n```\n- item";
        let text = MarkdownIndexer.extract_text(md);
        assert_eq!(text, "Hello World See the docs and logo. fn main() {} item");
        assert_eq!(MarkdownIndexer.extract_title(md).as_deref(), Some("Hello World"));
    }

    #[test]
    fn test_html_text() {
        let html = "<html><head><title>T &amp; C</title><style>p{}</style></head><body><p>Hi<br>there</p></body></html>";
        assert_eq!(HtmlIndexer.extract_text(html), "T & C Hi there");
        assert_eq!(HtmlIndexer.extract_title(html).as_deref(), Some("T & C"));
    }

    #[test]
    fn test_html_entities_and_comments() {
        let html = "<p>It&#8217;s <!-- draft note --> here&#x21;</p><script>var x = 1;</script><p>Fish &amp; chips &copy;</p>";
        assert_eq!(HtmlIndexer.extract_text(html), "It\u{2019}s here! Fish & chips \u{a9}");
    }

    #[test]
    fn test_html_tolerates_loose_markup() {
        let html = "<ul><li>one<li>two</ul></div><p>Fish & chips</p>";
        assert_eq!(HtmlIndexer.extract_text(html), "one two Fish & chips");
    }

    #[test]
    fn test_provider_lookup() {
        let formats = FormatProvider::with_defaults();
        assert!(formats.knows("MD"));
        assert_eq!(formats.indexer("htm").map(|i| i.format().to_string()), Some("html".to_string()));
        assert!(formats.indexer("png").is_none());
    }

    #[test]
    fn test_format_of() {
        assert_eq!(format_of("blog/post.MD"), "md");
        assert_eq!(format_of("blog/.hidden"), "");
        assert_eq!(format_of("README"), "");
    }
}
