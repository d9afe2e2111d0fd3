use std::sync::OnceLock;
use isolang::Language;
use regex::Regex;

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z]{2,3}(?:-[A-Za-z0-9]{2,8})*$").expect("valid language tag pattern")
    })
}

/// True for directory names that read as a language tag (`en`, `pt-BR`,
/// `zh-Hant-TW`, `yue-HK`). The primary subtag must be an ISO 639 code. A bare
/// three-letter code also needs a region or script subtag, because names like
/// `faq`, `api` or `css` are ISO 639-3 codes that far more often name a section.
pub fn is_language_tag(name: &str) -> bool {
    if !tag_pattern().is_match(name) {
        return false;
    }
    let mut subtags = name.split('-');
    let primary = subtags.next().unwrap_or_default().to_ascii_lowercase();
    let qualified = subtags.next().is_some();
    match primary.len() {
        2 => Language::from_639_1(&primary).is_some(),
        3 => qualified && Language::from_639_3(&primary).is_some(),
        _ => false,
    }
}

/// Canonical casing: lowercase primary, uppercase 2-letter region, title-case
/// 4-letter script.
pub fn normalize_tag(tag: &str) -> String {
    tag.split('-')
        .enumerate()
        .map(|(i, part)| {
            if i == 0 {
                part.to_ascii_lowercase()
            } else if part.len() == 2 {
                part.to_ascii_uppercase()
            } else if part.len() == 4 {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => {
                        first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                    }
                    None => String::new(),
                }
            } else {
                part.to_ascii_lowercase()
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
