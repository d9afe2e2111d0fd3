//! Frontmatter split off the top of a page: `+++` TOML, `---` YAML or a
//! leading JSON object.

use tracing::debug;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{parse_time, PageContext, Value};
use crate::core::utils::to_camel_case;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontmatterFormat {
    Toml,
    Yaml,
    Json,
}

/// Parsed frontmatter (camelCase keys) and the body that follows it.
#[derive(Debug, Clone, PartialEq)]
pub struct Split<'a> {
    pub format: Option<FrontmatterFormat>,
    pub fields: PageContext,
    pub body: &'a str,
}

pub fn split_frontmatter(text: &str) -> Result<Split<'_>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    if text.starts_with("+++") {
        let (head, body) = delimited(text, "+++")?;
        let table: toml::Table = toml::from_str(head)
            .map_err(|e| Error::new(ErrorKind::Parse, format!("toml frontmatter: {}", e)))?;
        let mut fields = PageContext::new();
        for (key, value) in table {
            insert(&mut fields, &key, from_toml(value));
        }
        return Ok(Split { format: Some(FrontmatterFormat::Toml), fields, body });
    }

    if text.starts_with("---") {
        let (head, body) = delimited(text, "---")?;
        let doc: serde_yaml::Value = serde_yaml::from_str(head)
            .map_err(|e| Error::new(ErrorKind::Parse, format!("yaml frontmatter: {}", e)))?;
        let mut fields = PageContext::new();
        match doc {
            serde_yaml::Value::Mapping(map) => {
                for (key, value) in map {
                    if let Some(key) = key.as_str() {
                        insert(&mut fields, key, from_yaml(value));
                    }
                }
            }
            serde_yaml::Value::Null => {}
            _ => {
                return Err(Error::new(ErrorKind::Parse, "yaml frontmatter is not a mapping".to_string()));
            }
        }
        return Ok(Split { format: Some(FrontmatterFormat::Yaml), fields, body });
    }

    if text.starts_with('{') {
        let mut stream = serde_json::Deserializer::from_str(text).into_iter::<serde_json::Value>();
        let object = match stream.next() {
            Some(Ok(serde_json::Value::Object(object))) => object,
            Some(Ok(_)) | None => {
                return Err(Error::new(ErrorKind::Parse, "json frontmatter is not an object".to_string()));
            }
            Some(Err(e)) => return Err(e.into()),
        };
        let body = &text[stream.byte_offset()..];
        let body = body.strip_prefix("\r\n").or_else(|| body.strip_prefix('\n')).unwrap_or(body);
        let mut fields = PageContext::new();
        for (key, value) in object {
            insert(&mut fields, &key, from_json(value));
        }
        return Ok(Split { format: Some(FrontmatterFormat::Json), fields, body });
    }

    Ok(Split { format: None, fields: PageContext::new(), body: text })
}

fn delimited<'a>(text: &'a str, delim: &str) -> Result<(&'a str, &'a str)> {
    let unterminated = || Error::new(ErrorKind::Parse, format!("unterminated {} frontmatter", delim));
    let rest = &text[delim.len()..];
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .ok_or_else(unterminated)?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == delim {
            return Ok((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    Err(unterminated())
}

fn insert(fields: &mut PageContext, key: &str, value: Option<Value>) {
    match value {
        Some(value) => {
            fields.insert(to_camel_case(key), value);
        }
        None => debug!(key, "frontmatter field has no scalar form, skipped"),
    }
}

fn from_toml(value: toml::Value) -> Option<Value> {
    match value {
        toml::Value::String(s) => Some(Value::Text(s)),
        toml::Value::Integer(i) => Some(Value::Int(i)),
        toml::Value::Float(f) => Some(Value::Float(f)),
        toml::Value::Boolean(b) => Some(Value::Bool(b)),
        toml::Value::Datetime(dt) => {
            let text = dt.to_string();
            Some(parse_time(&text).map(Value::Time).unwrap_or(Value::Text(text)))
        }
        toml::Value::Array(items) => Some(Value::List(items.into_iter().filter_map(from_toml).collect())),
        toml::Value::Table(_) => None,
    }
}

fn from_yaml(value: serde_yaml::Value) -> Option<Value> {
    match value {
        serde_yaml::Value::Null => None,
        serde_yaml::Value::Bool(b) => Some(Value::Bool(b)),
        serde_yaml::Value::Number(n) => n.as_i64().map(Value::Int).or_else(|| n.as_f64().map(Value::Float)),
        serde_yaml::Value::String(s) => Some(Value::Text(s)),
        serde_yaml::Value::Sequence(items) => {
            Some(Value::List(items.into_iter().filter_map(from_yaml).collect()))
        }
        serde_yaml::Value::Mapping(_) => None,
        serde_yaml::Value::Tagged(tagged) => from_yaml(tagged.value),
    }
}

fn from_json(value: serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(Value::Bool(b)),
        serde_json::Value::Number(n) => n.as_i64().map(Value::Int).or_else(|| n.as_f64().map(Value::Float)),
        serde_json::Value::String(s) => Some(Value::Text(s)),
        serde_json::Value::Array(items) => {
            Some(Value::List(items.into_iter().filter_map(from_json).collect()))
        }
        serde_json::Value::Object(_) => None,
    }
}
