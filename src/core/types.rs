use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};
use crate::core::utils::{format_duration, parse_duration};

/// Attribute value stored in page contexts and attribute postings.
///
/// `List` only appears on page contexts; indexing fans it out into one
/// posting per element, so postings always hold scalars. The serde form is
/// externally tagged so it survives bincode; `to_json` gives the plain form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Time(DateTime<Utc>),
    Duration(Duration),
    Text(String),
    List(Vec<Value>),
}

/// Page attributes keyed by camelCase attribute name.
pub type PageContext = BTreeMap<String, Value>;

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Time(_) => "time",
            Value::Duration(_) => "duration",
            Value::Text(_) => "string",
            Value::List(_) => "list",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Untagged JSON rendering for result envelopes.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(x) => serde_json::Value::from(*x),
            Value::Time(_) | Value::Duration(_) | Value::Text(_) => {
                serde_json::Value::String(self.to_string())
            }
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    /// Scalars this value posts under: itself, or each element of a list.
    pub fn fan_out(&self) -> Vec<&Value> {
        match self {
            Value::List(items) => items.iter().flat_map(|v| v.fan_out()).collect(),
            other => vec![other],
        }
    }

    /// Parses `literal` into the same variant as `self`.
    ///
    /// A literal that cannot be represented in this value's type is a type
    /// mismatch, never a silent non-match.
    pub fn coerce_literal(&self, literal: &str) -> Result<Value> {
        let mismatch = || {
            Error::type_mismatch(format!(
                "cannot compare {} value with \"{}\"",
                self.type_name(),
                literal
            ))
        };
        match self {
            Value::Text(_) => Ok(Value::Text(literal.to_string())),
            Value::Bool(_) => literal.parse::<bool>().map(Value::Bool).map_err(|_| mismatch()),
            Value::Int(_) => literal.parse::<i64>().map(Value::Int).map_err(|_| mismatch()),
            Value::Float(_) => literal.parse::<f64>().map(Value::Float).map_err(|_| mismatch()),
            Value::Time(_) => parse_time(literal).map(Value::Time).ok_or_else(mismatch),
            Value::Duration(_) => parse_duration(literal).map(Value::Duration).ok_or_else(mismatch),
            Value::List(_) => Err(mismatch()),
        }
    }

    /// Equality requiring both operands to be the same variant.
    pub fn strict_eq(&self, other: &Value) -> Result<bool> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
            (Value::Int(a), Value::Int(b)) => Ok(a == b),
            (Value::Float(a), Value::Float(b)) => Ok(a == b),
            (Value::Time(a), Value::Time(b)) => Ok(a == b),
            (Value::Duration(a), Value::Duration(b)) => Ok(a == b),
            (Value::Text(a), Value::Text(b)) => Ok(a == b),
            (a, b) => Err(Error::type_mismatch(format!(
                "cannot compare {} with {}",
                a.type_name(),
                b.type_name()
            ))),
        }
    }

    /// Typed ordering used for ORDER BY; mixed variants order by type rank.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Time(a), Value::Time(b)) => a.cmp(b),
            (Value::Duration(a), Value::Duration(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a.len().cmp(&b.len()),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::Duration(_) => 2,
            Value::Time(_) => 3,
            Value::Text(_) => 4,
            Value::List(_) => 5,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Time(t) => write!(f, "{}", t.to_rfc3339()),
            Value::Duration(d) => write!(f, "{}", format_duration(*d)),
            Value::Text(s) => write!(f, "{}", s),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Time(t)
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` and bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(t.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn test_coerce_literal_keeps_type_parity() {
        assert_eq!(Value::Int(3).coerce_literal("42").unwrap(), Value::Int(42));
        assert_eq!(Value::Bool(false).coerce_literal("true").unwrap(), Value::Bool(true));
        let err = Value::Int(3).coerce_literal("post").unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_coerce_time_and_duration() {
        let t = Value::Time(Utc::now()).coerce_literal("2024-03-01").unwrap();
        assert_eq!(t.to_string(), "2024-03-01T00:00:00+00:00");
        let d = Value::Duration(Duration::ZERO).coerce_literal("1h30m").unwrap();
        assert_eq!(d, Value::Duration(Duration::from_secs(5400)));
    }

    #[test]
    fn test_strict_eq_rejects_mixed_variants() {
        assert!(Value::from("a").strict_eq(&Value::from("a")).unwrap());
        assert!(Value::Int(1).strict_eq(&Value::from("1")).is_err());
    }

    #[test]
    fn test_fan_out_flattens_lists() {
        let v = Value::List(vec![Value::from("a"), Value::List(vec![Value::from("b")])]);
        let scalars: Vec<String> = v.fan_out().iter().map(|v| v.to_string()).collect();
        assert_eq!(scalars, vec!["a", "b"]);
    }

    #[test]
    fn test_bincode_round_trip_keeps_variant() {
        let original = Value::Text("2024-01-01T00:00:00Z".to_string());
        let bytes = bincode::serialize(&original).unwrap();
        let decoded: Value = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_sort_cmp_numbers_mix() {
        assert_eq!(Value::Int(2).sort_cmp(&Value::Float(2.5)), Ordering::Less);
        assert_eq!(Value::from("b").sort_cmp(&Value::from("a")), Ordering::Greater);
    }
}
