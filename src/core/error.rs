use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Parse,
    NotFound,
    InvalidArgument,
    InvalidInput,
    TypeMismatch,
    Backend,
    ReadOnly,
    InvalidState,
    Internal,
}

#[derive(Debug, thiserror::Error)]
#[error("{kind:?}: {context}")]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
    parse: Option<ParseError>,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context, parse: None }
    }

    pub fn not_found(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, context.into())
    }

    pub fn type_mismatch(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::TypeMismatch, context.into())
    }

    pub fn backend(context: impl fmt::Display) -> Self {
        Error::new(ErrorKind::Backend, context.to_string())
    }

    /// Backend key misses are the only errors callers may treat as "create".
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// The structured query error behind a `Parse` failure, when there is one.
    pub fn parse_error(&self) -> Option<&ParseError> {
        self.parse.as_ref()
    }
}

/// Query syntax error pointing at the offending column of the source text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at column {column}")]
pub struct ParseError {
    /// 1-based column into `query`.
    pub column: usize,
    pub message: String,
    pub query: String,
}

impl ParseError {
    pub fn new(query: &str, column: usize, message: impl Into<String>) -> Self {
        ParseError {
            column: column.max(1),
            message: message.into(),
            query: query.to_string(),
        }
    }

    /// Renders the source line with a caret under the failing column.
    pub fn pretty(&self) -> String {
        let pad = " ".repeat(self.column.saturating_sub(1));
        format!("{}\n{}^ {}", self.query, pad, self.message)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: err.to_string(),
            parse: Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            _ => ErrorKind::Io,
        };
        Error::new(kind, err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::new(ErrorKind::Parse, err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorKind::Parse, format!("json: {}", err))
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::new(ErrorKind::InvalidInput, format!("regex: {}", err))
    }
}

impl From<redb::Error> for Error {
    fn from(err: redb::Error) -> Self {
        Error::backend(format!("redb: {}", err))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::backend(format!("sqlite: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_pretty_places_caret() {
        let err = ParseError::new("(.Type = \"post\")", 8, "unexpected input");
        let pretty = err.pretty();
        let lines: Vec<&str> = pretty.lines().collect();
        assert_eq!(lines[0], "(.Type = \"post\")");
        assert_eq!(lines[1], "       ^ unexpected input");
    }

    #[test]
    fn test_parse_error_survives_conversion() {
        let err: Error = ParseError::new("x", 1, "boom").into();
        assert_eq!(err.kind, ErrorKind::Parse);
        assert_eq!(err.parse_error().map(|p| p.column), Some(1));
    }

    #[test]
    fn test_io_not_found_is_distinct() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(err.is_not_found());
        let io = std::io::Error::other("disk");
        let err: Error = io.into();
        assert!(!err.is_not_found());
    }
}
