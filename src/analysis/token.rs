use serde::{Serialize, Deserialize};

/// Token representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,      // Lowercased word
    pub position: u32,     // Word position in the text
    pub offset: usize,     // Byte offset in original text
    pub length: usize,     // Length of the original word in bytes
}

impl Token {
    pub fn new(text: String, position: u32, offset: usize, length: usize) -> Self {
        Token {
            text,
            position,
            offset,
            length,
        }
    }
}

/// How a keyword query term constrains matching documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Occur {
    Must,     // `+term`
    Should,   // bare term
    MustNot,  // `-term`
}

/// One term of a keyword search query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTerm {
    pub text: String,
    pub occur: Occur,
}

impl QueryTerm {
    pub fn new(text: impl Into<String>, occur: Occur) -> Self {
        QueryTerm { text: text.into(), occur }
    }
}
