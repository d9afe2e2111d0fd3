pub mod ast;
pub mod parser;
pub mod cache;
pub mod matcher;
pub mod selector;
