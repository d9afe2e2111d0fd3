pub mod posting;
pub mod tables;
pub mod context;
pub mod keyword;
