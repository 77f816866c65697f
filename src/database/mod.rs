// Database module
// SQLite for knowledge base metadata and generated sections, LanceDB for entry vectors

pub mod lancedb;
pub mod sqlite;

pub use sqlite::*;
