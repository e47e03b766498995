//! Content hash index implementations.

mod sqlite;

pub use sqlite::SqliteHashIndex;
