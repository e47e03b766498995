//! Schema for the content hash index.

use crate::{Error, Result};
use rusqlite::Connection;

/// Name of the table holding one row per path.
pub const FILES_TABLE: &str = "files";

/// Creates the `files` table and its lookup indexes.
///
/// Every statement is `IF NOT EXISTS`, so opening an existing database is a
/// no-op and never duplicates schema objects.
///
/// # Errors
///
/// Returns [`Error::Storage`] if a statement fails.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS files (
            path TEXT PRIMARY KEY,
            size INTEGER NOT NULL,
            mtime INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            mime TEXT NOT NULL,
            context_tag TEXT NOT NULL,
            hash_algo TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_files_hash ON files(content_hash);
        CREATE INDEX IF NOT EXISTS idx_files_hash_context ON files(content_hash, context_tag);",
    )
    .map_err(|e| Error::storage("create_files_schema", e))
}
