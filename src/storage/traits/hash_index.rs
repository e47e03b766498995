//! Content hash index trait.
//!
//! The hash index is the durable record of per-path content identity. Exact
//! duplicates are derived from it on demand; nothing else is persisted.
//!
//! # Error Modes and Guarantees
//!
//! | Operation | Atomicity | On Failure |
//! |-----------|-----------|------------|
//! | `upsert` | Whole batch | Prior committed state untouched |
//! | `remove` | Whole batch | Prior committed state untouched |
//! | reads | Snapshot | `Error::Storage` |
//!
//! An empty result from `duplicate_groups()` is a valid "no duplicates"
//! outcome, never an error.

use crate::Result;
use crate::models::{DuplicateGroup, FileRecord};

/// Trait for content hash index backends.
///
/// # Implementor Notes
///
/// - Methods use `&self` to enable sharing via `Arc<dyn ContentHashIndex>`
/// - Use interior mutability (e.g., `Mutex<Connection>`) and serialize writers
/// - Group on all of `(content_hash, context_tag, hash_algo)`, never on the hash alone
pub trait ContentHashIndex: Send + Sync {
    /// Inserts new paths and overwrites every field of existing ones.
    ///
    /// The batch is applied atomically.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Storage`] if any write fails; nothing from the
    /// batch is committed in that case.
    fn upsert(&self, records: &[FileRecord]) -> Result<()>;

    /// Returns every `(content_hash, context_tag, hash_algo)` key shared by at
    /// least two paths, with its members.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn duplicate_groups(&self) -> Result<Vec<DuplicateGroup>>;

    /// Reads back every record. Ordering is not guaranteed.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn all_records(&self) -> Result<Vec<FileRecord>>;

    /// Retrieves the record for one path.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get(&self, path: &str) -> Result<Option<FileRecord>>;

    /// Explicitly removes paths, returning how many rows were deleted.
    ///
    /// Unknown paths are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails; the batch is rolled back.
    fn remove(&self, paths: &[String]) -> Result<usize>;

    /// Number of recorded paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn count(&self) -> Result<usize>;

    /// Every record sharing `content_hash`, across contexts and algorithms.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn records_with_hash(&self, content_hash: &str) -> Result<Vec<FileRecord>>;

    /// True if `path` is recorded with exactly this size and mtime.
    ///
    /// Lets a walker skip re-hashing files that have not changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn is_unchanged(&self, path: &str, size: u64, mtime: i64) -> Result<bool> {
        Ok(self
            .get(path)?
            .is_some_and(|r| r.size == size && r.mtime == mtime))
    }
}
