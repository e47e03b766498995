//! `SQLite` content hash index.
//!
//! One row per path in the `files` table. Exact-duplicate groups are computed
//! with a `GROUP BY ... HAVING COUNT(*) > 1` over the full grouping key.

use crate::models::{DuplicateGroup, FileRecord};
use crate::storage::metrics::{record_operation_metrics, status_of};
use crate::storage::sqlite::{acquire_lock, initialize_schema, open, open_in_memory};
use crate::storage::traits::ContentHashIndex;
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

const BACKEND: &str = "sqlite";

const RECORD_COLUMNS: &str = "path, size, mtime, content_hash, mime, context_tag, hash_algo";

const UPSERT_SQL: &str = "INSERT INTO files (path, size, mtime, content_hash, mime, context_tag, hash_algo)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
     ON CONFLICT(path) DO UPDATE SET
         size = excluded.size,
         mtime = excluded.mtime,
         content_hash = excluded.content_hash,
         mime = excluded.mime,
         context_tag = excluded.context_tag,
         hash_algo = excluded.hash_algo";

const DUPLICATE_GROUPS_SQL: &str = "SELECT f.content_hash, f.context_tag, f.hash_algo, f.path
     FROM files f
     JOIN (
         SELECT content_hash, context_tag, hash_algo
         FROM files
         GROUP BY content_hash, context_tag, hash_algo
         HAVING COUNT(*) > 1
     ) d ON f.content_hash = d.content_hash
        AND f.context_tag = d.context_tag
        AND f.hash_algo = d.hash_algo
     ORDER BY f.content_hash, f.context_tag, f.hash_algo, f.path";

/// SQLite-backed [`ContentHashIndex`].
pub struct SqliteHashIndex {
    /// Connection to the `SQLite` database; the mutex is the writer lock.
    conn: Mutex<Connection>,
    /// Path to the `SQLite` database (None for in-memory).
    db_path: Option<PathBuf>,
}

impl SqliteHashIndex {
    /// Opens (or creates) the index at `db_path`.
    ///
    /// Safe to call on an existing database: schema creation is idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = open(&db_path)?;
        initialize_schema(&conn)?;

        tracing::debug!(path = %db_path.display(), "Opened SQLite hash index");
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        })
    }

    /// Creates an in-memory index (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    /// Returns the database path.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn query_records(
        &self,
        sql: &str,
        operation: &'static str,
        hash: Option<&str>,
    ) -> Result<Vec<FileRecord>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(sql).map_err(|e| Error::storage(operation, e))?;

        let rows = match hash {
            Some(hash) => stmt.query_map(params![hash], record_from_row),
            None => stmt.query_map([], record_from_row),
        }
        .map_err(|e| Error::storage(operation, e))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::storage(operation, e))
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let size: i64 = row.get(1)?;
    Ok(FileRecord {
        path: row.get(0)?,
        // Sizes are written from u64 and never negative.
        size: u64::try_from(size).unwrap_or_default(),
        mtime: row.get(2)?,
        content_hash: row.get(3)?,
        mime: row.get(4)?,
        context_tag: row.get(5)?,
        hash_algo: row.get(6)?,
    })
}

/// Folds rows ordered by grouping key into groups.
fn fold_groups(rows: Vec<(String, String, String, String)>) -> Vec<DuplicateGroup> {
    let mut groups: Vec<DuplicateGroup> = Vec::new();
    for (content_hash, context_tag, hash_algo, path) in rows {
        match groups.last_mut() {
            Some(last)
                if last.content_hash == content_hash
                    && last.context_tag == context_tag
                    && last.hash_algo == hash_algo =>
            {
                last.paths.push(path);
            },
            _ => groups.push(DuplicateGroup {
                content_hash,
                context_tag,
                hash_algo,
                paths: vec![path],
            }),
        }
    }
    groups
}

impl ContentHashIndex for SqliteHashIndex {
    #[instrument(skip(self, records), fields(operation = "upsert", backend = "sqlite", count = records.len()))]
    fn upsert(&self, records: &[FileRecord]) -> Result<()> {
        let start = Instant::now();

        if records.is_empty() {
            return Ok(());
        }

        let result: Result<()> = (|| {
            let mut conn = acquire_lock(&self.conn);

            // Dropping the transaction without commit rolls the batch back.
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| Error::storage("begin_transaction", e))?;

            {
                let mut stmt = tx
                    .prepare_cached(UPSERT_SQL)
                    .map_err(|e| Error::storage("prepare_upsert", e))?;

                for record in records {
                    let size = i64::try_from(record.size).map_err(|_| {
                        Error::InvalidInput(format!(
                            "size {} of '{}' exceeds storage range",
                            record.size, record.path
                        ))
                    })?;

                    stmt.execute(params![
                        record.path,
                        size,
                        record.mtime,
                        record.content_hash,
                        record.mime,
                        record.context_tag,
                        record.hash_algo
                    ])
                    .map_err(|e| Error::storage("upsert_record", e))?;
                }
            }

            tx.commit()
                .map_err(|e| Error::storage("commit_transaction", e))
        })();

        if let Err(e) = &result {
            tracing::warn!(error = %e, "Hash index upsert rolled back");
        }
        record_operation_metrics(BACKEND, "upsert", start, status_of(&result));
        result
    }

    #[instrument(skip(self), fields(operation = "duplicate_groups", backend = "sqlite"))]
    fn duplicate_groups(&self) -> Result<Vec<DuplicateGroup>> {
        let start = Instant::now();

        let result: Result<Vec<DuplicateGroup>> = (|| {
            let conn = acquire_lock(&self.conn);
            let mut stmt = conn
                .prepare(DUPLICATE_GROUPS_SQL)
                .map_err(|e| Error::storage("prepare_duplicate_groups", e))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })
                .map_err(|e| Error::storage("duplicate_groups", e))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::storage("duplicate_groups", e))?;

            Ok(fold_groups(rows))
        })();

        if let Ok(groups) = &result {
            tracing::debug!(groups = groups.len(), "Enumerated exact duplicate groups");
        }
        record_operation_metrics(BACKEND, "duplicate_groups", start, status_of(&result));
        result
    }

    fn all_records(&self) -> Result<Vec<FileRecord>> {
        let start = Instant::now();
        let sql = format!("SELECT {RECORD_COLUMNS} FROM files");
        let result = self.query_records(&sql, "all_records", None);
        record_operation_metrics(BACKEND, "all_records", start, status_of(&result));
        result
    }

    fn get(&self, path: &str) -> Result<Option<FileRecord>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM files WHERE path = ?1"),
            params![path],
            record_from_row,
        )
        .optional()
        .map_err(|e| Error::storage("get_record", e))
    }

    #[instrument(skip(self, paths), fields(operation = "remove", backend = "sqlite", count = paths.len()))]
    fn remove(&self, paths: &[String]) -> Result<usize> {
        let start = Instant::now();

        if paths.is_empty() {
            return Ok(0);
        }

        let result: Result<usize> = (|| {
            let mut conn = acquire_lock(&self.conn);
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| Error::storage("begin_transaction", e))?;

            let mut removed = 0;
            {
                let mut stmt = tx
                    .prepare_cached("DELETE FROM files WHERE path = ?1")
                    .map_err(|e| Error::storage("prepare_remove", e))?;
                for path in paths {
                    removed += stmt
                        .execute(params![path])
                        .map_err(|e| Error::storage("remove_record", e))?;
                }
            }

            tx.commit()
                .map_err(|e| Error::storage("commit_transaction", e))?;
            Ok(removed)
        })();

        record_operation_metrics(BACKEND, "remove", start, status_of(&result));
        result
    }

    fn count(&self) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))
            .map_err(|e| Error::storage("count_records", e))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn records_with_hash(&self, content_hash: &str) -> Result<Vec<FileRecord>> {
        let sql =
            format!("SELECT {RECORD_COLUMNS} FROM files WHERE content_hash = ?1 ORDER BY path");
        self.query_records(&sql, "records_with_hash", Some(content_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CONTEXT_ARCHIVED;
    use tempfile::TempDir;

    fn scenario_records() -> Vec<FileRecord> {
        vec![
            FileRecord::new("a.txt", 10, 100, "H1"),
            FileRecord::new("b.txt", 10, 100, "H1"),
            FileRecord::new("c.txt", 20, 100, "H2"),
        ]
    }

    #[test]
    fn test_exact_duplicate_scenario() {
        let index = SqliteHashIndex::in_memory().expect("open failed");
        index.upsert(&scenario_records()).expect("upsert failed");

        let groups = index.duplicate_groups().expect("groups failed");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].content_hash, "H1");
        assert_eq!(groups[0].context_tag, "unarchived");
        assert_eq!(groups[0].paths, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_upsert_overwrites_existing_path() {
        let index = SqliteHashIndex::in_memory().expect("open failed");
        index.upsert(&scenario_records()).expect("upsert failed");

        let changed = FileRecord::new("b.txt", 11, 200, "H3").with_mime("text/plain");
        index.upsert(&[changed.clone()]).expect("upsert failed");

        assert_eq!(index.count().expect("count failed"), 3);
        assert_eq!(index.get("b.txt").expect("get failed"), Some(changed));
        assert!(index.duplicate_groups().expect("groups failed").is_empty());
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let index = SqliteHashIndex::in_memory().expect("open failed");
        index.upsert(&scenario_records()).expect("upsert failed");
        let first = index.duplicate_groups().expect("groups failed");
        index.upsert(&scenario_records()).expect("upsert failed");
        let second = index.duplicate_groups().expect("groups failed");

        assert_eq!(first, second);
        assert_eq!(index.count().expect("count failed"), 3);
    }

    #[test]
    fn test_context_tag_partitions_groups() {
        let index = SqliteHashIndex::in_memory().expect("open failed");
        index
            .upsert(&[
                FileRecord::new("a.txt", 10, 100, "H1"),
                FileRecord::new("x/a.txt", 10, 100, "H1").with_context_tag(CONTEXT_ARCHIVED),
            ])
            .expect("upsert failed");

        assert!(index.duplicate_groups().expect("groups failed").is_empty());
        assert_eq!(index.records_with_hash("H1").expect("lookup failed").len(), 2);
    }

    #[test]
    fn test_hash_algo_partitions_groups() {
        let index = SqliteHashIndex::in_memory().expect("open failed");
        index
            .upsert(&[
                FileRecord::new("a.bin", 4, 1, "deadbeef"),
                FileRecord::new("b.bin", 4, 1, "deadbeef").with_hash_algo("xxh64"),
            ])
            .expect("upsert failed");

        assert!(index.duplicate_groups().expect("groups failed").is_empty());
    }

    #[test]
    fn test_failed_batch_leaves_prior_state() {
        let index = SqliteHashIndex::in_memory().expect("open failed");
        index.upsert(&scenario_records()).expect("upsert failed");

        // The second record cannot be stored, so the first must not be either.
        let batch = vec![
            FileRecord::new("d.txt", 10, 100, "H1"),
            FileRecord::new("e.txt", u64::MAX, 100, "H1"),
        ];
        assert!(index.upsert(&batch).is_err());

        assert_eq!(index.count().expect("count failed"), 3);
        assert!(index.get("d.txt").expect("get failed").is_none());
    }

    #[test]
    fn test_remove() {
        let index = SqliteHashIndex::in_memory().expect("open failed");
        index.upsert(&scenario_records()).expect("upsert failed");

        let removed = index
            .remove(&["a.txt".to_string(), "missing.txt".to_string()])
            .expect("remove failed");
        assert_eq!(removed, 1);
        assert!(index.duplicate_groups().expect("groups failed").is_empty());
        assert_eq!(index.remove(&[]).expect("remove failed"), 0);
    }

    #[test]
    fn test_is_unchanged() {
        let index = SqliteHashIndex::in_memory().expect("open failed");
        index.upsert(&scenario_records()).expect("upsert failed");

        assert!(index.is_unchanged("a.txt", 10, 100).expect("lookup failed"));
        assert!(!index.is_unchanged("a.txt", 10, 101).expect("lookup failed"));
        assert!(!index.is_unchanged("zzz.txt", 10, 100).expect("lookup failed"));
    }

    #[test]
    fn test_reopen_existing_database() {
        let dir = TempDir::new().expect("tempdir failed");
        let path = dir.path().join("files.db");

        {
            let index = SqliteHashIndex::new(&path).expect("open failed");
            index.upsert(&scenario_records()).expect("upsert failed");
        }

        let index = SqliteHashIndex::new(&path).expect("reopen failed");
        assert_eq!(index.db_path(), Some(path.as_path()));
        let mut records = index.all_records().expect("read failed");
        records.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(records, scenario_records());
    }

    #[test]
    fn test_open_invalid_path_fails() {
        let result = SqliteHashIndex::new("/nonexistent/deeply/nested/path/files.db");
        assert!(matches!(result, Err(Error::Storage { .. })));
    }

    #[test]
    fn test_groups_never_singletons() {
        let index = SqliteHashIndex::in_memory().expect("open failed");
        let records: Vec<_> = (0..20)
            .map(|i| FileRecord::new(format!("f{i}"), 1, 1, format!("H{}", i % 7)))
            .collect();
        index.upsert(&records).expect("upsert failed");

        for group in index.duplicate_groups().expect("groups failed") {
            assert!(group.len() >= 2);
        }
    }
}
