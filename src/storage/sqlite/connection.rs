//! Connection handling for the `SQLite` hash index.
//!
//! The connection lives behind a `Mutex`, which is the single-writer lock.
//! WAL journaling lets other connections to the same file keep reading a
//! committed snapshot while a batch is being written.

use crate::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Milliseconds `SQLite` waits on a locked database before returning `SQLITE_BUSY`.
pub const BUSY_TIMEOUT_MS: u32 = 5000;

/// Acquires a mutex, recovering the inner value if it was poisoned.
///
/// A panic inside a previous critical section cannot leave a rusqlite
/// transaction open (it rolls back on drop), so the connection is still usable.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Opens a database file, creating it if needed.
///
/// # Errors
///
/// Returns [`Error::Storage`] if the file cannot be opened or configured.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).map_err(|e| Error::storage("open_sqlite", e))?;
    configure_connection(&conn)?;
    Ok(conn)
}

/// Opens a private in-memory database.
///
/// # Errors
///
/// Returns [`Error::Storage`] if the database cannot be created.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().map_err(|e| Error::storage("open_sqlite_memory", e))?;
    configure_connection(&conn)?;
    Ok(conn)
}

/// Applies WAL journaling, NORMAL synchronous mode and a busy timeout.
///
/// # Errors
///
/// Returns [`Error::Storage`] if the busy timeout cannot be set.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode returns a row ("wal", or "memory" for in-memory databases),
    // so it goes through pragma_update and the result is not checked.
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS)
        .map_err(|e| Error::storage("configure_sqlite", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_lock_concurrent() {
        let mutex = Arc::new(Mutex::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                thread::spawn(move || {
                    *acquire_lock(&mutex) += 1;
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("thread panicked");
        }

        assert_eq!(*acquire_lock(&mutex), 8);
    }

    #[test]
    fn test_acquire_lock_recovers_from_poison() {
        let mutex = Arc::new(Mutex::new(1));
        let clone = Arc::clone(&mutex);
        let _ = thread::spawn(move || {
            let _guard = clone.lock().expect("lock");
            panic!("poison the mutex");
        })
        .join();

        assert!(mutex.is_poisoned());
        assert_eq!(*acquire_lock(&mutex), 1);
    }

    #[test]
    fn test_file_database_uses_wal() {
        let dir = TempDir::new().expect("tempdir failed");
        let conn = open(&dir.path().join("files.db")).expect("open failed");

        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("journal_mode");
        assert_eq!(journal_mode.to_lowercase(), "wal");

        let busy_timeout: i64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .expect("busy_timeout");
        assert_eq!(busy_timeout, i64::from(BUSY_TIMEOUT_MS));
    }

    #[test]
    fn test_in_memory_database() {
        let conn = open_in_memory().expect("open failed");
        let synchronous: i64 = conn
            .pragma_query_value(None, "synchronous", |row| row.get(0))
            .expect("synchronous");
        assert_eq!(synchronous, 1, "Expected NORMAL synchronous mode (1)");
    }
}
