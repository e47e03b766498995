//! Content hashing for the exact-duplicate index.
//!
//! Produces the `sha256` form of [`FileRecord::content_hash`]: the lowercase
//! hex SHA-256 digest of the raw file bytes. Files are streamed in fixed-size
//! chunks, so memory use does not grow with file size.

use crate::models::{DEFAULT_HASH_ALGO, FileRecord};
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Read size for streaming hashing and comparison.
const CHUNK_SIZE: usize = 64 * 1024;

/// Streaming SHA-256 hasher and byte comparator.
///
/// # Example
///
/// ```rust
/// use dupfind::ContentHasher;
///
/// let hash = ContentHasher::hash_bytes(b"hello");
/// assert_eq!(hash.len(), 64);
/// assert_eq!(hash, ContentHasher::hash_reader(&b"hello"[..]).unwrap());
/// ```
pub struct ContentHasher;

impl ContentHasher {
    /// Hashes an in-memory buffer.
    #[must_use]
    pub fn hash_bytes(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Hashes everything `reader` yields.
    ///
    /// # Errors
    ///
    /// Propagates read errors.
    pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<String> {
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => hasher.update(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(e),
            }
        }
        Ok(hex::encode(hasher.finalize()))
    }

    /// Hashes the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file cannot be opened or read.
    pub fn hash_file(path: &Path) -> Result<String> {
        let file = File::open(path).map_err(|e| Error::storage("open_file", e))?;
        Self::hash_reader(file).map_err(|e| Error::storage("hash_file", e))
    }

    /// Builds a [`FileRecord`] for `path` with its current size, mtime and
    /// content hash.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if metadata or contents cannot be read, and
    /// [`Error::InvalidInput`] if `path` is not a regular file.
    pub fn record_for(path: &Path, context_tag: &str) -> Result<FileRecord> {
        let meta = fs::metadata(path).map_err(|e| Error::storage("stat_file", e))?;
        if !meta.is_file() {
            return Err(Error::InvalidInput(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let hash = Self::hash_file(path)?;
        Ok(FileRecord::new(
            path.to_string_lossy().into_owned(),
            meta.len(),
            mtime_seconds(&meta),
            hash,
        )
        .with_hash_algo(DEFAULT_HASH_ALGO)
        .with_context_tag(context_tag))
    }

    /// Whether two files have identical bytes.
    ///
    /// Sizes are compared first; equal-size files are streamed side by side
    /// and the comparison stops at the first differing chunk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if either file cannot be read.
    pub fn files_identical(a: &Path, b: &Path) -> Result<bool> {
        let meta_a = fs::metadata(a).map_err(|e| Error::storage("stat_file", e))?;
        let meta_b = fs::metadata(b).map_err(|e| Error::storage("stat_file", e))?;
        if meta_a.len() != meta_b.len() {
            return Ok(false);
        }

        let open = |p: &Path| {
            File::open(p)
                .map(BufReader::new)
                .map_err(|e| Error::storage("open_file", e))
        };
        let (mut left, mut right) = (open(a)?, open(b)?);
        let mut buf_a = vec![0u8; CHUNK_SIZE];
        let mut buf_b = vec![0u8; CHUNK_SIZE];

        loop {
            let n_a = fill(&mut left, &mut buf_a).map_err(|e| Error::storage("read_file", e))?;
            let n_b = fill(&mut right, &mut buf_b).map_err(|e| Error::storage("read_file", e))?;
            if n_a != n_b || buf_a[..n_a] != buf_b[..n_b] {
                return Ok(false);
            }
            if n_a == 0 {
                return Ok(true);
            }
        }
    }
}

/// Reads until `buf` is full or the reader is exhausted.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Modification time in whole seconds relative to the Unix epoch.
fn mtime_seconds(meta: &fs::Metadata) -> i64 {
    meta.modified().map_or(0, |time| {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
            Err(before) => -i64::try_from(before.duration().as_secs()).unwrap_or(i64::MAX),
        }
    })
}
