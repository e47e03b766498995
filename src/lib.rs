//! # dupfind
//!
//! Exact and near-duplicate detection for large file collections.
//!
//! The crate is built around two indexes:
//!
//! - A durable content hash index (`SQLite`) mapping every path to its size,
//!   modification time, digest, MIME type and context tag. Paths sharing a
//!   `(content_hash, context_tag, hash_algo)` key are exact duplicates.
//! - A pluggable vector similarity index for near-duplicates. Embeddings are
//!   opaque fixed-length `f32` vectors produced elsewhere; the backends only
//!   store and search them.
//!
//! ## Features
//!
//! - Transactional batch upserts with single-writer discipline (WAL mode)
//! - Exact brute-force similarity search that is always available
//! - Optional usearch HNSW backend behind the `usearch-hnsw` cargo feature
//! - Explicit backend factory with observable fallback
//! - Resolver merging exact and near-duplicate evidence into one report
//!
//! ## Example
//!
//! ```rust
//! use dupfind::storage::{ContentHashIndex, SqliteHashIndex};
//! use dupfind::{DuplicateResolver, FileRecord, ResolverConfig, SimilarityBackendFactory};
//! use std::sync::Arc;
//!
//! let index = Arc::new(SqliteHashIndex::in_memory()?);
//! index.upsert(&[
//!     FileRecord::new("a.txt", 10, 100, "H1"),
//!     FileRecord::new("b.txt", 10, 100, "H1"),
//! ])?;
//!
//! let factory = SimilarityBackendFactory::new();
//! let selection = factory.create("usearch", 512)?;
//! if selection.fell_back() {
//!     eprintln!("usearch unavailable, using {}", selection.selected());
//! }
//!
//! let resolver = DuplicateResolver::new(index, ResolverConfig::default())?
//!     .with_backend(selection.into_backend().into());
//! let report = resolver.resolve()?;
//! assert_eq!(report.exact_count(), 1);
//! # Ok::<(), dupfind::Error>(())
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;
use thiserror::Error as ThisError;

pub mod config;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::{DupfindConfig, ResolverSettings};
pub use models::{
    DuplicateGroup, DuplicateReport, FileRecord, GroupKind, ResolvedGroup, SimilarityMatch,
    VectorEntry, VectorId,
};
pub use services::{
    BackendSelection, ContentHasher, DuplicateResolver, ResolverConfig, SimilarityBackendFactory,
};
pub use storage::{BackendKind, ContentHashIndex, SimilarityBackend};

/// Error type for dupfind operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Storage` | `SQLite` open/read/write failures, artifact I/O failures |
/// | `DimensionMismatch` | A vector or query does not match the backend dimension |
/// | `BackendUnavailable` | The accelerated backend was not compiled in |
/// | `UnknownBackend` | A backend name matches no registered variant |
/// | `CorruptArtifact` | A persisted backend fails to parse or is inconsistent |
/// | `InvalidInput` | Contract violations such as `k == 0` or mismatched id counts |
/// | `OperationFailed` | Configuration or logging setup failures |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Durable storage failed.
    ///
    /// Never swallowed: a silently lost write in a duplicate index is worse
    /// than a visible failure.
    #[error("storage operation '{operation}' failed: {cause}")]
    Storage {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A vector did not match the backend's fixed dimension.
    ///
    /// Raised before any backend state is mutated.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The backend dimension.
        expected: usize,
        /// The offending vector length.
        actual: usize,
    },

    /// The requested backend's runtime dependency is missing.
    ///
    /// The factory recovers from this by falling back to brute force when
    /// creating a backend; loading an accelerated artifact still fails.
    #[error("backend unavailable: {0} (compile with --features usearch-hnsw)")]
    BackendUnavailable(String),

    /// The requested backend name is not registered.
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    /// A persisted artifact could not be parsed or is inconsistent.
    #[error("corrupt artifact {}: {cause}", path.display())]
    CorruptArtifact {
        /// The artifact that failed to load.
        path: PathBuf,
        /// What was wrong with it.
        cause: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A non-storage operation failed (configuration, logging setup).
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Builds a [`Error::Storage`] from an operation name and any displayable cause.
    pub fn storage(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::Storage {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }

    /// Builds a [`Error::OperationFailed`] from an operation name and cause.
    pub fn failed(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }

    /// Builds a [`Error::CorruptArtifact`] for the given path.
    pub fn corrupt(path: impl Into<PathBuf>, cause: impl std::fmt::Display) -> Self {
        Self::CorruptArtifact {
            path: path.into(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for dupfind operations.
pub type Result<T> = std::result::Result<T, Error>;
