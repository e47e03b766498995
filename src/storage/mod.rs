//! Storage layer abstraction.
//!
//! Two layers back duplicate detection:
//! - **Hash index**: authoritative per-path records with exact-duplicate
//!   grouping (`SQLite`)
//! - **Similarity**: feature-vector nearest-neighbour search (brute force,
//!   usearch)

// Allow significant_drop_tightening - dropping database connections slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]
// Vector keys and counts are well below 2^52.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

pub mod index;
pub mod metrics;
pub mod sqlite;
pub mod traits;
pub mod vector;

pub use index::SqliteHashIndex;
pub use traits::{BackendKind, ContentHashIndex, SimilarityBackend};
pub use vector::{BruteForceBackend, UsearchBackend, detect_artifact};
