//! Duplicate detection services.
//!
//! Services compose the storage layer into the operations callers use:
//! hashing files, choosing a similarity backend, and resolving duplicates.

mod backend_factory;
mod hasher;
mod resolver;

pub use backend_factory::{BackendSelection, SimilarityBackendFactory};
pub use hasher::ContentHasher;
pub use resolver::{DEFAULT_NEAR_THRESHOLD, DEFAULT_NEIGHBORS, DuplicateResolver, ResolverConfig};
