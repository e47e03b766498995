//! Storage backend traits.

mod hash_index;
mod similarity;

pub use hash_index::ContentHashIndex;
pub use similarity::{BackendKind, SimilarityBackend, validate_batch, validate_query};

pub(crate) use similarity::IdRegistry;
