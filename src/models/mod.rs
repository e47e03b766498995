//! Data models for dupfind.
//!
//! Records persisted by the hash index, vector entries held by similarity
//! backends, and the derived groups and matches they produce.

mod record;
mod report;
mod similarity;

pub use record::{
    CONTEXT_ARCHIVED, CONTEXT_UNARCHIVED, DEFAULT_HASH_ALGO, DEFAULT_MIME, DuplicateGroup,
    FileRecord, GroupKey,
};
pub use report::{DuplicateReport, GroupKind, ResolvedGroup};
pub use similarity::{SimilarityMatch, VectorEntry, VectorId, squared_l2};
