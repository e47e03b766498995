//! Similarity backend trait.
//!
//! Provides the abstraction layer for near-duplicate vector search. Every
//! backend reports squared Euclidean distances, so thresholds tuned against
//! one backend carry over to the others unchanged.
//!
//! # Available Implementations
//!
//! | Backend | Search | Availability |
//! |---------|--------|--------------|
//! | `BruteForceBackend` | Exact linear scan, O(n·d) per query | Always |
//! | `UsearchBackend` | HNSW graph, approximate | `usearch-hnsw` feature |
//!
//! # Usage Example
//!
//! ```rust
//! use dupfind::storage::SimilarityBackend;
//! use dupfind::storage::vector::BruteForceBackend;
//!
//! let mut backend = BruteForceBackend::new(2);
//! backend.add(&[vec![0.0, 0.0], vec![3.0, 4.0]], None)?;
//!
//! let matches = backend.search(&[0.0, 0.0], 2)?;
//! assert_eq!(matches[0].id.as_str(), "0");
//! assert!((matches[1].distance - 25.0).abs() < 1e-6);
//! # Ok::<(), dupfind::Error>(())
//! ```

use crate::models::{SimilarityMatch, VectorEntry, VectorId};
use crate::{Error, Result};
use std::collections::HashSet;
use std::fmt;
use std::ops::Index;
use std::path::Path;

/// Registered backend variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Exact linear scan.
    BruteForce,
    /// usearch HNSW index.
    Usearch,
}

impl BackendKind {
    /// All variants, in registration order.
    pub const ALL: [Self; 2] = [Self::BruteForce, Self::Usearch];

    /// Canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BruteForce => "brute-force",
            Self::Usearch => "usearch",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for similarity search backends.
///
/// # Implementor Notes
///
/// - `add` takes `&mut self`: backends are not internally synchronized.
///   Share them behind an `RwLock` when several threads need access.
/// - Validate the whole batch before mutating anything.
/// - `available()` and `load()` are associated functions so the factory can
///   probe and construct without an instance.
///
/// # Dimensionality
///
/// All vectors and queries must match [`dimensions()`](Self::dimensions) for
/// the lifetime of the instance.
pub trait SimilarityBackend: Send + Sync {
    /// Which registered variant this is.
    fn kind(&self) -> BackendKind;

    /// The fixed vector dimension.
    fn dimensions(&self) -> usize;

    /// Number of stored vectors.
    fn len(&self) -> usize;

    /// True when no vectors are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends vectors.
    ///
    /// When `ids` is `None`, identifiers are assigned sequentially starting at
    /// the current size, skipping any number already used as an identifier.
    /// Identifiers are unique within one backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if any vector has the wrong length
    /// and [`Error::InvalidInput`] if `ids` and `vectors` differ in length or
    /// an identifier repeats within the batch or matches a stored one. No
    /// vector is stored when an error is returned.
    fn add(&mut self, vectors: &[Vec<f32>], ids: Option<&[VectorId]>) -> Result<()>;

    /// Returns up to `k` matches ordered by ascending squared Euclidean distance.
    ///
    /// An empty backend yields an empty result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `k == 0` and
    /// [`Error::DimensionMismatch`] if the query has the wrong length.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SimilarityMatch>>;

    /// Every stored entry in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if vectors cannot be read back from the index.
    fn entries(&self) -> Result<Vec<VectorEntry>>;

    /// Writes the full vector set and identifier list to `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the artifact cannot be written.
    fn persist(&self, destination: &Path) -> Result<()>;

    /// Whether this backend's runtime dependency is present.
    ///
    /// Side-effect free and cheap; never fails.
    fn available() -> bool
    where
        Self: Sized;

    /// Reconstructs a backend from an artifact written by [`persist`](Self::persist).
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptArtifact`] if the artifact is malformed,
    /// [`Error::Storage`] if it cannot be read and
    /// [`Error::BackendUnavailable`] if the backend is not compiled in.
    fn load(source: &Path) -> Result<Self>
    where
        Self: Sized;
}

/// Checks a batch for `add` against the backend dimension.
///
/// Collisions with already stored identifiers are checked separately, by the
/// backend's id registry.
///
/// # Errors
///
/// Returns [`Error::DimensionMismatch`] or [`Error::InvalidInput`].
pub fn validate_batch(
    dimensions: usize,
    vectors: &[Vec<f32>],
    ids: Option<&[VectorId]>,
) -> Result<()> {
    if let Some(ids) = ids {
        if ids.len() != vectors.len() {
            return Err(Error::InvalidInput(format!(
                "{} ids supplied for {} vectors",
                ids.len(),
                vectors.len()
            )));
        }
        let mut seen = HashSet::with_capacity(ids.len());
        if let Some(repeated) = ids.iter().find(|id| !seen.insert(*id)) {
            return Err(Error::InvalidInput(format!(
                "vector id '{repeated}' appears more than once in the batch"
            )));
        }
    }

    if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
        return Err(Error::DimensionMismatch {
            expected: dimensions,
            actual: bad.len(),
        });
    }

    Ok(())
}

/// Checks a query for `search`.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `k == 0` or
/// [`Error::DimensionMismatch`] if the query has the wrong length.
pub fn validate_query(dimensions: usize, query: &[f32], k: usize) -> Result<()> {
    if k == 0 {
        return Err(Error::InvalidInput("k must be at least 1".to_string()));
    }
    if query.len() != dimensions {
        return Err(Error::DimensionMismatch {
            expected: dimensions,
            actual: query.len(),
        });
    }
    Ok(())
}

/// Identifiers of stored vectors in insertion order, indexed for uniqueness.
#[derive(Debug, Clone, Default)]
pub(crate) struct IdRegistry {
    ids: Vec<VectorId>,
    taken: HashSet<VectorId>,
}

impl IdRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            taken: HashSet::with_capacity(capacity),
        }
    }

    /// Rebuilds a registry from a persisted list.
    ///
    /// Returns the first repeated identifier if the list is not unique.
    pub(crate) fn from_ids(ids: Vec<VectorId>) -> std::result::Result<Self, VectorId> {
        let mut taken = HashSet::with_capacity(ids.len());
        for id in &ids {
            if !taken.insert(id.clone()) {
                return Err(id.clone());
            }
        }
        Ok(Self { ids, taken })
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub(crate) fn as_slice(&self) -> &[VectorId] {
        &self.ids
    }

    pub(crate) fn iter(&self) -> std::slice::Iter<'_, VectorId> {
        self.ids.iter()
    }

    /// Identifiers for the next `count` vectors, without recording them.
    ///
    /// Supplied identifiers must not already be stored. Without them, decimal
    /// positions are handed out from the current size upward, passing over any
    /// that a caller already used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a supplied identifier is taken.
    pub(crate) fn assign(&self, ids: Option<&[VectorId]>, count: usize) -> Result<Vec<VectorId>> {
        if let Some(ids) = ids {
            if let Some(taken) = ids.iter().find(|id| self.taken.contains(*id)) {
                return Err(Error::InvalidInput(format!(
                    "vector id '{taken}' is already stored"
                )));
            }
            return Ok(ids.to_vec());
        }

        let mut assigned = Vec::with_capacity(count);
        let mut next = self.ids.len();
        while assigned.len() < count {
            let candidate = VectorId::sequential(next);
            next += 1;
            if !self.taken.contains(&candidate) {
                assigned.push(candidate);
            }
        }
        Ok(assigned)
    }

    /// Records identifiers returned by [`assign`](Self::assign).
    pub(crate) fn extend(&mut self, ids: Vec<VectorId>) {
        self.taken.extend(ids.iter().cloned());
        self.ids.extend(ids);
    }
}

impl Index<usize> for IdRegistry {
    type Output = VectorId;

    fn index(&self, position: usize) -> &VectorId {
        &self.ids[position]
    }
}
