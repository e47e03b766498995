//! Vector identifiers, entries and search matches.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an indexed vector.
///
/// Identifiers are opaque strings. When the resolver compares near-duplicate
/// candidates against exact groups it treats them as file paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorId(String);

impl VectorId {
    /// Creates a new vector ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the ID, returning the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// The identifier auto-assigned to the vector stored at `position`.
    #[must_use]
    pub fn sequential(position: usize) -> Self {
        Self(position.to_string())
    }
}

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VectorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VectorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An indexed embedding with its identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    /// Identifier.
    pub id: VectorId,
    /// Embedding values.
    pub vector: Vec<f32>,
}

impl VectorEntry {
    /// Creates a new entry.
    #[must_use]
    pub fn new(id: impl Into<VectorId>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
        }
    }
}

/// A neighbour returned by a similarity search.
///
/// `distance` is the squared Euclidean distance to the query, in the same
/// units for every backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    /// Identifier of the neighbour.
    pub id: VectorId,
    /// Squared Euclidean distance to the query.
    pub distance: f32,
}

impl SimilarityMatch {
    /// Creates a new match.
    #[must_use]
    pub const fn new(id: VectorId, distance: f32) -> Self {
        Self { id, distance }
    }
}

/// Squared Euclidean distance between two equal-length vectors.
#[must_use]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
