//! Brute-force similarity backend.
//!
//! Keeps every vector in one dense row-major block with a parallel id list and
//! answers queries with a full linear scan. Results are exact, and ties are
//! broken by insertion order.

use super::artifact;
use crate::models::{SimilarityMatch, VectorEntry, VectorId, squared_l2};
use crate::storage::metrics::{record_operation_metrics, status_of};
use crate::storage::traits::{
    BackendKind, IdRegistry, SimilarityBackend, validate_batch, validate_query,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;
use std::time::Instant;

const BACKEND: &str = "brute-force";

/// Current on-disk format version.
const FORMAT_VERSION: u32 = 1;

/// Exact nearest-neighbour backend with no external dependencies.
#[derive(Debug, Clone)]
pub struct BruteForceBackend {
    /// Fixed vector dimension.
    dimensions: usize,
    /// Row-major vector block, `ids.len() * dimensions` values.
    data: Vec<f32>,
    /// Identifier of each row, in insertion order.
    ids: IdRegistry,
}

/// Serialized form: the vector block and the parallel id list.
#[derive(Serialize, Deserialize)]
struct BruteForceArtifact {
    format_version: u32,
    dimensions: usize,
    ids: Vec<VectorId>,
    data: Vec<f32>,
}

impl BruteForceBackend {
    /// Creates an empty backend for vectors of length `dimensions`.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            data: Vec::new(),
            ids: IdRegistry::new(),
        }
    }

    /// Creates an empty backend with room for `capacity` vectors.
    #[must_use]
    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            dimensions,
            data: Vec::with_capacity(capacity.saturating_mul(dimensions)),
            ids: IdRegistry::with_capacity(capacity),
        }
    }

    /// The stored vector at `position`.
    fn row(&self, position: usize) -> &[f32] {
        let start = position * self.dimensions;
        &self.data[start..start + self.dimensions]
    }

    fn scan(&self, query: &[f32], k: usize) -> Vec<SimilarityMatch> {
        if self.ids.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(f32, usize)> = (0..self.ids.len())
            .map(|position| (squared_l2(query, self.row(position)), position))
            .collect();

        let k = k.min(scored.len());
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_distance_then_position);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_distance_then_position);

        scored
            .into_iter()
            .map(|(distance, position)| SimilarityMatch::new(self.ids[position].clone(), distance))
            .collect()
    }
}

/// Total order on `(distance, insertion position)`; equivalent to a stable sort
/// by distance.
fn by_distance_then_position(a: &(f32, usize), b: &(f32, usize)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

impl SimilarityBackend for BruteForceBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::BruteForce
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn add(&mut self, vectors: &[Vec<f32>], ids: Option<&[VectorId]>) -> Result<()> {
        validate_batch(self.dimensions, vectors, ids)?;

        let ids = self.ids.assign(ids, vectors.len())?;
        self.data.reserve(vectors.len() * self.dimensions);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        self.ids.extend(ids);

        tracing::debug!(
            added = vectors.len(),
            total = self.ids.len(),
            "Added vectors to brute-force backend"
        );
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SimilarityMatch>> {
        validate_query(self.dimensions, query, k)?;

        let start = Instant::now();
        let matches = self.scan(query, k);
        record_operation_metrics(BACKEND, "search", start, "success");
        Ok(matches)
    }

    fn entries(&self) -> Result<Vec<VectorEntry>> {
        Ok(self
            .ids
            .iter()
            .enumerate()
            .map(|(position, id)| VectorEntry::new(id.clone(), self.row(position).to_vec()))
            .collect())
    }

    fn persist(&self, destination: &Path) -> Result<()> {
        let start = Instant::now();
        let artifact = BruteForceArtifact {
            format_version: FORMAT_VERSION,
            dimensions: self.dimensions,
            ids: self.ids.as_slice().to_vec(),
            data: self.data.clone(),
        };
        let result = artifact::write_bincode(destination, &artifact);

        if result.is_ok() {
            tracing::debug!(
                path = %destination.display(),
                vectors = self.ids.len(),
                "Persisted brute-force backend"
            );
        }
        record_operation_metrics(BACKEND, "persist", start, status_of(&result));
        result
    }

    fn available() -> bool {
        true
    }

    fn load(source: &Path) -> Result<Self> {
        let start = Instant::now();
        let result = artifact::read_bincode::<BruteForceArtifact>(source).and_then(|artifact| {
            if artifact.format_version != FORMAT_VERSION {
                return Err(Error::corrupt(
                    source,
                    format!("unsupported format version {}", artifact.format_version),
                ));
            }

            let expected = artifact.ids.len().checked_mul(artifact.dimensions);
            if expected != Some(artifact.data.len()) {
                return Err(Error::corrupt(
                    source,
                    format!(
                        "{} ids with dimension {} do not match {} stored values",
                        artifact.ids.len(),
                        artifact.dimensions,
                        artifact.data.len()
                    ),
                ));
            }

            let ids = IdRegistry::from_ids(artifact.ids).map_err(|repeated| {
                Error::corrupt(source, format!("vector id '{repeated}' is stored twice"))
            })?;

            Ok(Self {
                dimensions: artifact.dimensions,
                data: artifact.data,
                ids,
            })
        });

        record_operation_metrics(BACKEND, "load", start, status_of(&result));
        result
    }
}
