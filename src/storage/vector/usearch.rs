//! usearch HNSW similarity backend.
//!
//! Provides approximate nearest neighbour search over a Hierarchical Navigable
//! Small World graph, using the squared-L2 metric so distances agree with
//! [`BruteForceBackend`](super::BruteForceBackend).
//!
//! When the `usearch-hnsw` feature is disabled the backend type is
//! uninhabited: construction and loading report
//! [`Error::BackendUnavailable`](crate::Error::BackendUnavailable) and
//! [`available()`](crate::storage::SimilarityBackend::available) is `false`.

#[cfg(feature = "usearch-hnsw")]
pub use native::UsearchBackend;
#[cfg(not(feature = "usearch-hnsw"))]
pub use unavailable::UsearchBackend;

use std::path::{Path, PathBuf};

/// Paths of the native index file and the id-list sidecar for `base`.
pub(crate) fn artifact_paths(base: &Path) -> (PathBuf, PathBuf) {
    (base.with_extension("usearch"), base.with_extension("ids.json"))
}

/// HNSW connectivity parameter (M).
/// Higher values improve recall but use more memory.
#[cfg(feature = "usearch-hnsw")]
const HNSW_CONNECTIVITY: usize = 16;

/// HNSW expansion factor for construction (`ef_construction`).
#[cfg(feature = "usearch-hnsw")]
const HNSW_EXPANSION_ADD: usize = 128;

/// HNSW expansion factor for search (`ef`).
#[cfg(feature = "usearch-hnsw")]
const HNSW_EXPANSION_SEARCH: usize = 64;

/// Capacity reserved on construction.
#[cfg(feature = "usearch-hnsw")]
const INITIAL_CAPACITY: usize = 1024;

// ============================================================================
// Native usearch Implementation (with feature)
// ============================================================================

#[cfg(feature = "usearch-hnsw")]
mod native {
    use super::{HNSW_CONNECTIVITY, HNSW_EXPANSION_ADD, HNSW_EXPANSION_SEARCH, INITIAL_CAPACITY};
    use crate::models::{SimilarityMatch, VectorEntry, VectorId};
    use crate::storage::metrics::{record_operation_metrics, status_of};
    use super::artifact_paths;
    use crate::storage::traits::{
        BackendKind, IdRegistry, SimilarityBackend, validate_batch, validate_query,
    };
    use crate::storage::vector::artifact;
    use crate::{Error, Result};
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::Path;
    use std::time::Instant;
    use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

    const BACKEND: &str = "usearch";

    /// Current id-list format version.
    const FORMAT_VERSION: u32 = 2;

    /// Native usearch-based backend using HNSW.
    ///
    /// Graph keys come from a counter that only moves forward, so a key
    /// removed while undoing a failed batch is never handed out again.
    pub struct UsearchBackend {
        /// Vector dimension.
        dimensions: usize,
        /// The usearch index.
        index: Index,
        /// Caller identifiers in insertion order.
        ids: IdRegistry,
        /// Graph key of each stored vector, parallel to `ids`.
        keys: Vec<u64>,
        /// Insertion position of each graph key.
        positions: HashMap<u64, usize>,
        /// Next unused graph key.
        next_key: u64,
    }

    /// Sidecar written next to the native index file.
    #[derive(Serialize, Deserialize)]
    struct IdList {
        format_version: u32,
        dimensions: usize,
        ids: Vec<VectorId>,
        keys: Vec<u64>,
        next_key: u64,
    }

    fn create_index(dimensions: usize) -> Result<Index> {
        let options = IndexOptions {
            dimensions,
            metric: MetricKind::L2sq,
            quantization: ScalarKind::F32,
            connectivity: HNSW_CONNECTIVITY,
            expansion_add: HNSW_EXPANSION_ADD,
            expansion_search: HNSW_EXPANSION_SEARCH,
            multi: false,
        };
        Index::new(&options).map_err(|e| Error::storage("create_usearch_index", e))
    }

    impl UsearchBackend {
        /// Creates an empty HNSW backend.
        ///
        /// # Errors
        ///
        /// Returns [`Error::Storage`] if the native index cannot be created.
        pub fn new(dimensions: usize) -> Result<Self> {
            let index = create_index(dimensions)?;
            index
                .reserve(INITIAL_CAPACITY)
                .map_err(|e| Error::storage("reserve_usearch_capacity", e))?;

            Ok(Self {
                dimensions,
                index,
                ids: IdRegistry::new(),
                keys: Vec::new(),
                positions: HashMap::new(),
                next_key: 0,
            })
        }

        /// Reserves graph slots for `additional` keys past `next_key`.
        fn ensure_capacity(&self, additional: usize) -> Result<()> {
            let issued = usize::try_from(self.next_key).unwrap_or(usize::MAX);
            let needed = issued.max(self.index.size()).saturating_add(additional);
            if needed > self.index.capacity() {
                let target = needed.max(self.index.capacity() * 2);
                self.index
                    .reserve(target)
                    .map_err(|e| Error::storage("reserve_usearch_capacity", e))?;
            }
            Ok(())
        }
    }

    impl SimilarityBackend for UsearchBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Usearch
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
            self.ensure_capacity(vectors.len())?;

            let first = self.next_key;
            for (offset, vector) in vectors.iter().enumerate() {
                let key = first + offset as u64;
                if let Err(e) = self.index.add(key, vector.as_slice()) {
                    // Undo the partial batch so the graph and id list stay aligned.
                    for added in first..key {
                        let _ = self.index.remove(added);
                    }
                    self.next_key = key + 1;
                    return Err(Error::storage("usearch_add", e));
                }
            }
            self.next_key = first + vectors.len() as u64;

            for key in first..self.next_key {
                self.positions.insert(key, self.keys.len());
                self.keys.push(key);
            }
            self.ids.extend(ids);

            tracing::debug!(
                added = vectors.len(),
                total = self.ids.len(),
                "Added vectors to usearch backend"
            );
            Ok(())
        }

        fn search(&self, query: &[f32], k: usize) -> Result<Vec<SimilarityMatch>> {
            validate_query(self.dimensions, query, k)?;
            if self.ids.is_empty() {
                return Ok(Vec::new());
            }

            let start = Instant::now();
            let result = self
                .index
                .search(query, k.min(self.ids.len()))
                .map_err(|e| Error::storage("usearch_search", e));
            record_operation_metrics(BACKEND, "search", start, status_of(&result));

            let found = result?;
            let mut scored: Vec<(f32, usize)> = found
                .keys
                .iter()
                .zip(found.distances.iter())
                .filter_map(|(&key, &distance)| {
                    self.positions
                        .get(&key)
                        .map(|&position| (distance, position))
                })
                .collect();
            scored.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            Ok(scored
                .into_iter()
                .map(|(distance, position)| {
                    SimilarityMatch::new(self.ids[position].clone(), distance)
                })
                .collect())
        }

        fn entries(&self) -> Result<Vec<VectorEntry>> {
            self.ids
                .iter()
                .zip(&self.keys)
                .map(|(id, &key)| {
                    let mut vector = vec![0.0f32; self.dimensions];
                    self.index
                        .get(key, &mut vector)
                        .map_err(|e| Error::storage("usearch_get", e))?;
                    Ok(VectorEntry::new(id.clone(), vector))
                })
                .collect()
        }

        fn persist(&self, destination: &Path) -> Result<()> {
            let start = Instant::now();
            let (index_file, ids_file) = artifact_paths(destination);

            let result = (|| -> Result<()> {
                if let Some(parent) = index_file.parent()
                    && !parent.as_os_str().is_empty()
                {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| Error::storage("create_artifact_dir", e))?;
                }
                self.index
                    .save(index_file.to_string_lossy().as_ref())
                    .map_err(|e| Error::storage("save_usearch_index", e))?;
                artifact::write_json(
                    &ids_file,
                    &IdList {
                        format_version: FORMAT_VERSION,
                        dimensions: self.dimensions,
                        ids: self.ids.as_slice().to_vec(),
                        keys: self.keys.clone(),
                        next_key: self.next_key,
                    },
                )
            })();

            if result.is_ok() {
                tracing::debug!(
                    path = %index_file.display(),
                    vectors = self.ids.len(),
                    "Persisted usearch backend"
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
            let (index_file, ids_file) = artifact_paths(source);

            let result = (|| -> Result<Self> {
                let list: IdList = artifact::read_json(&ids_file)?;
                if list.format_version != FORMAT_VERSION {
                    return Err(Error::corrupt(
                        &ids_file,
                        format!("unsupported format version {}", list.format_version),
                    ));
                }
                if !index_file.exists() {
                    return Err(Error::storage(
                        "load_usearch_index",
                        format!("{} not found", index_file.display()),
                    ));
                }

                if list.keys.len() != list.ids.len()
                    || list.keys.iter().any(|&key| key >= list.next_key)
                {
                    return Err(Error::corrupt(
                        &ids_file,
                        format!(
                            "{} ids do not match {} graph keys below {}",
                            list.ids.len(),
                            list.keys.len(),
                            list.next_key
                        ),
                    ));
                }
                let ids = IdRegistry::from_ids(list.ids).map_err(|repeated| {
                    Error::corrupt(&ids_file, format!("vector id '{repeated}' is stored twice"))
                })?;
                let positions: HashMap<u64, usize> = list
                    .keys
                    .iter()
                    .enumerate()
                    .map(|(position, &key)| (key, position))
                    .collect();
                if positions.len() != list.keys.len() {
                    return Err(Error::corrupt(&ids_file, "graph keys repeat"));
                }

                let index = create_index(list.dimensions)?;
                index
                    .load(index_file.to_string_lossy().as_ref())
                    .map_err(|e| Error::corrupt(&index_file, e))?;

                if index.dimensions() != list.dimensions || index.size() != ids.len() {
                    return Err(Error::corrupt(
                        &index_file,
                        format!(
                            "index holds {} vectors of dimension {}, id list expects {} of dimension {}",
                            index.size(),
                            index.dimensions(),
                            ids.len(),
                            list.dimensions
                        ),
                    ));
                }

                Ok(Self {
                    dimensions: list.dimensions,
                    index,
                    ids,
                    keys: list.keys,
                    positions,
                    next_key: list.next_key,
                })
            })();

            record_operation_metrics(BACKEND, "load", start, status_of(&result));
            result
        }
    }

}

// ============================================================================
// Unavailable Implementation (without feature)
// ============================================================================

#[cfg(not(feature = "usearch-hnsw"))]
mod unavailable {
    use crate::models::{SimilarityMatch, VectorEntry, VectorId};
    use crate::storage::traits::{BackendKind, SimilarityBackend};
    use crate::{Error, Result};
    use std::path::Path;

    /// Placeholder for the HNSW backend in builds without `usearch-hnsw`.
    ///
    /// The type has no values, so every trait method is unreachable.
    pub enum UsearchBackend {}

    fn unavailable() -> Error {
        Error::BackendUnavailable(format!(
            "{} requires the `usearch-hnsw` feature",
            BackendKind::Usearch
        ))
    }

    impl UsearchBackend {
        /// Always fails in this build.
        ///
        /// # Errors
        ///
        /// Returns [`Error::BackendUnavailable`].
        pub fn new(_dimensions: usize) -> Result<Self> {
            Err(unavailable())
        }
    }

    impl SimilarityBackend for UsearchBackend {
        fn kind(&self) -> BackendKind {
            match *self {}
        }

        fn dimensions(&self) -> usize {
            match *self {}
        }

        fn len(&self) -> usize {
            match *self {}
        }

        fn add(&mut self, _vectors: &[Vec<f32>], _ids: Option<&[VectorId]>) -> Result<()> {
            match *self {}
        }

        fn search(&self, _query: &[f32], _k: usize) -> Result<Vec<SimilarityMatch>> {
            match *self {}
        }

        fn entries(&self) -> Result<Vec<VectorEntry>> {
            match *self {}
        }

        fn persist(&self, _destination: &Path) -> Result<()> {
            match *self {}
        }

        fn available() -> bool {
            false
        }

        fn load(_source: &Path) -> Result<Self> {
            Err(unavailable())
        }
    }

}
