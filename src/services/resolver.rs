//! Duplicate resolution.
//!
//! Merges the two kinds of evidence into one [`DuplicateReport`]:
//! 1. **Exact**: groups sharing `(content_hash, context_tag, hash_algo)` in
//!    the hash index, optionally re-verified byte for byte
//! 2. **Near**: vectors closer than a squared-L2 threshold, joined into
//!    undirected groups with union-find
//!
//! Vector ids are treated as file paths when excluding pairs that an exact
//! group already covers.

use crate::models::{DuplicateGroup, DuplicateReport, ResolvedGroup, VectorEntry};
use crate::services::ContentHasher;
use crate::storage::traits::{ContentHashIndex, SimilarityBackend};
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Default squared-L2 distance below which two vectors are near duplicates.
pub const DEFAULT_NEAR_THRESHOLD: f32 = 0.5;

/// Default number of neighbours examined per vector.
pub const DEFAULT_NEIGHBORS: usize = 8;

/// Tuning for [`DuplicateResolver`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverConfig {
    /// Matches with a distance strictly below this are near duplicates.
    pub threshold: f32,
    /// Neighbours examined per vector, not counting the vector itself.
    pub neighbors: usize,
    /// Re-read exact group members and split groups whose bytes differ.
    pub verify_bytes: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_NEAR_THRESHOLD,
            neighbors: DEFAULT_NEIGHBORS,
            verify_bytes: false,
        }
    }
}

impl ResolverConfig {
    /// Sets the distance threshold.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the neighbour count.
    #[must_use]
    pub const fn with_neighbors(mut self, neighbors: usize) -> Self {
        self.neighbors = neighbors;
        self
    }

    /// Enables or disables byte verification of exact groups.
    #[must_use]
    pub const fn with_verify_bytes(mut self, verify: bool) -> Self {
        self.verify_bytes = verify;
        self
    }

    /// Checks the settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the threshold is NaN, infinite or
    /// negative, or if `neighbors` is zero.
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(Error::InvalidInput(format!(
                "near-duplicate threshold must be a finite non-negative number, got {}",
                self.threshold
            )));
        }
        if self.neighbors == 0 {
            return Err(Error::InvalidInput("neighbors must be at least 1".into()));
        }
        Ok(())
    }
}

/// Builds duplicate reports from a hash index and an optional similarity
/// backend.
///
/// # Example
///
/// ```rust
/// use dupfind::storage::{BruteForceBackend, SimilarityBackend, SqliteHashIndex};
/// use dupfind::{DuplicateResolver, FileRecord, ResolverConfig, VectorId};
/// use dupfind::storage::ContentHashIndex;
/// use std::sync::Arc;
///
/// let index = Arc::new(SqliteHashIndex::in_memory()?);
/// index.upsert(&[
///     FileRecord::new("a.txt", 3, 0, "aa"),
///     FileRecord::new("b.txt", 3, 0, "aa"),
/// ])?;
///
/// let mut backend = BruteForceBackend::new(2);
/// let ids = [VectorId::new("x.jpg"), VectorId::new("y.jpg")];
/// backend.add(&[vec![0.0, 0.0], vec![0.01, 0.0]], Some(&ids))?;
///
/// let resolver = DuplicateResolver::new(index, ResolverConfig::default())?
///     .with_backend(Arc::new(backend));
/// let report = resolver.resolve()?;
/// assert_eq!(report.exact_count(), 1);
/// assert_eq!(report.near_count(), 1);
/// # Ok::<(), dupfind::Error>(())
/// ```
pub struct DuplicateResolver {
    /// Exact-duplicate source.
    index: Arc<dyn ContentHashIndex>,
    /// Near-duplicate source (optional - exact only when absent).
    backend: Option<Arc<dyn SimilarityBackend>>,
    /// Validated settings.
    config: ResolverConfig,
}

impl DuplicateResolver {
    /// Creates a resolver over `index` with no similarity backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `config` fails validation.
    pub fn new(index: Arc<dyn ContentHashIndex>, config: ResolverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            index,
            backend: None,
            config,
        })
    }

    /// Adds a similarity backend for near-duplicate detection.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn SimilarityBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Returns the resolver settings.
    #[must_use]
    pub const fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Produces the full report: exact groups first, then near groups.
    ///
    /// # Errors
    ///
    /// Propagates hash index and backend errors.
    #[instrument(skip(self), fields(verify_bytes = self.config.verify_bytes))]
    pub fn resolve(&self) -> Result<DuplicateReport> {
        let start = Instant::now();
        let exact = self.exact_groups()?;

        let near = match &self.backend {
            Some(backend) => self.near_groups(backend.as_ref(), &exact)?,
            None => {
                tracing::info!("No similarity backend configured, reporting exact duplicates only");
                Vec::new()
            },
        };

        let mut groups: Vec<ResolvedGroup> = exact.into_iter().map(ResolvedGroup::exact).collect();
        let exact_count = groups.len();
        groups.extend(near);

        tracing::debug!(
            exact = exact_count,
            near = groups.len() - exact_count,
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Resolved duplicates"
        );
        Ok(DuplicateReport { groups })
    }

    /// Exact groups from the hash index, byte-verified when configured.
    ///
    /// # Errors
    ///
    /// Propagates hash index errors. Unreadable files during verification are
    /// logged and dropped from their group, not raised.
    pub fn exact_groups(&self) -> Result<Vec<DuplicateGroup>> {
        let groups = self.index.duplicate_groups()?;
        if !self.config.verify_bytes {
            return Ok(groups);
        }
        Ok(groups.into_iter().flat_map(verify_group).collect())
    }

    /// Near groups from `backend`, skipping pairs inside one of `exact`.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn near_groups(
        &self,
        backend: &dyn SimilarityBackend,
        exact: &[DuplicateGroup],
    ) -> Result<Vec<ResolvedGroup>> {
        let entries = backend.entries()?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let exact_of: HashMap<&str, usize> = exact
            .iter()
            .enumerate()
            .flat_map(|(group, g)| g.paths.iter().map(move |p| (p.as_str(), group)))
            .collect();
        let position_of: HashMap<&str, usize> = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.id.as_str(), position))
            .collect();

        let k = (self.config.neighbors + 1).min(entries.len());
        let mut edges: Vec<(usize, usize, f32)> = Vec::new();
        for (position, entry) in entries.iter().enumerate() {
            for candidate in backend.search(&entry.vector, k)? {
                if candidate.distance >= self.config.threshold || candidate.id == entry.id {
                    continue;
                }
                let covered = matches!(
                    (exact_of.get(entry.id.as_str()), exact_of.get(candidate.id.as_str())),
                    (Some(a), Some(b)) if a == b
                );
                if covered {
                    continue;
                }
                if let Some(&other) = position_of.get(candidate.id.as_str()) {
                    edges.push((position, other, candidate.distance));
                }
            }
        }

        metrics::counter!(
            "similarity_search_total",
            "backend" => backend.kind().as_str()
        )
        .increment(entries.len() as u64);

        Ok(connected_groups(&entries, &edges))
    }
}

/// Splits an exact group into byte-identical subsets of two or more.
fn verify_group(group: DuplicateGroup) -> Vec<DuplicateGroup> {
    let mut classes: Vec<Vec<String>> = Vec::new();

    'members: for path in &group.paths {
        if let Err(e) = std::fs::metadata(path) {
            tracing::warn!(path = %path, error = %e, "Skipping unreadable group member");
            continue;
        }
        for class in &mut classes {
            match ContentHasher::files_identical(Path::new(&class[0]), Path::new(path)) {
                Ok(true) => {
                    class.push(path.clone());
                    continue 'members;
                },
                Ok(false) => {},
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Skipping unreadable group member");
                    continue 'members;
                },
            }
        }
        classes.push(vec![path.clone()]);
    }

    if classes.len() > 1 {
        tracing::warn!(
            group = %group,
            subsets = classes.len(),
            "Exact group members differ on disk"
        );
    }

    classes
        .into_iter()
        .filter(|class| class.len() > 1)
        .map(|paths| DuplicateGroup {
            content_hash: group.content_hash.clone(),
            context_tag: group.context_tag.clone(),
            hash_algo: group.hash_algo.clone(),
            paths,
        })
        .collect()
}

/// Disjoint-set forest over entry positions.
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        let mut root = node;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] = self.rank[ra].saturating_add(1);
            },
        }
    }
}

/// Joins edges into undirected groups, each with its largest edge distance.
fn connected_groups(entries: &[VectorEntry], edges: &[(usize, usize, f32)]) -> Vec<ResolvedGroup> {
    let mut sets = UnionFind::new(entries.len());
    for &(a, b, _) in edges {
        sets.union(a, b);
    }

    let mut components: HashMap<usize, (Vec<String>, f32)> = HashMap::new();
    for &(a, b, distance) in edges {
        let root = sets.find(a);
        let component = components.entry(root).or_insert_with(|| (Vec::new(), 0.0));
        component.0.push(entries[a].id.as_str().to_string());
        component.0.push(entries[b].id.as_str().to_string());
        component.1 = component.1.max(distance);
    }

    let mut groups: Vec<ResolvedGroup> = components
        .into_values()
        .filter_map(|(mut members, max_distance)| {
            members.sort();
            members.dedup();
            (members.len() > 1).then(|| ResolvedGroup::near(members, max_distance))
        })
        .collect();
    groups.sort_by(|a, b| a.members.cmp(&b.members));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileRecord, GroupKind, VectorId};
    use crate::storage::index::SqliteHashIndex;
    use crate::storage::vector::BruteForceBackend;
    use tempfile::TempDir;

    fn index_with(records: &[FileRecord]) -> Arc<SqliteHashIndex> {
        let index = SqliteHashIndex::in_memory().expect("index failed");
        index.upsert(records).expect("upsert failed");
        Arc::new(index)
    }

    fn backend_with(points: &[(&str, [f32; 2])]) -> Arc<BruteForceBackend> {
        let mut backend = BruteForceBackend::new(2);
        let ids: Vec<VectorId> = points.iter().map(|(id, _)| VectorId::new(*id)).collect();
        let vectors: Vec<Vec<f32>> = points.iter().map(|(_, v)| v.to_vec()).collect();
        backend.add(&vectors, Some(ids.as_slice())).expect("add failed");
        Arc::new(backend)
    }

    fn resolver(
        index: Arc<SqliteHashIndex>,
        backend: Option<Arc<BruteForceBackend>>,
        config: ResolverConfig,
    ) -> DuplicateResolver {
        let resolver = DuplicateResolver::new(index, config).expect("config rejected");
        match backend {
            Some(b) => resolver.with_backend(b),
            None => resolver,
        }
    }

    #[test]
    fn test_near_groups_are_symmetric() {
        let backend = backend_with(&[("x", [0.0, 0.0]), ("y", [0.01, 0.0]), ("z", [10.0, 10.0])]);
        let report = resolver(
            index_with(&[]),
            Some(backend),
            ResolverConfig::default().with_threshold(1.0),
        )
        .resolve()
        .expect("resolve failed");

        assert_eq!(report.near_count(), 1);
        let group = &report.groups[0];
        assert_eq!(group.kind, GroupKind::Near);
        assert_eq!(group.members, vec!["x", "y"]);
        assert!(report.groups.iter().all(|g| !g.contains("z")));
        let max = group.max_distance.expect("near group has max distance");
        assert!((max - 0.0001).abs() < 1e-6);
    }

    #[test]
    fn test_chain_merges_into_one_group() {
        let backend = backend_with(&[("a", [0.0, 0.0]), ("b", [0.5, 0.0]), ("c", [1.0, 0.0])]);
        let report = resolver(
            index_with(&[]),
            Some(backend),
            ResolverConfig::default().with_threshold(0.3),
        )
        .resolve()
        .expect("resolve failed");

        assert_eq!(report.near_count(), 1);
        assert_eq!(report.groups[0].members, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_exact_pairs_not_reported_as_near() {
        let index = index_with(&[
            FileRecord::new("p1", 1, 0, "h1"),
            FileRecord::new("p2", 1, 0, "h1"),
        ]);
        let backend = backend_with(&[("p1", [0.0, 0.0]), ("p2", [0.0, 0.0]), ("p3", [0.1, 0.0])]);
        let report = resolver(index, Some(backend), ResolverConfig::default())
            .resolve()
            .expect("resolve failed");

        assert_eq!(report.exact_count(), 1);
        assert_eq!(report.groups[0].kind, GroupKind::Exact);
        // p3 is near both, so it still joins them through non-exact edges.
        assert_eq!(report.near_count(), 1);
        assert_eq!(report.groups[1].members, vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn test_exact_only_pair_yields_no_near_group() {
        let index = index_with(&[
            FileRecord::new("p1", 1, 0, "h1"),
            FileRecord::new("p2", 1, 0, "h1"),
        ]);
        let backend = backend_with(&[("p1", [0.0, 0.0]), ("p2", [0.0, 0.0])]);
        let report = resolver(index, Some(backend), ResolverConfig::default())
            .resolve()
            .expect("resolve failed");

        assert_eq!(report.exact_count(), 1);
        assert_eq!(report.near_count(), 0);
    }

    #[test]
    fn test_without_backend_reports_exact_only() {
        let index = index_with(&[
            FileRecord::new("a", 1, 0, "h"),
            FileRecord::new("b", 1, 0, "h"),
        ]);
        let report = resolver(index, None, ResolverConfig::default())
            .resolve()
            .expect("resolve failed");

        assert_eq!(report.exact_count(), 1);
        assert_eq!(report.near_count(), 0);
    }

    #[test]
    fn test_empty_backend_yields_no_near_groups() {
        let backend = Arc::new(BruteForceBackend::new(3));
        let report = resolver(index_with(&[]), Some(backend), ResolverConfig::default())
            .resolve()
            .expect("resolve failed");
        assert!(report.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let index: Arc<dyn ContentHashIndex> = index_with(&[]);
        for config in [
            ResolverConfig::default().with_threshold(f32::NAN),
            ResolverConfig::default().with_threshold(-1.0),
            ResolverConfig::default().with_neighbors(0),
        ] {
            assert!(matches!(
                DuplicateResolver::new(Arc::clone(&index), config),
                Err(Error::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_verify_bytes_splits_colliding_group() {
        let dir = TempDir::new().expect("tempdir failed");
        let path = |name: &str| dir.path().join(name).to_string_lossy().into_owned();
        std::fs::write(path("a"), b"same").expect("write");
        std::fs::write(path("b"), b"same").expect("write");
        std::fs::write(path("c"), b"diff").expect("write");

        let index = index_with(&[
            FileRecord::new(path("a"), 4, 0, "collide"),
            FileRecord::new(path("b"), 4, 0, "collide"),
            FileRecord::new(path("c"), 4, 0, "collide"),
            FileRecord::new(path("missing"), 4, 0, "collide"),
        ]);
        let report = resolver(
            index,
            None,
            ResolverConfig::default().with_verify_bytes(true),
        )
        .resolve()
        .expect("resolve failed");

        assert_eq!(report.exact_count(), 1);
        assert_eq!(report.groups[0].members, vec![path("a"), path("b")]);
    }

    #[test]
    fn test_union_find_components() {
        let mut sets = UnionFind::new(5);
        sets.union(0, 1);
        sets.union(3, 4);
        sets.union(1, 0);
        assert_eq!(sets.find(0), sets.find(1));
        assert_eq!(sets.find(3), sets.find(4));
        assert_ne!(sets.find(0), sets.find(3));
        assert_eq!(sets.find(2), 2);
    }
}
