//! Similarity backend selection and construction.
//!
//! The factory is an explicit object built once at startup. It maps names to
//! [`BackendKind`]s, constructs the requested backend, and falls back to the
//! brute-force backend when the requested one is not compiled in.
//!
//! # Architecture
//!
//! ```text
//! SimilarityBackendFactory
//!   ├── resolve(name)          → BackendKind
//!   ├── create(name, dims)     → BackendSelection (may fall back)
//!   ├── load(name, path)       → BackendSelection (whatever wrote the artifact)
//!   └── rebuild_from(sel, keep) → BackendSelection (filtered copy)
//! ```
//!
//! # Graceful Degradation
//!
//! `create` degrades to [`BruteForceBackend`] with a warning and a
//! `backend_fallback_total` metric. `load` reads the artifact with the backend
//! that wrote it, so a brute-force artifact persisted after a fallback loads
//! under the name that was originally requested. Only an HNSW artifact in a
//! build without HNSW support reports [`Error::BackendUnavailable`].

use crate::models::VectorEntry;
use crate::storage::traits::{BackendKind, SimilarityBackend};
use crate::storage::vector::{BruteForceBackend, UsearchBackend, detect_artifact};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::instrument;

/// A constructed backend together with what was asked for.
pub struct BackendSelection {
    backend: Box<dyn SimilarityBackend>,
    requested: BackendKind,
}

impl BackendSelection {
    fn new(backend: Box<dyn SimilarityBackend>, requested: BackendKind) -> Self {
        Self { backend, requested }
    }

    /// The constructed backend.
    #[must_use]
    pub fn backend(&self) -> &dyn SimilarityBackend {
        self.backend.as_ref()
    }

    /// Mutable access for adding vectors.
    pub fn backend_mut(&mut self) -> &mut dyn SimilarityBackend {
        self.backend.as_mut()
    }

    /// Consumes the selection, returning the backend.
    #[must_use]
    pub fn into_backend(self) -> Box<dyn SimilarityBackend> {
        self.backend
    }

    /// The kind the caller asked for.
    #[must_use]
    pub const fn requested(&self) -> BackendKind {
        self.requested
    }

    /// The kind that was actually constructed.
    #[must_use]
    pub fn selected(&self) -> BackendKind {
        self.backend.kind()
    }

    /// True when a different backend than requested was constructed: brute
    /// force standing in for an unavailable one, or a load that followed the
    /// artifact's writer.
    #[must_use]
    pub fn fell_back(&self) -> bool {
        self.requested != self.selected()
    }
}

impl fmt::Debug for BackendSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSelection")
            .field("requested", &self.requested)
            .field("selected", &self.selected())
            .field("dimensions", &self.backend.dimensions())
            .field("len", &self.backend.len())
            .finish()
    }
}

/// Name registry and constructor for similarity backends.
///
/// # Example
///
/// ```rust
/// use dupfind::SimilarityBackendFactory;
/// use dupfind::storage::BackendKind;
///
/// let factory = SimilarityBackendFactory::new();
/// let selection = factory.create("Exact", 8)?;
/// assert_eq!(selection.selected(), BackendKind::BruteForce);
/// assert!(!selection.fell_back());
/// # Ok::<(), dupfind::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct SimilarityBackendFactory {
    names: BTreeMap<String, BackendKind>,
}

impl Default for SimilarityBackendFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SimilarityBackendFactory {
    /// Creates a factory with the built-in names and aliases registered.
    #[must_use]
    pub fn new() -> Self {
        let builtin = [
            ("brute-force", BackendKind::BruteForce),
            ("brute", BackendKind::BruteForce),
            ("flat", BackendKind::BruteForce),
            ("exact", BackendKind::BruteForce),
            ("usearch", BackendKind::Usearch),
            ("hnsw", BackendKind::Usearch),
            ("accelerated", BackendKind::Usearch),
        ];
        Self {
            names: builtin
                .into_iter()
                .map(|(name, kind)| (name.to_string(), kind))
                .collect(),
        }
    }

    /// Registers an additional name for `kind`, replacing any previous
    /// mapping for that name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `name` is blank.
    pub fn register_alias(&mut self, name: &str, kind: BackendKind) -> Result<()> {
        let key = normalize(name);
        if key.is_empty() {
            return Err(Error::InvalidInput("backend name must not be empty".into()));
        }
        self.names.insert(key, kind);
        Ok(())
    }

    /// Maps a name to its backend kind. Matching is case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownBackend`] if no such name is registered.
    pub fn resolve(&self, name: &str) -> Result<BackendKind> {
        self.names
            .get(&normalize(name))
            .copied()
            .ok_or_else(|| Error::UnknownBackend(name.to_string()))
    }

    /// Every registered name with its kind, sorted by name.
    pub fn registered_names(&self) -> impl Iterator<Item = (&str, BackendKind)> {
        self.names.iter().map(|(name, kind)| (name.as_str(), *kind))
    }

    /// Whether `kind` can be constructed in this build.
    #[must_use]
    pub fn available(kind: BackendKind) -> bool {
        kind.available()
    }

    /// Constructs an empty backend by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownBackend`] for unregistered names,
    /// [`Error::InvalidInput`] if `dimensions` is zero, and [`Error::Storage`]
    /// if an available native index fails to initialize.
    #[instrument(skip(self), fields(requested = tracing::field::Empty))]
    pub fn create(&self, name: &str, dimensions: usize) -> Result<BackendSelection> {
        let requested = self.resolve(name)?;
        tracing::Span::current().record("requested", requested.as_str());
        let backend = construct(requested, dimensions)?;
        Ok(BackendSelection::new(backend, requested))
    }

    /// Reconstructs a backend from a persisted artifact.
    ///
    /// The artifact is read by the backend that wrote it, which may differ
    /// from the one `name` resolves to; [`BackendSelection::fell_back`] then
    /// reports the substitution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownBackend`] for unregistered names,
    /// [`Error::Storage`] if no artifact exists at `path`,
    /// [`Error::BackendUnavailable`] if the artifact was written by a backend
    /// that is not compiled in, and the backend's own load errors otherwise.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn load(&self, name: &str, path: &Path) -> Result<BackendSelection> {
        let requested = self.resolve(name)?;
        let written = detect_artifact(path).ok_or_else(|| {
            Error::storage(
                "load_backend",
                format!("no vector artifact at {}", path.display()),
            )
        })?;
        if written != requested {
            tracing::info!(
                requested = requested.as_str(),
                written = written.as_str(),
                "Loading artifact with the backend that wrote it"
            );
        }

        let backend: Box<dyn SimilarityBackend> = match written {
            BackendKind::BruteForce => Box::new(BruteForceBackend::load(path)?),
            BackendKind::Usearch => Box::new(UsearchBackend::load(path)?),
        };

        tracing::debug!(
            backend = written.as_str(),
            vectors = backend.len(),
            "Loaded similarity backend"
        );
        Ok(BackendSelection::new(backend, requested))
    }

    /// Builds a fresh backend of the same kind holding only the entries for
    /// which `keep` returns true, in their original order.
    ///
    /// Backends are append-only, so this is how vectors are removed.
    ///
    /// # Errors
    ///
    /// Propagates read-back and insertion errors.
    pub fn rebuild_from<F>(
        &self,
        selection: &BackendSelection,
        mut keep: F,
    ) -> Result<BackendSelection>
    where
        F: FnMut(&VectorEntry) -> bool,
    {
        let source = selection.backend();
        let (ids, vectors): (Vec<_>, Vec<_>) = source
            .entries()?
            .into_iter()
            .filter(|entry| keep(entry))
            .map(|entry| (entry.id, entry.vector))
            .unzip();

        let mut backend = construct(selection.selected(), source.dimensions())?;
        if !vectors.is_empty() {
            backend.add(&vectors, Some(ids.as_slice()))?;
        }

        tracing::debug!(
            backend = selection.selected().as_str(),
            before = source.len(),
            after = backend.len(),
            "Rebuilt similarity backend"
        );
        Ok(BackendSelection::new(backend, selection.requested()))
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Constructs an empty backend of `kind`, substituting brute force when
/// `kind` is not compiled in.
fn construct(kind: BackendKind, dimensions: usize) -> Result<Box<dyn SimilarityBackend>> {
    if dimensions == 0 {
        return Err(Error::InvalidInput("dimensions must be at least 1".into()));
    }

    if !kind.available() {
        tracing::warn!(
            requested = kind.as_str(),
            selected = BackendKind::BruteForce.as_str(),
            "Similarity backend unavailable, falling back"
        );
        metrics::counter!(
            "backend_fallback_total",
            "requested" => kind.as_str(),
            "selected" => BackendKind::BruteForce.as_str()
        )
        .increment(1);
        return Ok(Box::new(BruteForceBackend::new(dimensions)));
    }

    Ok(match kind {
        BackendKind::BruteForce => Box::new(BruteForceBackend::new(dimensions)),
        BackendKind::Usearch => Box::new(UsearchBackend::new(dimensions)?),
    })
}
