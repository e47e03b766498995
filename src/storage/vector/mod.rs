//! Similarity backend implementations.

mod artifact;
mod brute_force;
mod usearch;

pub use brute_force::BruteForceBackend;
pub use usearch::UsearchBackend;

use crate::storage::traits::{BackendKind, SimilarityBackend};
use std::fs;
use std::path::Path;
use std::time::SystemTime;

impl BackendKind {
    /// Whether this variant can be constructed in the running build.
    #[must_use]
    pub fn available(self) -> bool {
        match self {
            Self::BruteForce => BruteForceBackend::available(),
            Self::Usearch => UsearchBackend::available(),
        }
    }
}

/// Which backend wrote the artifact persisted at `path`, judged by the files
/// present.
///
/// Brute force writes `path` itself; usearch writes an index file and an
/// `ids.json` sidecar beside it. When both layouts are present, the one
/// written last wins, ties going to usearch since its sidecar is written last.
/// Returns `None` when neither exists.
#[must_use]
pub fn detect_artifact(path: &Path) -> Option<BackendKind> {
    let (_, sidecar) = usearch::artifact_paths(path);
    let modified = |p: &Path| {
        fs::metadata(p)
            .ok()
            .filter(fs::Metadata::is_file)
            .map(|meta| meta.modified().unwrap_or(SystemTime::UNIX_EPOCH))
    };

    match (modified(path), modified(&sidecar)) {
        (Some(flat), Some(graph)) if flat > graph => Some(BackendKind::BruteForce),
        (_, Some(_)) => Some(BackendKind::Usearch),
        (Some(_), None) => Some(BackendKind::BruteForce),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_brute_force_always_available() {
        assert!(BackendKind::BruteForce.available());
    }

    #[test]
    fn test_usearch_availability_follows_feature() {
        assert_eq!(
            BackendKind::Usearch.available(),
            cfg!(feature = "usearch-hnsw")
        );
    }

    #[test]
    fn test_detect_artifact_layouts() {
        let dir = TempDir::new().expect("tempdir failed");
        let path = dir.path().join("vectors.bin");
        assert_eq!(detect_artifact(&path), None);

        fs::write(&path, b"flat").expect("write failed");
        assert_eq!(detect_artifact(&path), Some(BackendKind::BruteForce));

        fs::write(dir.path().join("vectors.ids.json"), b"{}").expect("write failed");
        let later = SystemTime::now() + Duration::from_secs(60);
        fs::File::options()
            .write(true)
            .open(dir.path().join("vectors.ids.json"))
            .and_then(|f| f.set_modified(later))
            .expect("touch failed");
        assert_eq!(detect_artifact(&path), Some(BackendKind::Usearch));

        fs::File::options()
            .write(true)
            .open(&path)
            .and_then(|f| f.set_modified(later + Duration::from_secs(60)))
            .expect("touch failed");
        assert_eq!(detect_artifact(&path), Some(BackendKind::BruteForce));
    }

    #[test]
    fn test_detect_artifact_ignores_directories() {
        let dir = TempDir::new().expect("tempdir failed");
        assert_eq!(detect_artifact(dir.path()), None);
    }
}
