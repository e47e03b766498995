//! File helpers shared by the similarity backends' persistence.

use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// Writes `bytes` to `destination` through a sibling temporary file, so a
/// reader never observes a half-written artifact.
pub fn write_atomic(destination: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| Error::storage("create_artifact_dir", e))?;
    }

    let mut staging = destination.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = Path::new(&staging);

    fs::write(staging, bytes).map_err(|e| Error::storage("write_artifact", e))?;
    fs::rename(staging, destination).map_err(|e| {
        let _ = fs::remove_file(staging);
        Error::storage("rename_artifact", e)
    })
}

/// Serializes `value` with bincode and writes it atomically.
pub fn write_bincode<T: Serialize>(destination: &Path, value: &T) -> Result<()> {
    let bytes = bincode::serialize(value).map_err(|e| Error::storage("encode_artifact", e))?;
    write_atomic(destination, &bytes)
}

/// Reads a bincode artifact. Unreadable files are storage errors; undecodable
/// contents are corrupt artifacts.
pub fn read_bincode<T: DeserializeOwned>(source: &Path) -> Result<T> {
    let bytes = fs::read(source).map_err(|e| Error::storage("read_artifact", e))?;
    bincode::deserialize(&bytes).map_err(|e| Error::corrupt(source, e))
}

/// Serializes `value` as JSON and writes it atomically.
pub fn write_json<T: Serialize>(destination: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value).map_err(|e| Error::storage("encode_artifact", e))?;
    write_atomic(destination, &bytes)
}

/// Reads a JSON artifact, with the same error split as [`read_bincode`].
pub fn read_json<T: DeserializeOwned>(source: &Path) -> Result<T> {
    let bytes = fs::read(source).map_err(|e| Error::storage("read_artifact", e))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::corrupt(source, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_parent_and_leaves_no_staging_file() {
        let dir = TempDir::new().expect("tempdir failed");
        let path = dir.path().join("nested/deeper/artifact.bin");

        write_bincode(&path, &vec![1u32, 2, 3]).expect("write failed");

        let back: Vec<u32> = read_bincode(&path).expect("read failed");
        assert_eq!(back, vec![1, 2, 3]);
        let names: Vec<_> = fs::read_dir(path.parent().expect("parent"))
            .expect("read_dir")
            .map(|e| e.expect("entry").file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_read_json_rejects_malformed() {
        let dir = TempDir::new().expect("tempdir failed");
        let path = dir.path().join("meta.json");
        fs::write(&path, "{ not json").expect("write failed");

        let result: Result<Vec<String>> = read_json(&path);
        assert!(matches!(result, Err(Error::CorruptArtifact { .. })));
    }
}
