//! File records and exact-duplicate groups.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Digest algorithm assumed when a record does not name one.
pub const DEFAULT_HASH_ALGO: &str = "sha256";

/// MIME type recorded when the content type is unknown.
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Context tag for files extracted from an archive.
pub const CONTEXT_ARCHIVED: &str = "archived";

/// Context tag for standalone files.
pub const CONTEXT_UNARCHIVED: &str = "unarchived";

/// Content identity of a single filesystem path.
///
/// `path` is the primary key: upserting a record for a path that already
/// exists replaces every other field.
///
/// # Example
///
/// ```rust
/// use dupfind::FileRecord;
///
/// let record = FileRecord::new("photos/a.jpg", 2048, 1_700_000_000, "ab12")
///     .with_mime("image/jpeg")
///     .with_context_tag("archived");
///
/// assert_eq!(record.hash_algo, "sha256");
/// assert_eq!(record.context_tag, "archived");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Filesystem path.
    pub path: String,
    /// Byte length at time of hashing.
    pub size: u64,
    /// Modification time at time of hashing (Unix seconds).
    pub mtime: i64,
    /// Hex digest of the full file content.
    pub content_hash: String,
    /// Best-effort content type.
    #[serde(default = "default_mime")]
    pub mime: String,
    /// Classification label partitioning duplicate detection.
    #[serde(default = "default_context_tag")]
    pub context_tag: String,
    /// Name of the digest algorithm that produced `content_hash`.
    #[serde(default = "default_hash_algo")]
    pub hash_algo: String,
}

fn default_mime() -> String {
    DEFAULT_MIME.to_string()
}

fn default_context_tag() -> String {
    CONTEXT_UNARCHIVED.to_string()
}

fn default_hash_algo() -> String {
    DEFAULT_HASH_ALGO.to_string()
}

impl FileRecord {
    /// Creates a record with default MIME type, context tag and hash algorithm.
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        size: u64,
        mtime: i64,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            size,
            mtime,
            content_hash: content_hash.into(),
            mime: default_mime(),
            context_tag: default_context_tag(),
            hash_algo: default_hash_algo(),
        }
    }

    /// Sets the MIME type.
    #[must_use]
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }

    /// Sets the context tag.
    #[must_use]
    pub fn with_context_tag(mut self, tag: impl Into<String>) -> Self {
        self.context_tag = tag.into();
        self
    }

    /// Sets the hash algorithm name.
    #[must_use]
    pub fn with_hash_algo(mut self, algo: impl Into<String>) -> Self {
        self.hash_algo = algo.into();
        self
    }

    /// Returns the key under which this record groups with exact duplicates.
    #[must_use]
    pub fn group_key(&self) -> GroupKey<'_> {
        GroupKey {
            content_hash: &self.content_hash,
            context_tag: &self.context_tag,
            hash_algo: &self.hash_algo,
        }
    }
}

/// Borrowed `(content_hash, context_tag, hash_algo)` grouping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey<'a> {
    /// Content digest.
    pub content_hash: &'a str,
    /// Context tag.
    pub context_tag: &'a str,
    /// Digest algorithm.
    pub hash_algo: &'a str,
}

/// A set of paths sharing one `(content_hash, context_tag, hash_algo)` key.
///
/// Always has at least two members. Members are sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Shared content digest.
    pub content_hash: String,
    /// Shared context tag.
    pub context_tag: String,
    /// Shared digest algorithm.
    pub hash_algo: String,
    /// Member paths, sorted.
    pub paths: Vec<String>,
}

impl DuplicateGroup {
    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// True when the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// True if `path` belongs to this group.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.paths.binary_search_by(|p| p.as_str().cmp(path)).is_ok()
    }
}

impl fmt::Display for DuplicateGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} [{}] ({} files)",
            self.hash_algo,
            self.content_hash,
            self.context_tag,
            self.paths.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_defaults() {
        let record = FileRecord::new("a.txt", 10, 100, "H1");
        assert_eq!(record.mime, DEFAULT_MIME);
        assert_eq!(record.context_tag, CONTEXT_UNARCHIVED);
        assert_eq!(record.hash_algo, DEFAULT_HASH_ALGO);
    }

    #[test]
    fn test_record_deserialize_fills_defaults() {
        let json = r#"{"path":"a.txt","size":10,"mtime":100,"content_hash":"H1"}"#;
        let record: FileRecord = serde_json::from_str(json).expect("parse failed");
        assert_eq!(record, FileRecord::new("a.txt", 10, 100, "H1"));
    }

    #[test]
    fn test_group_key_includes_algorithm() {
        let a = FileRecord::new("a", 1, 1, "00ff");
        let b = FileRecord::new("b", 1, 1, "00ff").with_hash_algo("blake3");
        assert_ne!(a.group_key(), b.group_key());
    }

    #[test]
    fn test_group_contains() {
        let group = DuplicateGroup {
            content_hash: "H1".to_string(),
            context_tag: CONTEXT_UNARCHIVED.to_string(),
            hash_algo: DEFAULT_HASH_ALGO.to_string(),
            paths: vec!["a.txt".to_string(), "b.txt".to_string()],
        };
        assert!(group.contains("b.txt"));
        assert!(!group.contains("c.txt"));
        assert_eq!(group.to_string(), "sha256:H1 [unarchived] (2 files)");
    }
}
