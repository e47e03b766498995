//! Resolver output.

use super::DuplicateGroup;
use serde::{Deserialize, Serialize};

/// How members of a resolved group were found to be duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    /// Identical content hash.
    Exact,
    /// Embeddings closer than the distance threshold.
    Near,
}

impl GroupKind {
    /// Returns the kind as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Near => "near",
        }
    }
}

/// One group in a [`DuplicateReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedGroup {
    /// Exact or near.
    pub kind: GroupKind,
    /// Shared digest (exact groups only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Shared context tag (exact groups only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_tag: Option<String>,
    /// Shared digest algorithm (exact groups only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_algo: Option<String>,
    /// Largest edge distance inside the group (near groups only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_distance: Option<f32>,
    /// Sorted members. Never empty.
    pub members: Vec<String>,
}

impl ResolvedGroup {
    /// Wraps an exact duplicate group.
    #[must_use]
    pub fn exact(group: DuplicateGroup) -> Self {
        Self {
            kind: GroupKind::Exact,
            content_hash: Some(group.content_hash),
            context_tag: Some(group.context_tag),
            hash_algo: Some(group.hash_algo),
            max_distance: None,
            members: group.paths,
        }
    }

    /// Builds a near-duplicate group.
    #[must_use]
    pub fn near(mut members: Vec<String>, max_distance: f32) -> Self {
        members.sort();
        Self {
            kind: GroupKind::Near,
            content_hash: None,
            context_tag: None,
            hash_algo: None,
            max_distance: Some(max_distance),
            members,
        }
    }

    /// True if `member` is in this group.
    #[must_use]
    pub fn contains(&self, member: &str) -> bool {
        self.members.iter().any(|m| m == member)
    }
}

/// Unified exact and near-duplicate report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DuplicateReport {
    /// Exact groups first, then near groups.
    pub groups: Vec<ResolvedGroup>,
}

impl DuplicateReport {
    /// Iterates over groups of the given kind.
    pub fn of_kind(&self, kind: GroupKind) -> impl Iterator<Item = &ResolvedGroup> {
        self.groups.iter().filter(move |g| g.kind == kind)
    }

    /// Number of exact groups.
    #[must_use]
    pub fn exact_count(&self) -> usize {
        self.of_kind(GroupKind::Exact).count()
    }

    /// Number of near groups.
    #[must_use]
    pub fn near_count(&self) -> usize {
        self.of_kind(GroupKind::Near).count()
    }

    /// True when no duplicates were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
