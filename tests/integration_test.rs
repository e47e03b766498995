//! Integration tests for dupfind.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::too_many_lines,
    clippy::cast_precision_loss,
    clippy::uninlined_format_args
)]

use dupfind::storage::{BruteForceBackend, SqliteHashIndex};
use dupfind::{
    BackendKind, ContentHashIndex, ContentHasher, DuplicateResolver, Error, FileRecord, GroupKind,
    ResolverConfig, SimilarityBackend, SimilarityBackendFactory, VectorId,
};
use std::sync::Arc;
use tempfile::TempDir;

fn record(path: &str, hash: &str) -> FileRecord {
    FileRecord::new(path, 10, 1_700_000_000, hash)
}

#[test]
fn test_error_display() {
    let err = Error::DimensionMismatch {
        expected: 3,
        actual: 2,
    };
    let display = err.to_string();
    assert!(display.contains("expected 3"));
    assert!(display.contains("got 2"));

    let err = Error::UnknownBackend("annoy".to_string());
    assert!(err.to_string().contains("annoy"));

    let err = Error::Storage {
        operation: "upsert".to_string(),
        cause: "disk full".to_string(),
    };
    let display = err.to_string();
    assert!(display.contains("upsert"));
    assert!(display.contains("disk full"));
}

#[test]
fn test_exact_duplicates_grouped_by_hash() {
    let index = SqliteHashIndex::in_memory().expect("index");
    index
        .upsert(&[record("/a", "H1"), record("/b", "H1"), record("/c", "H2")])
        .expect("upsert");

    let groups = index.duplicate_groups().expect("groups");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].content_hash, "H1");
    assert_eq!(groups[0].paths, vec!["/a".to_string(), "/b".to_string()]);
}

#[test]
fn test_context_tag_partitions_groups() {
    let index = SqliteHashIndex::in_memory().expect("index");
    index
        .upsert(&[
            record("/a", "H1").with_context_tag("archived"),
            record("/b", "H1").with_context_tag("unarchived"),
        ])
        .expect("upsert");

    assert!(index.duplicate_groups().expect("groups").is_empty());
    assert_eq!(index.records_with_hash("H1").expect("lookup").len(), 2);
}

#[test]
fn test_reopen_preserves_records() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("files.db");

    {
        let index = SqliteHashIndex::new(&db).expect("open");
        index
            .upsert(&[record("/a", "H1"), record("/b", "H1")])
            .expect("upsert");
    }

    let index = SqliteHashIndex::new(&db).expect("reopen");
    assert_eq!(index.count().expect("count"), 2);
    index.upsert(&[record("/a", "H1")]).expect("re-upsert");
    assert_eq!(index.count().expect("count"), 2);
    assert_eq!(index.duplicate_groups().expect("groups").len(), 1);
}

#[test]
fn test_rehash_moves_path_between_groups() {
    let index = SqliteHashIndex::in_memory().expect("index");
    index
        .upsert(&[record("/a", "H1"), record("/b", "H1"), record("/c", "H2")])
        .expect("upsert");
    index.upsert(&[record("/b", "H2")]).expect("update");

    let groups = index.duplicate_groups().expect("groups");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].content_hash, "H2");
    assert_eq!(groups[0].paths, vec!["/b".to_string(), "/c".to_string()]);
}

#[test]
fn test_brute_force_search_is_exact() {
    let mut backend = BruteForceBackend::new(2);
    backend
        .add(&[vec![0.0, 0.0], vec![3.0, 4.0], vec![1.0, 0.0]], None)
        .expect("add");

    let matches = backend.search(&[0.0, 0.0], 3).expect("search");
    let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["0", "2", "1"]);
    assert!((matches[2].distance - 25.0).abs() < f32::EPSILON);
}

#[test]
fn test_empty_backend_search_returns_nothing() {
    let backend = BruteForceBackend::new(4);
    assert!(backend.search(&[0.0; 4], 5).expect("search").is_empty());
}

#[test]
fn test_factory_fallback_matches_feature() {
    let factory = SimilarityBackendFactory::new();
    let selection = factory.create("usearch", 8).expect("create");

    assert_eq!(selection.requested(), BackendKind::Usearch);
    if BackendKind::Usearch.available() {
        assert!(!selection.fell_back());
    } else {
        assert!(selection.fell_back());
        assert_eq!(selection.selected(), BackendKind::BruteForce);
    }
    assert_eq!(selection.backend().dimensions(), 8);
}

#[test]
fn test_factory_rejects_unknown_name() {
    let factory = SimilarityBackendFactory::new();
    assert!(matches!(
        factory.create("faiss", 8),
        Err(Error::UnknownBackend(_))
    ));
}

#[test]
fn test_persisted_backend_searches_identically() {
    let dir = TempDir::new().expect("tempdir");
    let artifact = dir.path().join("vectors.bin");
    let factory = SimilarityBackendFactory::new();

    let mut selection = factory.create("brute-force", 3).expect("create");
    let ids = vec![VectorId::new("/x"), VectorId::new("/y"), VectorId::new("/z")];
    selection
        .backend_mut()
        .add(
            &[vec![0.0, 0.0, 0.0], vec![0.5, 0.0, 0.0], vec![5.0, 5.0, 5.0]],
            Some(ids.as_slice()),
        )
        .expect("add");
    selection.backend().persist(&artifact).expect("persist");

    let loaded = factory.load("flat", &artifact).expect("load");
    let query = [0.1, 0.0, 0.0];
    assert_eq!(
        selection.backend().search(&query, 3).expect("search"),
        loaded.backend().search(&query, 3).expect("search")
    );
}

#[test]
fn test_resolver_end_to_end() {
    let dir = TempDir::new().expect("tempdir");
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    let c = dir.path().join("c.txt");
    std::fs::write(&a, b"same bytes").expect("write");
    std::fs::write(&b, b"same bytes").expect("write");
    std::fs::write(&c, b"other bytes").expect("write");

    let index = SqliteHashIndex::new(dir.path().join("files.db")).expect("index");
    let records: Vec<FileRecord> = [&a, &b, &c]
        .iter()
        .map(|p| ContentHasher::record_for(p, "unarchived").expect("hash"))
        .collect();
    index.upsert(&records).expect("upsert");

    let path_of = |p: &std::path::Path| p.to_string_lossy().into_owned();
    let mut backend = BruteForceBackend::new(2);
    backend
        .add(
            &[vec![0.0, 0.0], vec![0.0, 0.0], vec![0.1, 0.0]],
            Some(
                [
                    VectorId::new(path_of(&a)),
                    VectorId::new(path_of(&b)),
                    VectorId::new(path_of(&c)),
                ]
                .as_slice(),
            ),
        )
        .expect("add");

    let resolver = DuplicateResolver::new(
        Arc::new(index),
        ResolverConfig::default().with_verify_bytes(true),
    )
    .expect("resolver")
    .with_backend(Arc::new(backend));
    let report = resolver.resolve().expect("resolve");

    assert_eq!(report.exact_count(), 1);
    let exact = report.of_kind(GroupKind::Exact).next().expect("exact group");
    assert_eq!(exact.members, vec![path_of(&a), path_of(&b)]);

    // The a-b edge is already exact; both still reach c by distance.
    assert_eq!(report.near_count(), 1);
    let near = report.of_kind(GroupKind::Near).next().expect("near group");
    assert!(near.contains(&path_of(&c)));
    assert!(near.max_distance.expect("distance") < 0.5);
}

#[test]
fn test_resolver_without_backend_reports_exact_only() {
    let index = SqliteHashIndex::in_memory().expect("index");
    index
        .upsert(&[record("/a", "H1"), record("/b", "H1")])
        .expect("upsert");

    let report = DuplicateResolver::new(Arc::new(index), ResolverConfig::default())
        .expect("resolver")
        .resolve()
        .expect("resolve");
    assert_eq!(report.exact_count(), 1);
    assert_eq!(report.near_count(), 0);
}

#[test]
fn test_report_serializes_kind_tags() {
    let index = SqliteHashIndex::in_memory().expect("index");
    index
        .upsert(&[record("/a", "H1"), record("/b", "H1")])
        .expect("upsert");
    let report = DuplicateResolver::new(Arc::new(index), ResolverConfig::default())
        .expect("resolver")
        .resolve()
        .expect("resolve");

    let json = serde_json::to_value(&report).expect("serialize");
    assert_eq!(json["groups"][0]["content_hash"], "H1");
    assert!(json["groups"][0].get("max_distance").is_none());
}

#[test]
fn test_mixed_caller_and_assigned_ids_keep_near_pair() {
    let mut backend = BruteForceBackend::new(2);
    backend
        .add(&[vec![0.0, 0.0]], Some(&[VectorId::new("1")]))
        .expect("add");
    backend
        .add(&[vec![0.01, 0.0], vec![50.0, 50.0]], None)
        .expect("add");

    let ids: Vec<String> = backend
        .entries()
        .expect("entries")
        .into_iter()
        .map(|e| e.id.into_inner())
        .collect();
    let unique: std::collections::HashSet<&String> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());

    let resolver = DuplicateResolver::new(
        Arc::new(SqliteHashIndex::in_memory().expect("index")),
        ResolverConfig::default().with_threshold(1.0),
    )
    .expect("resolver")
    .with_backend(Arc::new(backend));
    let report = resolver.resolve().expect("resolve");

    assert_eq!(report.near_count(), 1);
    let near = report.of_kind(GroupKind::Near).next().expect("near group");
    assert_eq!(near.members.len(), 2);
    assert!(near.contains("1"));
}

#[test]
fn test_duplicate_vector_id_rejected() {
    let factory = SimilarityBackendFactory::new();
    let mut selection = factory.create("brute-force", 1).expect("create");
    selection
        .backend_mut()
        .add(&[vec![0.0]], Some(&[VectorId::new("/a")]))
        .expect("add");

    let again = selection
        .backend_mut()
        .add(&[vec![1.0]], Some(&[VectorId::new("/a")]));
    assert!(matches!(again, Err(Error::InvalidInput(_))));

    let twice = [VectorId::new("/b"), VectorId::new("/b")];
    let repeated = selection
        .backend_mut()
        .add(&[vec![1.0], vec![2.0]], Some(twice.as_slice()));
    assert!(matches!(repeated, Err(Error::InvalidInput(_))));
    assert_eq!(selection.backend().len(), 1);
}

#[test]
fn test_fallback_persist_reload_resolve() {
    let dir = TempDir::new().expect("tempdir");
    let artifact = dir.path().join("vectors.bin");
    let factory = SimilarityBackendFactory::new();

    let mut created = factory.create("usearch", 2).expect("create");
    let ids = vec![VectorId::new("/p"), VectorId::new("/q"), VectorId::new("/r")];
    created
        .backend_mut()
        .add(
            &[vec![0.0, 0.0], vec![0.01, 0.0], vec![50.0, 50.0]],
            Some(ids.as_slice()),
        )
        .expect("add");
    created.backend().persist(&artifact).expect("persist");

    let loaded = factory.load("usearch", &artifact).expect("load");
    assert_eq!(loaded.selected(), created.selected());
    assert_eq!(loaded.backend().len(), 3);

    let resolver = DuplicateResolver::new(
        Arc::new(SqliteHashIndex::in_memory().expect("index")),
        ResolverConfig::default(),
    )
    .expect("resolver")
    .with_backend(loaded.into_backend().into());
    let report = resolver.resolve().expect("resolve");

    assert_eq!(report.near_count(), 1);
    let near = report.of_kind(GroupKind::Near).next().expect("near group");
    assert_eq!(near.members, vec!["/p".to_string(), "/q".to_string()]);
}
