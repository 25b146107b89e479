use std::collections::BTreeMap;

use gitlite::config::IndexConfig;
use gitlite::error::{GitLiteError, GitLiteResult};
use gitlite::index::{IndexKind, OrderedIndex, Row, TreeIndex};
use gitlite::storage::{FileSink, MemorySink, NodeRecord, RecordSink};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

const ALL_KINDS: [IndexKind; 3] = [IndexKind::Avl, IndexKind::RedBlack, IndexKind::BTree];

fn new_index(kind: IndexKind) -> TreeIndex {
    TreeIndex::new(
        &IndexConfig::default()
            .with_kind(kind)
            .with_btree_min_degree(2usize),
    )
    .unwrap()
}

fn row(key: &str) -> Row {
    vec![key.to_string(), format!("payload of {key}")]
}

#[test]
fn every_kind_agrees_on_reads() {
    let keys = ["m", "c", "x", "a", "e", "q", "z", "b", "d"];
    for kind in ALL_KINDS {
        let mut index = new_index(kind);
        let mut sink = MemorySink::new();
        for key in keys {
            assert!(index.insert(key, row(key), &mut sink), "{kind}");
        }
        assert!(!index.insert("m", row("other"), &mut sink));

        index.verify().unwrap();
        assert_eq!(index.len(), keys.len());
        assert_eq!(
            index.keys(),
            vec!["a", "b", "c", "d", "e", "m", "q", "x", "z"]
        );
        assert_eq!(index.get("q"), Some(&row("q")));
        assert_eq!(index.get("nope"), None);

        let found = index
            .range("b", "m")
            .into_iter()
            .map(|(key, _)| key)
            .collect::<Vec<_>>();
        assert_eq!(found, vec!["b", "c", "d", "e", "m"], "{kind}");
        assert!(index.range("y", "c").is_empty());
    }
}

#[test]
fn digest_capable_kinds_match_reference_model() -> GitLiteResult<()> {
    let mut rng = StdRng::seed_from_u64(42);
    for kind in [IndexKind::Avl, IndexKind::RedBlack] {
        let mut index = new_index(kind);
        let mut sink = MemorySink::new();
        let mut model = BTreeMap::new();

        for _ in 0..1500 {
            let key = format!("{:03}", rng.random_range(0..200));
            match rng.random_range(0..10) {
                0..=4 => {
                    let inserted = index.insert(&key, row(&key), &mut sink);
                    assert_eq!(inserted, model.insert(key.clone(), row(&key)).is_none());
                }
                5..=7 => {
                    assert_eq!(index.remove(&key, &mut sink)?, model.remove(&key).is_some());
                }
                _ => {
                    let end = format!("{:03}", rng.random_range(0..200));
                    let removed = index.remove_range(&key, &end, &mut sink)?;
                    let doomed = model
                        .keys()
                        .filter(|k| k.as_str() >= key.as_str() && k.as_str() <= end.as_str())
                        .cloned()
                        .collect::<Vec<_>>();
                    assert_eq!(removed, doomed.len());
                    for k in doomed {
                        model.remove(&k);
                    }
                }
            }
            index.verify()?;
        }

        assert_eq!(index.keys(), model.keys().cloned().collect::<Vec<_>>());
        let ids = sink.ids().cloned().collect::<Vec<_>>();
        assert_eq!(ids, index.keys(), "{kind} records drifted");
    }
    Ok(())
}

#[test]
fn same_keys_same_root_digest() -> GitLiteResult<()> {
    for kind in [IndexKind::Avl, IndexKind::RedBlack] {
        let mut first = new_index(kind);
        let mut second = new_index(kind);
        let mut sink = MemorySink::new();
        for key in ["k1", "k2", "k3", "k4"] {
            first.insert(key, vec![], &mut sink);
            second.insert(key, vec!["different payload".to_string()], &mut sink);
        }
        assert_eq!(first.root_digest()?, second.root_digest()?);

        second.remove("k4", &mut sink)?;
        assert_ne!(first.root_digest()?, second.root_digest()?);
        second.insert("k4", vec![], &mut sink);
        first.verify()?;
        second.verify()?;
    }
    Ok(())
}

#[test]
fn btree_is_insert_only() {
    let mut index = new_index(IndexKind::BTree);
    let mut sink = MemorySink::new();
    index.insert("a", vec![], &mut sink);
    let err = index.remove("a", &mut sink).unwrap_err();
    assert!(matches!(err, GitLiteError::UnsupportedOperation(_)));
    assert_eq!(index.keys(), vec!["a"]);
}

#[test]
fn file_records_round_trip_through_disk() -> GitLiteResult<()> {
    let temp_dir = TempDir::new()?;
    for kind in ALL_KINDS {
        let dir = temp_dir.path().join(kind.to_string());
        let mut sink = FileSink::new(&dir);
        let mut index = new_index(kind);
        for key in ["delta", "alpha", "echo", "bravo", "charlie"] {
            index.insert(key, row(key), &mut sink);
        }

        let mut restored = new_index(kind);
        let mut scratch = MemorySink::new();
        for record in sink.load_all()? {
            for (key, row) in record.entries() {
                restored.insert(key, row, &mut scratch);
            }
        }
        assert_eq!(restored.keys(), index.keys(), "{kind}");
        // fields are whitespace-split on the way back in
        let echo = restored.get("echo").unwrap();
        assert_eq!(echo, &vec!["echo", "payload", "of", "echo"]);
    }
    Ok(())
}

/// Rejects every write; used to check failures stay inside the index.
#[derive(Default)]
struct ReadOnlySink;

impl RecordSink for ReadOnlySink {
    fn write(&mut self, id: &str, _record: &NodeRecord) -> GitLiteResult<()> {
        Err(GitLiteError::Persistence(format!("read-only: {id}")))
    }

    fn remove(&mut self, id: &str) -> GitLiteResult<()> {
        Err(GitLiteError::Persistence(format!("read-only: {id}")))
    }
}

#[test]
fn sink_failures_are_counted_not_returned() -> GitLiteResult<()> {
    for kind in ALL_KINDS {
        let mut index = new_index(kind);
        let mut sink = ReadOnlySink;
        for key in ["a", "b", "c", "d"] {
            assert!(index.insert(key, vec![], &mut sink));
        }
        assert!(index.persistence_failures() >= 4, "{kind}");
        assert_eq!(index.len(), 4);
        if index.capabilities().supports_delete {
            assert!(index.remove("b", &mut sink)?);
        }
        index.verify()?;
    }
    Ok(())
}
