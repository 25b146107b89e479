use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use gitlite::config::IndexConfig;
use gitlite::index::{IndexKind, OrderedIndex, TreeIndex};
use gitlite::storage::{FileSink, MemorySink};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tempfile::TempDir;

const KEYS: usize = 10_000;
const FILE_KEYS: usize = 1_000;
const POINT_SAMPLES: usize = 2_000;
const RANGE_WIDTH: usize = 200;

const KINDS: [IndexKind; 3] = [IndexKind::Avl, IndexKind::RedBlack, IndexKind::BTree];

fn shuffled_keys(count: usize) -> Vec<String> {
    let mut keys = (0..count).map(|i| format!("key{i:06}")).collect::<Vec<_>>();
    keys.shuffle(&mut StdRng::seed_from_u64(0x5EED));
    keys
}

fn new_index(kind: IndexKind) -> TreeIndex {
    TreeIndex::new(&IndexConfig::default().with_kind(kind)).expect("valid index config")
}

fn populated(kind: IndexKind, keys: &[String]) -> TreeIndex {
    let mut index = new_index(kind);
    let mut sink = MemorySink::new();
    for key in keys {
        index.insert(key, vec![key.clone(), "payload".to_string()], &mut sink);
    }
    index
}

fn bench_insert(c: &mut Criterion) {
    let keys = shuffled_keys(KEYS);
    let mut group = c.benchmark_group("insert_10k");
    group.throughput(Throughput::Elements(KEYS as u64));
    for kind in KINDS {
        group.bench_function(kind.to_string(), |b| {
            b.iter_batched(
                || (new_index(kind), MemorySink::new()),
                |(mut index, mut sink)| {
                    for key in &keys {
                        index.insert(key, vec![key.clone()], &mut sink);
                    }
                    black_box(index.len());
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_insert_to_files(c: &mut Criterion) {
    let keys = shuffled_keys(FILE_KEYS);
    let mut group = c.benchmark_group("insert_1k_files");
    group.throughput(Throughput::Elements(FILE_KEYS as u64));
    for kind in KINDS {
        group.bench_function(kind.to_string(), |b| {
            b.iter_batched(
                || {
                    let dir = TempDir::new().expect("temp dir");
                    let sink = FileSink::new(dir.path());
                    (new_index(kind), sink, dir)
                },
                |(mut index, mut sink, _dir)| {
                    for key in &keys {
                        index.insert(key, vec![key.clone()], &mut sink);
                    }
                    black_box(index.persistence_failures());
                },
                BatchSize::PerIteration,
            );
        });
    }
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let keys = shuffled_keys(KEYS);
    let mut sorted = keys.clone();
    sorted.sort();
    let mut group = c.benchmark_group("lookup");
    for kind in KINDS {
        let index = populated(kind, &keys);
        group.bench_function(format!("{kind}_point"), |b| {
            b.iter(|| {
                for key in keys.iter().take(POINT_SAMPLES) {
                    black_box(index.get(key));
                }
            });
        });
        group.bench_function(format!("{kind}_range"), |b| {
            b.iter(|| {
                for start in (0..KEYS - RANGE_WIDTH).step_by(KEYS / 20) {
                    black_box(index.range(&sorted[start], &sorted[start + RANGE_WIDTH]));
                }
            });
        });
    }
    group.finish();
}

fn bench_remove(c: &mut Criterion) {
    let keys = shuffled_keys(KEYS);
    let mut group = c.benchmark_group("remove_half");
    for kind in [IndexKind::Avl, IndexKind::RedBlack] {
        let index = populated(kind, &keys);
        group.bench_function(kind.to_string(), |b| {
            b.iter_batched(
                || (index.clone(), MemorySink::new()),
                |(mut index, mut sink)| {
                    for key in keys.iter().step_by(2) {
                        index.remove(key, &mut sink).expect("delete supported");
                    }
                    black_box(index.len());
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_insert, bench_insert_to_files, bench_lookup, bench_remove
);
criterion_main!(benches);
