//! # Record Store Benchmarks
//!
//! Measures the hot paths of the record API: insert, read, and in-place
//! update. Every insert pays for a durable redo-log append, so these numbers
//! are dominated by fsync cost; the read benchmark shows the cache-hit path
//! without any I/O.
//!
//! ## Running Benchmarks
//!
//! ```bash
//! cargo bench --bench insertion
//! cargo bench --bench insertion -- insert   # Only insert benchmarks
//! cargo bench --bench insertion -- read     # Only read benchmarks
//! ```

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use heapfile::{RecordStore, TxnManager};

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    group.bench_function("small_payload", |b| {
        let dir = tempfile::tempdir().unwrap();
        let txns = Arc::new(TxnManager::open(dir.path()).unwrap());
        let store = RecordStore::open(dir.path(), 8 * 1024 * 1024, Arc::clone(&txns)).unwrap();
        let xid = txns.begin().unwrap();

        b.iter(|| {
            let rid = store.insert(xid, black_box(b"benchmark payload")).unwrap();
            black_box(rid)
        });
    });

    group.bench_function("four_kib_payload", |b| {
        let dir = tempfile::tempdir().unwrap();
        let txns = Arc::new(TxnManager::open(dir.path()).unwrap());
        let store = RecordStore::open(dir.path(), 8 * 1024 * 1024, Arc::clone(&txns)).unwrap();
        let xid = txns.begin().unwrap();
        let payload = vec![0x42u8; 4096];

        b.iter(|| {
            let rid = store.insert(xid, black_box(&payload)).unwrap();
            black_box(rid)
        });
    });

    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");

    group.bench_function("cached_record", |b| {
        let dir = tempfile::tempdir().unwrap();
        let txns = Arc::new(TxnManager::open(dir.path()).unwrap());
        let store = RecordStore::open(dir.path(), 8 * 1024 * 1024, Arc::clone(&txns)).unwrap();
        let xid = txns.begin().unwrap();
        let rid = store.insert(xid, b"read me back").unwrap();

        b.iter(|| {
            let record = store.read(black_box(rid)).unwrap().unwrap();
            black_box(record.payload().len())
        });
    });

    group.finish();
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("update");

    group.bench_function("in_place", |b| {
        let dir = tempfile::tempdir().unwrap();
        let txns = Arc::new(TxnManager::open(dir.path()).unwrap());
        let store = RecordStore::open(dir.path(), 8 * 1024 * 1024, Arc::clone(&txns)).unwrap();
        let xid = txns.begin().unwrap();
        let rid = store.insert(xid, b"xxxxxxxxxxxxxxxx").unwrap();

        b.iter(|| {
            let rid = store.update(xid, black_box(rid), b"yyyyyyyyyyyyyyyy").unwrap();
            black_box(rid)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_insert, bench_read, bench_update);
criterion_main!(benches);
