use std::io::Cursor;

use audio_blob_store::{BlobStore, LocalFileBlobStore};
use chrono::NaiveDate;
use criterion::{criterion_group, criterion_main, Criterion};


fn save_benchmark(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalFileBlobStore::new(dir.path()).unwrap();
    let payload = vec![7u8; 64 * 1024];
    let date = NaiveDate::from_ymd_opt(2024, 1, 15);

    c.bench_function("save 64KiB blob", |b| b.iter(|| {
        store.save(&mut Cursor::new(&payload), "wav", date).unwrap();
    }));
}

fn list_benchmark(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalFileBlobStore::new(dir.path()).unwrap();
    for day in 1..=28 {
        let date = NaiveDate::from_ymd_opt(2024, 2, day);
        for _ in 0..20 {
            store.save(&mut Cursor::new(b"blob"), "mp3", date).unwrap();
        }
    }

    c.bench_function("list 560 blobs", |b| b.iter(|| {
        store.list_all().unwrap()
    }));
}

criterion_group!(benches, save_benchmark, list_benchmark);
criterion_main!(benches);
