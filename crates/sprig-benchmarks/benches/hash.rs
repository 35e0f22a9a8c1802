//! Archive hashing benchmarks
//!
//! Every install hashes the downloaded archive with SHA-512; the blake3 and
//! SHA-256 rows are there for comparison.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sprig_benchmarks::{create_test_content, criterion_config};
use sprig_core::utils::{blake3_hash, sha512_base64, verify_integrity};

fn bench_archive_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("archive_hash");

    for size in [1024, 102_400, 1_024_000, 10_240_000] {
        let content = create_test_content(size);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("sha512_base64", size), &content, |b, data| {
            b.iter(|| black_box(sha512_base64(data)));
        });
    }

    group.finish();
}

fn bench_integrity_verification(c: &mut Criterion) {
    let mut group = c.benchmark_group("integrity_verification");

    for size in [10_240, 1_024_000] {
        let content = create_test_content(size);
        let expected = sha512_base64(&content);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("verify", size), &content, |b, data| {
            b.iter(|| black_box(verify_integrity("Bench 1.0.0", data, &expected).is_ok()));
        });
    }

    group.finish();
}

fn bench_hash_algorithms(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_algorithms");
    let content = create_test_content(102_400);
    group.throughput(Throughput::Bytes(content.len() as u64));

    group.bench_function("sha512", |b| {
        b.iter(|| black_box(sha512_base64(&content)));
    });

    group.bench_function("blake3", |b| {
        b.iter(|| black_box(blake3_hash(&content)));
    });

    group.bench_function("sha256", |b| {
        use sha2::{Digest, Sha256};

        b.iter(|| {
            let mut hasher = Sha256::new();
            hasher.update(&content);
            black_box(hasher.finalize())
        });
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_archive_hash, bench_integrity_verification, bench_hash_algorithms
}
criterion_main!(benches);
