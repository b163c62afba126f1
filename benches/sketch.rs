//! Benchmarks for signature construction and index queries.
//!
//! Token sets are synthetic: each column draws from a shared vocabulary, so
//! neighbouring columns overlap and index queries have real candidates.

use colsketch::config::{ForestParams, SketchConfig};
use colsketch::{
    ColumnKey, ForestIndex, MinHashSignature, MinHasher, SimilarityMatrix, ThresholdIndex,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;
use std::collections::HashSet;

// === Synthetic Data Generation ===

fn random_tokens(n: usize, vocab: usize, rng: &mut StdRng) -> HashSet<String> {
    (0..n).map(|_| format!("tok{}", rng.gen_range(0..vocab))).collect()
}

fn random_columns(n: usize, num_perm: usize, seed: u64) -> Vec<(ColumnKey, MinHashSignature)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let hasher = MinHasher::new(SketchConfig::with_num_perm(num_perm)).unwrap();
    (0..n)
        .map(|i| {
            let key = ColumnKey::new("bench", format!("c{i:05}")).unwrap();
            (key, hasher.signature(&random_tokens(200, 5_000, &mut rng)))
        })
        .collect()
}

// === Benchmarks ===

fn bench_signature(c: &mut Criterion) {
    let mut group = c.benchmark_group("signature");
    let mut rng = StdRng::seed_from_u64(7);

    for &set_size in &[100usize, 1_000, 10_000] {
        let tokens = random_tokens(set_size, set_size * 4, &mut rng);
        group.throughput(Throughput::Elements(tokens.len() as u64));
        for &num_perm in &[64usize, 128, 256] {
            let hasher = MinHasher::new(SketchConfig::with_num_perm(num_perm)).unwrap();
            group.bench_with_input(
                BenchmarkId::new(format!("p{num_perm}"), set_size),
                &tokens,
                |b, tokens| b.iter(|| hasher.signature(black_box(tokens))),
            );
        }
    }
    group.finish();
}

fn bench_forest(c: &mut Criterion) {
    let mut group = c.benchmark_group("forest");
    group.sample_size(20);

    for &n in &[1_000usize, 10_000] {
        let columns = random_columns(n, 128, 42);
        let probe = columns[n / 2].1.clone();

        group.bench_with_input(BenchmarkId::new("build", n), &columns, |b, columns| {
            b.iter(|| ForestIndex::build(columns.clone(), 128, ForestParams::default()).unwrap())
        });

        let forest = ForestIndex::build(columns, 128, ForestParams::default()).unwrap();
        for &k in &[1usize, 10, 100] {
            group.bench_with_input(BenchmarkId::new(format!("query_k{k}"), n), &k, |b, &k| {
                b.iter(|| forest.query(black_box(&probe), k).unwrap())
            });
        }
    }
    group.finish();
}

fn bench_threshold(c: &mut Criterion) {
    let mut group = c.benchmark_group("threshold");
    let columns = random_columns(10_000, 128, 43);
    let probe = columns[0].1.clone();

    for &t in &[0.3f64, 0.5, 0.8] {
        let index = ThresholdIndex::build(columns.clone(), 128, t).unwrap();
        group.bench_with_input(BenchmarkId::new("query", t), &index, |b, index| {
            b.iter(|| index.query(black_box(&probe)).unwrap())
        });
    }
    group.finish();
}

fn bench_matrix(c: &mut Criterion) {
    let mut group = c.benchmark_group("matrix");
    group.sample_size(10);

    for &n in &[100usize, 500] {
        let columns = random_columns(n, 128, 44);
        group.throughput(Throughput::Elements((n * n) as u64));
        group.bench_with_input(BenchmarkId::new("compute", n), &columns, |b, columns| {
            b.iter(|| SimilarityMatrix::compute(black_box(columns)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_signature,
    bench_forest,
    bench_threshold,
    bench_matrix
);
criterion_main!(benches);
