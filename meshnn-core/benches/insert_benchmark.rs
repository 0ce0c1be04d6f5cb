//! Insert throughput benchmarks.
//!
//! Run with: `cargo bench --bench insert_benchmark`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use meshnn_core::{DistanceMetric, Index, IndexParams};

/// Deterministic pseudo-random vector, cheap enough to generate inline
/// inside a benchmark closure without skewing the measured work.
fn generate_vector(dim: usize, seed: u64) -> Vec<f32> {
    (0..dim).map(|i| ((seed as f32 * 0.1 + i as f32 * 0.01).sin() + 1.0) / 2.0).collect()
}

fn bench_single_thread_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_single_thread");

    for count in [1_000, 10_000].iter() {
        let dim = 128;
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(
            BenchmarkId::new("vectors", format!("{count}x{dim}d")),
            count,
            |b, &count| {
                b.iter(|| {
                    let index: Index<Vec<f32>, f32> = Index::new(IndexParams::default(), |a, b| {
                        DistanceMetric::SquaredEuclidean.distance(a, b)
                    });
                    for i in 0..count {
                        index.add(generate_vector(dim, i as u64));
                    }
                    black_box(index.len())
                });
            },
        );
    }

    group.finish();
}

#[cfg(feature = "parallel")]
fn bench_parallel_batch_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_parallel_batch");
    let dim = 128;
    let count = 10_000;
    group.throughput(Throughput::Elements(count as u64));

    group.bench_function("add_batch_10k", |b| {
        b.iter(|| {
            let index: Index<Vec<f32>, f32> = Index::new(IndexParams::default(), |a, b| {
                DistanceMetric::SquaredEuclidean.distance(a, b)
            });
            let labels: Vec<Vec<f32>> = (0..count).map(|i| generate_vector(dim, i as u64)).collect();
            let ids = index.add_batch(labels);
            black_box(ids.len())
        });
    });

    group.finish();
}

fn bench_ef_construction_tradeoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_ef_construction");
    let dim = 128;
    let count = 5_000;

    for ef in [40, 100, 300].iter() {
        group.bench_with_input(BenchmarkId::new("ef_construction", ef), ef, |b, &ef| {
            b.iter(|| {
                let params = IndexParams::default().with_ef_construction(ef);
                let index: Index<Vec<f32>, f32> =
                    Index::new(params, |a, b| DistanceMetric::SquaredEuclidean.distance(a, b));
                for i in 0..count {
                    index.add(generate_vector(dim, i as u64));
                }
                black_box(index.len())
            });
        });
    }

    group.finish();
}

#[cfg(feature = "parallel")]
criterion_group!(
    benches,
    bench_single_thread_insert,
    bench_parallel_batch_insert,
    bench_ef_construction_tradeoff
);
#[cfg(not(feature = "parallel"))]
criterion_group!(benches, bench_single_thread_insert, bench_ef_construction_tradeoff);
criterion_main!(benches);
