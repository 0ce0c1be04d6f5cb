//! Query latency and throughput benchmarks.
//!
//! Run with: `cargo bench --bench search_benchmark`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use meshnn_core::{DistanceMetric, Index, IndexParams};

fn generate_vector(dim: usize, seed: u64) -> Vec<f32> {
    (0..dim).map(|i| ((seed as f32 * 0.1 + i as f32 * 0.01).sin() + 1.0) / 2.0).collect()
}

fn populated_index(dim: usize, count: usize) -> Index<Vec<f32>, f32> {
    let index: Index<Vec<f32>, f32> =
        Index::new(IndexParams::default(), |a, b| DistanceMetric::SquaredEuclidean.distance(a, b));
    for i in 0..count {
        index.add(generate_vector(dim, i as u64));
    }
    index
}

fn bench_knn_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("knn_latency");
    let dim = 128;
    let index = populated_index(dim, 10_000);
    let query = generate_vector(dim, 99_999);

    for k in [1, 10, 50, 100].iter() {
        group.bench_with_input(BenchmarkId::new("top_k", k), k, |b, &k| {
            b.iter(|| black_box(index.knn(&query, k).unwrap()));
        });
    }

    group.finish();
}

fn bench_knn_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("knn_throughput");
    let dim = 128;
    let index = populated_index(dim, 10_000);
    let queries: Vec<Vec<f32>> = (0..200).map(|i| generate_vector(dim, 100_000 + i)).collect();

    group.throughput(Throughput::Elements(queries.len() as u64));
    group.bench_function("200_queries_top10", |b| {
        b.iter(|| {
            for q in &queries {
                black_box(index.knn(q, 10).unwrap());
            }
        });
    });

    group.finish();
}

fn bench_ef_search_tradeoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("knn_ef_search");
    let dim = 128;
    let query_seed = 99_999;

    for ef in [5, 20, 50, 200].iter() {
        let index = populated_index(dim, 10_000);
        index.set_ef_search(*ef);
        let query = generate_vector(dim, query_seed);
        group.bench_with_input(BenchmarkId::new("ef_search", ef), ef, |b, _| {
            b.iter(|| black_box(index.knn(&query, 10).unwrap()));
        });
    }

    group.finish();
}

fn bench_range_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_query");
    let dim = 128;
    let index = populated_index(dim, 10_000);
    let query = generate_vector(dim, 99_999);

    group.bench_function("radius_5", |b| {
        b.iter(|| black_box(index.range(&query, 5.0).unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_knn_latency,
    bench_knn_throughput,
    bench_ef_search_tradeoff,
    bench_range_query
);
criterion_main!(benches);
