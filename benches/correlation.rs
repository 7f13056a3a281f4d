//! Benchmarks for the correlation-dimension stage.
//!
//! Pairwise distances are O(N²·D) and dominate the analysis for long
//! sequences; the fit itself is negligible.

use attractor::correlation::{
    curve_from_distances, estimate_correlation_dimension, fit_dimension, pairwise_distances,
    CorrelationConfig,
};
use attractor::datasets;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn bench_pairwise_distances(c: &mut Criterion) {
    let mut group = c.benchmark_group("pairwise_distances");
    group.sample_size(20);

    for n in [100, 500, 1000].iter() {
        let seq = datasets::conversational_drift(*n, 384, 0.05, 42).unwrap();
        group.throughput(Throughput::Elements((n * (n - 1) / 2) as u64));

        group.bench_with_input(BenchmarkId::from_parameter(n), n, |bench, _| {
            bench.iter(|| pairwise_distances(black_box(&seq)).unwrap());
        });
    }

    group.finish();
}

fn bench_curve_and_fit(c: &mut Criterion) {
    let seq = datasets::lorenz(2000, 42).unwrap();
    let distances = pairwise_distances(&seq).unwrap();
    let config = CorrelationConfig::default();

    c.bench_function("curve_from_distances_2000", |bench| {
        bench.iter(|| curve_from_distances(black_box(&distances), &config).unwrap());
    });

    let curve = curve_from_distances(&distances, &config).unwrap();
    c.bench_function("fit_dimension_50_radii", |bench| {
        bench.iter(|| fit_dimension(black_box(&curve), None).unwrap());
    });
}

fn bench_estimate_dimensions(c: &mut Criterion) {
    let mut group = c.benchmark_group("estimate_correlation_dimension");
    group.sample_size(10);

    for dim in [64, 384, 768].iter() {
        group.throughput(Throughput::Elements(*dim as u64));
        let seq = datasets::manifold_trajectory(300, *dim, &Default::default(), 42).unwrap();
        let config = CorrelationConfig::default();

        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |bench, _| {
            bench.iter(|| estimate_correlation_dimension(black_box(&seq), &config).unwrap());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_pairwise_distances,
    bench_curve_and_fit,
    bench_estimate_dimensions,
);
criterion_main!(benches);
