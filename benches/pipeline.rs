//! Benchmarks for the compression chain and full pipeline runs.

use attractor::datasets::{self, ManifoldParams};
use attractor::delta::DeltaSequence;
use attractor::pca;
use attractor::pipeline::{self, PipelineConfig};
use attractor::quantize::{quantize, QuantizerConfig};
use attractor::similarity::{consecutive_similarity, SimilarityConfig};
use attractor::ReductionTarget;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn bench_similarity(c: &mut Criterion) {
    let mut group = c.benchmark_group("consecutive_similarity");

    for dim in [128, 384, 768, 1536].iter() {
        group.throughput(Throughput::Elements(*dim as u64));
        let seq = datasets::conversational_drift(1000, *dim, 0.05, 42).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |bench, _| {
            bench.iter(|| consecutive_similarity(black_box(&seq), &SimilarityConfig::default()).unwrap());
        });
    }

    group.finish();
}

fn bench_pca(c: &mut Criterion) {
    let mut group = c.benchmark_group("pca_reduce");
    group.sample_size(10);

    // N < D takes the Gram path, N > D the covariance path.
    for (n, dim) in [(100, 768), (500, 768), (1000, 128)].iter() {
        let seq = datasets::manifold_trajectory(*n, *dim, &ManifoldParams::default(), 42).unwrap();
        let id = format!("{n}x{dim}");

        group.bench_with_input(BenchmarkId::from_parameter(id), &seq, |bench, seq| {
            bench.iter(|| pca::reduce(black_box(seq), ReductionTarget::Components(10)).unwrap());
        });
    }

    group.finish();
}

fn bench_delta_quantize(c: &mut Criterion) {
    let seq = datasets::manifold_trajectory(1000, 256, &ManifoldParams::default(), 42).unwrap();
    let reduced = pca::reduce(&seq, ReductionTarget::Components(16)).unwrap();

    c.bench_function("delta_encode_1000x16", |bench| {
        bench.iter(|| DeltaSequence::encode(black_box(&reduced)));
    });

    let deltas = DeltaSequence::encode(&reduced);
    let mut group = c.benchmark_group("quantize_1000x16");
    for bits in [4u8, 8, 12].iter() {
        let config = QuantizerConfig {
            bits: *bits,
            ..QuantizerConfig::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(bits), bits, |bench, _| {
            bench.iter(|| quantize(black_box(&deltas), &config).unwrap());
        });
    }
    group.finish();
}

fn bench_full_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_run");
    group.sample_size(10);

    let seq = datasets::manifold_trajectory(100, 768, &ManifoldParams::default(), 42).unwrap();
    let config = PipelineConfig {
        reduction: ReductionTarget::Components(10),
        ..PipelineConfig::default()
    };
    group.bench_function("manifold_100x768", |bench| {
        bench.iter(|| pipeline::run(black_box(&seq), &config).unwrap());
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_similarity,
    bench_pca,
    bench_delta_quantize,
    bench_full_run,
);
criterion_main!(benches);
