
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};

use lossagg::{ingest_file, IngestOptions};

use fixtures::write_fixture;

// ── Group 1: ingest_scale — row count scaling, single worker ────────────────

fn bench_ingest_scale(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest_scale");
    for &num_iter in &[1_000u32, 10_000, 50_000] {
        let path = write_fixture(num_iter, 5, "scale");
        group.throughput(Throughput::Elements((num_iter * 5) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(num_iter), &path, |b, path| {
            b.iter_batched(
                IngestOptions::default,
                |opts| ingest_file(path, &opts, 1).unwrap(),
                BatchSize::LargeInput,
            )
        });
        std::fs::remove_file(&path).ok();
    }
    group.finish();
}

// ── Group 2: ingest_workers — worker-count scaling on a fixed file ──────────

fn bench_ingest_workers(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest_workers");
    group.sample_size(10);
    let path = write_fixture(20_000, 5, "workers");
    for &workers in &[1usize, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &w| {
            b.iter_batched(
                IngestOptions::default,
                |opts| ingest_file(&path, &opts, w).unwrap(),
                BatchSize::LargeInput,
            )
        });
    }
    std::fs::remove_file(&path).ok();
    group.finish();
}

// ── Group 3: allocated_tvar — probability-set scaling ───────────────────────

fn bench_allocated_tvar(c: &mut Criterion) {
    use lossagg::loss_series::LossSeries;

    let mut group = c.benchmark_group("allocated_tvar");
    let path = write_fixture(50_000, 3, "tvar");
    let sim = ingest_file(&path, &IngestOptions::default(), 4).unwrap();
    std::fs::remove_file(&path).ok();
    let base = LossSeries::from_simulation(&sim, false);

    for &n_probs in &[1usize, 5, 20] {
        let probs: Vec<f64> = (1..=n_probs).map(|i| i as f64 * 0.01).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n_probs), &probs, |b, probs| {
            b.iter_batched(
                || base.clone(),
                |mut series| series.allocated_tvar(&base, probs, false),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_ingest_scale, bench_ingest_workers, bench_allocated_tvar);
criterion_main!(benches);
