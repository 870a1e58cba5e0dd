use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use saxs_runtime::data::{diff, find_peaks, find_peaks_batch};

/// Synthetic scattering curve: decaying background with a few Gaussian peaks.
fn synthetic_curve(len: usize, seed: usize) -> Vec<f64> {
    let centers = [0.2, 0.45, 0.7];
    (0..len)
        .map(|i| {
            let x = i as f64 / len as f64;
            let background = 2.0 * (-3.0 * x).exp();
            let peaks: f64 = centers
                .iter()
                .enumerate()
                .map(|(k, c)| {
                    let amp = 1.0 + ((seed + k) % 4) as f64;
                    amp * (-(x - c).powi(2) / 2e-4).exp()
                })
                .sum();
            background + peaks
        })
        .collect()
}

/// Benchmark single-curve peak detection
fn bench_find_peaks(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_peaks");

    for len in [1_000, 10_000, 100_000] {
        let curve = synthetic_curve(len, 0);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &curve, |b, curve| {
            b.iter(|| find_peaks(black_box(curve), 0.5, 0.3).unwrap());
        });
    }

    group.finish();
}

/// Benchmark parallel detection over many curves
fn bench_find_peaks_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_peaks_batch");

    for rows in [16, 128, 1024] {
        let curves: Vec<Vec<f64>> = (0..rows).map(|seed| synthetic_curve(2_000, seed)).collect();
        group.throughput(Throughput::Elements((rows * 2_000) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}rows", rows)),
            &curves,
            |b, curves| {
                b.iter(|| find_peaks_batch(black_box(curves), 0.5, 0.3).unwrap());
            },
        );
    }

    group.finish();
}

fn bench_diff(c: &mut Criterion) {
    let curve = synthetic_curve(100_000, 1);
    c.bench_function("diff_100k", |b| b.iter(|| diff(black_box(&curve))));
}

criterion_group!(benches, bench_find_peaks, bench_find_peaks_batch, bench_diff);
criterion_main!(benches);
