//! Benchmarks for the PSF extraction pipeline.
//!
//! Run with: cargo bench -p psfstack --features bench --bench extraction

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use psfstack::extraction::convolution::gaussian_blur_3d;
use psfstack::extraction::labeling::LabelMap;
use psfstack::extraction::threshold::threshold;
use psfstack::testing::synthetic::{add_gaussian_noise, bead_volume, grid_centers};
use psfstack::{Connectivity, PsfExtractor, ThresholdMethod, VoxelSpacing};

const PITCH: f64 = 24.0;
const MARGIN: f64 = 12.0;

fn bead_field(n: usize) -> psfstack::Volume {
    let size = (MARGIN * 2.0 + PITCH * (n - 1) as f64) as usize;
    let centers = grid_centers(n, PITCH, MARGIN);
    let volume = bead_volume(
        [size; 3],
        &centers,
        [2.0, 1.5, 1.5],
        1000.0,
        VoxelSpacing::new(0.2, 0.1, 0.1),
    );
    let spacing = volume.spacing();
    let mut data = volume.into_data();
    add_gaussian_noise(&mut data, 5.0, 42);
    psfstack::Volume::new(data, spacing)
}

fn blur_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("gaussian_blur_3d");
    for n in [2, 4] {
        let volume = bead_field(n);
        let shape = volume.shape();
        group.throughput(Throughput::Elements((shape[0] * shape[1] * shape[2]) as u64));
        group.bench_function(BenchmarkId::from_parameter(shape[0]), |b| {
            b.iter(|| black_box(gaussian_blur_3d(black_box(volume.data()), [1.0; 3])))
        });
    }
    group.finish();
}

fn labeling_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("label_map");
    for n in [2, 4] {
        let volume = bead_field(n);
        let mask = threshold(volume.data(), ThresholdMethod::default()).mask;
        let shape = volume.shape();
        group.throughput(Throughput::Elements((shape[0] * shape[1] * shape[2]) as u64));
        for connectivity in [Connectivity::Six, Connectivity::TwentySix] {
            group.bench_function(BenchmarkId::new(connectivity.to_string(), shape[0]), |b| {
                b.iter(|| black_box(LabelMap::from_mask(black_box(&mask), connectivity, None)))
            });
        }
    }
    group.finish();
}

fn pipeline_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_psf");
    group.sample_size(10);
    for n in [2, 3] {
        let volume = bead_field(n);
        let extractor = PsfExtractor::new();
        group.bench_function(BenchmarkId::new("beads", n * n * n), |b| {
            b.iter(|| black_box(extractor.extract(black_box(&volume))))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    blur_benchmarks,
    labeling_benchmarks,
    pipeline_benchmarks
);
criterion_main!(benches);
