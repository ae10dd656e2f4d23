//! Synthetic bead volumes for tests and benchmarks.

use common::Buffer3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::volume::{Volume, VoxelSpacing};

/// Volume with Gaussian point sources on a constant background.
///
/// # Arguments
/// * `shape` - `(z, y, x)` shape
/// * `centers` - Source centers as fractional `(z, y, x)` indices
/// * `sigma` - Per-axis `(z, y, x)` Gaussian sigma in voxels
/// * `amplitude` - Peak amplitude above background
/// * `background` - Background level
pub fn gaussian_volume(
    shape: [usize; 3],
    centers: &[[f64; 3]],
    sigma: [f64; 3],
    amplitude: f64,
    background: f64,
) -> Buffer3<f32> {
    Buffer3::from_fn(shape, |z, y, x| {
        let p = [z as f64, y as f64, x as f64];
        let sum: f64 = centers
            .iter()
            .map(|c| {
                let q: f64 = (0..3)
                    .map(|a| {
                        let d = (p[a] - c[a]) / sigma[a];
                        d * d
                    })
                    .sum();
                (-0.5 * q).exp()
            })
            .sum();
        (background + amplitude * sum) as f32
    })
}

/// Same as [`gaussian_volume`], wrapped with an isotropic spacing.
pub fn bead_volume(
    shape: [usize; 3],
    centers: &[[f64; 3]],
    sigma: [f64; 3],
    amplitude: f64,
    spacing: VoxelSpacing,
) -> Volume {
    Volume::new(gaussian_volume(shape, centers, sigma, amplitude, 0.0), spacing)
}

/// Centers of a regular `n × n × n` grid of sources, `pitch` voxels apart,
/// starting at `margin`.
pub fn grid_centers(n: usize, pitch: f64, margin: f64) -> Vec<[f64; 3]> {
    let mut centers = Vec::with_capacity(n * n * n);
    for iz in 0..n {
        for iy in 0..n {
            for ix in 0..n {
                centers.push([
                    margin + iz as f64 * pitch,
                    margin + iy as f64 * pitch,
                    margin + ix as f64 * pitch,
                ]);
            }
        }
    }
    centers
}

/// Adds zero-mean Gaussian noise (Box-Muller) with a fixed seed.
pub fn add_gaussian_noise(voxels: &mut [f32], sigma: f32, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for v in voxels.iter_mut() {
        let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
        let u2: f64 = rng.random();
        let g = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
        *v += (g * sigma as f64) as f32;
    }
}
