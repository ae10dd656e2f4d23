//! Separable 3D Gaussian convolution.
//!
//! A 3D Gaussian factors into three 1D passes (x, then y, then z), which is
//! O(n×k) per voxel instead of O(n×k³). Boundaries are mirrored without
//! repeating the edge voxel (`d c b | a b c d`).


use common::Buffer3;
use rayon::prelude::*;

/// Rows processed per parallel task in the x pass.
const ROWS_PER_CHUNK: usize = 8;

/// Compute 1D Gaussian kernel.
///
/// The kernel is normalized so that it sums to 1.0. Its radius is
/// `ceil(3 * sigma)`, so its length is `2 * radius + 1`.
pub fn gaussian_kernel_1d(sigma: f32) -> Vec<f32> {
    assert!(sigma > 0.0, "Sigma must be positive");

    let radius = (3.0 * sigma).ceil() as usize;
    let two_sigma_sq = 2.0 * sigma as f64 * sigma as f64;

    let weights: Vec<f64> = (0..2 * radius + 1)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();

    weights.iter().map(|&w| (w / sum) as f32).collect()
}

/// Blur `input` with a Gaussian of per-axis `(z, y, x)` sigmas in voxels.
///
/// An axis with sigma 0 is left untouched.
pub fn gaussian_blur_3d(input: &Buffer3<f32>, sigma: [f32; 3]) -> Buffer3<f32> {
    for s in sigma {
        assert!(s >= 0.0, "Sigma must be non-negative");
    }

    let mut current = input.clone();
    if sigma[2] > 0.0 {
        current = convolve_x(&current, &gaussian_kernel_1d(sigma[2]));
    }
    if sigma[1] > 0.0 {
        current = convolve_y(&current, &gaussian_kernel_1d(sigma[1]));
    }
    if sigma[0] > 0.0 {
        current = convolve_z(&current, &gaussian_kernel_1d(sigma[0]));
    }
    current
}

/// Reflects an out-of-range index back into `0..n` (edge not repeated).
#[inline]
pub(crate) fn mirror_index(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let m = i.rem_euclid(period);
    if m >= n as isize {
        (period - m) as usize
    } else {
        m as usize
    }
}

/// Convolve along x: every row is independent.
fn convolve_x(input: &Buffer3<f32>, kernel: &[f32]) -> Buffer3<f32> {
    let width = input.width();
    let radius = kernel.len() / 2;
    let mut output = Buffer3::new_default(input.shape());

    output
        .par_chunks_mut(width * ROWS_PER_CHUNK)
        .enumerate()
        .for_each(|(chunk_idx, out_chunk)| {
            let row_start = chunk_idx * ROWS_PER_CHUNK;
            for (local, out_row) in out_chunk.chunks_mut(width).enumerate() {
                let offset = (row_start + local) * width;
                let in_row = &input[offset..offset + width];
                for (x, out) in out_row.iter_mut().enumerate() {
                    let mut sum = 0.0f32;
                    for (k, &kval) in kernel.iter().enumerate() {
                        let sx = mirror_index(x as isize + k as isize - radius as isize, width);
                        sum += in_row[sx] * kval;
                    }
                    *out = sum;
                }
            }
        });
    output
}

/// Convolve along y: planes are independent, rows are accumulated whole.
fn convolve_y(input: &Buffer3<f32>, kernel: &[f32]) -> Buffer3<f32> {
    let (height, width) = (input.height(), input.width());
    let radius = kernel.len() / 2;
    let mut output = Buffer3::new_default(input.shape());

    output
        .par_chunks_mut(input.plane_len())
        .enumerate()
        .for_each(|(z, out_plane)| {
            let in_plane = input.plane(z);
            for (y, out_row) in out_plane.chunks_mut(width).enumerate() {
                for (k, &kval) in kernel.iter().enumerate() {
                    let sy = mirror_index(y as isize + k as isize - radius as isize, height);
                    let in_row = &in_plane[sy * width..(sy + 1) * width];
                    for (out, &v) in out_row.iter_mut().zip(in_row) {
                        *out += v * kval;
                    }
                }
            }
        });
    output
}

/// Convolve along z: each output plane is a weighted sum of input planes.
fn convolve_z(input: &Buffer3<f32>, kernel: &[f32]) -> Buffer3<f32> {
    let depth = input.depth();
    let radius = kernel.len() / 2;
    let mut output = Buffer3::new_default(input.shape());

    output
        .par_chunks_mut(input.plane_len())
        .enumerate()
        .for_each(|(z, out_plane)| {
            for (k, &kval) in kernel.iter().enumerate() {
                let sz = mirror_index(z as isize + k as isize - radius as isize, depth);
                for (out, &v) in out_plane.iter_mut().zip(input.plane(sz)) {
                    *out += v * kval;
                }
            }
        });
    output
}
