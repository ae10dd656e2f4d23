//! Smoothing and foreground masks.
//!
//! The mask is a `Buffer3<f32>`: zero is background. Binary masks hold 1.0 for
//! foreground; graded masks keep the smoothed intensity so segmentation can
//! compare neighbouring values.

#[cfg(test)]
mod tests;

use common::Buffer3;
use rayon::prelude::*;

use crate::extraction::config::{Blur, ThresholdMethod};
use crate::extraction::convolution::gaussian_blur_3d;
use crate::math::statistics::{MeanStd, mean_std, mean_std_below};

const CHUNK_SIZE: usize = 16_384;

/// Result of the iterative background estimation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundEstimate {
    pub mean: f64,
    pub std: f64,
    /// Refinement passes actually run.
    pub iterations: usize,
    /// Voxels in the final inclusion set.
    pub included: usize,
}

/// Foreground mask plus the cut that produced it.
#[derive(Debug, Clone)]
pub struct ThresholdResult {
    pub mask: Buffer3<f32>,
    pub cut: f64,
    pub background: Option<BackgroundEstimate>,
}

/// Returns a smoothed copy of `volume`; [`Blur::None`] returns a plain copy.
pub fn smooth(volume: &Buffer3<f32>, blur: Blur) -> Buffer3<f32> {
    match blur.sigmas() {
        Some(sigmas) => gaussian_blur_3d(volume, sigmas),
        None => volume.clone(),
    }
}

/// Applies `method` to a smoothed volume.
pub fn threshold(smoothed: &Buffer3<f32>, method: ThresholdMethod) -> ThresholdResult {
    match method {
        ThresholdMethod::Relative {
            relative_threshold,
            value_tolerance,
        } => {
            let max = smoothed
                .par_chunks(CHUNK_SIZE)
                .map(|c| c.iter().copied().fold(f32::NEG_INFINITY, f32::max))
                .reduce(|| f32::NEG_INFINITY, f32::max);
            let cut = max * relative_threshold;
            ThresholdResult {
                mask: relative_mask(smoothed, cut, value_tolerance > 0.0),
                cut: cut as f64,
                background: None,
            }
        }
        ThresholdMethod::Background {
            k_sigma,
            max_iterations,
            convergence,
            foreground_sigma,
        } => {
            let estimate = estimate_background(smoothed, k_sigma, max_iterations, convergence);
            let cut = estimate.mean + foreground_sigma * estimate.std;
            let mask = smoothed.map(|&v| if v as f64 >= cut { 1.0 } else { 0.0 });
            ThresholdResult {
                mask,
                cut,
                background: Some(estimate),
            }
        }
    }
}

/// Zeroes voxels below `cut`.
///
/// Non-zero survivors become 1.0 unless `graded`, in which case they keep
/// their value.
pub fn relative_mask(smoothed: &Buffer3<f32>, cut: f32, graded: bool) -> Buffer3<f32> {
    let mut mask = smoothed.clone();
    mask.par_chunks_mut(CHUNK_SIZE).for_each(|chunk| {
        for v in chunk.iter_mut() {
            if *v < cut {
                *v = 0.0;
            } else if !graded && *v != 0.0 {
                *v = 1.0;
            }
        }
    });
    mask
}

/// Iteratively estimates background mean and standard deviation.
///
/// Starts from the statistics of every voxel, then repeatedly restricts them
/// to voxels below `mean + k_sigma * std`. Stops once the inclusion count
/// changes by less than `convergence` relative to the previous pass, or after
/// `max_iterations` passes.
pub fn estimate_background(
    values: &[f32],
    k_sigma: f64,
    max_iterations: usize,
    convergence: f64,
) -> BackgroundEstimate {
    let mut stats = mean_std(values);
    let mut included = stats.count;
    let mut iterations = 0;

    while iterations < max_iterations {
        let next: MeanStd = mean_std_below(values, stats.mean + k_sigma * stats.std);
        iterations += 1;
        if next.count == 0 {
            break;
        }
        stats = next;

        let change = (included as f64 - next.count as f64).abs() / included.max(1) as f64;
        included = next.count;
        if change < convergence {
            break;
        }
    }

    tracing::debug!(
        "Background estimate: mean={:.4}, std={:.4}, iterations={}, included={}",
        stats.mean,
        stats.std,
        iterations,
        included
    );

    BackgroundEstimate {
        mean: stats.mean,
        std: stats.std,
        iterations,
        included,
    }
}
