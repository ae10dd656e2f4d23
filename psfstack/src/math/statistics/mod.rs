//! Statistical functions over voxel data: mean/std, percentiles, peak and mass center.

#[cfg(test)]
mod tests;

use common::Buffer3;
use glam::DVec3;
use rayon::prelude::*;

/// Chunk size for parallel reductions over whole volumes.
const CHUNK_SIZE: usize = 16_384;

/// Mean and population standard deviation of a set of samples.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeanStd {
    pub mean: f64,
    pub std: f64,
    /// Number of samples that contributed.
    pub count: usize,
}

/// Mean and standard deviation of all values (ddof = 0).
pub fn mean_std(values: &[f32]) -> MeanStd {
    mean_std_filtered(values, |_| true)
}

/// Mean and standard deviation of the values strictly below `cut`.
pub fn mean_std_below(values: &[f32], cut: f64) -> MeanStd {
    mean_std_filtered(values, |v| (v as f64) < cut)
}

/// Two-pass mean/std restricted to values accepted by `keep`.
///
/// Returns zeros when no value is accepted.
fn mean_std_filtered(values: &[f32], keep: impl Fn(f32) -> bool + Sync) -> MeanStd {
    let (sum, count) = values
        .par_chunks(CHUNK_SIZE)
        .map(|chunk| {
            chunk
                .iter()
                .filter(|&&v| keep(v))
                .fold((0.0f64, 0usize), |(s, n), &v| (s + v as f64, n + 1))
        })
        .reduce(|| (0.0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

    if count == 0 {
        return MeanStd::default();
    }
    let mean = sum / count as f64;

    let squares: f64 = values
        .par_chunks(CHUNK_SIZE)
        .map(|chunk| {
            chunk
                .iter()
                .filter(|&&v| keep(v))
                .map(|&v| {
                    let d = v as f64 - mean;
                    d * d
                })
                .sum::<f64>()
        })
        .sum();

    MeanStd {
        mean,
        std: (squares / count as f64).sqrt(),
        count,
    }
}

/// Percentile `q` in `[0, 100]` with linear interpolation between ranks.
///
/// Mutates the input buffer (partial sort via quickselect).
pub fn percentile(data: &mut [f32], q: f32) -> f32 {
    assert!(!data.is_empty(), "percentile of empty data");
    debug_assert!((0.0..=100.0).contains(&q));

    let rank = q as f64 / 100.0 * (data.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let frac = rank - lo as f64;

    let (_, lower, upper) = data.select_nth_unstable_by(lo, f32::total_cmp);
    let lower = *lower;
    if frac == 0.0 || upper.is_empty() {
        return lower;
    }
    let upper = upper.iter().copied().fold(f32::INFINITY, f32::min);
    (lower as f64 + frac * (upper as f64 - lower as f64)) as f32
}

/// Position of the first maximum in raster order.
///
/// NaN voxels are never selected unless every voxel is NaN.
pub fn argmax(buffer: &Buffer3<f32>) -> [usize; 3] {
    let mut best = 0;
    let mut best_value = f32::NEG_INFINITY;
    for (idx, &v) in buffer.iter().enumerate() {
        if v > best_value {
            best_value = v;
            best = idx;
        }
    }
    buffer.coords(best)
}

/// Intensity-weighted mass center as fractional `(x, y, z)` voxel coordinates.
///
/// Returns `None` when the total weight is zero or not finite.
pub fn center_of_mass(buffer: &Buffer3<f32>) -> Option<DVec3> {
    let mut total = 0.0f64;
    let mut moment = DVec3::ZERO;
    for (idx, &v) in buffer.iter().enumerate() {
        let [z, y, x] = buffer.coords(idx);
        let w = v as f64;
        total += w;
        moment += w * DVec3::new(x as f64, y as f64, z as f64);
    }
    if total == 0.0 || !total.is_finite() {
        return None;
    }
    Some(moment / total)
}

/// Nearest grid index to a fractional `(x, y, z)` position, clamped to `shape`.
pub fn nearest_index(position: DVec3, shape: [usize; 3]) -> [usize; 3] {
    let clamp = |v: f64, n: usize| (v.round().max(0.0) as usize).min(n.saturating_sub(1));
    [
        clamp(position.z, shape[0]),
        clamp(position.y, shape[1]),
        clamp(position.x, shape[2]),
    ]
}

/// Converts a `(z, y, x)` grid index to an `(x, y, z)` position.
#[inline]
pub fn index_to_position(index: [usize; 3]) -> DVec3 {
    DVec3::new(index[2] as f64, index[1] as f64, index[0] as f64)
}
