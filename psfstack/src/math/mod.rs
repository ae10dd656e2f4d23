//! Math utilities shared by the extraction stages.

pub mod bbox;
pub mod interpolation;
pub mod statistics;

pub use bbox::Aabb3;
pub use interpolation::{TrilinearInterpolator, supersample};
pub use statistics::{argmax, center_of_mass, mean_std, percentile};

/// FWHM to Gaussian sigma conversion factor: FWHM = 2√(2ln2) × σ.
pub const FWHM_TO_SIGMA: f64 = 2.354_820_045_030_949;

/// Euclidean distance between two `(z, y, x)` grid indices, in voxels.
#[inline]
pub fn index_distance(a: [usize; 3], b: [usize; 3]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&p, &q)| {
            let d = p as f64 - q as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}
