//! Input volume, voxel spacing and optical resolution.

use std::f64::consts::PI;

use common::Buffer3;
use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Physical size of one voxel along each axis, in consistent length units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoxelSpacing {
    pub dz: f64,
    pub dy: f64,
    pub dx: f64,
}

impl VoxelSpacing {
    pub const fn new(dz: f64, dy: f64, dx: f64) -> Self {
        Self { dz, dy, dx }
    }

    pub const fn isotropic(d: f64) -> Self {
        Self::new(d, d, d)
    }

    pub fn is_valid(&self) -> bool {
        [self.dz, self.dy, self.dx]
            .iter()
            .all(|&d| d.is_finite() && d > 0.0)
    }

    /// Spacing of a grid resampled with `n` extra samples between nodes.
    pub fn supersampled(&self, n: usize) -> Self {
        let f = (n + 1) as f64;
        Self::new(self.dz / f, self.dy / f, self.dx / f)
    }

    /// Spacing as an `(x, y, z)` vector, matching [`crate::math::statistics::index_to_position`].
    #[inline]
    pub fn as_dvec3(&self) -> DVec3 {
        DVec3::new(self.dx, self.dy, self.dz)
    }

    /// Physical distance between two fractional `(x, y, z)` voxel positions.
    #[inline]
    pub fn physical_distance(&self, a: DVec3, b: DVec3) -> f64 {
        ((a - b) * self.as_dvec3()).length()
    }
}

/// A dense `(z, y, x)` intensity volume with its voxel spacing.
///
/// The pipeline only ever borrows a `Volume`; every stage that needs to modify
/// intensities works on its own copy.
#[derive(Debug, Clone)]
pub struct Volume {
    data: Buffer3<f32>,
    spacing: VoxelSpacing,
}

impl Volume {
    pub fn new(data: Buffer3<f32>, spacing: VoxelSpacing) -> Self {
        Self { data, spacing }
    }

    #[inline]
    pub fn data(&self) -> &Buffer3<f32> {
        &self.data
    }

    #[inline]
    pub fn spacing(&self) -> VoxelSpacing {
        self.spacing
    }

    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        self.data.shape()
    }

    pub fn into_data(self) -> Buffer3<f32> {
        self.data
    }
}

/// Theoretical axial and lateral resolution, in the same units as [`VoxelSpacing`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub axial: f64,
    pub lateral: f64,
}

impl Resolution {
    pub const fn new(axial: f64, lateral: f64) -> Self {
        Self { axial, lateral }
    }

    /// Confocal resolution without pinhole reduction.
    ///
    /// Lateral `0.51 λ / NA`, axial `0.88 λ / (n - sqrt(n² - NA²))`, where `λ`
    /// is the excitation wavelength and `n` the immersion refractive index.
    pub fn confocal(wavelength: f64, numerical_aperture: f64, refractive_index: f64) -> Self {
        let na = numerical_aperture;
        let n = refractive_index;
        Self {
            lateral: 0.51 * wavelength / na,
            axial: 0.88 * wavelength / (n - (n * n - na * na).sqrt()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.axial.is_finite() && self.axial > 0.0 && self.lateral.is_finite() && self.lateral > 0.0
    }

    /// Axial resolution in voxels, rounded up.
    pub fn axial_voxels(&self, spacing: VoxelSpacing) -> usize {
        (self.axial / spacing.dz).ceil() as usize
    }

    /// Lateral resolution in voxels, rounded up.
    pub fn lateral_voxels(&self, spacing: VoxelSpacing) -> usize {
        (self.lateral / spacing.dx).ceil() as usize
    }

    /// Resolution in fractional voxels per axis, `(z, y, x)`.
    pub fn voxels(&self, spacing: VoxelSpacing) -> [f64; 3] {
        [
            self.axial / spacing.dz,
            self.lateral / spacing.dy,
            self.lateral / spacing.dx,
        ]
    }

    /// Crop footprint of `factor` resolution elements per axis, made odd.
    pub fn field_size(&self, spacing: VoxelSpacing, factor: usize) -> [usize; 3] {
        let axial = make_odd(factor * self.axial_voxels(spacing));
        let lateral = make_odd(factor * self.lateral_voxels(spacing));
        [axial, lateral, lateral]
    }

    /// Expected number of voxels above half maximum: the ellipsoid with
    /// half-resolution semi-axes, rounded up.
    pub fn fwhm_volume(&self, spacing: VoxelSpacing) -> usize {
        let semi_axial = 0.5 * self.axial / spacing.dz;
        let semi_lateral = 0.5 * self.lateral / spacing.dx;
        (4.0 / 3.0 * PI * semi_axial * semi_lateral * semi_lateral).ceil() as usize
    }
}

/// Bumps even sizes to the next odd value so the crop has a center voxel.
#[inline]
pub fn make_odd(size: usize) -> usize {
    if size % 2 == 0 { size + 1 } else { size }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPACING: VoxelSpacing = VoxelSpacing::new(1e-7, 1e-7, 1e-7);

    #[test]
    fn test_supersampled_spacing() {
        let s = VoxelSpacing::new(3.0, 0.6, 0.3).supersampled(2);
        assert!((s.dz - 1.0).abs() < 1e-12);
        assert!((s.dy - 0.2).abs() < 1e-12);
        assert!((s.dx - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_spacing_validity() {
        assert!(SPACING.is_valid());
        assert!(!VoxelSpacing::new(0.0, 1.0, 1.0).is_valid());
        assert!(!VoxelSpacing::new(1.0, f64::NAN, 1.0).is_valid());
    }

    #[test]
    fn test_physical_distance_scales_per_axis() {
        let spacing = VoxelSpacing::new(2.0, 1.0, 0.5);
        let d = spacing.physical_distance(DVec3::new(2.0, 0.0, 1.0), DVec3::ZERO);
        // x: 2 * 0.5, z: 1 * 2
        assert!((d - 5.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_field_size_is_odd() {
        let res = Resolution::new(4e-7, 2e-7);
        assert_eq!(res.axial_voxels(SPACING), 4);
        assert_eq!(res.lateral_voxels(SPACING), 2);
        assert_eq!(res.field_size(SPACING, 7), [29, 15, 15]);
    }

    #[test]
    fn test_fwhm_volume() {
        // 4/3 * pi * 2 * 1 * 1 = 8.38 -> 9
        let res = Resolution::new(4e-7, 2e-7);
        assert_eq!(res.fwhm_volume(SPACING), 9);
    }

    #[test]
    fn test_confocal_resolution() {
        let res = Resolution::confocal(488e-9, 1.4, 1.518);
        assert!((res.lateral - 0.51 * 488e-9 / 1.4).abs() < 1e-15);
        assert!(res.axial > res.lateral);
    }

    #[test]
    fn test_make_odd() {
        assert_eq!(make_odd(14), 15);
        assert_eq!(make_odd(15), 15);
        assert_eq!(make_odd(0), 1);
    }
}
