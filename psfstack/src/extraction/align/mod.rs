//! Sub-voxel alignment of candidate crops.
//!
//! Each crop is resampled onto a finer grid by trilinear interpolation,
//! checked for a compact peak and circularly shifted so that its rounded
//! mass center lands on the reference index shared by every candidate. Crops
//! are centered on their raw maximum, so the shift carries the sub-voxel
//! position of the source. The aligned result is floor-subtracted and
//! normalized to a unit peak.


use common::Buffer3;
use thiserror::Error;

use crate::extraction::config::Config;
use crate::extraction::convolution::gaussian_blur_3d;
use crate::math::index_distance;
use crate::math::interpolation::{supersample, supersampled_len};
use crate::math::statistics::{argmax, center_of_mass, nearest_index, percentile};
use crate::volume::VoxelSpacing;

/// Why a candidate could not be aligned.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum Misalignment {
    #[error("peak is {offset:.2} supersampled voxels from the mass center (max {max})")]
    Offset { offset: f64, max: f64 },

    #[error("candidate has no intensity above its floor")]
    Flat,
}

/// A candidate resampled and shifted onto the shared reference.
#[derive(Debug, Clone)]
pub struct Aligned {
    /// Supersampled, rolled, floor-subtracted data with a unit peak.
    ///
    /// Its mass center is within half a supersampled voxel of the reference.
    pub data: Buffer3<f32>,
    /// Raw maximum before the shift, in supersampled indices.
    pub raw_max: [usize; 3],
    /// Maximum of the smoothed resample. Reported only; the shift and the
    /// offset gate do not use it.
    pub smoothed_max: [usize; 3],
    /// Mass center rounded to the nearest supersampled index, before the shift.
    pub mass_center: [usize; 3],
    /// Distance between `raw_max` and `mass_center`, in supersampled voxels.
    pub offset: f64,
}

/// Aligns crops of one common footprint.
#[derive(Debug, Clone)]
pub struct Aligner {
    footprint: [usize; 3],
    supersampling: usize,
    sigmas: [f32; 3],
    max_offset: f64,
    floor_percentile: f32,
}

impl Aligner {
    pub fn new(
        footprint: [usize; 3],
        supersampling: usize,
        sigmas: [f32; 3],
        max_offset: f64,
        floor_percentile: f32,
    ) -> Self {
        Self {
            footprint,
            supersampling,
            sigmas,
            max_offset,
            floor_percentile,
        }
    }

    pub fn from_config(config: &Config, spacing: VoxelSpacing, footprint: [usize; 3]) -> Self {
        Self::new(
            footprint,
            config.supersampling,
            config.alignment_sigmas(spacing),
            config.max_alignment_offset,
            config.floor_percentile,
        )
    }

    /// Shape of every aligned candidate.
    pub fn shape(&self) -> [usize; 3] {
        self.footprint
            .map(|p| supersampled_len(p, self.supersampling))
    }

    /// Center of the supersampled footprint; every aligned mass center lands here.
    pub fn reference_index(&self) -> [usize; 3] {
        self.shape().map(|s| s / 2)
    }

    /// Aligns one crop of the common footprint.
    ///
    /// # Panics
    /// If `crop` does not have the footprint shape.
    pub fn align(&self, crop: &Buffer3<f32>) -> Result<Aligned, Misalignment> {
        assert_eq!(crop.shape(), self.footprint, "crop must match the footprint");

        let floor = percentile(&mut crop.to_vec(), self.floor_percentile);

        let fine = supersample(crop, self.supersampling);
        let shape = fine.shape();
        let smoothed = gaussian_blur_3d(&fine, self.sigmas);

        let raw_max = argmax(&fine);
        let smoothed_max = argmax(&smoothed);
        let mass_center = center_of_mass(&fine)
            .map(|com| nearest_index(com, shape))
            .ok_or(Misalignment::Flat)?;

        let offset = index_distance(raw_max, mass_center);
        if offset > self.max_offset {
            return Err(Misalignment::Offset {
                offset,
                max: self.max_offset,
            });
        }

        // Trilinear samples never exceed the largest node, so the peak survives the shift.
        let peak = fine[raw_max] - floor;
        if !(peak > 0.0) {
            return Err(Misalignment::Flat);
        }

        let reference = self.reference_index();
        let shift = [0, 1, 2].map(|a| reference[a] as isize - mass_center[a] as isize);
        let data = fine.roll(shift).map(|&v| (v - floor) / peak);

        tracing::trace!(
            "Aligned: raw max {:?}, smoothed max {:?}, mass center {:?}, shift {:?}",
            raw_max,
            smoothed_max,
            mass_center,
            shift
        );

        Ok(Aligned {
            data,
            raw_max,
            smoothed_max,
            mass_center,
            offset,
        })
    }
}
