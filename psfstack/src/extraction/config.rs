//! Configuration types for PSF extraction.
//!
//! This module defines the flat [`Config`] struct and the tagged enums used by
//! every stage of the pipeline. Parameters are grouped by comments into
//! logical sections; the struct is read-only once the pipeline starts.

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::extraction::error::ConfigError;
use crate::volume::{Resolution, VoxelSpacing};

// ============================================================================
// Enums
// ============================================================================

/// Gaussian pre-smoothing applied before thresholding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Blur {
    /// Skip smoothing; thresholding works on a copy of the raw volume.
    None,
    /// Same sigma (in voxels) on every axis.
    Isotropic(f32),
    /// Separate axial (z) and lateral (y, x) sigmas, in voxels.
    Anisotropic { axial: f32, lateral: f32 },
}

impl Default for Blur {
    fn default() -> Self {
        Blur::Isotropic(1.0)
    }
}

impl Blur {
    /// Per-axis `(z, y, x)` sigmas, or `None` when smoothing is disabled.
    pub fn sigmas(&self) -> Option<[f32; 3]> {
        match *self {
            Blur::None => None,
            Blur::Isotropic(s) => Some([s; 3]),
            Blur::Anisotropic { axial, lateral } => Some([axial, lateral, lateral]),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(sigmas) = self.sigmas() {
            for s in sigmas {
                if !(s.is_finite() && s > 0.0) {
                    return Err(ConfigError::BlurSigma(s));
                }
            }
        }
        Ok(())
    }
}

/// How the smoothed volume is split into foreground and background.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ThresholdMethod {
    /// Cut at a fraction of the global maximum.
    ///
    /// With `value_tolerance == 0` the mask is binary. With a positive
    /// tolerance the mask keeps the smoothed intensities and segmentation
    /// only joins neighbours whose values differ by less than the tolerance.
    Relative {
        relative_threshold: f32,
        value_tolerance: f32,
    },
    /// Iterative background estimation.
    ///
    /// Mean and standard deviation are recomputed over voxels below
    /// `mean + k_sigma * std` until the included voxel count changes by less
    /// than `convergence` (relative) or `max_iterations` is reached. Voxels at
    /// or above `mean + foreground_sigma * std` are foreground.
    Background {
        k_sigma: f64,
        max_iterations: usize,
        convergence: f64,
        foreground_sigma: f64,
    },
}

impl Default for ThresholdMethod {
    fn default() -> Self {
        ThresholdMethod::Relative {
            relative_threshold: 0.2,
            value_tolerance: 0.0,
        }
    }
}

impl ThresholdMethod {
    /// Iterative background estimation with the usual constants.
    pub const fn background() -> Self {
        ThresholdMethod::Background {
            k_sigma: 20.0,
            max_iterations: 10,
            convergence: 0.001,
            foreground_sigma: 1.0,
        }
    }

    /// Intensity tolerance for graded segmentation, if any.
    pub fn value_tolerance(&self) -> Option<f32> {
        match *self {
            ThresholdMethod::Relative {
                value_tolerance, ..
            } if value_tolerance > 0.0 => Some(value_tolerance),
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            ThresholdMethod::Relative {
                relative_threshold,
                value_tolerance,
            } => {
                if !(relative_threshold > 0.0 && relative_threshold <= 1.0) {
                    return Err(ConfigError::RelativeThreshold(relative_threshold));
                }
                if !(value_tolerance >= 0.0) {
                    return Err(ConfigError::ValueTolerance(value_tolerance));
                }
            }
            ThresholdMethod::Background { k_sigma, .. } => {
                if !(k_sigma > 0.0) {
                    return Err(ConfigError::BackgroundSigma(k_sigma));
                }
            }
        }
        Ok(())
    }
}

/// Voxel connectivity for connected component labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
pub enum Connectivity {
    /// Face neighbours only.
    Six,
    /// Face and edge neighbours.
    Eighteen,
    /// Face, edge and corner neighbours.
    #[default]
    TwentySix,
}

/// Expected candidate bounding-box size for the geometric filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExpectedSize {
    /// Explicit `(z, y, x)` size in voxels.
    Fixed([usize; 3]),
    /// Component-wise mean bounding-box size over all detected regions.
    #[default]
    AutoEstimate,
}

/// Which candidate filters run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
pub enum FilterMode {
    /// Bounding-box size test; the footprint derives from surviving boxes.
    #[default]
    Geometric,
    /// FWHM volume and mass-center tests; the footprint derives from the
    /// theoretical resolution.
    Statistical,
    /// Geometric test first, then the statistical tests on the geometric footprint.
    Both,
}

impl FilterMode {
    pub fn geometric(&self) -> bool {
        matches!(self, FilterMode::Geometric | FilterMode::Both)
    }

    pub fn statistical(&self) -> bool {
        matches!(self, FilterMode::Statistical | FilterMode::Both)
    }
}

// ============================================================================
// Config
// ============================================================================

/// PSF extraction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // -- Smoothing and thresholding --
    pub blur: Blur,
    pub threshold: ThresholdMethod,
    pub connectivity: Connectivity,

    // -- Candidate filtering --
    pub filter: FilterMode,
    pub expected_size: ExpectedSize,
    /// Maximum relative bounding-box deviation per axis (strict). Values of
    /// 1 or more disable the size test.
    pub size_tolerance: f32,
    /// Scale applied to the largest surviving bounding box to get the crop footprint.
    pub footprint_margin: f32,
    /// Theoretical resolution; required by the statistical filter.
    pub resolution: Option<Resolution>,
    /// Crop footprint in resolution elements when the geometric filter is off.
    pub field_size_factor: usize,
    /// Accepted FWHM volume as multiples of the theoretical target.
    pub fwhm_volume_range: (f64, f64),
    /// Maximum physical distance between a candidate's peak and its mass
    /// center. This is an absolute length and does not scale with voxel size.
    pub max_center_distance: f64,

    // -- Sub-voxel alignment --
    /// Extra samples inserted between neighbouring voxels per axis.
    pub supersampling: usize,
    /// Smoothing sigma in axial resolution elements (or voxels without resolution).
    pub smoothing_axial: f32,
    /// Smoothing sigma in lateral resolution elements (or voxels without resolution).
    pub smoothing_lateral: f32,
    /// Maximum distance, in supersampled voxels, between peak and rounded mass center.
    pub max_alignment_offset: f64,
    /// Percentile subtracted from each candidate before normalization.
    pub floor_percentile: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Smoothing and thresholding
            blur: Blur::default(),
            threshold: ThresholdMethod::default(),
            connectivity: Connectivity::default(),

            // Candidate filtering
            filter: FilterMode::default(),
            expected_size: ExpectedSize::default(),
            size_tolerance: 0.7,
            footprint_margin: 1.5,
            resolution: None,
            field_size_factor: 7,
            fwhm_volume_range: (0.5, 2.5),
            max_center_distance: 5e-7,

            // Sub-voxel alignment
            supersampling: 2,
            smoothing_axial: 3.0,
            smoothing_lateral: 3.0,
            max_alignment_offset: 6.0,
            floor_percentile: 10.0,
        }
    }
}

impl Config {
    /// Geometric pipeline for bead images: relative threshold, automatic
    /// size estimate, footprint from the surviving bounding boxes.
    pub fn beads() -> Self {
        Self::default()
    }

    /// Statistical pipeline driven by a theoretical resolution.
    ///
    /// Blurs with the lateral resolution, thresholds with the iterative
    /// background estimate and segments with face connectivity.
    pub fn with_resolution(resolution: Resolution, spacing: VoxelSpacing) -> Self {
        Self {
            blur: Blur::Isotropic((resolution.lateral / spacing.dx) as f32),
            threshold: ThresholdMethod::background(),
            connectivity: Connectivity::Six,
            filter: FilterMode::Statistical,
            resolution: Some(resolution),
            ..Self::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Smoothing and thresholding
        self.blur.validate()?;
        self.threshold.validate()?;

        // Candidate filtering
        if !(0.0..=1.0).contains(&self.size_tolerance) {
            return Err(ConfigError::SizeTolerance(self.size_tolerance));
        }
        if let ExpectedSize::Fixed(size) = self.expected_size {
            if size.contains(&0) {
                return Err(ConfigError::ExpectedSize(size));
            }
        }
        if !(self.footprint_margin >= 1.0) {
            return Err(ConfigError::FootprintMargin(self.footprint_margin));
        }
        if let Some(res) = self.resolution {
            if !res.is_valid() {
                return Err(ConfigError::Resolution {
                    axial: res.axial,
                    lateral: res.lateral,
                });
            }
        }
        if self.filter.statistical() && self.resolution.is_none() {
            return Err(ConfigError::MissingResolution);
        }
        if self.field_size_factor == 0 {
            return Err(ConfigError::FieldSizeFactor);
        }
        let (low, high) = self.fwhm_volume_range;
        if !(low >= 0.0 && low <= high) {
            return Err(ConfigError::FwhmVolumeRange(low, high));
        }
        if !(self.max_center_distance >= 0.0) {
            return Err(ConfigError::MaxCenterDistance(self.max_center_distance));
        }

        // Sub-voxel alignment
        if self.supersampling == 0 {
            return Err(ConfigError::Supersampling(self.supersampling));
        }
        if !(self.smoothing_axial >= 0.0 && self.smoothing_lateral >= 0.0) {
            return Err(ConfigError::Smoothing {
                axial: self.smoothing_axial,
                lateral: self.smoothing_lateral,
            });
        }
        if !(self.max_alignment_offset >= 0.0) {
            return Err(ConfigError::AlignmentOffset(self.max_alignment_offset));
        }
        if !(0.0..=100.0).contains(&self.floor_percentile) {
            return Err(ConfigError::FloorPercentile(self.floor_percentile));
        }
        Ok(())
    }

    /// Validate the voxel spacing of the volume this configuration runs on.
    pub fn validate_spacing(&self, spacing: VoxelSpacing) -> Result<(), ConfigError> {
        if spacing.is_valid() {
            Ok(())
        } else {
            Err(ConfigError::Spacing {
                dz: spacing.dz,
                dy: spacing.dy,
                dx: spacing.dx,
            })
        }
    }

    /// Gaussian smoothing sigmas, in supersampled voxels, used to find the
    /// soft local maximum during alignment.
    pub fn alignment_sigmas(&self, spacing: VoxelSpacing) -> [f32; 3] {
        let scale = match self.resolution {
            Some(res) => res.voxels(spacing),
            None => [1.0; 3],
        };
        [
            self.smoothing_axial * scale[0] as f32,
            self.smoothing_lateral * scale[1] as f32,
            self.smoothing_lateral * scale[2] as f32,
        ]
    }
}
