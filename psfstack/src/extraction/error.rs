//! Error types for PSF extraction.

use thiserror::Error;

use crate::extraction::diagnostics::RejectionSummary;

/// Fatal errors of the extraction pipeline.
///
/// Individual candidate rejections are not errors; they are recorded in the
/// [`RejectionSummary`] and the diagnostics records.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    #[error("No candidates found: segmentation produced zero labeled regions")]
    NoCandidatesFound,

    #[error("No candidates survived filtering: {summary}")]
    NoCandidatesSurvivedFilter { summary: RejectionSummary },

    #[error(
        "Empty average: {survived} candidates survived filtering but none passed sub-voxel alignment"
    )]
    EmptyAverage { survived: usize },
}

/// Reasons a [`crate::Config`] is rejected before the pipeline starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("size_tolerance must be in [0, 1], got {0}")]
    SizeTolerance(f32),

    #[error("expected size must be positive on every axis, got {0:?}")]
    ExpectedSize([usize; 3]),

    #[error("statistical filtering requires a theoretical resolution")]
    MissingResolution,

    #[error("resolution must be positive and finite, got axial {axial}, lateral {lateral}")]
    Resolution { axial: f64, lateral: f64 },

    #[error("voxel spacing must be positive and finite, got ({dz}, {dy}, {dx})")]
    Spacing { dz: f64, dy: f64, dx: f64 },

    #[error("blur sigma must be positive and finite, got {0}")]
    BlurSigma(f32),

    #[error("relative_threshold must be in (0, 1], got {0}")]
    RelativeThreshold(f32),

    #[error("value_tolerance must be non-negative, got {0}")]
    ValueTolerance(f32),

    #[error("background k_sigma must be positive, got {0}")]
    BackgroundSigma(f64),

    #[error("footprint_margin must be >= 1, got {0}")]
    FootprintMargin(f32),

    #[error("field_size_factor must be at least 1")]
    FieldSizeFactor,

    #[error("fwhm_volume_range must satisfy 0 <= low <= high, got ({0}, {1})")]
    FwhmVolumeRange(f64, f64),

    #[error("max_center_distance must be non-negative, got {0}")]
    MaxCenterDistance(f64),

    #[error("supersampling must be at least 1, got {0}")]
    Supersampling(usize),

    #[error("smoothing factors must be non-negative, got axial {axial}, lateral {lateral}")]
    Smoothing { axial: f32, lateral: f32 },

    #[error("max_alignment_offset must be non-negative, got {0}")]
    AlignmentOffset(f64),

    #[error("floor_percentile must be in [0, 100], got {0}")]
    FloorPercentile(f32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_candidates_found_message() {
        let err = Error::NoCandidatesFound;
        assert_eq!(
            err.to_string(),
            "No candidates found: segmentation produced zero labeled regions"
        );
    }

    #[test]
    fn test_configuration_error_wraps_source() {
        let err: Error = ConfigError::SizeTolerance(1.5).into();
        let msg = err.to_string();
        assert!(msg.starts_with("Invalid configuration"));
        assert!(msg.contains("1.5"));
    }

    #[test]
    fn test_empty_average_reports_survivors() {
        let err = Error::EmptyAverage { survived: 3 };
        assert!(err.to_string().contains("3 candidates survived filtering"));
    }

    #[test]
    fn test_no_survivors_includes_summary() {
        let summary = RejectionSummary {
            found: 4,
            size: 3,
            boundary: 1,
            ..Default::default()
        };
        let msg = Error::NoCandidatesSurvivedFilter { summary }.to_string();
        assert!(msg.contains("4 candidates found, 4 rejected"), "{msg}");
        assert!(msg.contains("size 3"));
        assert!(msg.contains("boundary 1"));
    }
}
