//! Psfstack - point spread function extraction from 3D bead images.
//!
//! This library finds isolated point sources in a microscope volume, rejects
//! candidates that are clipped, merged or malformed, and averages the rest
//! into one sub-voxel aligned PSF:
//! - Separable Gaussian smoothing and relative or background thresholds
//! - 3D connected component labeling (6, 18 or 26 connectivity)
//! - Geometric and statistical candidate filters with per-candidate diagnostics
//! - Trilinear supersampling, peak alignment and parallel averaging
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use psfstack::{Config, PsfExtractor, Volume, VoxelSpacing};
//!
//! let volume = Volume::new(data, VoxelSpacing::new(0.2, 0.1, 0.1));
//! let result = PsfExtractor::from_config(Config::beads()).extract(&volume)?;
//!
//! println!("{}", result.summary);
//! ```

pub mod extraction;
pub mod math;
pub mod volume;

#[cfg(any(test, feature = "bench"))]
pub mod testing;

pub use common::Buffer3;

// ============================================================================
// Volume
// ============================================================================

pub use volume::{Resolution, Volume, VoxelSpacing};

// ============================================================================
// Extraction
// ============================================================================

pub use extraction::{
    Blur, Config, ConfigError, Connectivity, Error, ExpectedSize, ExtractionHooks, FilterMode,
    PsfExtractor, PsfResult, ThresholdMethod,
};

// ============================================================================
// Diagnostics and progress
// ============================================================================

pub use extraction::diagnostics::{
    CandidateRecord, DiagnosticsRecorder, DiagnosticsSink, IntermediateKind, JsonLinesSink,
    NullSink, RejectionReason, RejectionSummary,
};
pub use extraction::progress::{CancelToken, ExtractionProgress, ExtractionStage, ProgressCallback};
