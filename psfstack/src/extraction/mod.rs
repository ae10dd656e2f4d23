//! PSF extraction from bead volumes.
//!
//! Finds isolated point sources in a 3D volume, rejects the ones that do not
//! look like a clean instrument response and averages the rest into a single
//! sub-voxel aligned PSF.
//!
//! # Algorithm Overview
//!
//! 1. **Smoothing**: Separable Gaussian blur of a copy of the volume.
//!
//! 2. **Thresholding**: Relative cut at a fraction of the maximum, or an
//!    iterative background estimate. Binary or graded foreground mask.
//!
//! 3. **Segmentation**: Connected component labeling of the mask, with one
//!    bounding box per region.
//!
//! 4. **Filtering**: Geometric size test and/or statistical shape tests
//!    (FWHM volume, peak-to-mass-center distance). Survivors are cropped
//!    from the raw volume with a common odd footprint centered on their peak.
//!
//! 5. **Alignment**: Trilinear supersampling, compactness check and circular
//!    shift of every candidate's rounded mass center onto a shared reference index.
//!
//! 6. **Averaging**: Floor-subtracted, unit-peak candidates are summed in a
//!    parallel fold/reduce and divided by the accepted count.

pub mod align;
pub mod average;
pub mod config;
pub mod convolution;
pub mod diagnostics;
pub mod error;
pub mod filter;
pub mod labeling;
pub mod progress;
pub mod threshold;


use std::sync::atomic::{AtomicUsize, Ordering};

use common::Buffer3;
use rayon::prelude::*;

use crate::volume::{Volume, VoxelSpacing};

use align::Aligner;
use average::PsfAccumulator;
use diagnostics::{
    CandidateRecord, DiagnosticsSink, IntermediateKind, NullSink, RejectionReason,
    RejectionSummary,
};
use filter::filter_candidates;
use labeling::LabelMap;
use progress::{CancelToken, ExtractionStage, ProgressCallback, report_progress};
use threshold::{smooth, threshold};

pub use config::{Blur, Config, Connectivity, ExpectedSize, FilterMode, ThresholdMethod};
pub use error::{ConfigError, Error};

/// Averaged PSF with its geometry and the per-candidate outcome.
#[derive(Debug, Clone)]
pub struct PsfResult {
    /// Mean of the aligned candidates, non-negative, on the supersampled grid.
    pub psf: Buffer3<f32>,
    /// Voxel spacing of `psf`.
    pub spacing: VoxelSpacing,
    /// Index every candidate maximum was shifted to.
    pub reference_index: [usize; 3],
    /// Crop footprint on the original grid.
    pub footprint: [usize; 3],
    pub summary: RejectionSummary,
    /// One record per labeled region, in label order.
    pub records: Vec<CandidateRecord>,
    /// `true` when the run was cancelled and the average covers only part of the survivors.
    pub partial: bool,
}

impl PsfResult {
    /// Physical full width at half maximum along z, y and x.
    ///
    /// Measured on line profiles through the reference index; half-maximum
    /// crossings are located by linear interpolation between samples.
    pub fn fwhm(&self) -> [f64; 3] {
        let reference = self.reference_index;
        let shape = self.psf.shape();
        let step = [self.spacing.dz, self.spacing.dy, self.spacing.dx];
        [0, 1, 2].map(|axis| {
            let profile: Vec<f32> = (0..shape[axis])
                .map(|i| {
                    let mut idx = reference;
                    idx[axis] = i;
                    self.psf[idx]
                })
                .collect();
            profile_fwhm(&profile, reference[axis]) * step[axis]
        })
    }
}

/// Width in samples of the half-maximum plateau around `center`.
///
/// A side that never drops below half maximum extends to the profile edge.
pub(crate) fn profile_fwhm(profile: &[f32], center: usize) -> f64 {
    let half = 0.5 * profile[center] as f64;
    let value = |i: usize| profile[i] as f64;

    let mut lo = center;
    while lo > 0 && value(lo - 1) >= half {
        lo -= 1;
    }
    let left = if lo == 0 {
        0.0
    } else {
        let (a, b) = (value(lo - 1), value(lo));
        (lo - 1) as f64 + (half - a) / (b - a)
    };

    let mut hi = center;
    while hi + 1 < profile.len() && value(hi + 1) >= half {
        hi += 1;
    }
    let right = if hi + 1 == profile.len() {
        hi as f64
    } else {
        let (a, b) = (value(hi), value(hi + 1));
        hi as f64 + (a - half) / (a - b)
    };

    right - left
}

/// Optional observers of one extraction run.
#[derive(Default)]
pub struct ExtractionHooks<'a> {
    pub sink: Option<&'a mut dyn DiagnosticsSink>,
    pub progress: ProgressCallback,
    pub cancel: Option<CancelToken>,
}

/// PSF extractor.
///
/// Wraps a [`Config`] and runs the full pipeline on borrowed volumes.
///
/// # Example
///
/// ```rust,ignore
/// use psfstack::{PsfExtractor, Config, Volume, VoxelSpacing};
///
/// let volume = Volume::new(data, VoxelSpacing::new(0.2, 0.1, 0.1));
/// let result = PsfExtractor::from_config(Config::beads()).extract(&volume)?;
/// println!("{}", result.summary);
/// ```
#[derive(Debug, Default)]
pub struct PsfExtractor {
    config: Config,
}

impl PsfExtractor {
    /// Create a new extractor with default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Create an extractor from an existing configuration.
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Get reference to the underlying configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Extract the averaged PSF from `volume`.
    pub fn extract(&self, volume: &Volume) -> Result<PsfResult, Error> {
        self.extract_with(volume, ExtractionHooks::default())
    }

    /// Extract with a diagnostics sink, progress callback and cancellation.
    pub fn extract_with(&self, volume: &Volume, hooks: ExtractionHooks<'_>) -> Result<PsfResult, Error> {
        let config = &self.config;
        config.validate()?;
        config.validate_spacing(volume.spacing())?;

        let ExtractionHooks {
            sink,
            progress,
            cancel,
        } = hooks;
        let mut null_sink = NullSink;
        let sink: &mut dyn DiagnosticsSink = match sink {
            Some(sink) => sink,
            None => &mut null_sink,
        };

        // Step 1: Smooth a copy of the volume
        let smoothed = smooth(volume.data(), config.blur);
        sink.intermediate(IntermediateKind::Blurred, &smoothed);

        // Step 2: Foreground mask
        let thresholded = threshold(&smoothed, config.threshold);
        drop(smoothed);
        sink.intermediate(IntermediateKind::Mask, &thresholded.mask);
        tracing::debug!("Threshold cut {:.4}", thresholded.cut);

        // Step 3: Label connected regions
        let labels = LabelMap::from_mask(
            &thresholded.mask,
            config.connectivity,
            config.threshold.value_tolerance(),
        );
        drop(thresholded);
        let regions = labels.regions();
        let mut summary = RejectionSummary::new(regions.len());
        if regions.is_empty() {
            tracing::info!("{}", summary);
            return Err(Error::NoCandidatesFound);
        }

        // Step 4: Filter candidates
        report_progress(&progress, 0, regions.len(), ExtractionStage::Filtering);
        let filtered = filter_candidates(volume, &labels, &regions, config)?;
        report_progress(
            &progress,
            regions.len(),
            regions.len(),
            ExtractionStage::Filtering,
        );
        let mut records = filtered.records;
        for reason in records.iter().filter_map(|r| r.reason) {
            summary.count(reason);
        }

        let candidates = filtered.candidates;
        if candidates.is_empty() {
            emit_records(sink, &labels, &records);
            tracing::info!("{}", summary);
            return Err(Error::NoCandidatesSurvivedFilter { summary });
        }

        // Step 5: Align and accumulate (parallel fold/reduce)
        let aligner = Aligner::from_config(config, volume.spacing(), filtered.footprint);
        let shape = aligner.shape();
        let total = candidates.len();
        let processed = AtomicUsize::new(0);
        let retain = sink.retain_candidates();

        let result = candidates
            .par_iter()
            .fold(
                || AlignPartial::new(shape),
                |mut partial, candidate| {
                    if cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                        partial.skipped.push(candidate.label);
                        return partial;
                    }
                    match aligner.align(&candidate.data) {
                        Ok(aligned) => {
                            partial.accumulator.add(&aligned.data);
                            if retain {
                                partial.kept.push((candidate.label, aligned.data));
                            }
                        }
                        Err(e) => {
                            tracing::debug!("Candidate {} rejected: {}", candidate.label, e);
                            partial.rejected.push(candidate.label);
                        }
                    }
                    let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                    report_progress(&progress, done, total, ExtractionStage::Aligning);
                    partial
                },
            )
            .reduce(|| AlignPartial::new(shape), AlignPartial::merge);

        for &label in &result.rejected {
            records[label as usize - 1].reject(RejectionReason::Alignment);
            summary.count(RejectionReason::Alignment);
        }
        for &label in &result.skipped {
            let record = &mut records[label as usize - 1];
            record.accepted = false;
            record.reason = None;
        }
        summary.skipped = result.skipped.len();
        summary.accepted = result.accumulator.count();

        emit_records(sink, &labels, &records);
        if retain {
            let mut kept = result.kept;
            kept.sort_by_key(|(label, _)| *label);
            for (label, data) in &kept {
                sink.aligned_candidate(*label, data);
            }
        }
        tracing::info!("{}", summary);

        // Step 6: Finalize the average
        let psf = result.accumulator.finalize(total)?;
        sink.mean_psf(&psf);

        let partial = summary.skipped > 0;
        if partial {
            tracing::warn!(
                "Extraction cancelled: average covers {} of {} candidates",
                total - summary.skipped,
                total
            );
        }

        Ok(PsfResult {
            psf,
            spacing: volume.spacing().supersampled(config.supersampling),
            reference_index: aligner.reference_index(),
            footprint: filtered.footprint,
            summary,
            records,
            partial,
        })
    }
}

/// Per-worker state of the alignment fold.
struct AlignPartial {
    accumulator: PsfAccumulator,
    rejected: Vec<u32>,
    skipped: Vec<u32>,
    kept: Vec<(u32, Buffer3<f32>)>,
}

impl AlignPartial {
    fn new(shape: [usize; 3]) -> Self {
        Self {
            accumulator: PsfAccumulator::new(shape),
            rejected: Vec::new(),
            skipped: Vec::new(),
            kept: Vec::new(),
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.accumulator = self.accumulator.merge(other.accumulator);
        self.rejected.extend(other.rejected);
        self.skipped.extend(other.skipped);
        self.kept.extend(other.kept);
        self
    }
}

/// Sends every record and the label maps to the sink.
fn emit_records(sink: &mut dyn DiagnosticsSink, labels: &LabelMap, records: &[CandidateRecord]) {
    for record in records {
        sink.candidate(record);
    }
    let accepted: Vec<u32> = records
        .iter()
        .filter(|r| r.accepted)
        .map(|r| r.label_id)
        .collect();
    sink.label_map(labels.labels(), &labels.retain(&accepted));
}
