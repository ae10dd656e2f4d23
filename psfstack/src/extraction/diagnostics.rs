//! Per-candidate records, the rejection histogram and diagnostics sinks.

use std::fmt;
use std::io::Write;

use common::Buffer3;
use serde::Serialize;
use strum_macros::{Display, EnumIter, IntoStaticStr};

/// Why a candidate was dropped.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr, Serialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Bounding box too far from the expected size.
    Size,
    /// Crop footprint would leave the volume.
    Boundary,
    /// Half-maximum voxel count outside the accepted range.
    FwhmVolume,
    /// Peak too far from the mass center.
    Distance,
    /// Sub-voxel alignment failed.
    Alignment,
}

/// Outcome of one labeled region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateRecord {
    pub label_id: u32,
    pub accepted: bool,
    pub reason: Option<RejectionReason>,
    pub fwhm_volume: Option<usize>,
    pub max_to_center_distance: Option<f64>,
}

impl CandidateRecord {
    pub fn accepted(label_id: u32) -> Self {
        Self {
            label_id,
            accepted: true,
            reason: None,
            fwhm_volume: None,
            max_to_center_distance: None,
        }
    }

    pub fn rejected(label_id: u32, reason: RejectionReason) -> Self {
        Self {
            label_id,
            accepted: false,
            reason: Some(reason),
            fwhm_volume: None,
            max_to_center_distance: None,
        }
    }

    pub fn reject(&mut self, reason: RejectionReason) {
        self.accepted = false;
        self.reason = Some(reason);
    }
}

/// Candidate counts per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RejectionSummary {
    /// Labeled regions found by segmentation.
    pub found: usize,
    pub size: usize,
    pub boundary: usize,
    pub fwhm_volume: usize,
    pub distance: usize,
    pub alignment: usize,
    /// Candidates folded into the average.
    pub accepted: usize,
    /// Candidates never processed because the run was cancelled.
    pub skipped: usize,
}

impl RejectionSummary {
    pub fn new(found: usize) -> Self {
        Self {
            found,
            ..Default::default()
        }
    }

    pub fn count(&mut self, reason: RejectionReason) {
        match reason {
            RejectionReason::Size => self.size += 1,
            RejectionReason::Boundary => self.boundary += 1,
            RejectionReason::FwhmVolume => self.fwhm_volume += 1,
            RejectionReason::Distance => self.distance += 1,
            RejectionReason::Alignment => self.alignment += 1,
        }
    }

    pub fn rejected(&self) -> usize {
        self.size + self.boundary + self.fwhm_volume + self.distance + self.alignment
    }

    /// Rejections by the geometric and statistical filters (not alignment).
    pub fn filtered(&self) -> usize {
        self.size + self.boundary + self.fwhm_volume + self.distance
    }
}

impl fmt::Display for RejectionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} candidates found, {} rejected (reasons: size {}, boundary {}, FWHM {}, distance {}, alignment {})",
            self.found,
            self.rejected(),
            self.size,
            self.boundary,
            self.fwhm_volume,
            self.distance,
            self.alignment
        )?;
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        Ok(())
    }
}

/// Intermediate arrays offered to a [`DiagnosticsSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum IntermediateKind {
    /// Smoothed copy of the input volume.
    Blurred,
    /// Foreground mask after thresholding.
    Mask,
}

/// Receives diagnostics while the pipeline runs.
///
/// Every method has a no-op default; implement only what you persist.
pub trait DiagnosticsSink {
    fn candidate(&mut self, _record: &CandidateRecord) {}

    fn intermediate(&mut self, _kind: IntermediateKind, _data: &Buffer3<f32>) {}

    /// Full label map, then the map restricted to accepted candidates.
    fn label_map(&mut self, _labels: &Buffer3<u32>, _remaining: &Buffer3<u32>) {}

    /// Whether aligned candidates should be kept for [`DiagnosticsSink::aligned_candidate`].
    fn retain_candidates(&self) -> bool {
        false
    }

    fn aligned_candidate(&mut self, _label_id: u32, _data: &Buffer3<f32>) {}

    fn mean_psf(&mut self, _psf: &Buffer3<f32>) {}
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticsSink for NullSink {}

/// In-memory sink keeping every record and array.
#[derive(Debug, Default)]
pub struct DiagnosticsRecorder {
    pub records: Vec<CandidateRecord>,
    pub blurred: Option<Buffer3<f32>>,
    pub mask: Option<Buffer3<f32>>,
    pub labels: Option<Buffer3<u32>>,
    pub remaining_labels: Option<Buffer3<u32>>,
    pub aligned: Vec<(u32, Buffer3<f32>)>,
    pub mean_psf: Option<Buffer3<f32>>,
    /// Keep aligned candidates (off by default).
    pub keep_aligned: bool,
}

impl DiagnosticsSink for DiagnosticsRecorder {
    fn candidate(&mut self, record: &CandidateRecord) {
        self.records.push(record.clone());
    }

    fn intermediate(&mut self, kind: IntermediateKind, data: &Buffer3<f32>) {
        match kind {
            IntermediateKind::Blurred => self.blurred = Some(data.clone()),
            IntermediateKind::Mask => self.mask = Some(data.clone()),
        }
    }

    fn label_map(&mut self, labels: &Buffer3<u32>, remaining: &Buffer3<u32>) {
        self.labels = Some(labels.clone());
        self.remaining_labels = Some(remaining.clone());
    }

    fn retain_candidates(&self) -> bool {
        self.keep_aligned
    }

    fn aligned_candidate(&mut self, label_id: u32, data: &Buffer3<f32>) {
        self.aligned.push((label_id, data.clone()));
    }

    fn mean_psf(&mut self, psf: &Buffer3<f32>) {
        self.mean_psf = Some(psf.clone());
    }
}

/// Writes one JSON object per candidate record, newline-delimited.
///
/// Arrays are not written; pair with another sink to persist them.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Records successfully written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> DiagnosticsSink for JsonLinesSink<W> {
    fn candidate(&mut self, record: &CandidateRecord) {
        let result = serde_json::to_writer(&mut self.writer, record)
            .map_err(std::io::Error::from)
            .and_then(|()| self.writer.write_all(b"\n"));
        match result {
            Ok(()) => self.written += 1,
            Err(e) => tracing::error!("Failed to write candidate record {}: {}", record.label_id, e),
        }
    }

    /// Sent once after the last record on every path that produced records.
    fn label_map(&mut self, _labels: &Buffer3<u32>, _remaining: &Buffer3<u32>) {
        if let Err(e) = self.writer.flush() {
            tracing::error!("Failed to flush candidate records: {}", e);
        }
    }
}
