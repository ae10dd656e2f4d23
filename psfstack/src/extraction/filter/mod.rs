//! Candidate filtering: geometric size test, crop extraction and
//! statistical shape tests.
//!
//! Every labeled region is evaluated; nothing stops at the first rejection.
//! The label map is only read.


use common::Buffer3;
use rayon::prelude::*;

use crate::extraction::config::{Config, ExpectedSize};
use crate::extraction::diagnostics::{CandidateRecord, RejectionReason};
use crate::extraction::error::ConfigError;
use crate::extraction::labeling::{LabelMap, Region};
use crate::math::statistics::{argmax, center_of_mass, index_to_position, percentile};
use crate::volume::{Resolution, Volume, make_odd};

/// Percentile used as the floor of the half-maximum level.
const FWHM_FLOOR_PERCENTILE: f32 = 10.0;

/// A crop of the raw volume around one region's peak.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub label: u32,
    /// Absolute index of the crop's first voxel.
    pub offset: [usize; 3],
    /// Absolute index of the raw maximum; the crop is centered on it.
    pub peak: [usize; 3],
    pub data: Buffer3<f32>,
}

/// Result of filtering all regions.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub candidates: Vec<Candidate>,
    /// One record per region, in label order.
    pub records: Vec<CandidateRecord>,
    /// Common crop shape, odd on every axis.
    pub footprint: [usize; 3],
    /// Expected size used by the geometric test, if it ran.
    pub expected_size: Option<[usize; 3]>,
}

/// Statistical acceptance targets derived from the theoretical resolution.
#[derive(Debug, Clone, Copy)]
struct ShapeTargets {
    fwhm_volume: usize,
    fwhm_range: (f64, f64),
    max_center_distance: f64,
}

/// Runs the configured filters over every region.
pub fn filter_candidates(
    volume: &Volume,
    labels: &LabelMap,
    regions: &[Region],
    config: &Config,
) -> Result<FilterOutcome, ConfigError> {
    let mut records: Vec<CandidateRecord> = regions
        .iter()
        .map(|r| CandidateRecord::accepted(r.label))
        .collect();

    // Geometric test and footprint.
    let (expected_size, footprint) = if config.filter.geometric() {
        let expected = resolve_expected_size(config.expected_size, regions);
        let mut largest = [0usize; 3];
        for (region, record) in regions.iter().zip(records.iter_mut()) {
            let size = region.bbox.size();
            if size_within_tolerance(size, expected, config.size_tolerance) {
                for a in 0..3 {
                    largest[a] = largest[a].max(size[a]);
                }
            } else {
                record.reject(RejectionReason::Size);
            }
        }
        let footprint = common_footprint(largest, config.footprint_margin);
        tracing::debug!(
            "Geometric filter: expected size {:?}, footprint {:?}",
            expected,
            footprint
        );
        (Some(expected), footprint)
    } else {
        let resolution = config.resolution.ok_or(ConfigError::MissingResolution)?;
        let footprint = resolution.field_size(volume.spacing(), config.field_size_factor);
        tracing::debug!("Resolution footprint {:?}", footprint);
        (None, footprint)
    };

    let targets = if config.filter.statistical() {
        let resolution: Resolution = config.resolution.ok_or(ConfigError::MissingResolution)?;
        Some(ShapeTargets {
            fwhm_volume: resolution.fwhm_volume(volume.spacing()),
            fwhm_range: config.fwhm_volume_range,
            max_center_distance: config.max_center_distance,
        })
    } else {
        None
    };

    // Crop extraction and shape tests for geometric survivors.
    let evaluated: Vec<(CandidateRecord, Option<Candidate>)> = regions
        .par_iter()
        .zip(records.par_iter())
        .map(|(region, record)| {
            let mut record = record.clone();
            if !record.accepted {
                return (record, None);
            }
            let candidate = evaluate_region(volume, labels, region, footprint, targets, &mut record);
            (record, candidate)
        })
        .collect();

    let mut candidates = Vec::new();
    records.clear();
    for (record, candidate) in evaluated {
        records.push(record);
        candidates.extend(candidate);
    }

    tracing::debug!(
        "Filter kept {} of {} regions",
        candidates.len(),
        regions.len()
    );

    Ok(FilterOutcome {
        candidates,
        records,
        footprint,
        expected_size,
    })
}

/// Explicit size, or the component-wise mean bounding-box size rounded half to even.
pub fn resolve_expected_size(expected: ExpectedSize, regions: &[Region]) -> [usize; 3] {
    match expected {
        ExpectedSize::Fixed(size) => size,
        ExpectedSize::AutoEstimate => {
            if regions.is_empty() {
                return [1; 3];
            }
            let mut sum = [0usize; 3];
            for region in regions {
                let size = region.bbox.size();
                for a in 0..3 {
                    sum[a] += size[a];
                }
            }
            sum.map(|s| ((s as f64 / regions.len() as f64).round_ties_even() as usize).max(1))
        }
    }
}

/// `true` if every axis deviates from `expected` by strictly less than
/// `tolerance` (relative). A tolerance of 1 or more accepts any size.
pub fn size_within_tolerance(observed: [usize; 3], expected: [usize; 3], tolerance: f32) -> bool {
    if tolerance >= 1.0 {
        return true;
    }
    (0..3).all(|a| {
        let e = expected[a] as f32;
        (observed[a] as f32 - e).abs() / e < tolerance
    })
}

/// Largest surviving size scaled by `margin`, rounded and made odd.
pub fn common_footprint(largest: [usize; 3], margin: f32) -> [usize; 3] {
    largest.map(|s| make_odd((s as f32 * margin).round() as usize))
}

/// Locates the region's raw peak, crops around it and applies the shape tests.
fn evaluate_region(
    volume: &Volume,
    labels: &LabelMap,
    region: &Region,
    footprint: [usize; 3],
    targets: Option<ShapeTargets>,
    record: &mut CandidateRecord,
) -> Option<Candidate> {
    let peak = region_peak(volume.data(), labels.labels(), region);

    let Some(offset) = crop_origin(peak, footprint, volume.shape()) else {
        tracing::warn!(
            "Boundary overflow: candidate {} at {:?} needs a {:?} footprint outside the volume, skipping",
            region.label,
            peak,
            footprint
        );
        record.reject(RejectionReason::Boundary);
        return None;
    };
    let data = volume.data().crop(offset, footprint);

    if let Some(targets) = targets {
        let fwhm = fwhm_volume(&data);
        record.fwhm_volume = Some(fwhm);

        let local_max = argmax(&data);
        let distance = center_of_mass(&data)
            .map(|com| volume.spacing().physical_distance(index_to_position(local_max), com))
            .unwrap_or(f64::INFINITY);
        record.max_to_center_distance = Some(distance);

        let target = targets.fwhm_volume as f64;
        let (low, high) = targets.fwhm_range;
        if (fwhm as f64) < low * target || (fwhm as f64) > high * target {
            tracing::trace!(
                "Candidate {}: FWHM volume {} outside [{}, {}]",
                region.label,
                fwhm,
                low * target,
                high * target
            );
            record.reject(RejectionReason::FwhmVolume);
            return None;
        }
        if distance > targets.max_center_distance {
            tracing::trace!(
                "Candidate {}: peak-to-center distance {:e} exceeds {:e}",
                region.label,
                distance,
                targets.max_center_distance
            );
            record.reject(RejectionReason::Distance);
            return None;
        }
    }

    Some(Candidate {
        label: region.label,
        offset,
        peak,
        data,
    })
}

/// First maximum of the raw volume over the region's own voxels.
fn region_peak(data: &Buffer3<f32>, labels: &Buffer3<u32>, region: &Region) -> [usize; 3] {
    let (start, stop) = (region.bbox.start(), region.bbox.stop());
    let mut best = start;
    let mut best_value = f32::NEG_INFINITY;
    for z in start[0]..stop[0] {
        for y in start[1]..stop[1] {
            for x in start[2]..stop[2] {
                if labels[(z, y, x)] != region.label {
                    continue;
                }
                let v = data[(z, y, x)];
                if v > best_value {
                    best_value = v;
                    best = [z, y, x];
                }
            }
        }
    }
    best
}

/// Start of a `footprint` box centered on `peak`, or `None` if it leaves `shape`.
pub fn crop_origin(peak: [usize; 3], footprint: [usize; 3], shape: [usize; 3]) -> Option<[usize; 3]> {
    let mut origin = [0usize; 3];
    for a in 0..3 {
        let half = footprint[a] / 2;
        if peak[a] < half || peak[a] + half + 1 > shape[a] {
            return None;
        }
        origin[a] = peak[a] - half;
    }
    Some(origin)
}

/// Voxels at or above the midpoint between the 10th percentile and the maximum.
pub fn fwhm_volume(data: &Buffer3<f32>) -> usize {
    let mut scratch = data.to_vec();
    let floor = percentile(&mut scratch, FWHM_FLOOR_PERCENTILE);
    let max = data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let level = 0.5 * (max + floor);
    data.iter().filter(|&&v| v >= level).count()
}
