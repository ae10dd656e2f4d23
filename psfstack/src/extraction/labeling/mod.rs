//! Connected component labeling of 3D foreground masks using union-find.
//!
//! - Voxel raster scan against the already-visited half of the neighbourhood
//! - Graded masks join neighbours only when their values are close enough
//! - Slab-parallel labeling with a lock-free union-find for large volumes
//! - Final labels follow the raster order of each region's first voxel, so
//!   sequential and parallel paths produce identical label maps


use std::sync::atomic::{AtomicU32, Ordering};

use common::Buffer3;
use rayon::prelude::*;

use crate::extraction::config::Connectivity;
use crate::math::Aabb3;

/// Voxel count below which sequential labeling is used.
const PARALLEL_CCL_THRESHOLD: usize = 262_144;

/// Minimum planes per slab in parallel labeling.
const MIN_PLANES_PER_SLAB: usize = 8;

/// One labeled region and its extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// 1-based label id.
    pub label: u32,
    pub bbox: Aabb3,
    pub voxel_count: usize,
}

/// Label map produced by connected component labeling.
///
/// 0 is background; regions are numbered `1..=num_labels`.
#[derive(Debug, Clone)]
pub struct LabelMap {
    labels: Buffer3<u32>,
    num_labels: usize,
}

impl LabelMap {
    /// Labels the non-zero voxels of `mask`.
    ///
    /// With `tolerance`, two adjacent foreground voxels are connected only if
    /// their values differ by strictly less than the tolerance.
    pub fn from_mask(mask: &Buffer3<f32>, connectivity: Connectivity, tolerance: Option<f32>) -> Self {
        let offsets = backward_offsets(connectivity);
        let slabs = slab_count(mask);
        let (labels, num_labels) = if slabs <= 1 {
            label_mask_sequential(mask, &offsets, tolerance)
        } else {
            label_mask_parallel(mask, &offsets, tolerance, slabs)
        };
        tracing::debug!(
            "Labeled {} regions ({:?} connectivity, {} slabs)",
            num_labels,
            connectivity,
            slabs
        );
        Self { labels, num_labels }
    }

    #[inline]
    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    #[inline]
    pub fn labels(&self) -> &Buffer3<u32> {
        &self.labels
    }

    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        self.labels.shape()
    }

    /// Bounding box and voxel count of every region, in label order.
    pub fn regions(&self) -> Vec<Region> {
        let n = self.num_labels;
        let plane_len = self.labels.plane_len();
        let width = self.labels.width();

        let empty = || vec![(Aabb3::empty(), 0usize); n];
        let stats = self
            .labels
            .par_chunks(plane_len)
            .enumerate()
            .fold(empty, |mut acc, (z, plane)| {
                for (i, &label) in plane.iter().enumerate() {
                    if label != 0 {
                        let entry = &mut acc[label as usize - 1];
                        entry.0.include([z, i / width, i % width]);
                        entry.1 += 1;
                    }
                }
                acc
            })
            .reduce(empty, |mut a, b| {
                for (lhs, rhs) in a.iter_mut().zip(b) {
                    lhs.0.union(&rhs.0);
                    lhs.1 += rhs.1;
                }
                a
            });

        stats
            .into_iter()
            .enumerate()
            .map(|(i, (bbox, voxel_count))| Region {
                label: i as u32 + 1,
                bbox,
                voxel_count,
            })
            .collect()
    }

    /// Copy of the label map keeping only `keep`; every other label becomes 0.
    pub fn retain(&self, keep: &[u32]) -> Buffer3<u32> {
        let mut kept = vec![false; self.num_labels + 1];
        for &label in keep {
            if let Some(slot) = kept.get_mut(label as usize) {
                *slot = true;
            }
        }
        self.labels
            .map(|&label| if kept[label as usize] { label } else { 0 })
    }
}

/// Offsets `(dz, dy, dx)` of the neighbours visited before a voxel in raster order.
pub(crate) fn backward_offsets(connectivity: Connectivity) -> Vec<[isize; 3]> {
    let max_manhattan = match connectivity {
        Connectivity::Six => 1,
        Connectivity::Eighteen => 2,
        Connectivity::TwentySix => 3,
    };
    let mut offsets = Vec::with_capacity(13);
    for dz in -1isize..=0 {
        for dy in -1isize..=1 {
            for dx in -1isize..=1 {
                let before = dz < 0 || (dz == 0 && dy < 0) || (dz == 0 && dy == 0 && dx < 0);
                let manhattan = dz.abs() + dy.abs() + dx.abs();
                if before && manhattan <= max_manhattan {
                    offsets.push([dz, dy, dx]);
                }
            }
        }
    }
    offsets
}

#[inline]
fn connected(a: f32, b: f32, tolerance: Option<f32>) -> bool {
    b != 0.0 && tolerance.is_none_or(|t| (a - b).abs() < t)
}

fn slab_count(mask: &Buffer3<f32>) -> usize {
    if mask.len() < PARALLEL_CCL_THRESHOLD {
        return 1;
    }
    (mask.depth() / MIN_PLANES_PER_SLAB)
        .min(rayon::current_num_threads())
        .max(1)
}

// ============================================================================
// Shared voxel-merge helper
// ============================================================================

/// Trait abstracting union-find operations for voxel merging.
trait LabelUnion {
    fn union(&mut self, a: u32, b: u32);
    fn make_set(&mut self) -> u32;
}

impl LabelUnion for UnionFind {
    #[inline]
    fn union(&mut self, a: u32, b: u32) {
        UnionFind::union(self, a, b);
    }
    #[inline]
    fn make_set(&mut self) -> u32 {
        UnionFind::make_set(self)
    }
}

/// Adapts `&AtomicUnionFind` (which uses `&self`) to `LabelUnion`.
#[derive(Debug)]
struct AtomicUFRef<'a>(&'a AtomicUnionFind);

impl LabelUnion for AtomicUFRef<'_> {
    #[inline]
    fn union(&mut self, a: u32, b: u32) {
        self.0.union(a, b);
    }
    #[inline]
    fn make_set(&mut self) -> u32 {
        self.0.make_set()
    }
}

/// Assigns provisional labels to planes `z_start..` covered by `labels`.
///
/// `labels` holds whole planes starting at `z_start`. Neighbours in planes
/// before `z_start` are ignored; slab boundaries are merged separately.
fn label_slab(
    mask: &Buffer3<f32>,
    labels: &mut [u32],
    z_start: usize,
    offsets: &[[isize; 3]],
    tolerance: Option<f32>,
    uf: &mut impl LabelUnion,
) {
    let [_, height, width] = mask.shape();
    let base = z_start * mask.plane_len();

    for local in 0..labels.len() {
        let global = base + local;
        let value = mask[global];
        if value == 0.0 {
            continue;
        }
        let [z, y, x] = mask.coords(global);

        let mut assigned = None;
        for &[dz, dy, dx] in offsets {
            let (nz, ny, nx) = (z as isize + dz, y as isize + dy, x as isize + dx);
            if nz < z_start as isize || ny < 0 || nx < 0 || ny >= height as isize || nx >= width as isize {
                continue;
            }
            let neighbour = mask.index(nz as usize, ny as usize, nx as usize);
            if !connected(value, mask[neighbour], tolerance) {
                continue;
            }
            let neighbour_label = labels[neighbour - base];
            match assigned {
                Some(label) if label != neighbour_label => uf.union(label, neighbour_label),
                None => assigned = Some(neighbour_label),
                _ => {}
            }
        }
        labels[local] = assigned.unwrap_or_else(|| uf.make_set());
    }
}

// ============================================================================
// Sequential labeling (small volumes)
// ============================================================================

fn label_mask_sequential(
    mask: &Buffer3<f32>,
    offsets: &[[isize; 3]],
    tolerance: Option<f32>,
) -> (Buffer3<u32>, usize) {
    let mut labels = Buffer3::new_default(mask.shape());
    let mut uf = UnionFind::new();
    label_slab(mask, &mut labels, 0, offsets, tolerance, &mut uf);
    let num_labels = uf.flatten_labels(&mut labels);
    (labels, num_labels)
}

// ============================================================================
// Parallel labeling (large volumes)
// ============================================================================

fn label_mask_parallel(
    mask: &Buffer3<f32>,
    offsets: &[[isize; 3]],
    tolerance: Option<f32>,
    slabs: usize,
) -> (Buffer3<u32>, usize) {
    let plane_len = mask.plane_len();
    let planes_per_slab = mask.depth().div_ceil(slabs);

    let foreground = mask
        .par_chunks(plane_len)
        .map(|plane| plane.iter().filter(|&&v| v != 0.0).count())
        .sum::<usize>();
    let uf = AtomicUnionFind::new(foreground);

    // Phase 1: label each slab independently.
    let mut labels = Buffer3::new_default(mask.shape());
    labels
        .par_chunks_mut(planes_per_slab * plane_len)
        .enumerate()
        .for_each(|(slab, chunk)| {
            let mut uf_ref = AtomicUFRef(&uf);
            label_slab(mask, chunk, slab * planes_per_slab, offsets, tolerance, &mut uf_ref);
        });

    // Phase 2: merge across slab boundaries.
    let boundaries: Vec<usize> = (1..slabs)
        .map(|s| s * planes_per_slab)
        .filter(|&z| z < mask.depth())
        .collect();
    boundaries.par_iter().for_each(|&z| {
        merge_slab_boundary(mask, &labels, z, offsets, tolerance, &uf);
    });

    // Phase 3: relabel in raster order of first appearance.
    let mut remap = vec![0u32; uf.label_count() + 1];
    let mut num_labels = 0u32;
    for label in labels.iter_mut() {
        if *label == 0 {
            continue;
        }
        let root = uf.find(*label) as usize;
        if remap[root] == 0 {
            num_labels += 1;
            remap[root] = num_labels;
        }
        *label = remap[root];
    }

    (labels, num_labels as usize)
}

/// Unions the first plane of a slab (`z`) with the last plane of the previous one.
fn merge_slab_boundary(
    mask: &Buffer3<f32>,
    labels: &Buffer3<u32>,
    z: usize,
    offsets: &[[isize; 3]],
    tolerance: Option<f32>,
    uf: &AtomicUnionFind,
) {
    let [_, height, width] = mask.shape();
    for y in 0..height {
        for x in 0..width {
            let value = mask[(z, y, x)];
            if value == 0.0 {
                continue;
            }
            let label = labels[(z, y, x)];
            for &[dz, dy, dx] in offsets.iter().filter(|o| o[0] == -1) {
                let (ny, nx) = (y as isize + dy, x as isize + dx);
                if ny < 0 || nx < 0 || ny >= height as isize || nx >= width as isize {
                    continue;
                }
                let neighbour = ((z as isize + dz) as usize, ny as usize, nx as usize);
                if connected(value, mask[neighbour], tolerance) {
                    uf.union(label, labels[neighbour]);
                }
            }
        }
    }
}

// ============================================================================
// Union-Find (sequential)
// ============================================================================

/// Sequential union-find for small volumes.
#[derive(Debug)]
struct UnionFind {
    parent: Vec<u32>,
    next_label: u32,
}

impl UnionFind {
    fn new() -> Self {
        Self {
            parent: Vec::with_capacity(256),
            next_label: 1,
        }
    }

    #[inline]
    fn make_set(&mut self) -> u32 {
        let label = self.next_label;
        self.parent.push(label);
        self.next_label += 1;
        label
    }

    /// Find root with two-pass path compression.
    #[inline]
    fn find(&mut self, label: u32) -> u32 {
        let mut root = label;
        loop {
            let parent = self.parent[(root - 1) as usize];
            if parent == root {
                break;
            }
            root = parent;
        }

        let mut current = label;
        while current != root {
            let idx = (current - 1) as usize;
            current = self.parent[idx];
            self.parent[idx] = root;
        }
        root
    }

    /// Unions two sets; the smaller root wins so roots stay first-created.
    #[inline]
    fn union(&mut self, a: u32, b: u32) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            let (smaller, larger) = if root_a < root_b {
                (root_a, root_b)
            } else {
                (root_b, root_a)
            };
            self.parent[(larger - 1) as usize] = smaller;
        }
    }

    /// Rewrites provisional labels to sequential ids `1..=n`.
    fn flatten_labels(&mut self, labels: &mut [u32]) -> usize {
        let len = self.parent.len();
        let mut label_map = vec![0u32; len + 1];
        let mut num_labels = 0u32;

        for i in 1..=len as u32 {
            let root = self.find(i);
            if label_map[root as usize] == 0 {
                num_labels += 1;
                label_map[root as usize] = num_labels;
            }
            label_map[i as usize] = label_map[root as usize];
        }

        for l in labels.iter_mut().filter(|l| **l != 0) {
            *l = label_map[*l as usize];
        }
        num_labels as usize
    }
}

// ============================================================================
// Union-Find (atomic/parallel)
// ============================================================================

/// Lock-free union-find shared by all slabs.
struct AtomicUnionFind {
    parent: Vec<AtomicU32>,
    next_label: AtomicU32,
}

impl std::fmt::Debug for AtomicUnionFind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicUnionFind")
            .field("capacity", &self.parent.len())
            .field("next_label", &self.next_label.load(Ordering::Relaxed))
            .finish()
    }
}

impl AtomicUnionFind {
    /// `capacity` bounds the number of provisional labels (one per foreground voxel at most).
    fn new(capacity: usize) -> Self {
        Self {
            parent: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            next_label: AtomicU32::new(1),
        }
    }

    #[inline]
    fn make_set(&self) -> u32 {
        let label = self.next_label.fetch_add(1, Ordering::SeqCst);
        assert!(
            (label as usize) <= self.parent.len(),
            "AtomicUnionFind capacity exceeded: label {label} > capacity {}",
            self.parent.len()
        );
        self.parent[label as usize - 1].store(label, Ordering::SeqCst);
        label
    }

    #[inline]
    fn find(&self, label: u32) -> u32 {
        let mut current = label;
        loop {
            // Stale reads only cost extra iterations; union's CAS synchronizes.
            let parent = self.parent[(current - 1) as usize].load(Ordering::Relaxed);
            if parent == current || parent == 0 {
                return current;
            }
            current = parent;
        }
    }

    fn union(&self, a: u32, b: u32) {
        let mut root_a = self.find(a);
        let mut root_b = self.find(b);

        while root_a != root_b {
            if root_a > root_b {
                std::mem::swap(&mut root_a, &mut root_b);
            }
            match self.parent[(root_b - 1) as usize].compare_exchange_weak(
                root_b,
                root_a,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => {
                    root_a = self.find(root_a);
                    root_b = self.find(current);
                }
            }
        }
    }

    #[inline]
    fn label_count(&self) -> usize {
        (self.next_label.load(Ordering::Relaxed) - 1) as usize
    }
}
