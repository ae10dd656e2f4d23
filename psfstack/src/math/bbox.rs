//! Axis-aligned bounding box for voxel regions.

/// Axis-aligned bounding box with inclusive `(z, y, x)` bounds.
///
/// A voxel at `p` is inside if `min[a] <= p[a] <= max[a]` on every axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aabb3 {
    pub min: [usize; 3],
    pub max: [usize; 3],
}

impl Default for Aabb3 {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb3 {
    #[inline]
    pub const fn new(min: [usize; 3], max: [usize; 3]) -> Self {
        Self { min, max }
    }

    /// Create an empty bounding box (for accumulation).
    ///
    /// The empty box has inverted bounds so that the first voxel passed to
    /// `include()` sets the initial bounds.
    #[inline]
    pub const fn empty() -> Self {
        Self {
            min: [usize::MAX; 3],
            max: [0; 3],
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        (0..3).any(|a| self.min[a] > self.max[a])
    }

    /// Expand this bounding box to include the given voxel.
    #[inline]
    pub fn include(&mut self, p: [usize; 3]) {
        for a in 0..3 {
            self.min[a] = self.min[a].min(p[a]);
            self.max[a] = self.max[a].max(p[a]);
        }
    }

    /// Merge another box into this one.
    #[inline]
    pub fn union(&mut self, other: &Aabb3) {
        if other.is_empty() {
            return;
        }
        self.include(other.min);
        self.include(other.max);
    }

    /// Extent per axis in voxels.
    #[inline]
    pub fn size(&self) -> [usize; 3] {
        [0, 1, 2].map(|a| self.max[a].saturating_sub(self.min[a]) + 1)
    }

    /// First voxel index per axis.
    #[inline]
    pub fn start(&self) -> [usize; 3] {
        self.min
    }

    /// One past the last voxel index per axis.
    #[inline]
    pub fn stop(&self) -> [usize; 3] {
        self.max.map(|v| v + 1)
    }

    /// Number of voxels enclosed by the box.
    #[inline]
    pub fn volume(&self) -> usize {
        self.size().iter().product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let bbox = Aabb3::empty();
        assert!(bbox.is_empty());
        assert_eq!(bbox.min, [usize::MAX; 3]);
        assert_eq!(bbox.max, [0; 3]);
    }

    #[test]
    fn test_include() {
        let mut bbox = Aabb3::empty();
        bbox.include([5, 3, 4]);
        assert_eq!(bbox, Aabb3::new([5, 3, 4], [5, 3, 4]));
        assert!(!bbox.is_empty());

        bbox.include([2, 7, 4]);
        assert_eq!(bbox, Aabb3::new([2, 3, 4], [5, 7, 4]));

        bbox.include([8, 1, 0]);
        assert_eq!(bbox, Aabb3::new([2, 1, 0], [8, 7, 4]));
    }

    #[test]
    fn test_size_and_volume() {
        let bbox = Aabb3::new([2, 3, 0], [5, 8, 0]);
        assert_eq!(bbox.size(), [4, 6, 1]);
        assert_eq!(bbox.volume(), 24);
    }

    #[test]
    fn test_start_stop_half_open() {
        let bbox = Aabb3::new([1, 2, 3], [4, 5, 6]);
        assert_eq!(bbox.start(), [1, 2, 3]);
        assert_eq!(bbox.stop(), [5, 6, 7]);
    }

    #[test]
    fn test_union_ignores_empty() {
        let mut bbox = Aabb3::new([1, 1, 1], [2, 2, 2]);
        bbox.union(&Aabb3::empty());
        assert_eq!(bbox, Aabb3::new([1, 1, 1], [2, 2, 2]));
        bbox.union(&Aabb3::new([0, 3, 1], [0, 3, 1]));
        assert_eq!(bbox, Aabb3::new([0, 1, 1], [2, 3, 2]));
    }
}
