use std::ops::{Deref, DerefMut, Index, IndexMut, Range};
use std::slice;

/// Dense 3D buffer stored plane by plane, row by row.
///
/// Coordinates are always given in `(z, y, x)` order and shapes as
/// `[depth, height, width]`, so `x` is the fastest-varying axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer3<T> {
    voxels: Vec<T>,
    depth: usize,
    height: usize,
    width: usize,
}

impl<T> Buffer3<T> {
    pub fn new(depth: usize, height: usize, width: usize, voxels: Vec<T>) -> Self {
        assert_eq!(
            voxels.len(),
            depth * height * width,
            "voxels length must equal depth * height * width"
        );
        Self {
            voxels,
            depth,
            height,
            width,
        }
    }

    pub fn from_shape(shape: [usize; 3], voxels: Vec<T>) -> Self {
        Self::new(shape[0], shape[1], shape[2], voxels)
    }

    /// Builds a buffer by evaluating `f(z, y, x)` for every voxel in raster order.
    pub fn from_fn(shape: [usize; 3], mut f: impl FnMut(usize, usize, usize) -> T) -> Self {
        let [depth, height, width] = shape;
        let mut voxels = Vec::with_capacity(depth * height * width);
        for z in 0..depth {
            for y in 0..height {
                for x in 0..width {
                    voxels.push(f(z, y, x));
                }
            }
        }
        Self::new(depth, height, width, voxels)
    }

    #[inline]
    pub fn get(&self, z: usize, y: usize, x: usize) -> &T {
        debug_assert!(z < self.depth && y < self.height && x < self.width);
        &self.voxels[self.index(z, y, x)]
    }

    #[inline]
    pub fn get_mut(&mut self, z: usize, y: usize, x: usize) -> &mut T {
        debug_assert!(z < self.depth && y < self.height && x < self.width);
        let idx = self.index(z, y, x);
        &mut self.voxels[idx]
    }

    #[inline]
    pub fn index(&self, z: usize, y: usize, x: usize) -> usize {
        (z * self.height + y) * self.width + x
    }

    /// Inverse of [`Buffer3::index`].
    #[inline]
    pub fn coords(&self, idx: usize) -> [usize; 3] {
        let plane = self.plane_len();
        [idx / plane, (idx % plane) / self.width, idx % self.width]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        [self.depth, self.height, self.width]
    }

    #[inline]
    pub fn plane_len(&self) -> usize {
        self.height * self.width
    }

    #[inline]
    pub fn plane(&self, z: usize) -> &[T] {
        let len = self.plane_len();
        &self.voxels[z * len..(z + 1) * len]
    }

    #[inline]
    pub fn voxels(&self) -> &[T] {
        &self.voxels
    }

    #[inline]
    pub fn voxels_mut(&mut self) -> &mut [T] {
        &mut self.voxels
    }

    #[inline]
    pub fn into_vec(self) -> Vec<T> {
        self.voxels
    }

    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.voxels.iter()
    }

    #[inline]
    pub fn iter_mut(&mut self) -> slice::IterMut<'_, T> {
        self.voxels.iter_mut()
    }

    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Buffer3<U> {
        Buffer3::from_shape(self.shape(), self.voxels.iter().map(f).collect())
    }
}

impl<T: Copy> Buffer3<T> {
    /// Copies the box `start..start + shape` into a new buffer.
    pub fn crop(&self, start: [usize; 3], shape: [usize; 3]) -> Self {
        for axis in 0..3 {
            assert!(
                start[axis] + shape[axis] <= self.shape()[axis],
                "crop exceeds buffer bounds on axis {axis}"
            );
        }
        let [depth, height, width] = shape;
        let mut voxels = Vec::with_capacity(depth * height * width);
        for z in 0..depth {
            for y in 0..height {
                let row = self.index(start[0] + z, start[1] + y, start[2]);
                voxels.extend_from_slice(&self.voxels[row..row + width]);
            }
        }
        Self::new(depth, height, width, voxels)
    }

    /// Circular shift along every axis: the voxel at `i` moves to `(i + shift) mod n`.
    pub fn roll(&self, shift: [isize; 3]) -> Self {
        let shape = self.shape();
        let wrap = |axis: usize| shift[axis].rem_euclid(shape[axis].max(1) as isize) as usize;
        let (sz, sy, sx) = (wrap(0), wrap(1), wrap(2));

        let mut voxels = self.voxels.clone();
        for z in 0..self.depth {
            let dz = (z + sz) % self.depth;
            for y in 0..self.height {
                let dy = (y + sy) % self.height;
                let src = self.index(z, y, 0);
                let dst = self.index(dz, dy, 0);
                let row = &self.voxels[src..src + self.width];
                let out = &mut voxels[dst..dst + self.width];
                out[sx..].copy_from_slice(&row[..self.width - sx]);
                out[..sx].copy_from_slice(&row[self.width - sx..]);
            }
        }
        Self::new(self.depth, self.height, self.width, voxels)
    }

    #[inline]
    pub fn copy_from(&mut self, other: &Self) {
        assert_eq!(self.shape(), other.shape(), "shape mismatch");
        self.voxels.copy_from_slice(&other.voxels);
    }
}

impl<T: Default + Clone> Buffer3<T> {
    pub fn new_default(shape: [usize; 3]) -> Self {
        Self::from_shape(shape, vec![T::default(); shape[0] * shape[1] * shape[2]])
    }
}

impl<T: Clone> Buffer3<T> {
    pub fn new_filled(shape: [usize; 3], value: T) -> Self {
        Self::from_shape(shape, vec![value; shape[0] * shape[1] * shape[2]])
    }

    #[inline]
    pub fn fill(&mut self, value: T) {
        self.voxels.fill(value);
    }
}

impl<T> Index<(usize, usize, usize)> for Buffer3<T> {
    type Output = T;

    #[inline]
    fn index(&self, (z, y, x): (usize, usize, usize)) -> &Self::Output {
        &self.voxels[(z * self.height + y) * self.width + x]
    }
}

impl<T> IndexMut<(usize, usize, usize)> for Buffer3<T> {
    #[inline]
    fn index_mut(&mut self, (z, y, x): (usize, usize, usize)) -> &mut Self::Output {
        &mut self.voxels[(z * self.height + y) * self.width + x]
    }
}

impl<T> Index<[usize; 3]> for Buffer3<T> {
    type Output = T;

    #[inline]
    fn index(&self, [z, y, x]: [usize; 3]) -> &Self::Output {
        &self[(z, y, x)]
    }
}

impl<T> IndexMut<[usize; 3]> for Buffer3<T> {
    #[inline]
    fn index_mut(&mut self, [z, y, x]: [usize; 3]) -> &mut Self::Output {
        &mut self[(z, y, x)]
    }
}

impl<T> Index<usize> for Buffer3<T> {
    type Output = T;

    #[inline]
    fn index(&self, idx: usize) -> &Self::Output {
        &self.voxels[idx]
    }
}

impl<T> IndexMut<usize> for Buffer3<T> {
    #[inline]
    fn index_mut(&mut self, idx: usize) -> &mut Self::Output {
        &mut self.voxels[idx]
    }
}

impl<T> Index<Range<usize>> for Buffer3<T> {
    type Output = [T];

    #[inline]
    fn index(&self, range: Range<usize>) -> &Self::Output {
        &self.voxels[range]
    }
}

impl<T> Deref for Buffer3<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.voxels
    }
}

impl<T> DerefMut for Buffer3<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.voxels
    }
}

impl<'a, T> IntoIterator for &'a Buffer3<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.voxels.iter()
    }
}

impl<T> From<Buffer3<T>> for Vec<T> {
    #[inline]
    fn from(buffer: Buffer3<T>) -> Self {
        buffer.voxels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(shape: [usize; 3]) -> Buffer3<i32> {
        let len = shape[0] * shape[1] * shape[2];
        Buffer3::from_shape(shape, (0..len as i32).collect())
    }

    #[test]
    fn test_new_stores_dimensions() {
        let buf = ramp([2, 3, 4]);
        assert_eq!(buf.depth(), 2);
        assert_eq!(buf.height(), 3);
        assert_eq!(buf.width(), 4);
        assert_eq!(buf.shape(), [2, 3, 4]);
        assert_eq!(buf.len(), 24);
    }

    #[test]
    #[should_panic(expected = "voxels length must equal depth * height * width")]
    fn test_new_panics_on_size_mismatch() {
        Buffer3::new(2, 2, 2, vec![0u8; 7]);
    }

    #[test]
    fn test_index_is_x_fastest() {
        let buf = ramp([2, 3, 4]);
        assert_eq!(buf[(0, 0, 1)], 1);
        assert_eq!(buf[(0, 1, 0)], 4);
        assert_eq!(buf[(1, 0, 0)], 12);
        assert_eq!(buf[[1, 2, 3]], 23);
    }

    #[test]
    fn test_coords_inverts_index() {
        let buf = ramp([3, 4, 5]);
        for idx in 0..buf.len() {
            let [z, y, x] = buf.coords(idx);
            assert_eq!(buf.index(z, y, x), idx);
        }
    }

    #[test]
    fn test_from_fn_raster_order() {
        let buf = Buffer3::from_fn([2, 2, 2], |z, y, x| z * 100 + y * 10 + x);
        assert_eq!(buf.voxels(), &[0, 1, 10, 11, 100, 101, 110, 111]);
    }

    #[test]
    fn test_plane() {
        let buf = ramp([2, 2, 3]);
        assert_eq!(buf.plane(1), &[6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn test_crop() {
        let buf = ramp([3, 3, 3]);
        let crop = buf.crop([1, 1, 1], [2, 2, 2]);
        assert_eq!(crop.shape(), [2, 2, 2]);
        assert_eq!(crop.voxels(), &[13, 14, 16, 17, 22, 23, 25, 26]);
    }

    #[test]
    #[should_panic(expected = "crop exceeds buffer bounds")]
    fn test_crop_out_of_bounds_panics() {
        ramp([3, 3, 3]).crop([2, 0, 0], [2, 1, 1]);
    }

    #[test]
    fn test_roll_moves_voxel_forward() {
        let mut buf = Buffer3::new_default([3, 4, 5]);
        buf[(0, 0, 0)] = 1;
        let rolled = buf.roll([1, 2, 3]);
        assert_eq!(rolled[(1, 2, 3)], 1);
        assert_eq!(rolled.iter().sum::<i32>(), 1);
    }

    #[test]
    fn test_roll_negative_wraps() {
        let mut buf = Buffer3::new_default([3, 3, 3]);
        buf[(0, 1, 0)] = 7;
        let rolled = buf.roll([-1, 0, -1]);
        assert_eq!(rolled[(2, 1, 2)], 7);
    }

    #[test]
    fn test_roll_full_period_is_identity() {
        let buf = ramp([2, 3, 4]);
        assert_eq!(buf.roll([2, -3, 8]), buf);
    }

    #[test]
    fn test_map() {
        let buf = ramp([1, 2, 2]);
        let doubled = buf.map(|&v| v as f32 * 2.0);
        assert_eq!(doubled.voxels(), &[0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_new_filled_and_fill() {
        let mut buf = Buffer3::new_filled([2, 2, 2], 3u8);
        assert!(buf.iter().all(|&v| v == 3));
        buf.fill(9);
        assert!(buf.iter().all(|&v| v == 9));
    }
}
