//! Trilinear interpolation over a regular voxel grid.
//!
//! Used to resample candidates onto a finer grid before sub-voxel alignment.
//! Supersampling with factor `n` inserts `n` samples between neighbouring grid
//! nodes, so an axis with `p` samples becomes `(p - 1)(n + 1) + 1` samples and
//! every original node is reproduced exactly.


use common::Buffer3;
use rayon::prelude::*;

/// Piecewise-linear interpolant over a `Buffer3<f32>`.
///
/// Coordinates are fractional `(z, y, x)` grid positions; positions outside
/// the grid are clamped to the nearest edge.
#[derive(Debug, Clone, Copy)]
pub struct TrilinearInterpolator<'a> {
    grid: &'a Buffer3<f32>,
}

impl<'a> TrilinearInterpolator<'a> {
    pub fn new(grid: &'a Buffer3<f32>) -> Self {
        assert!(!grid.is_empty(), "interpolation grid must not be empty");
        Self { grid }
    }

    /// Samples the interpolant at fractional grid position `(z, y, x)`.
    pub fn sample(&self, z: f64, y: f64, x: f64) -> f32 {
        let shape = self.grid.shape();
        let (z0, z1, fz) = split(z, shape[0]);
        let (y0, y1, fy) = split(y, shape[1]);
        let (x0, x1, fx) = split(x, shape[2]);
        self.blend([z0, z1], [y0, y1], [x0, x1], [fz, fy, fx])
    }

    #[inline]
    fn blend(&self, z: [usize; 2], y: [usize; 2], x: [usize; 2], f: [f64; 3]) -> f32 {
        let g = self.grid;
        let lerp = |a: f32, b: f32, t: f64| {
            if t == 0.0 {
                a as f64
            } else {
                a as f64 + (b as f64 - a as f64) * t
            }
        };
        let plane = |zi: usize| {
            let row0 = lerp(g[(zi, y[0], x[0])], g[(zi, y[0], x[1])], f[2]);
            let row1 = lerp(g[(zi, y[1], x[0])], g[(zi, y[1], x[1])], f[2]);
            if f[1] == 0.0 {
                row0
            } else {
                row0 + (row1 - row0) * f[1]
            }
        };
        let p0 = plane(z[0]);
        if f[0] == 0.0 {
            return p0 as f32;
        }
        let p1 = plane(z[1]);
        (p0 + (p1 - p0) * f[0]) as f32
    }
}

/// Splits a fractional coordinate into the bracketing nodes and the weight of
/// the upper node.
#[inline]
fn split(v: f64, n: usize) -> (usize, usize, f64) {
    let max = (n - 1) as f64;
    let v = v.clamp(0.0, max);
    let lo = v.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    (lo, hi, v - lo as f64)
}

/// Number of samples along an axis of `p` nodes after supersampling with `n`.
#[inline]
pub fn supersampled_len(p: usize, n: usize) -> usize {
    (p.max(1) - 1) * (n + 1) + 1
}

/// Resamples `grid` with `n` extra samples between neighbouring nodes per axis.
///
/// Sample positions are computed with integer arithmetic so original nodes
/// land on exact grid positions.
pub fn supersample(grid: &Buffer3<f32>, n: usize) -> Buffer3<f32> {
    let interp = TrilinearInterpolator::new(grid);
    let step = n + 1;
    let shape = grid.shape().map(|p| supersampled_len(p, n));
    let (height, width) = (shape[1], shape[2]);

    let node = |i: usize, len: usize| {
        let lo = (i / step).min(len - 1);
        let hi = (lo + 1).min(len - 1);
        (lo, hi, (i % step) as f64 / step as f64)
    };

    let mut out = Buffer3::new_default(shape);
    out.par_chunks_mut(height * width)
        .enumerate()
        .for_each(|(z, plane)| {
            let (z0, z1, fz) = node(z, grid.depth());
            for y in 0..height {
                let (y0, y1, fy) = node(y, grid.height());
                let row = &mut plane[y * width..(y + 1) * width];
                for (x, value) in row.iter_mut().enumerate() {
                    let (x0, x1, fx) = node(x, grid.width());
                    *value = interp.blend([z0, z1], [y0, y1], [x0, x1], [fz, fy, fx]);
                }
            }
        });
    out
}
