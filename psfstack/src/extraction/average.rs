//! Running mean of aligned candidates.

use common::Buffer3;
use rayon::prelude::*;

use crate::extraction::error::Error;

const CHUNK_SIZE: usize = 16_384;

/// Sum and count of aligned candidates.
///
/// Accumulates in `f64`. Partial accumulators from parallel workers are
/// combined with [`PsfAccumulator::merge`].
#[derive(Debug, Clone)]
pub struct PsfAccumulator {
    sum: Buffer3<f64>,
    count: usize,
}

impl PsfAccumulator {
    pub fn new(shape: [usize; 3]) -> Self {
        Self {
            sum: Buffer3::new_default(shape),
            count: 0,
        }
    }

    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        self.sum.shape()
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Adds one aligned candidate.
    ///
    /// # Panics
    /// If the candidate shape differs from the accumulator shape.
    pub fn add(&mut self, candidate: &Buffer3<f32>) {
        assert_eq!(
            candidate.shape(),
            self.shape(),
            "candidate shape must match the accumulator"
        );
        self.sum
            .par_chunks_mut(CHUNK_SIZE)
            .zip(candidate.par_chunks(CHUNK_SIZE))
            .for_each(|(acc, src)| {
                for (a, &v) in acc.iter_mut().zip(src) {
                    *a += v as f64;
                }
            });
        self.count += 1;
    }

    /// Folds another partial accumulator into this one.
    pub fn merge(mut self, other: Self) -> Self {
        if other.count == 0 {
            return self;
        }
        if self.count == 0 {
            return other;
        }
        assert_eq!(self.shape(), other.shape(), "accumulator shapes differ");
        for (a, b) in self.sum.iter_mut().zip(other.sum.iter()) {
            *a += b;
        }
        self.count += other.count;
        self
    }

    /// Mean of all added candidates with negative values clipped to zero.
    ///
    /// `survived` is only reported in the error when nothing was added.
    pub fn finalize(self, survived: usize) -> Result<Buffer3<f32>, Error> {
        if self.count == 0 {
            return Err(Error::EmptyAverage { survived });
        }
        let n = self.count as f64;
        Ok(self.sum.map(|&s| ((s / n) as f32).max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_of_two() {
        let mut acc = PsfAccumulator::new([1, 2, 2]);
        acc.add(&Buffer3::new(1, 2, 2, vec![1.0, 2.0, 3.0, 4.0]));
        acc.add(&Buffer3::new(1, 2, 2, vec![3.0, 2.0, 1.0, 0.0]));
        assert_eq!(acc.count(), 2);
        let mean = acc.finalize(2).unwrap();
        assert_eq!(mean.voxels(), &[2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_negative_values_clipped() {
        let mut acc = PsfAccumulator::new([1, 1, 3]);
        acc.add(&Buffer3::new(1, 1, 3, vec![-1.0, 0.5, 1.0]));
        acc.add(&Buffer3::new(1, 1, 3, vec![-0.5, -1.0, 1.0]));
        let mean = acc.finalize(2).unwrap();
        assert_eq!(mean.voxels(), &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_empty_average_is_an_error() {
        let acc = PsfAccumulator::new([3, 3, 3]);
        let err = acc.finalize(4).unwrap_err();
        assert!(matches!(err, Error::EmptyAverage { survived: 4 }));
    }

    #[test]
    fn test_merge_partials() {
        let mut a = PsfAccumulator::new([1, 1, 2]);
        a.add(&Buffer3::new(1, 1, 2, vec![1.0, 0.0]));
        let mut b = PsfAccumulator::new([1, 1, 2]);
        b.add(&Buffer3::new(1, 1, 2, vec![0.0, 1.0]));
        b.add(&Buffer3::new(1, 1, 2, vec![2.0, 2.0]));

        let merged = a.merge(b).merge(PsfAccumulator::new([1, 1, 2]));
        assert_eq!(merged.count(), 3);
        assert_eq!(merged.finalize(3).unwrap().voxels(), &[1.0, 1.0]);
    }

    #[test]
    fn test_merge_with_empty_identity() {
        let mut a = PsfAccumulator::new([2, 2, 2]);
        a.add(&Buffer3::new_filled([2, 2, 2], 3.0));
        let merged = PsfAccumulator::new([2, 2, 2]).merge(a);
        assert_eq!(merged.count(), 1);
        assert!(merged.finalize(1).unwrap().iter().all(|&v| v == 3.0));
    }

    #[test]
    #[should_panic(expected = "candidate shape must match the accumulator")]
    fn test_shape_mismatch_panics() {
        let mut acc = PsfAccumulator::new([2, 2, 2]);
        acc.add(&Buffer3::new_filled([1, 2, 2], 1.0));
    }
}
