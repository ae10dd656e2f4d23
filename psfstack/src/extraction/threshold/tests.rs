use super::*;
use crate::testing::synthetic::{add_gaussian_noise, gaussian_volume};

#[test]
fn test_smooth_none_copies_input() {
    let input = gaussian_volume([9, 9, 9], &[[4.0, 4.0, 4.0]], [1.0; 3], 10.0, 0.0);
    let output = smooth(&input, Blur::None);
    assert_eq!(output, input);
}

#[test]
fn test_smooth_lowers_peak() {
    let input = gaussian_volume([17, 17, 17], &[[8.0, 8.0, 8.0]], [1.0; 3], 100.0, 0.0);
    let output = smooth(&input, Blur::Isotropic(1.0));
    assert!(output[(8, 8, 8)] < input[(8, 8, 8)]);
    assert_eq!(crate::math::argmax(&output), [8, 8, 8]);
}

#[test]
fn test_binary_mask_cut_at_fraction_of_max() {
    let smoothed = Buffer3::from_shape([1, 1, 5], vec![0.0, 10.0, 19.9, 20.0, 100.0]);
    let result = threshold(
        &smoothed,
        ThresholdMethod::Relative {
            relative_threshold: 0.2,
            value_tolerance: 0.0,
        },
    );
    assert_eq!(result.cut, 20.0);
    assert_eq!(result.mask.voxels(), &[0.0, 0.0, 0.0, 1.0, 1.0]);
    assert!(result.background.is_none());
}

#[test]
fn test_graded_mask_keeps_values() {
    let smoothed = Buffer3::from_shape([1, 1, 4], vec![5.0, 30.0, 60.0, 100.0]);
    let result = threshold(
        &smoothed,
        ThresholdMethod::Relative {
            relative_threshold: 0.5,
            value_tolerance: 3.0,
        },
    );
    assert_eq!(result.mask.voxels(), &[0.0, 0.0, 60.0, 100.0]);
}

#[test]
fn test_all_zero_volume_has_empty_mask() {
    let smoothed = Buffer3::new_default([4, 4, 4]);
    let result = threshold(&smoothed, ThresholdMethod::default());
    assert!(result.mask.iter().all(|&v| v == 0.0));
}

#[test]
fn test_background_estimate_on_noise() {
    let mut volume = Buffer3::new_filled([32, 32, 32], 100.0f32);
    add_gaussian_noise(&mut volume, 5.0, 7);
    let estimate = estimate_background(&volume, 3.0, 10, 0.001);
    assert!((estimate.mean - 100.0).abs() < 0.5, "mean {}", estimate.mean);
    assert!(estimate.std > 3.5 && estimate.std < 5.5, "std {}", estimate.std);
    assert!(estimate.iterations >= 1 && estimate.iterations <= 10);
}

#[test]
fn test_background_estimate_ignores_bright_sources() {
    let mut volume = gaussian_volume(
        [32, 32, 32],
        &[[16.0, 16.0, 16.0]],
        [1.5; 3],
        10_000.0,
        50.0,
    );
    add_gaussian_noise(&mut volume, 2.0, 11);
    let estimate = estimate_background(&volume, 3.0, 10, 0.001);
    assert!((estimate.mean - 50.0).abs() < 1.0, "mean {}", estimate.mean);
    assert!(estimate.std < 3.0, "std {}", estimate.std);
    assert!(estimate.included < volume.len());
}

#[test]
fn test_background_estimate_respects_iteration_cap() {
    let values: Vec<f32> = (0..1000).map(|i| (i as f32).powi(2)).collect();
    let estimate = estimate_background(&values, 0.1, 2, 0.0);
    assert_eq!(estimate.iterations, 2);
}

#[test]
fn test_background_threshold_marks_source() {
    let volume = gaussian_volume([24, 24, 24], &[[12.0, 12.0, 12.0]], [2.0; 3], 1000.0, 0.0);
    let result = threshold(&volume, ThresholdMethod::background());
    let background = result.background.unwrap();
    assert!((result.cut - (background.mean + background.std)).abs() < 1e-9);
    assert_eq!(result.mask[(12, 12, 12)], 1.0);
    assert_eq!(result.mask[(0, 0, 0)], 0.0);
}
