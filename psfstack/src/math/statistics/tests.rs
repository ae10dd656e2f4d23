use super::*;

#[test]
fn test_mean_std_matches_population_formula() {
    let stats = mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
    assert_eq!(stats.count, 8);
    assert!((stats.mean - 5.0).abs() < 1e-12);
    assert!((stats.std - 2.0).abs() < 1e-12);
}

#[test]
fn test_mean_std_empty_is_zero() {
    let stats = mean_std(&[]);
    assert_eq!(stats, MeanStd::default());
}

#[test]
fn test_mean_std_below_excludes_cut() {
    let stats = mean_std_below(&[1.0, 3.0, 5.0, 100.0], 5.0);
    assert_eq!(stats.count, 2);
    assert!((stats.mean - 2.0).abs() < 1e-12);
    assert!((stats.std - 1.0).abs() < 1e-12);
}

#[test]
fn test_mean_std_large_input_spans_chunks() {
    let values: Vec<f32> = (0..100_000).map(|i| (i % 2) as f32).collect();
    let stats = mean_std(&values);
    assert!((stats.mean - 0.5).abs() < 1e-9);
    assert!((stats.std - 0.5).abs() < 1e-9);
}

#[test]
fn test_percentile_interpolates_linearly() {
    // rank = 0.1 * 9 = 0.9 between 1 and 2
    let mut data: Vec<f32> = (1..=10).rev().map(|v| v as f32).collect();
    let p = percentile(&mut data, 10.0);
    assert!((p - 1.9).abs() < 1e-6, "got {p}");
}

#[test]
fn test_percentile_extremes() {
    let mut data = vec![3.0, -1.0, 7.0, 2.0];
    assert_eq!(percentile(&mut data, 0.0), -1.0);
    assert_eq!(percentile(&mut data, 100.0), 7.0);
    assert_eq!(percentile(&mut data, 50.0), 2.5);
}

#[test]
fn test_percentile_single_value() {
    assert_eq!(percentile(&mut [4.0], 10.0), 4.0);
}

#[test]
fn test_argmax_first_in_raster_order() {
    let mut buf = Buffer3::new_default([2, 2, 2]);
    buf[(0, 1, 1)] = 5.0;
    buf[(1, 0, 0)] = 5.0;
    assert_eq!(argmax(&buf), [0, 1, 1]);
}

#[test]
fn test_center_of_mass_symmetric_pair() {
    let mut buf = Buffer3::new_default([3, 3, 5]);
    buf[(1, 1, 1)] = 1.0;
    buf[(1, 1, 3)] = 1.0;
    let com = center_of_mass(&buf).unwrap();
    assert!((com - DVec3::new(2.0, 1.0, 1.0)).length() < 1e-12);
}

#[test]
fn test_center_of_mass_zero_weight_is_none() {
    let buf = Buffer3::<f32>::new_default([2, 2, 2]);
    assert!(center_of_mass(&buf).is_none());
}

#[test]
fn test_nearest_index_rounds_and_clamps() {
    let shape = [4, 4, 4];
    assert_eq!(nearest_index(DVec3::new(1.4, 2.6, 0.5), shape), [1, 3, 1]);
    assert_eq!(nearest_index(DVec3::new(-2.0, 9.0, 3.0), shape), [3, 3, 0]);
}
