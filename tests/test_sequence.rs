use forecast_air::sequence::{make_sequences, train_test_split};
use ndarray::{Array2, Axis};
use rstest::rstest;

/// x[i][j] = 10*i + j so every window cell is recognizable
fn matrix(rows: usize, cols: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(i, j)| (10 * i + j) as f64)
}

#[rstest]
#[case(10, 7, 3)]
#[case(8, 7, 1)]
#[case(7, 7, 0)]
#[case(3, 7, 0)]
#[case(20, 1, 19)]
fn test_window_count_invariant(#[case] rows: usize, #[case] time_step: usize, #[case] expected: usize) {
    let x = matrix(rows, 10);
    let y = matrix(rows, 5);
    let (windows, targets) = make_sequences(&x, &y, time_step);

    assert_eq!(windows.len_of(Axis(0)), expected);
    assert_eq!(targets.nrows(), expected);
    if expected > 0 {
        assert_eq!(windows.len_of(Axis(1)), time_step);
        assert_eq!(windows.len_of(Axis(2)), 10);
        assert_eq!(targets.ncols(), 5);
    }
}

#[test]
fn test_window_and_target_alignment() {
    let x = matrix(6, 3);
    let y = matrix(6, 2);
    let (windows, targets) = make_sequences(&x, &y, 4);

    // window_0 = x[0..4], target_0 = y[4]
    assert_eq!(windows[[0, 0, 0]], 0.0);
    assert_eq!(windows[[0, 3, 2]], 32.0);
    assert_eq!(targets[[0, 0]], 40.0);

    // window_1 = x[1..5], target_1 = y[5]
    assert_eq!(windows[[1, 0, 0]], 10.0);
    assert_eq!(targets[[1, 1]], 51.0);
}

#[test]
fn test_split_is_chronological() {
    let m = matrix(10, 2);
    let (train, test) = train_test_split(&m, 0.2);

    assert_eq!(train.nrows(), 8);
    assert_eq!(test.nrows(), 2);
    // Train is the head, test is the tail
    assert_eq!(train[[0, 0]], 0.0);
    assert_eq!(test[[0, 0]], 80.0);
    assert_eq!(test[[1, 0]], 90.0);
}

#[rstest]
#[case(0.0)]
#[case(1.0)]
#[case(-0.5)]
fn test_degenerate_ratio_keeps_everything_in_train(#[case] ratio: f64) {
    let m = matrix(5, 2);
    let (train, test) = train_test_split(&m, ratio);
    assert_eq!(train.nrows(), 5);
    assert_eq!(test.nrows(), 0);
}

#[rstest]
#[case(7, 1)]
#[case(41, 8)]
#[case(43, 9)]
fn test_split_rounds_to_nearest_row(#[case] rows: usize, #[case] expected_test: usize) {
    // Nearest-row rounding, not ceiling: 41 * 0.2 = 8.2 holds out 8
    let m = matrix(rows, 1);
    let (train, test) = train_test_split(&m, 0.2);
    assert_eq!(train.nrows(), rows - expected_test);
    assert_eq!(test.nrows(), expected_test);
}
