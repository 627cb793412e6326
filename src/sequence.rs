//! Supervised-sequence construction and chronological splitting

use ndarray::{s, Array2, Array3};

/// Split a matrix chronologically into train and test partitions
///
/// The test partition is the trailing `test_ratio` share of rows, rounded
/// to the nearest row rather than up: 41 rows at 0.2 hold out 8, not 9.
/// No shuffling: the tail of the series is always the held-out part. A
/// ratio outside `(0, 1)` keeps everything in train.
pub fn train_test_split(matrix: &Array2<f64>, test_ratio: f64) -> (Array2<f64>, Array2<f64>) {
    if matrix.nrows() == 0 || test_ratio <= 0.0 || test_ratio >= 1.0 {
        return (matrix.clone(), Array2::zeros((0, matrix.ncols())));
    }

    let test_size = (matrix.nrows() as f64 * test_ratio).round() as usize;
    let train_size = matrix.nrows() - test_size;

    let train = matrix.slice(s![..train_size, ..]).to_owned();
    let test = matrix.slice(s![train_size.., ..]).to_owned();
    (train, test)
}

/// Build single-step-ahead supervised pairs from aligned matrices
///
/// For every offset `i` in `[0, len - time_step)` the window is
/// `x[i..i + time_step]` and the target is `y[i + time_step]`: the model
/// learns to predict the pollutant vector immediately following a window
/// of `time_step` full feature rows. Yields exactly
/// `max(0, len - time_step)` pairs.
pub fn make_sequences(
    x: &Array2<f64>,
    y: &Array2<f64>,
    time_step: usize,
) -> (Array3<f64>, Array2<f64>) {
    let n = x.nrows().saturating_sub(time_step);
    let mut windows = Array3::<f64>::zeros((n, time_step, x.ncols()));
    let mut targets = Array2::<f64>::zeros((n, y.ncols()));

    for i in 0..n {
        windows
            .slice_mut(s![i, .., ..])
            .assign(&x.slice(s![i..i + time_step, ..]));
        targets.row_mut(i).assign(&y.row(i + time_step));
    }
    (windows, targets)
}
