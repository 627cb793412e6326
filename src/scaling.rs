//! Min-max normalization for features and targets

use crate::error::{ForecastError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Per-column min-max scaler
///
/// Fit once on the training partition, then reused read-only everywhere
/// else. `transform` maps the fitted range onto `[0, 1]`; values outside
/// the fitted range are **not clipped** and extrapolate linearly beyond
/// `[0, 1]`, matching the behavior the model was trained against. A
/// constant column (min == max) transforms to 0 and inverts back to the
/// fitted minimum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    mins: Vec<f64>,
    maxs: Vec<f64>,
}

impl MinMaxScaler {
    /// Fit a scaler to the columns of a matrix
    pub fn fit(matrix: &Array2<f64>) -> Result<Self> {
        if matrix.nrows() == 0 {
            return Err(ForecastError::DataError(
                "Cannot fit scaler to an empty matrix".to_string(),
            ));
        }

        let mut mins = vec![f64::INFINITY; matrix.ncols()];
        let mut maxs = vec![f64::NEG_INFINITY; matrix.ncols()];
        for row in matrix.rows() {
            for (j, &v) in row.iter().enumerate() {
                if v.is_nan() {
                    return Err(ForecastError::DataError(format!(
                        "NaN in column {} while fitting scaler",
                        j
                    )));
                }
                mins[j] = mins[j].min(v);
                maxs[j] = maxs[j].max(v);
            }
        }
        Ok(Self { mins, maxs })
    }

    /// Number of columns the scaler was fitted on
    pub fn n_columns(&self) -> usize {
        self.mins.len()
    }

    /// Fitted per-column (min, max) bounds
    pub fn bounds(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.mins.iter().copied().zip(self.maxs.iter().copied())
    }

    fn check_width(&self, matrix: &Array2<f64>) -> Result<()> {
        if matrix.ncols() != self.n_columns() {
            return Err(ForecastError::DataError(format!(
                "Matrix has {} columns but scaler was fitted on {}",
                matrix.ncols(),
                self.n_columns()
            )));
        }
        Ok(())
    }

    /// Map each column linearly onto the fitted `[min, max] -> [0, 1]`
    pub fn transform(&self, matrix: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(matrix)?;
        let mut out = matrix.clone();
        for mut row in out.rows_mut() {
            for (j, v) in row.iter_mut().enumerate() {
                let range = self.maxs[j] - self.mins[j];
                *v = if range == 0.0 {
                    *v - self.mins[j]
                } else {
                    (*v - self.mins[j]) / range
                };
            }
        }
        Ok(out)
    }

    /// Exact inverse of [`MinMaxScaler::transform`]
    pub fn inverse_transform(&self, matrix: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(matrix)?;
        let mut out = matrix.clone();
        for mut row in out.rows_mut() {
            for (j, v) in row.iter_mut().enumerate() {
                let range = self.maxs[j] - self.mins[j];
                *v = if range == 0.0 {
                    *v + self.mins[j]
                } else {
                    *v * range + self.mins[j]
                };
            }
        }
        Ok(out)
    }
}

/// The two independent scalers owned by a model artifact
///
/// `features` covers the 10-dim input space, `targets` the 5-dim
/// pollutant space. Both are fitted on the training partition only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerPair {
    pub features: MinMaxScaler,
    pub targets: MinMaxScaler,
}

impl ScalerPair {
    /// Fit both scalers on the training partitions
    pub fn fit(x_train: &Array2<f64>, y_train: &Array2<f64>) -> Result<Self> {
        Ok(Self {
            features: MinMaxScaler::fit(x_train)?,
            targets: MinMaxScaler::fit(y_train)?,
        })
    }
}
