//! Metrics for evaluating forecast performance

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Regression metrics for a single pollutant column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Mean Absolute Error
    #[serde(rename = "MAE")]
    pub mae: f64,
    /// Mean Absolute Percentage Error (fraction, not percent)
    #[serde(rename = "MAPE")]
    pub mape: f64,
    /// Mean Squared Error
    #[serde(rename = "MSE")]
    pub mse: f64,
    /// Root Mean Squared Error
    #[serde(rename = "RMSE")]
    pub rmse: f64,
    /// Coefficient of determination
    #[serde(rename = "R2")]
    pub r2: f64,
}

impl std::fmt::Display for RegressionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MAE={:.3} | MAPE={:.3} | MSE={:.3} | RMSE={:.3} | R2={:.3}",
            self.mae, self.mape, self.mse, self.rmse, self.r2
        )
    }
}

/// Evaluate one pollutant column in physical units
///
/// Inputs are expected to be inverse-scaled already. MAPE denominators
/// are epsilon-guarded so an occasional true zero does not blow up the
/// metric.
pub fn evaluate_column(y_true: &[f64], y_pred: &[f64]) -> Result<RegressionMetrics> {
    if y_true.len() != y_pred.len() || y_true.is_empty() {
        return Err(ForecastError::ValidationError(
            "True and predicted values must have the same non-zero length".to_string(),
        ));
    }

    let n = y_true.len() as f64;
    let errors: Vec<f64> = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(&t, &p)| t - p)
        .collect();

    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
    let mse = errors.iter().map(|e| e.powi(2)).sum::<f64>() / n;
    let rmse = mse.sqrt();

    let mape = y_true
        .iter()
        .zip(errors.iter())
        .map(|(&t, &e)| e.abs() / t.abs().max(f64::EPSILON))
        .sum::<f64>()
        / n;

    let mean_true = y_true.iter().sum::<f64>() / n;
    let ss_tot = y_true.iter().map(|t| (t - mean_true).powi(2)).sum::<f64>();
    let ss_res = errors.iter().map(|e| e.powi(2)).sum::<f64>();
    // A constant truth column has no variance to explain; only an
    // exact fit scores 1
    let r2 = if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    };

    Ok(RegressionMetrics {
        mae,
        mape,
        mse,
        rmse,
        r2,
    })
}

/// Per-pollutant metrics plus an unweighted `Overall` mean
///
/// The map is ordered so JSON output is stable across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport(pub BTreeMap<String, RegressionMetrics>);

/// Key of the aggregate entry in an [`EvaluationReport`]
pub const OVERALL_KEY: &str = "Overall";

/// Evaluate every pollutant column independently and aggregate
///
/// `y_true` and `y_pred` are row-major matrices with one column per name
/// in `columns`; the `Overall` entry is the unweighted arithmetic mean of
/// each metric across the columns.
pub fn evaluate(
    y_true: &ndarray::Array2<f64>,
    y_pred: &ndarray::Array2<f64>,
    columns: &[String],
) -> Result<EvaluationReport> {
    if y_true.dim() != y_pred.dim() {
        return Err(ForecastError::ValidationError(format!(
            "Shape mismatch: true {:?} vs predicted {:?}",
            y_true.dim(),
            y_pred.dim()
        )));
    }
    if y_true.ncols() != columns.len() {
        return Err(ForecastError::ValidationError(format!(
            "Matrix has {} columns but {} names were given",
            y_true.ncols(),
            columns.len()
        )));
    }

    let mut report = BTreeMap::new();
    let mut sums = RegressionMetrics {
        mae: 0.0,
        mape: 0.0,
        mse: 0.0,
        rmse: 0.0,
        r2: 0.0,
    };

    for (j, name) in columns.iter().enumerate() {
        let t: Vec<f64> = y_true.column(j).to_vec();
        let p: Vec<f64> = y_pred.column(j).to_vec();
        let m = evaluate_column(&t, &p)?;
        sums.mae += m.mae;
        sums.mape += m.mape;
        sums.mse += m.mse;
        sums.rmse += m.rmse;
        sums.r2 += m.r2;
        report.insert(name.clone(), m);
    }

    let k = columns.len() as f64;
    report.insert(
        OVERALL_KEY.to_string(),
        RegressionMetrics {
            mae: sums.mae / k,
            mape: sums.mape / k,
            mse: sums.mse / k,
            rmse: sums.rmse / k,
            r2: sums.r2 / k,
        },
    );

    Ok(EvaluationReport(report))
}
