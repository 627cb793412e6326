//! Autoregressive multi-step forecasting
//!
//! The forecaster rolls a fixed-length window forward one day at a time:
//! each day's meteorology is supplied, each day's pollutants start as a
//! persistence placeholder (yesterday's values), the scaled window runs
//! through the model, and the model output replaces the placeholder
//! before the window rolls on. Errors therefore compound forward, which
//! is why every numeric policy here (scaling, fills, placeholder) must
//! match training exactly.

use crate::artifact::ModelArtifact;
use crate::data::{target_columns, TimeTable, METEOROLOGY};
use crate::error::{ForecastError, Result};
use crate::history::{merge_history, HistoryPayload};
use chrono::{Duration, NaiveDate};
use log::info;
use ndarray::{s, Array1, Array2};
use serde::Serialize;

/// Days added by the second-week extension
pub const EXTENSION_DAYS: usize = 7;

/// One forecasted day in physical units
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRecord {
    pub date: NaiveDate,
    #[serde(rename = "PM10")]
    pub pm10: f64,
    #[serde(rename = "SO2")]
    pub so2: f64,
    #[serde(rename = "CO")]
    pub co: f64,
    #[serde(rename = "O3")]
    pub o3: f64,
    #[serde(rename = "NO2")]
    pub no2: f64,
}

/// Ordered, date-indexed table of predicted pollutant values
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    table: TimeTable,
}

impl ForecastResult {
    fn new(table: TimeTable) -> Self {
        Self { table }
    }

    /// Underlying table (rows = forecast days, columns = pollutants)
    pub fn table(&self) -> &TimeTable {
        &self.table
    }

    /// Number of forecasted days
    pub fn len(&self) -> usize {
        self.table.height()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Serializable per-day records, ascending by date
    pub fn records(&self) -> Vec<ForecastRecord> {
        (0..self.table.height())
            .map(|i| {
                let row = self.table.row(i);
                ForecastRecord {
                    date: self.table.dates()[i],
                    pm10: row[0],
                    so2: row[1],
                    co: row[2],
                    o3: row[3],
                    no2: row[4],
                }
            })
            .collect()
    }

    /// Date-sorted concatenation of two horizons
    pub fn concat(&self, other: &Self) -> Result<Self> {
        Ok(Self::new(self.table.concat(&other.table)?.sort_by_date()?))
    }
}

/// Forecasts pollutant concentrations from a trained artifact
#[derive(Debug)]
pub struct AutoregressiveForecaster<'a> {
    artifact: &'a ModelArtifact,
}

impl<'a> AutoregressiveForecaster<'a> {
    pub fn new(artifact: &'a ModelArtifact) -> Self {
        Self { artifact }
    }

    /// Forecast one row per meteorology row, strictly in date order
    ///
    /// `history`, when given, must carry every feature column; its tail
    /// becomes the rolling window seed. Without it the artifact's stored
    /// seed window is used.
    pub fn forecast(
        &self,
        history: Option<&TimeTable>,
        meteorology: &TimeTable,
    ) -> Result<ForecastResult> {
        let metadata = &self.artifact.metadata;
        let time_step = metadata.time_step;
        if time_step < 2 {
            return Err(ForecastError::InvalidParameter(
                "time_step must be at least 2 for autoregressive forecasting".to_string(),
            ));
        }

        let seed = match history {
            Some(h) => clean_history(h, metadata.features.as_slice(), metadata.targets.as_slice())?
                .tail(time_step),
            None => self.artifact.seed_window.clone(),
        };
        if seed.height() < time_step {
            return Err(ForecastError::ForecastingError(format!(
                "Window seed has {} rows but time_step={}",
                seed.height(),
                time_step
            )));
        }
        let bad = seed.nan_columns();
        if !bad.is_empty() {
            return Err(ForecastError::ForecastingError(format!(
                "Initial window contains missing values. Affected columns: {}",
                bad.join(", ")
            )));
        }

        let met = meteorology
            .select(&METEOROLOGY.iter().map(|s| s.to_string()).collect::<Vec<_>>())?
            .sort_by_date()?;
        for (i, date) in met.dates().iter().enumerate() {
            if let Some(j) = met.row(i).iter().position(|v| !v.is_finite()) {
                return Err(ForecastError::DataError(format!(
                    "Future meteorology has a missing value on {} for '{}'",
                    date,
                    met.columns()[j]
                )));
            }
        }

        // Rolling state: last time_step feature rows, owned by this call
        let mut window = seed.select(&metadata.features)?.values().clone();
        let mut window_dates = seed.dates().to_vec();

        let target_idx: Vec<usize> = metadata
            .targets
            .iter()
            .map(|t| column_position(&metadata.features, t))
            .collect::<Result<_>>()?;
        let met_idx: Vec<usize> = METEOROLOGY
            .iter()
            .map(|m| column_position(&metadata.features, m))
            .collect::<Result<_>>()?;

        let mut out_dates = Vec::with_capacity(met.height());
        let mut out_values = Array2::<f64>::zeros((met.height(), metadata.targets.len()));

        for (step, date) in met.dates().iter().enumerate() {
            // 1-2: candidate row with known meteorology, pollutants
            // unresolved; roll the window forward one day
            let mut candidate = Array1::<f64>::from_elem(metadata.features.len(), f64::NAN);
            for (j, &col) in met_idx.iter().enumerate() {
                candidate[col] = met.values()[[step, j]];
            }
            roll_window(&mut window, &mut window_dates, *date, &candidate);

            // 3: defensive repair of the rows preceding the candidate
            if window
                .slice(s![..time_step - 1, ..])
                .iter()
                .any(|v| v.is_nan())
            {
                ffill_bfill_rows(&mut window, time_step - 1);
            }

            // 4: persistence placeholder so the window can be scaled;
            // never the emitted value
            for &col in &target_idx {
                window[[time_step - 1, col]] = window[[time_step - 2, col]];
            }

            // 5: anything still missing is an unrecoverable input gap
            if let Some((r, c)) = find_nan(&window) {
                return Err(ForecastError::ForecastingError(format!(
                    "Missing value remains before scaling: {} -> {}",
                    window_dates[r], metadata.features[c]
                )));
            }

            // 6: scale, run the model, inverse-transform
            let scaled = self.artifact.scalers.features.transform(&window)?;
            let pred_scaled = self.artifact.model.predict(scaled.view())?;
            let pred_matrix = self
                .artifact
                .scalers
                .targets
                .inverse_transform(&pred_scaled.insert_axis(ndarray::Axis(0)))?;
            let prediction = pred_matrix.row(0);

            // 7: the forecast replaces the placeholder and is carried
            // forward as that day's value
            for (j, &col) in target_idx.iter().enumerate() {
                window[[time_step - 1, col]] = prediction[j];
            }
            out_dates.push(*date);
            out_values.row_mut(step).assign(&prediction);
        }

        let table = TimeTable::new(out_dates, metadata.targets.clone(), out_values)?;
        Ok(ForecastResult::new(table))
    }

    /// Extend a meteorology horizon by repeating its last row
    ///
    /// Naive constant extrapolation: no trend or seasonality model for
    /// the meteorology itself.
    pub fn extend_meteorology(meteorology: &TimeTable, extra_days: usize) -> Result<TimeTable> {
        if meteorology.is_empty() {
            return Err(ForecastError::DataError(
                "Cannot extend an empty meteorology horizon".to_string(),
            ));
        }
        let last_idx = meteorology.height() - 1;
        let last_date = meteorology.dates()[last_idx];
        let last_row = meteorology.row(last_idx).to_owned();

        let mut dates = Vec::with_capacity(extra_days);
        let mut values = Array2::<f64>::zeros((extra_days, meteorology.width()));
        for i in 0..extra_days {
            dates.push(last_date + Duration::days(i as i64 + 1));
            values.row_mut(i).assign(&last_row);
        }
        TimeTable::new(dates, meteorology.columns().to_vec(), values)
    }

    /// Full two-horizon run: forecast the requested week, then chain a
    /// second pass over constant-extrapolated meteorology seeded with the
    /// first week's own output
    pub fn forecast_two_weeks(
        &self,
        history: Option<&HistoryPayload>,
        meteorology: &TimeTable,
    ) -> Result<TwoWeekForecast> {
        let metadata = &self.artifact.metadata;

        let merged = match history {
            Some(payload) => Some(merge_history(payload, self.artifact)?),
            None => None,
        };

        let week1 = self.forecast(merged.as_ref(), meteorology)?;
        info!(
            "week-1 horizon forecast: {} days from {:?}",
            week1.len(),
            meteorology.dates().first()
        );

        // Week-2 seed: prior history (merged or stored) followed by the
        // first week's meteorology joined with its own forecasts
        let base = match &merged {
            Some(m) => m.clone(),
            None => self.artifact.seed_window.clone(),
        };
        let week1_features = join_features(meteorology, &week1, metadata.features.as_slice())?;
        let seed2 = base.concat(&week1_features)?.sort_by_date()?;

        let met2 = Self::extend_meteorology(meteorology, EXTENSION_DAYS)?;
        let week2 = self.forecast(Some(&seed2), &met2)?;

        let combined = week1.concat(&week2)?;
        Ok(TwoWeekForecast {
            week1,
            week2,
            combined,
        })
    }
}

/// Both horizons plus their date-sorted concatenation
#[derive(Debug, Clone)]
pub struct TwoWeekForecast {
    pub week1: ForecastResult,
    pub week2: ForecastResult,
    pub combined: ForecastResult,
}

/// Clean a full-feature history the same way training data is cleaned
fn clean_history(history: &TimeTable, features: &[String], targets: &[String]) -> Result<TimeTable> {
    let table = history.select(&features.to_vec())?.sort_by_date()?;
    Ok(table.zeros_to_nan(&targets.to_vec())?.interpolate())
}

/// Join a meteorology horizon with its forecasted pollutants into
/// full-feature rows
fn join_features(
    meteorology: &TimeTable,
    forecast: &ForecastResult,
    features: &[String],
) -> Result<TimeTable> {
    let met = meteorology.sort_by_date()?;
    let preds = forecast.table();

    let mut values = Array2::<f64>::zeros((met.height(), features.len()));
    for (i, date) in met.dates().iter().enumerate() {
        let pred_row = preds.date_position(*date).ok_or_else(|| {
            ForecastError::ForecastingError(format!("Forecast missing for day {}", date))
        })?;
        for (j, name) in features.iter().enumerate() {
            values[[i, j]] = if target_columns().contains(name) {
                preds.cell(pred_row, name)?
            } else {
                met.cell(i, name)?
            };
        }
    }
    TimeTable::new(met.dates().to_vec(), features.to_vec(), values)
}

fn column_position(columns: &[String], name: &str) -> Result<usize> {
    columns
        .iter()
        .position(|c| c == name)
        .ok_or_else(|| ForecastError::DataError(format!("Column '{}' not found", name)))
}

/// Drop the oldest row and append the candidate
fn roll_window(
    window: &mut Array2<f64>,
    dates: &mut Vec<NaiveDate>,
    date: NaiveDate,
    candidate: &Array1<f64>,
) {
    let rows = window.nrows();
    for i in 0..rows - 1 {
        let next = window.row(i + 1).to_owned();
        window.row_mut(i).assign(&next);
    }
    window.row_mut(rows - 1).assign(candidate);
    dates.remove(0);
    dates.push(date);
}

/// Forward- then backward-fill NaN cells column-wise over the first
/// `rows` rows
fn ffill_bfill_rows(window: &mut Array2<f64>, rows: usize) {
    for j in 0..window.ncols() {
        let mut last = f64::NAN;
        for i in 0..rows {
            if window[[i, j]].is_nan() {
                window[[i, j]] = last;
            } else {
                last = window[[i, j]];
            }
        }
        let mut next = f64::NAN;
        for i in (0..rows).rev() {
            if window[[i, j]].is_nan() {
                window[[i, j]] = next;
            } else {
                next = window[[i, j]];
            }
        }
    }
}

/// First NaN cell of a matrix, if any
fn find_nan(matrix: &Array2<f64>) -> Option<(usize, usize)> {
    for i in 0..matrix.nrows() {
        for j in 0..matrix.ncols() {
            if matrix[[i, j]].is_nan() {
                return Some((i, j));
            }
        }
    }
    None
}
