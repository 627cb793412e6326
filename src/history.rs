//! User-supplied history payloads and their reconciliation with a
//! stored seed window

use crate::artifact::ModelArtifact;
use crate::data::{TimeTable, METEOROLOGY};
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// History carrying every feature column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullFeatureHistory {
    pub dates: Vec<NaiveDate>,
    pub temperature: Vec<f64>,
    pub humidity: Vec<f64>,
    pub rainfall: Vec<f64>,
    pub sunshine: Vec<f64>,
    pub wind_speed: Vec<f64>,
    #[serde(rename = "PM10")]
    pub pm10: Vec<f64>,
    #[serde(rename = "SO2")]
    pub so2: Vec<f64>,
    #[serde(rename = "CO")]
    pub co: Vec<f64>,
    #[serde(rename = "O3")]
    pub o3: Vec<f64>,
    #[serde(rename = "NO2")]
    pub no2: Vec<f64>,
}

/// History carrying only the five pollutant columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollutantHistory {
    pub dates: Vec<NaiveDate>,
    #[serde(rename = "PM10")]
    pub pm10: Vec<f64>,
    #[serde(rename = "SO2")]
    pub so2: Vec<f64>,
    #[serde(rename = "CO")]
    pub co: Vec<f64>,
    #[serde(rename = "O3")]
    pub o3: Vec<f64>,
    #[serde(rename = "NO2")]
    pub no2: Vec<f64>,
}

/// Optional history attached to a forecast request
///
/// Either every feature column or at least every target column must be
/// present; a payload matching neither variant is rejected during
/// deserialization or by [`HistoryPayload::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HistoryPayload {
    FullFeatures(FullFeatureHistory),
    PollutantsOnly(PollutantHistory),
}

fn check_length(name: &str, len: usize, expected: usize) -> Result<()> {
    if len != expected {
        return Err(ForecastError::ValidationError(format!(
            "{} length ({}) must equal dates length ({})",
            name, len, expected
        )));
    }
    Ok(())
}

impl HistoryPayload {
    /// Cross-field length checks, run before any merging
    pub fn validate(&self) -> Result<()> {
        match self {
            HistoryPayload::FullFeatures(h) => {
                if h.dates.is_empty() {
                    return Err(ForecastError::ValidationError(
                        "History must contain at least one date".to_string(),
                    ));
                }
                let n = h.dates.len();
                check_length("PM10", h.pm10.len(), n)?;
                check_length("SO2", h.so2.len(), n)?;
                check_length("CO", h.co.len(), n)?;
                check_length("O3", h.o3.len(), n)?;
                check_length("NO2", h.no2.len(), n)?;
                check_length("temperature", h.temperature.len(), n)?;
                check_length("humidity", h.humidity.len(), n)?;
                check_length("rainfall", h.rainfall.len(), n)?;
                check_length("sunshine", h.sunshine.len(), n)?;
                check_length("wind_speed", h.wind_speed.len(), n)?;
            }
            HistoryPayload::PollutantsOnly(h) => {
                if h.dates.is_empty() {
                    return Err(ForecastError::ValidationError(
                        "History must contain at least one date".to_string(),
                    ));
                }
                let n = h.dates.len();
                check_length("PM10", h.pm10.len(), n)?;
                check_length("SO2", h.so2.len(), n)?;
                check_length("CO", h.co.len(), n)?;
                check_length("O3", h.o3.len(), n)?;
                check_length("NO2", h.no2.len(), n)?;
            }
        }
        Ok(())
    }

    /// Dates covered by the payload
    pub fn dates(&self) -> &[NaiveDate] {
        match self {
            HistoryPayload::FullFeatures(h) => &h.dates,
            HistoryPayload::PollutantsOnly(h) => &h.dates,
        }
    }

    /// Column names the payload carries, in table order
    fn column_names(&self) -> Vec<String> {
        match self {
            HistoryPayload::FullFeatures(_) => crate::data::feature_columns(),
            HistoryPayload::PollutantsOnly(_) => crate::data::target_columns(),
        }
    }

    /// Convert the payload into a date-sorted [`TimeTable`]
    pub fn to_table(&self) -> Result<TimeTable> {
        self.validate()?;
        let columns = self.column_names();
        let series: Vec<&[f64]> = match self {
            HistoryPayload::FullFeatures(h) => vec![
                &h.pm10, &h.so2, &h.co, &h.o3, &h.no2, &h.temperature, &h.humidity, &h.rainfall,
                &h.sunshine, &h.wind_speed,
            ],
            HistoryPayload::PollutantsOnly(h) => {
                vec![&h.pm10, &h.so2, &h.co, &h.o3, &h.no2]
            }
        };

        let n = self.dates().len();
        let mut values = Array2::<f64>::zeros((n, columns.len()));
        for (j, col) in series.into_iter().enumerate() {
            for (i, &v) in col.iter().enumerate() {
                values[[i, j]] = v;
            }
        }
        TimeTable::new(self.dates().to_vec(), columns, values)?.sort_by_date()
    }
}

/// Reconcile a user history with an artifact's stored seed window
///
/// The result is a full-feature table over the union of the seed window's
/// and the history's dates, in the artifact's feature-column order. User
/// values take precedence at matching dates: a full-feature history
/// overwrites whole rows, a pollutants-only history overwrites only the
/// target cells while meteorology comes from the seed window, forward-
/// and backward-filled across any date gaps.
pub fn merge_history(payload: &HistoryPayload, artifact: &ModelArtifact) -> Result<TimeTable> {
    let user = payload.to_table()?;
    let seed = &artifact.seed_window;

    let base = seed.reindex_union(user.dates())?;

    let overwrite: Vec<String> = match payload {
        HistoryPayload::FullFeatures(_) => artifact.metadata.features.clone(),
        HistoryPayload::PollutantsOnly(_) => artifact.metadata.targets.clone(),
    };

    let mut merged = base;
    for (row, date) in user.dates().iter().enumerate() {
        let pos = merged
            .date_position(*date)
            .ok_or_else(|| ForecastError::DataError(format!("Date {} lost in reindex", date)))?;
        let cells: Vec<f64> = overwrite
            .iter()
            .map(|name| user.cell(row, name))
            .collect::<Result<_>>()?;
        merged = merged.with_cells(pos, &overwrite, &cells)?;
    }

    let met_columns: Vec<String> = METEOROLOGY.iter().map(|s| s.to_string()).collect();
    let merged = merged.ffill_bfill(&met_columns)?;
    merged.select(&artifact.metadata.features)
}

/// A forecast request: one horizon of future meteorology plus optional
/// history
///
/// Transport and authentication live upstream; this type only owns the
/// payload validation the forecaster depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub dates: Vec<NaiveDate>,
    pub temperature: Vec<f64>,
    pub humidity: Vec<f64>,
    pub rainfall: Vec<f64>,
    pub sunshine: Vec<f64>,
    pub wind_speed: Vec<f64>,
    #[serde(default)]
    pub history: Option<HistoryPayload>,
}

impl ForecastRequest {
    /// Validate lengths and values before the forecaster runs
    pub fn validate(&self) -> Result<()> {
        if self.dates.is_empty() {
            return Err(ForecastError::ValidationError(
                "Request must contain at least one date".to_string(),
            ));
        }
        let n = self.dates.len();
        check_length("temperature", self.temperature.len(), n)?;
        check_length("humidity", self.humidity.len(), n)?;
        check_length("rainfall", self.rainfall.len(), n)?;
        check_length("sunshine", self.sunshine.len(), n)?;
        check_length("wind_speed", self.wind_speed.len(), n)?;

        for (name, series) in [
            ("temperature", &self.temperature),
            ("humidity", &self.humidity),
            ("rainfall", &self.rainfall),
            ("sunshine", &self.sunshine),
            ("wind_speed", &self.wind_speed),
        ] {
            if let Some(i) = series.iter().position(|v| !v.is_finite()) {
                return Err(ForecastError::ValidationError(format!(
                    "Future meteorology has an invalid value on {} for '{}'",
                    self.dates[i], name
                )));
            }
        }

        if let Some(history) = &self.history {
            history.validate()?;
        }
        Ok(())
    }

    /// The requested meteorology horizon as a date-sorted table
    pub fn meteorology_table(&self) -> Result<TimeTable> {
        self.validate()?;
        let columns: Vec<String> = METEOROLOGY.iter().map(|s| s.to_string()).collect();
        let series = [
            &self.temperature,
            &self.humidity,
            &self.rainfall,
            &self.sunshine,
            &self.wind_speed,
        ];
        let mut values = Array2::<f64>::zeros((self.dates.len(), columns.len()));
        for (j, col) in series.into_iter().enumerate() {
            for (i, &v) in col.iter().enumerate() {
                values[[i, j]] = v;
            }
        }
        TimeTable::new(self.dates.clone(), columns, values)?.sort_by_date()
    }
}
