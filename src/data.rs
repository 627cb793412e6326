//! Time-indexed data handling for pollutant forecasting
//!
//! The central type is [`TimeTable`], an immutable date-indexed numeric
//! table. Every transform returns a new table; missing values are encoded
//! as NaN.

use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Pollutant concentration columns, in model target order
pub const POLLUTANTS: [&str; 5] = ["PM10", "SO2", "CO", "O3", "NO2"];

/// Meteorological covariate columns, in model feature order
pub const METEOROLOGY: [&str; 5] = [
    "temperature",
    "humidity",
    "rainfall",
    "sunshine",
    "wind_speed",
];

/// Name of the date column in input data
pub const DATE_COLUMN: &str = "date";

/// Days between 0001-01-01 (CE) and the Unix epoch
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Full feature column list: pollutants followed by meteorology
pub fn feature_columns() -> Vec<String> {
    POLLUTANTS
        .iter()
        .chain(METEOROLOGY.iter())
        .map(|s| s.to_string())
        .collect()
}

/// Target column list (the five pollutants)
pub fn target_columns() -> Vec<String> {
    POLLUTANTS.iter().map(|s| s.to_string()).collect()
}

/// Immutable date-indexed numeric table
///
/// Rows correspond to dates, columns to named f64 series. NaN marks a
/// missing value. All operations are pure and return new tables, so a
/// rolling window derived from one table never aliases another.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeTable {
    dates: Vec<NaiveDate>,
    columns: Vec<String>,
    values: Array2<f64>,
}

impl TimeTable {
    /// Create a table, checking that the value matrix matches the index
    pub fn new(dates: Vec<NaiveDate>, columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if values.nrows() != dates.len() || values.ncols() != columns.len() {
            return Err(ForecastError::DataError(format!(
                "Table shape {}x{} does not match {} dates and {} columns",
                values.nrows(),
                values.ncols(),
                dates.len(),
                columns.len()
            )));
        }
        Ok(Self {
            dates,
            columns,
            values,
        })
    }

    /// Number of rows
    pub fn height(&self) -> usize {
        self.dates.len()
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Check if the table has no rows
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Row dates, ascending if the table has been sorted
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Raw value matrix (rows x columns)
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Position of a named column
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| ForecastError::DataError(format!("Column '{}' not found", name)))
    }

    /// A single named column as a vector
    pub fn column(&self, name: &str) -> Result<Vec<f64>> {
        let idx = self.column_index(name)?;
        Ok(self.values.column(idx).to_vec())
    }

    /// View of a single row
    pub fn row(&self, idx: usize) -> ArrayView1<'_, f64> {
        self.values.row(idx)
    }

    /// Select (and reorder) columns by name
    pub fn select(&self, names: &[String]) -> Result<Self> {
        let mut out = Array2::<f64>::zeros((self.height(), names.len()));
        for (j, name) in names.iter().enumerate() {
            let src = self.column_index(name)?;
            out.column_mut(j).assign(&self.values.column(src));
        }
        Self::new(self.dates.clone(), names.to_vec(), out)
    }

    /// Sort rows ascending by date, rejecting duplicate dates
    ///
    /// Duplicate timestamps violate the series invariant and are refused
    /// loudly rather than silently deduplicated.
    pub fn sort_by_date(&self) -> Result<Self> {
        let mut order: Vec<usize> = (0..self.height()).collect();
        order.sort_by_key(|&i| self.dates[i]);

        for pair in order.windows(2) {
            if self.dates[pair[0]] == self.dates[pair[1]] {
                return Err(ForecastError::DataError(format!(
                    "Duplicate date in series: {}",
                    self.dates[pair[0]]
                )));
            }
        }

        let dates = order.iter().map(|&i| self.dates[i]).collect();
        let values = self.values.select(Axis(0), &order);
        Self::new(dates, self.columns.clone(), values)
    }

    /// Last `n` rows (or the whole table if shorter)
    pub fn tail(&self, n: usize) -> Self {
        let start = self.height().saturating_sub(n);
        let order: Vec<usize> = (start..self.height()).collect();
        Self {
            dates: self.dates[start..].to_vec(),
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), &order),
        }
    }

    /// New table with one row appended
    pub fn append_row(&self, date: NaiveDate, row: &Array1<f64>) -> Result<Self> {
        if row.len() != self.width() {
            return Err(ForecastError::DataError(format!(
                "Row has {} values but table has {} columns",
                row.len(),
                self.width()
            )));
        }
        let mut values = Array2::<f64>::zeros((self.height() + 1, self.width()));
        values
            .slice_mut(ndarray::s![..self.height(), ..])
            .assign(&self.values);
        values.row_mut(self.height()).assign(row);
        let mut dates = self.dates.clone();
        dates.push(date);
        Self::new(dates, self.columns.clone(), values)
    }

    /// Replace the values of selected cells in one row
    pub fn with_cells(&self, row: usize, names: &[String], cell_values: &[f64]) -> Result<Self> {
        let mut values = self.values.clone();
        for (name, &v) in names.iter().zip(cell_values.iter()) {
            let j = self.column_index(name)?;
            values[[row, j]] = v;
        }
        Self::new(self.dates.clone(), self.columns.clone(), values)
    }

    /// Columns containing at least one NaN cell
    pub fn nan_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(j, _)| self.values.column(*j).iter().any(|v| v.is_nan()))
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Check whether any cell is NaN
    pub fn has_nan(&self) -> bool {
        self.values.iter().any(|v| v.is_nan())
    }

    /// New table with exact-zero cells of the named columns set to NaN
    pub fn zeros_to_nan(&self, names: &[String]) -> Result<Self> {
        let mut values = self.values.clone();
        for name in names {
            let j = self.column_index(name)?;
            for v in values.column_mut(j).iter_mut() {
                if *v == 0.0 {
                    *v = f64::NAN;
                }
            }
        }
        Self::new(self.dates.clone(), self.columns.clone(), values)
    }

    /// Linear interpolation of NaN runs in every column
    ///
    /// Interior gaps are interpolated linearly over the row index; leading
    /// and trailing gaps take the nearest valid value. Columns with no
    /// valid value at all are left untouched for the caller to detect.
    pub fn interpolate(&self) -> Self {
        let mut values = self.values.clone();
        for j in 0..self.width() {
            let col: Vec<f64> = values.column(j).to_vec();
            let filled = interpolate_series(&col);
            for (i, v) in filled.into_iter().enumerate() {
                values[[i, j]] = v;
            }
        }
        Self {
            dates: self.dates.clone(),
            columns: self.columns.clone(),
            values,
        }
    }

    /// Forward-fill then backward-fill NaN cells in the named columns
    pub fn ffill_bfill(&self, names: &[String]) -> Result<Self> {
        let mut values = self.values.clone();
        for name in names {
            let j = self.column_index(name)?;
            let mut col: Vec<f64> = values.column(j).to_vec();
            let mut last = f64::NAN;
            for v in col.iter_mut() {
                if v.is_nan() {
                    *v = last;
                } else {
                    last = *v;
                }
            }
            let mut next = f64::NAN;
            for v in col.iter_mut().rev() {
                if v.is_nan() {
                    *v = next;
                } else {
                    next = *v;
                }
            }
            for (i, v) in col.into_iter().enumerate() {
                values[[i, j]] = v;
            }
        }
        Self::new(self.dates.clone(), self.columns.clone(), values)
    }

    /// Reindex over the sorted union of this table's dates and `extra`
    ///
    /// Rows for dates absent from the table are filled with NaN.
    pub fn reindex_union(&self, extra: &[NaiveDate]) -> Result<Self> {
        let mut all: Vec<NaiveDate> = self.dates.clone();
        for d in extra {
            if !all.contains(d) {
                all.push(*d);
            }
        }
        all.sort();

        let mut values = Array2::<f64>::from_elem((all.len(), self.width()), f64::NAN);
        for (i, d) in all.iter().enumerate() {
            if let Some(src) = self.dates.iter().position(|x| x == d) {
                values.row_mut(i).assign(&self.values.row(src));
            }
        }
        Self::new(all, self.columns.clone(), values)
    }

    /// Value of a single cell by row index and column name
    pub fn cell(&self, row: usize, name: &str) -> Result<f64> {
        let j = self.column_index(name)?;
        Ok(self.values[[row, j]])
    }

    /// Row index of a given date, if present
    pub fn date_position(&self, date: NaiveDate) -> Option<usize> {
        self.dates.iter().position(|d| *d == date)
    }

    /// Vertical concatenation of two tables with identical columns
    pub fn concat(&self, other: &Self) -> Result<Self> {
        if self.columns != other.columns {
            return Err(ForecastError::DataError(
                "Cannot concatenate tables with different columns".to_string(),
            ));
        }
        let mut dates = self.dates.clone();
        dates.extend_from_slice(&other.dates);
        let mut values = Array2::<f64>::zeros((self.height() + other.height(), self.width()));
        values
            .slice_mut(ndarray::s![..self.height(), ..])
            .assign(&self.values);
        values
            .slice_mut(ndarray::s![self.height().., ..])
            .assign(&other.values);
        Self::new(dates, self.columns.clone(), values)
    }
}

/// Linear interpolation over one series; see [`TimeTable::interpolate`]
fn interpolate_series(col: &[f64]) -> Vec<f64> {
    let anchors: Vec<usize> = col
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .map(|(i, _)| i)
        .collect();
    if anchors.is_empty() {
        return col.to_vec();
    }

    let mut out = col.to_vec();
    let first = anchors[0];
    let last = *anchors.last().unwrap();

    for i in 0..first {
        out[i] = col[first];
    }
    for i in (last + 1)..col.len() {
        out[i] = col[last];
    }
    for pair in anchors.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if hi - lo > 1 {
            let step = (col[hi] - col[lo]) / (hi - lo) as f64;
            for i in (lo + 1)..hi {
                out[i] = col[lo] + step * (i - lo) as f64;
            }
        }
    }
    out
}

/// Data loader for historical pollutant series
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load a historical series from a CSV file
    ///
    /// The file must carry the `date` column plus the five pollutant and
    /// five meteorology columns. Null cells become NaN.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<TimeTable> {
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?;
        Self::from_dataframe(df)
    }

    /// Build a [`TimeTable`] from an existing DataFrame
    pub fn from_dataframe(df: DataFrame) -> Result<TimeTable> {
        let dates = Self::parse_dates(&df)?;

        let columns = feature_columns();
        let mut values = Array2::<f64>::from_elem((df.height(), columns.len()), f64::NAN);
        for (j, name) in columns.iter().enumerate() {
            let col = Self::column_as_f64(&df, name)?;
            for (i, v) in col.into_iter().enumerate() {
                values[[i, j]] = v;
            }
        }
        TimeTable::new(dates, columns, values)
    }

    /// Parse the date column into `NaiveDate`s
    fn parse_dates(df: &DataFrame) -> Result<Vec<NaiveDate>> {
        let col = df.column(DATE_COLUMN).map_err(|_| {
            ForecastError::DataError(format!("Missing required column '{}'", DATE_COLUMN))
        })?;

        match col.dtype() {
            DataType::Utf8 => col
                .utf8()?
                .into_iter()
                .map(|opt| {
                    let s = opt.ok_or_else(|| {
                        ForecastError::DataError("Null value in date column".to_string())
                    })?;
                    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
                        ForecastError::DataError(format!("Unparsable date '{}'", s))
                    })
                })
                .collect(),
            DataType::Date => col
                .date()?
                .into_iter()
                .map(|opt| {
                    let days = opt.ok_or_else(|| {
                        ForecastError::DataError("Null value in date column".to_string())
                    })?;
                    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
                        .ok_or_else(|| {
                            ForecastError::DataError(format!("Date out of range: {} days", days))
                        })
                })
                .collect(),
            other => Err(ForecastError::DataError(format!(
                "Date column has unsupported type {:?}",
                other
            ))),
        }
    }

    /// Helper method to get a column as f64 values, null becoming NaN
    fn column_as_f64(df: &DataFrame, column_name: &str) -> Result<Vec<f64>> {
        let col = df.column(column_name).map_err(|_| {
            ForecastError::DataError(format!("Missing required column '{}'", column_name))
        })?;

        match col.dtype() {
            DataType::Float64 => Ok(col
                .f64()?
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect()),
            DataType::Float32 => Ok(col
                .f32()?
                .into_iter()
                .map(|v| v.map(|x| x as f64).unwrap_or(f64::NAN))
                .collect()),
            DataType::Int64 => Ok(col
                .i64()?
                .into_iter()
                .map(|v| v.map(|x| x as f64).unwrap_or(f64::NAN))
                .collect()),
            DataType::Int32 => Ok(col
                .i32()?
                .into_iter()
                .map(|v| v.map(|x| x as f64).unwrap_or(f64::NAN))
                .collect()),
            _ => Err(ForecastError::DataError(format!(
                "Column '{}' cannot be converted to f64",
                column_name
            ))),
        }
    }
}

/// Clean a raw historical series ahead of training or merging
///
/// Sorts ascending by date (duplicate dates are a data error), treats
/// exact-zero pollutant readings as sensor artifacts, then linearly
/// interpolates every gap with nearest-value edge fill. A column with no
/// valid reading at all cannot be interpolated and is reported.
pub fn preprocess(table: &TimeTable) -> Result<TimeTable> {
    let sorted = table.sort_by_date()?;
    let cleaned = sorted.zeros_to_nan(&target_columns())?.interpolate();

    let bad = cleaned.nan_columns();
    if !bad.is_empty() {
        return Err(ForecastError::DataError(format!(
            "Columns contain no valid readings to interpolate from: {}",
            bad.join(", ")
        )));
    }
    Ok(cleaned)
}
