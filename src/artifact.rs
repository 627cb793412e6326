//! Model artifact persistence and the trained-model registry
//!
//! Each trained model lives in its own directory under the registry root
//! and is immutable once written. The only mutable state is the active
//! pointer file, and every JSON write goes through a temp-file-and-rename
//! so concurrent readers never observe a torn file.

use crate::data::TimeTable;
use crate::error::{ForecastError, Result};
use crate::metrics::{EvaluationReport, RegressionMetrics, OVERALL_KEY};
use crate::model::BiLstmRegressor;
use crate::scaling::ScalerPair;
use chrono::{DateTime, Local, NaiveDate};
use log::info;
use ndarray::Array2;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Serialized model weights and config
pub const MODEL_FILE: &str = "bilstm_model.json";
/// Fitted feature scaler
pub const SCALER_X_FILE: &str = "scaler_x.json";
/// Fitted target scaler
pub const SCALER_Y_FILE: &str = "scaler_y.json";
/// Artifact metadata record
pub const METADATA_FILE: &str = "metadata.json";
/// Evaluation report
pub const EVALUATION_FILE: &str = "evaluation.json";
/// Seed window table
pub const SEED_WINDOW_FILE: &str = "seed_window.csv";
/// Active-model pointer record, stored at the registry root
pub const MODEL_INFO_FILE: &str = "model_information.json";

/// The five files an artifact must carry to be usable
const REQUIRED_FILES: [&str; 5] = [
    MODEL_FILE,
    SCALER_X_FILE,
    SCALER_Y_FILE,
    METADATA_FILE,
    EVALUATION_FILE,
];

/// Metadata persisted next to the model weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub time_step: usize,
    /// Ordered feature-column names
    pub features: Vec<String>,
    /// Ordered target-column names
    pub targets: Vec<String>,
}

/// A complete persisted model bundle, loaded read-only
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub name: String,
    pub model: BiLstmRegressor,
    pub scalers: ScalerPair,
    pub metadata: ArtifactMetadata,
    pub evaluation: EvaluationReport,
    pub seed_window: TimeTable,
}

/// Listing entry for one trained model
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub name: String,
    pub created_at: Option<String>,
    pub overall: Option<RegressionMetrics>,
}

/// Active-model pointer record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelInformation {
    active: String,
}

/// Directory of trained model artifacts plus the active pointer
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    root: PathBuf,
}

impl ModelRegistry {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn model_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn required_files_present(&self, name: &str) -> bool {
        let dir = self.model_dir(name);
        REQUIRED_FILES.iter().all(|f| dir.join(f).exists())
    }

    /// Check that an artifact exists and is complete
    pub fn ensure_exists(&self, name: &str) -> Result<PathBuf> {
        let dir = self.model_dir(name);
        if !dir.is_dir() {
            return Err(ForecastError::ModelNotFound(name.to_string()));
        }
        if !self.required_files_present(name) {
            return Err(ForecastError::ModelIncomplete(name.to_string()));
        }
        Ok(dir)
    }

    /// All complete artifacts, newest first
    pub fn list_models(&self) -> Result<Vec<ModelSummary>> {
        let mut items = Vec::new();
        if !self.root.is_dir() {
            return Ok(items);
        }
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if !self.required_files_present(&name) {
                continue;
            }
            let created_at = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string());
            let overall = read_json::<EvaluationReport>(&entry.path().join(EVALUATION_FILE))
                .ok()
                .and_then(|report| report.0.get(OVERALL_KEY).copied());
            items.push(ModelSummary {
                name,
                created_at,
                overall,
            });
        }
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    /// Name of the active artifact
    ///
    /// Not-found if the pointer file is absent or names an incomplete
    /// artifact; the registry never substitutes a different model.
    pub fn active_model(&self) -> Result<String> {
        let info: ModelInformation = read_json(&self.root.join(MODEL_INFO_FILE))
            .map_err(|_| ForecastError::ModelNotFound("active model pointer unset".to_string()))?;
        self.ensure_exists(&info.active)?;
        Ok(info.active)
    }

    /// Point the registry at a different artifact (administrative action)
    pub fn set_active(&self, name: &str) -> Result<()> {
        self.ensure_exists(name)?;
        write_json_atomic(
            &self.root.join(MODEL_INFO_FILE),
            &ModelInformation {
                active: name.to_string(),
            },
        )?;
        info!("active model set to \"{}\"", name);
        Ok(())
    }

    /// Resolve an explicit artifact name, falling back to the active one
    pub fn resolve(&self, name: Option<&str>) -> Result<String> {
        match name {
            Some(n) => {
                self.ensure_exists(n)?;
                Ok(n.to_string())
            }
            None => self.active_model(),
        }
    }

    /// Remove an artifact directory; the active artifact cannot be deleted
    pub fn delete_model(&self, name: &str) -> Result<()> {
        self.ensure_exists(name)?;
        if let Ok(active) = self.active_model() {
            if active == name {
                return Err(ForecastError::ValidationError(format!(
                    "Model \"{}\" is active and cannot be deleted",
                    name
                )));
            }
        }
        fs::remove_dir_all(self.model_dir(name))?;
        info!("deleted model \"{}\"", name);
        Ok(())
    }

    /// Load a complete artifact by name
    pub fn load(&self, name: &str) -> Result<ModelArtifact> {
        let dir = self.ensure_exists(name)?;

        let model: BiLstmRegressor = read_json(&dir.join(MODEL_FILE))?;
        let scaler_x = read_json(&dir.join(SCALER_X_FILE))?;
        let scaler_y = read_json(&dir.join(SCALER_Y_FILE))?;
        let metadata: ArtifactMetadata = read_json(&dir.join(METADATA_FILE))?;
        let evaluation: EvaluationReport = read_json(&dir.join(EVALUATION_FILE))?;
        let seed_window = read_seed_window(&dir.join(SEED_WINDOW_FILE), &metadata)?;

        Ok(ModelArtifact {
            name: name.to_string(),
            model,
            scalers: ScalerPair {
                features: scaler_x,
                targets: scaler_y,
            },
            metadata,
            evaluation,
            seed_window,
        })
    }

    /// Persist a freshly trained artifact
    ///
    /// Refuses a seed window containing missing values: there would be no
    /// source of truth left for future forecasting.
    pub fn save(&self, artifact: &ModelArtifact) -> Result<()> {
        if artifact.seed_window.has_nan() {
            return Err(ForecastError::DataError(format!(
                "Seed window contains missing values. Affected columns: {}",
                artifact.seed_window.nan_columns().join(", ")
            )));
        }
        if artifact.seed_window.height() != artifact.metadata.time_step {
            return Err(ForecastError::DataError(format!(
                "Seed window has {} rows but time_step={}",
                artifact.seed_window.height(),
                artifact.metadata.time_step
            )));
        }

        let dir = self.model_dir(&artifact.name);
        fs::create_dir_all(&dir)?;

        write_json_atomic(&dir.join(MODEL_FILE), &artifact.model)?;
        write_json_atomic(&dir.join(SCALER_X_FILE), &artifact.scalers.features)?;
        write_json_atomic(&dir.join(SCALER_Y_FILE), &artifact.scalers.targets)?;
        write_json_atomic(&dir.join(METADATA_FILE), &artifact.metadata)?;
        write_json_atomic(&dir.join(EVALUATION_FILE), &artifact.evaluation)?;
        write_seed_window(&dir.join(SEED_WINDOW_FILE), &artifact.seed_window)?;

        info!("saved model \"{}\" to {}", artifact.name, dir.display());
        Ok(())
    }
}

/// Read a JSON file into a value
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Write JSON via a temp file in the same directory, then rename
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Write the seed window as a date-indexed CSV table
fn write_seed_window(path: &Path, window: &TimeTable) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        let mut header = vec![crate::data::DATE_COLUMN.to_string()];
        header.extend(window.columns().iter().cloned());
        writer.write_record(&header)?;
        for (i, date) in window.dates().iter().enumerate() {
            let mut record = vec![date.format("%Y-%m-%d").to_string()];
            record.extend(window.row(i).iter().map(|v| v.to_string()));
            writer.write_record(&record)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read the seed window back, resolving the metadata's column order
fn read_seed_window(path: &Path, metadata: &ArtifactMetadata) -> Result<TimeTable> {
    if !path.exists() {
        return Err(ForecastError::DataError(format!(
            "No seed window found at {}",
            path.display()
        )));
    }
    let mut reader = csv::Reader::from_path(path)?;
    let header: Vec<String> = reader
        .headers()?
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut dates: Vec<NaiveDate> = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let date_str = record.get(0).unwrap_or_default();
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .map_err(|_| ForecastError::DataError(format!("Unparsable date '{}'", date_str)))?;
        dates.push(date);
        rows.push(
            record
                .iter()
                .skip(1)
                .map(|s| s.parse::<f64>().unwrap_or(f64::NAN))
                .collect(),
        );
    }

    let columns: Vec<String> = header.into_iter().skip(1).collect();
    let mut values = Array2::<f64>::from_elem((dates.len(), columns.len()), f64::NAN);
    for (i, row) in rows.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            values[[i, j]] = v;
        }
    }

    let table = TimeTable::new(dates, columns, values)?.sort_by_date()?;
    let table = table.select(&metadata.features)?;
    if table.height() < metadata.time_step {
        return Err(ForecastError::DataError(format!(
            "Seed window has {} rows but time_step={}",
            table.height(),
            metadata.time_step
        )));
    }
    Ok(table.tail(metadata.time_step))
}
