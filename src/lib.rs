//! # Forecast Air
//!
//! A Rust library for forecasting daily concentrations of five air
//! pollutants (PM10, SO2, CO, O3, NO2) from meteorological covariates
//! with a bidirectional recurrent sequence model.
//!
//! ## Features
//!
//! - Historical-series cleaning (zero-as-missing policy, linear
//!   interpolation, chronological ordering)
//! - Min-max scaler pair fitted on the training partition only
//! - Supervised-sequence construction and chronological splitting
//! - Bidirectional LSTM regressor trained with Huber loss, Adam, and
//!   early stopping
//! - Per-pollutant evaluation (MAE, MAPE, MSE, RMSE, R2) with an
//!   aggregate report
//! - Persisted model artifacts with an atomically updated active-model
//!   pointer
//! - Autoregressive two-week forecasting over externally supplied
//!   future meteorology
//!
//! ## Quick Start
//!
//! ```no_run
//! use forecast_air::artifact::ModelRegistry;
//! use forecast_air::data::DataLoader;
//! use forecast_air::forecast::AutoregressiveForecaster;
//! use forecast_air::history::ForecastRequest;
//! use forecast_air::training::{Trainer, TrainingConfig};
//!
//! # fn main() -> forecast_air::error::Result<()> {
//! let registry = ModelRegistry::new("models");
//!
//! // Train and persist an artifact
//! let series = DataLoader::from_csv("history.csv")?;
//! let outcome = Trainer::new(&registry).train(&series, &TrainingConfig::default())?;
//! registry.set_active(&outcome.artifact.name)?;
//!
//! // Forecast two weeks from a week of future meteorology
//! let request: ForecastRequest = serde_json::from_str(r#"{
//!     "dates": ["2025-10-20", "2025-10-21", "2025-10-22", "2025-10-23",
//!               "2025-10-24", "2025-10-25", "2025-10-26"],
//!     "temperature": [27.1, 27.3, 27.0, 27.2, 27.4, 27.1, 26.9],
//!     "humidity": [85.0, 86.0, 84.0, 83.0, 85.0, 84.0, 86.0],
//!     "rainfall": [10.0, 0.0, 5.2, 3.0, 1.0, 0.0, 2.5],
//!     "sunshine": [5.0, 6.0, 4.5, 5.5, 6.2, 6.0, 4.8],
//!     "wind_speed": [2.3, 2.0, 2.5, 2.1, 2.0, 2.2, 2.4]
//! }"#).unwrap();
//!
//! let name = registry.active_model()?;
//! let artifact = registry.load(&name)?;
//! let forecaster = AutoregressiveForecaster::new(&artifact);
//! let result = forecaster.forecast_two_weeks(
//!     request.history.as_ref(),
//!     &request.meteorology_table()?,
//! )?;
//! for record in result.combined.records() {
//!     println!("{}: PM10={:.1}", record.date, record.pm10);
//! }
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod data;
pub mod error;
pub mod forecast;
pub mod history;
pub mod metrics;
pub mod model;
pub mod scaling;
pub mod sequence;
pub mod training;

// Re-export commonly used types
pub use crate::artifact::{ModelArtifact, ModelRegistry};
pub use crate::data::{DataLoader, TimeTable};
pub use crate::error::ForecastError;
pub use crate::forecast::{AutoregressiveForecaster, ForecastResult};
pub use crate::history::{ForecastRequest, HistoryPayload};
pub use crate::training::{Trainer, TrainingConfig};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
