//! Training orchestration: raw series in, persisted artifact out

use crate::artifact::{ArtifactMetadata, ModelArtifact, ModelRegistry};
use crate::data::{feature_columns, preprocess, target_columns, TimeTable};
use crate::error::{ForecastError, Result};
use crate::metrics::evaluate;
use crate::model::{BiLstmRegressor, FitHistory, FitOptions, ModelConfig};
use crate::scaling::ScalerPair;
use crate::sequence::{make_sequences, train_test_split};
use log::info;
use serde::{Deserialize, Serialize};

/// Hyperparameters for one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Window length consumed by the model
    pub time_step: usize,
    /// Trailing fraction of rows held out as the test partition
    pub test_size: f64,
    /// Trailing fraction of training sequences used for early stopping
    pub validation_split: f64,
    /// Maximum training epochs
    pub epochs: usize,
    /// Mini-batch size
    pub batch_size: usize,
    /// Early-stopping patience in epochs
    pub patience: usize,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Dropout rate after the recurrent layer
    pub dropout: f64,
    /// Hidden units per LSTM direction
    pub lstm_units: usize,
    /// RNG seed for initialization and dropout
    pub seed: u64,
    /// Directory name of the produced artifact
    pub model_name: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            time_step: 7,
            test_size: 0.2,
            validation_split: 0.2,
            epochs: 200,
            batch_size: 64,
            patience: 10,
            learning_rate: 0.001,
            dropout: 0.2,
            lstm_units: 128,
            seed: 42,
            model_name: "prediction_model".to_string(),
        }
    }
}

/// Outcome of a training run: the persisted artifact plus the loss trace
#[derive(Debug)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub history: FitHistory,
}

/// Orchestrates the training pipeline end to end
#[derive(Debug)]
pub struct Trainer<'a> {
    registry: &'a ModelRegistry,
}

impl<'a> Trainer<'a> {
    pub fn new(registry: &'a ModelRegistry) -> Self {
        Self { registry }
    }

    /// Run the whole pipeline and persist the resulting artifact
    ///
    /// Preprocess, split chronologically, fit scalers on the training
    /// partition only, build sequences, fit with early stopping, evaluate
    /// on the held-out tail in physical units, then save the artifact
    /// together with the last `time_step` preprocessed rows as the seed
    /// window.
    pub fn train(&self, raw: &TimeTable, config: &TrainingConfig) -> Result<TrainingOutcome> {
        if config.time_step == 0 {
            return Err(ForecastError::InvalidParameter(
                "time_step must be positive".to_string(),
            ));
        }

        let features = feature_columns();
        let targets = target_columns();

        let cleaned = preprocess(raw)?;
        info!(
            "training \"{}\" on {} rows ({} -> {})",
            config.model_name,
            cleaned.height(),
            cleaned.dates().first().map(|d| d.to_string()).unwrap_or_default(),
            cleaned.dates().last().map(|d| d.to_string()).unwrap_or_default(),
        );

        let x = cleaned.select(&features)?.values().clone();
        let y = cleaned.select(&targets)?.values().clone();

        let (x_train, x_test) = train_test_split(&x, config.test_size);
        let (y_train, y_test) = train_test_split(&y, config.test_size);

        // Fitted once on the training partition, reused read-only after
        let scalers = ScalerPair::fit(&x_train, &y_train)?;
        let x_train_scaled = scalers.features.transform(&x_train)?;
        let x_test_scaled = scalers.features.transform(&x_test)?;
        let y_train_scaled = scalers.targets.transform(&y_train)?;
        let y_test_scaled = scalers.targets.transform(&y_test)?;

        let (train_windows, train_targets) =
            make_sequences(&x_train_scaled, &y_train_scaled, config.time_step);
        let (test_windows, test_targets) =
            make_sequences(&x_test_scaled, &y_test_scaled, config.time_step);
        if test_windows.is_empty() {
            return Err(ForecastError::DataError(format!(
                "Test partition of {} rows is too small for time_step={}",
                x_test.nrows(),
                config.time_step
            )));
        }

        let model_config = ModelConfig {
            time_step: config.time_step,
            input_size: features.len(),
            output_size: targets.len(),
            hidden_size: config.lstm_units,
            dropout: config.dropout,
            learning_rate: config.learning_rate,
            huber_delta: 1.0,
        };
        let mut model = BiLstmRegressor::new(model_config, config.seed);
        let history = model.fit(
            &train_windows,
            &train_targets,
            &FitOptions {
                epochs: config.epochs,
                batch_size: config.batch_size,
                validation_split: config.validation_split,
                patience: config.patience,
                seed: config.seed,
            },
        )?;
        info!(
            "fit stopped after {} epochs (best epoch {})",
            history.train_loss.len(),
            history.best_epoch
        );

        // Back to physical units before computing metrics
        let predictions_scaled = model.predict_batch(&test_windows)?;
        let predictions = scalers.targets.inverse_transform(&predictions_scaled)?;
        let truth = scalers.targets.inverse_transform(&test_targets)?;
        let evaluation = evaluate(&truth, &predictions, &targets)?;

        let seed_window = cleaned.select(&features)?.tail(config.time_step);

        let artifact = ModelArtifact {
            name: config.model_name.clone(),
            model,
            scalers,
            metadata: ArtifactMetadata {
                time_step: config.time_step,
                features,
                targets,
            },
            evaluation,
            seed_window,
        };
        self.registry.save(&artifact)?;

        Ok(TrainingOutcome { artifact, history })
    }
}
