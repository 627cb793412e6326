use chrono::{Duration, NaiveDate};
use forecast_air::artifact::ModelRegistry;
use forecast_air::data::{feature_columns, TimeTable, METEOROLOGY, POLLUTANTS};
use forecast_air::forecast::AutoregressiveForecaster;
use forecast_air::metrics::OVERALL_KEY;
use forecast_air::training::{Trainer, TrainingConfig};
use ndarray::Array2;

fn day(d: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + Duration::days(d)
}

/// Synthetic full-feature series: smooth, strictly positive seasonal
/// curves so preprocessing is a pass-through
fn series(days: usize) -> TimeTable {
    let columns = feature_columns();
    let values = Array2::from_shape_fn((days, columns.len()), |(i, j)| {
        10.0 + j as f64 + 3.0 * ((i as f64) * 0.3 + j as f64).sin() + i as f64 * 0.01
    });
    TimeTable::new((0..days as i64).map(day).collect(), columns, values).unwrap()
}

fn quick_config(name: &str) -> TrainingConfig {
    TrainingConfig {
        time_step: 3,
        test_size: 0.2,
        validation_split: 0.2,
        epochs: 3,
        batch_size: 16,
        patience: 5,
        learning_rate: 0.01,
        dropout: 0.1,
        lstm_units: 8,
        seed: 1,
        model_name: name.to_string(),
    }
}

#[test]
fn test_train_produces_a_complete_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());
    let raw = series(40);

    let outcome = Trainer::new(&registry)
        .train(&raw, &quick_config("pipeline_model"))
        .unwrap();

    assert_eq!(outcome.artifact.seed_window.height(), 3);
    assert_eq!(outcome.artifact.seed_window.dates(), &[day(37), day(38), day(39)]);
    assert!(outcome.history.train_loss.len() <= 3);
    assert!(outcome.history.train_loss.iter().all(|v| v.is_finite()));
    assert!(outcome.history.validation_loss.iter().all(|v| v.is_finite()));

    // The artifact on disk matches what the trainer returned
    let loaded = registry.load("pipeline_model").unwrap();
    assert_eq!(loaded.metadata.time_step, 3);
    assert_eq!(loaded.metadata.targets.len(), POLLUTANTS.len());
    assert!(loaded.evaluation.0.contains_key(OVERALL_KEY));
    for name in POLLUTANTS {
        assert!(loaded.evaluation.0.contains_key(name));
    }
}

#[test]
fn test_train_then_forecast_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());
    let raw = series(40);

    Trainer::new(&registry)
        .train(&raw, &quick_config("round_trip_model"))
        .unwrap();
    registry.set_active("round_trip_model").unwrap();

    let name = registry.active_model().unwrap();
    let artifact = registry.load(&name).unwrap();
    let forecaster = AutoregressiveForecaster::new(&artifact);

    // A week of future meteorology right after the training range
    let columns: Vec<String> = METEOROLOGY.iter().map(|s| s.to_string()).collect();
    let met_values = Array2::from_shape_fn((7, columns.len()), |(i, j)| {
        15.0 + j as f64 + i as f64 * 0.1
    });
    let met = TimeTable::new((40..47).map(day).collect(), columns, met_values).unwrap();

    let result = forecaster.forecast_two_weeks(None, &met).unwrap();
    assert_eq!(result.combined.len(), 14);
    assert_eq!(result.combined.table().dates().first(), Some(&day(40)));
    assert!(result
        .combined
        .table()
        .values()
        .iter()
        .all(|v| v.is_finite()));
}

#[test]
fn test_train_rejects_degenerate_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());
    let trainer = Trainer::new(&registry);

    let mut config = quick_config("bad_model");
    config.time_step = 0;
    assert!(trainer.train(&series(40), &config).is_err());

    // Test partition of 2 rows cannot produce a single 7-row window
    let mut config = quick_config("short_model");
    config.time_step = 7;
    let err = trainer.train(&series(10), &config).unwrap_err();
    assert!(err.to_string().contains("time_step=7"));
}
