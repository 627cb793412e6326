use chrono::NaiveDate;
use forecast_air::artifact::{
    ArtifactMetadata, ModelArtifact, ModelRegistry, EVALUATION_FILE, SEED_WINDOW_FILE,
};
use forecast_air::data::{feature_columns, target_columns, TimeTable};
use forecast_air::error::ForecastError;
use forecast_air::metrics::evaluate;
use forecast_air::model::{BiLstmRegressor, ModelConfig};
use forecast_air::scaling::ScalerPair;
use ndarray::Array2;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 6, d).unwrap()
}

fn seed_window(rows: usize) -> TimeTable {
    let columns = feature_columns();
    let values = Array2::from_shape_fn((rows, columns.len()), |(i, j)| (i + j) as f64 + 1.0);
    TimeTable::new((1..=rows as u32).map(day).collect(), columns, values).unwrap()
}

fn artifact(name: &str) -> ModelArtifact {
    let config = ModelConfig {
        time_step: 3,
        input_size: 10,
        output_size: 5,
        hidden_size: 4,
        dropout: 0.2,
        learning_rate: 0.001,
        huber_delta: 1.0,
    };
    let x = Array2::from_shape_fn((6, 10), |(i, j)| (i * 10 + j) as f64);
    let y = Array2::from_shape_fn((6, 5), |(i, j)| (i * 5 + j) as f64);
    let y_pred = y.mapv(|v| v + 0.5);

    ModelArtifact {
        name: name.to_string(),
        model: BiLstmRegressor::new(config, 42),
        scalers: ScalerPair::fit(&x, &y).unwrap(),
        metadata: ArtifactMetadata {
            time_step: 3,
            features: feature_columns(),
            targets: target_columns(),
        },
        evaluation: evaluate(&y, &y_pred, &target_columns()).unwrap(),
        seed_window: seed_window(3),
    }
}

#[test]
fn test_save_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());

    let original = artifact("model_a");
    registry.save(&original).unwrap();
    let loaded = registry.load("model_a").unwrap();

    assert_eq!(loaded.name, "model_a");
    assert_eq!(loaded.metadata, original.metadata);
    assert_eq!(loaded.scalers, original.scalers);
    assert_eq!(loaded.seed_window.dates(), original.seed_window.dates());
    assert_eq!(loaded.seed_window.values(), original.seed_window.values());

    // Identical weights give identical predictions
    let window = original.seed_window.values().clone();
    assert_eq!(
        loaded.model.predict(window.view()).unwrap(),
        original.model.predict(window.view()).unwrap()
    );
}

#[test]
fn test_save_rejects_bad_seed_window() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());

    let mut bad = artifact("model_nan");
    bad.seed_window = bad
        .seed_window
        .with_cells(1, &["PM10".to_string()], &[f64::NAN])
        .unwrap();
    let err = registry.save(&bad).unwrap_err();
    assert!(err.to_string().contains("PM10"));

    let mut short = artifact("model_short");
    short.seed_window = seed_window(2);
    assert!(registry.save(&short).is_err());
}

#[test]
fn test_missing_and_incomplete_models() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());

    assert!(matches!(
        registry.load("nope").unwrap_err(),
        ForecastError::ModelNotFound(_)
    ));

    registry.save(&artifact("model_b")).unwrap();
    std::fs::remove_file(dir.path().join("model_b").join(EVALUATION_FILE)).unwrap();
    assert!(matches!(
        registry.ensure_exists("model_b").unwrap_err(),
        ForecastError::ModelIncomplete(_)
    ));
}

#[test]
fn test_active_model_pointer() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());

    // No pointer yet
    assert!(matches!(
        registry.active_model().unwrap_err(),
        ForecastError::ModelNotFound(_)
    ));

    registry.save(&artifact("model_c")).unwrap();
    assert!(registry.set_active("absent").is_err());
    registry.set_active("model_c").unwrap();
    assert_eq!(registry.active_model().unwrap(), "model_c");

    // Losing the seed window does not make the artifact incomplete,
    // losing a required file does
    std::fs::remove_file(dir.path().join("model_c").join(SEED_WINDOW_FILE)).unwrap();
    assert!(registry.active_model().is_ok());
    std::fs::remove_file(dir.path().join("model_c").join(EVALUATION_FILE)).unwrap();
    assert!(registry.active_model().is_err());
}

#[test]
fn test_resolve_explicit_or_active() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());

    registry.save(&artifact("model_d")).unwrap();
    registry.save(&artifact("model_e")).unwrap();
    registry.set_active("model_d").unwrap();

    assert_eq!(registry.resolve(None).unwrap(), "model_d");
    assert_eq!(registry.resolve(Some("model_e")).unwrap(), "model_e");
    assert!(registry.resolve(Some("absent")).is_err());
}

#[test]
fn test_delete_refuses_active_model() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());

    registry.save(&artifact("model_f")).unwrap();
    registry.save(&artifact("model_g")).unwrap();
    registry.set_active("model_f").unwrap();

    assert!(registry.delete_model("model_f").is_err());
    registry.delete_model("model_g").unwrap();
    assert!(!dir.path().join("model_g").exists());
}

#[test]
fn test_list_models_skips_incomplete() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());

    assert!(registry.list_models().unwrap().is_empty());

    registry.save(&artifact("model_h")).unwrap();
    registry.save(&artifact("model_i")).unwrap();
    std::fs::remove_file(dir.path().join("model_i").join(EVALUATION_FILE)).unwrap();

    let items = registry.list_models().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "model_h");
    assert!(items[0].overall.is_some());
    assert!(items[0].created_at.is_some());
}
