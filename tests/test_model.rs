use assert_approx_eq::assert_approx_eq;
use forecast_air::model::{
    dropout_mask, huber_loss, huber_value, BiLstmRegressor, FitOptions, LstmCell, ModelConfig,
};
use ndarray::{Array1, Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn small_config() -> ModelConfig {
    ModelConfig {
        time_step: 4,
        input_size: 3,
        output_size: 2,
        hidden_size: 8,
        dropout: 0.0,
        learning_rate: 0.01,
        huber_delta: 1.0,
    }
}

/// Deterministic window with values spread over (-1, 1)
fn window(rows: usize, cols: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(i, j)| {
        ((i * cols + j) as f64 * 0.37).sin()
    })
}

/// Loss used by the gradient check: sum of the final hidden state
fn forward_sum(cell: &LstmCell, w: &Array2<f64>) -> f64 {
    cell.forward(w.view()).h.sum()
}

#[test]
fn test_backward_matches_central_differences() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut cell = LstmCell::new(2, 3, &mut rng);
    let w = window(4, 2);
    let eps = 1e-5;

    let cache = cell.forward(w.view());
    let d_h = Array1::ones(3);
    let grads = cell.backward(w.view(), &cache, &d_h);

    for r in 0..12 {
        for c in 0..2 {
            {
                let (wx, _, _) = cell.params_mut();
                wx[[r, c]] += eps;
            }
            let plus = forward_sum(&cell, &w);
            {
                let (wx, _, _) = cell.params_mut();
                wx[[r, c]] -= 2.0 * eps;
            }
            let minus = forward_sum(&cell, &w);
            {
                let (wx, _, _) = cell.params_mut();
                wx[[r, c]] += eps;
            }
            assert_approx_eq!(grads.w_x[[r, c]], (plus - minus) / (2.0 * eps), 1e-6);
        }
        for c in 0..3 {
            {
                let (_, wh, _) = cell.params_mut();
                wh[[r, c]] += eps;
            }
            let plus = forward_sum(&cell, &w);
            {
                let (_, wh, _) = cell.params_mut();
                wh[[r, c]] -= 2.0 * eps;
            }
            let minus = forward_sum(&cell, &w);
            {
                let (_, wh, _) = cell.params_mut();
                wh[[r, c]] += eps;
            }
            assert_approx_eq!(grads.w_h[[r, c]], (plus - minus) / (2.0 * eps), 1e-6);
        }
        {
            let (_, _, b) = cell.params_mut();
            b[r] += eps;
        }
        let plus = forward_sum(&cell, &w);
        {
            let (_, _, b) = cell.params_mut();
            b[r] -= 2.0 * eps;
        }
        let minus = forward_sum(&cell, &w);
        {
            let (_, _, b) = cell.params_mut();
            b[r] += eps;
        }
        assert_approx_eq!(grads.b[r], (plus - minus) / (2.0 * eps), 1e-6);
    }
}

#[test]
fn test_huber_loss_known_values() {
    // Quadratic region: 0.5 * e^2
    let (loss, grad) = huber_loss(
        &Array1::from_vec(vec![0.5]),
        &Array1::from_vec(vec![0.0]),
        1.0,
    );
    assert_approx_eq!(loss, 0.125);
    assert_approx_eq!(grad[0], 0.5);

    // Linear region: delta * (|e| - delta / 2)
    let (loss, grad) = huber_loss(
        &Array1::from_vec(vec![3.0]),
        &Array1::from_vec(vec![0.0]),
        1.0,
    );
    assert_approx_eq!(loss, 2.5);
    assert_approx_eq!(grad[0], 1.0);

    assert_approx_eq!(
        huber_value(
            &Array1::from_vec(vec![0.5, 3.0]),
            &Array1::from_vec(vec![0.0, 0.0]),
            1.0
        ),
        (0.125 + 2.5) / 2.0
    );
}

#[test]
fn test_same_seed_builds_identical_models() {
    let config = small_config();
    let a = BiLstmRegressor::new(config.clone(), 42);
    let b = BiLstmRegressor::new(config.clone(), 42);
    let c = BiLstmRegressor::new(config.clone(), 43);

    let w = window(config.time_step, config.input_size);
    let pa = a.predict(w.view()).unwrap();
    let pb = b.predict(w.view()).unwrap();
    let pc = c.predict(w.view()).unwrap();

    assert_eq!(pa, pb);
    assert_ne!(pa, pc);
}

#[test]
fn test_predict_rejects_wrong_window_shape() {
    let config = small_config();
    let model = BiLstmRegressor::new(config, 1);

    let wrong_rows = window(3, 3);
    assert!(model.predict(wrong_rows.view()).is_err());

    let wrong_cols = window(4, 2);
    assert!(model.predict(wrong_cols.view()).is_err());
}

#[test]
fn test_fit_improves_monitored_loss() {
    let config = small_config();
    let n = 40;

    let windows = Array3::from_shape_fn((n, config.time_step, config.input_size), |(s, i, j)| {
        0.5 + 0.3 * ((s + i * 3 + j) as f64 * 0.29).sin()
    });
    // A learnable constant relation in the scaled domain
    let targets = Array2::from_elem((n, config.output_size), 0.5);

    let mut model = BiLstmRegressor::new(config, 42);
    let options = FitOptions {
        epochs: 30,
        batch_size: 8,
        validation_split: 0.2,
        patience: 10,
        seed: 7,
    };
    let history = model.fit(&windows, &targets, &options).unwrap();

    assert_eq!(history.train_loss.len(), history.validation_loss.len());
    assert!(history.validation_loss.len() <= options.epochs);
    assert!(history.best_epoch < history.validation_loss.len());

    let first = history.validation_loss[0];
    let best = history.validation_loss[history.best_epoch];
    assert!(best < first, "best {} not below first {}", best, first);

    // The restored weights match the best epoch, not the last one
    let restored = model
        .predict(windows.index_axis(Axis(0), 0))
        .unwrap();
    for v in restored.iter() {
        assert!(v.is_finite());
    }
}

#[test]
fn test_fit_rejects_empty_and_mismatched_input() {
    let config = small_config();
    let mut model = BiLstmRegressor::new(config.clone(), 1);

    let empty = Array3::<f64>::zeros((0, config.time_step, config.input_size));
    let no_targets = Array2::<f64>::zeros((0, config.output_size));
    assert!(model.fit(&empty, &no_targets, &FitOptions::default()).is_err());

    let windows = Array3::<f64>::zeros((4, config.time_step, config.input_size));
    let targets = Array2::<f64>::zeros((3, config.output_size));
    assert!(model.fit(&windows, &targets, &FitOptions::default()).is_err());
}

#[test]
fn test_dropout_mask_values() {
    let mut rng = StdRng::seed_from_u64(5);

    let none = dropout_mask(16, 0.0, &mut rng);
    assert!(none.iter().all(|&v| v == 1.0));

    let half = dropout_mask(1000, 0.5, &mut rng);
    for &v in half.iter() {
        assert!(v == 0.0 || (v - 2.0).abs() < 1e-12);
    }
    // Roughly half the cells survive
    let kept = half.iter().filter(|&&v| v > 0.0).count();
    assert!(kept > 400 && kept < 600);
}

#[test]
fn test_serde_round_trip_preserves_predictions() {
    let config = small_config();
    let model = BiLstmRegressor::new(config.clone(), 9);
    let w = window(config.time_step, config.input_size);

    let json = serde_json::to_string(&model).unwrap();
    let restored: BiLstmRegressor = serde_json::from_str(&json).unwrap();

    assert_eq!(
        model.predict(w.view()).unwrap(),
        restored.predict(w.view()).unwrap()
    );
}
