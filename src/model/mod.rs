//! Bidirectional recurrent regression model
//!
//! A sequence-to-vector regressor: a forward and a backward LSTM read the
//! window, their final hidden states are concatenated, passed through
//! dropout (training only) and a linear head projecting to the five
//! pollutant outputs. Trained with Huber loss and Adam; early stopping on
//! a trailing validation slice restores the best-seen weights.

use crate::error::{ForecastError, Result};
use log::debug;
use ndarray::{s, Array1, Array2, Array3, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

mod lstm;
mod optim;

pub use lstm::{dropout_mask, LstmCell, LstmGrads};
pub use optim::{huber_loss, huber_value, Adam, AdamTensor};

/// Architecture and optimizer hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Rows per input window
    pub time_step: usize,
    /// Input features per row
    pub input_size: usize,
    /// Output dimensions (pollutants)
    pub output_size: usize,
    /// Hidden units per direction
    pub hidden_size: usize,
    /// Dropout rate on the concatenated hidden state (training only)
    pub dropout: f64,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Huber loss transition point
    pub huber_delta: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            time_step: 7,
            input_size: 10,
            output_size: 5,
            hidden_size: 128,
            dropout: 0.2,
            learning_rate: 0.001,
            huber_delta: 1.0,
        }
    }
}

/// Options controlling one fit run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    /// Maximum epochs
    pub epochs: usize,
    /// Mini-batch size (batches are taken in chronological order)
    pub batch_size: usize,
    /// Trailing fraction of the training sequences held out for validation
    pub validation_split: f64,
    /// Epochs without validation improvement before stopping
    pub patience: usize,
    /// RNG seed for weight initialization and dropout masks
    pub seed: u64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            epochs: 200,
            batch_size: 64,
            validation_split: 0.2,
            patience: 10,
            seed: 42,
        }
    }
}

/// Per-epoch loss trace of a fit run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitHistory {
    pub train_loss: Vec<f64>,
    pub validation_loss: Vec<f64>,
    /// Epoch (0-based) whose weights were kept
    pub best_epoch: usize,
}

/// The bidirectional LSTM regressor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiLstmRegressor {
    config: ModelConfig,
    forward_cell: LstmCell,
    backward_cell: LstmCell,
    /// Linear head over the concatenated hidden states (O x 2H)
    dense_w: Array2<f64>,
    dense_b: Array1<f64>,
}

impl BiLstmRegressor {
    /// Build an untrained model with seeded Xavier-uniform weights
    pub fn new(config: ModelConfig, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let forward_cell = LstmCell::new(config.input_size, config.hidden_size, &mut rng);
        let backward_cell = LstmCell::new(config.input_size, config.hidden_size, &mut rng);

        let fan_in = 2 * config.hidden_size;
        let limit = (6.0 / (fan_in + config.output_size) as f64).sqrt();
        let dist = Uniform::new(-limit, limit);
        let dense_w =
            Array2::from_shape_fn((config.output_size, fan_in), |_| dist.sample(&mut rng));
        let dense_b = Array1::zeros(config.output_size);

        Self {
            config,
            forward_cell,
            backward_cell,
            dense_w,
            dense_b,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Predict the scaled pollutant vector following one window
    ///
    /// Deterministic: no dropout is applied at inference time.
    pub fn predict(&self, window: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        self.check_window(&window)?;
        let h_cat = self.hidden_concat(&window);
        Ok(self.dense_w.dot(&h_cat) + &self.dense_b)
    }

    /// Predict a batch of windows, one output row per window
    pub fn predict_batch(&self, windows: &Array3<f64>) -> Result<Array2<f64>> {
        let mut out = Array2::<f64>::zeros((windows.len_of(Axis(0)), self.config.output_size));
        for (i, window) in windows.axis_iter(Axis(0)).enumerate() {
            out.row_mut(i).assign(&self.predict(window)?);
        }
        Ok(out)
    }

    fn check_window(&self, window: &ArrayView2<'_, f64>) -> Result<()> {
        if window.nrows() != self.config.time_step || window.ncols() != self.config.input_size {
            return Err(ForecastError::ForecastingError(format!(
                "Window shape {}x{} does not match model input {}x{}",
                window.nrows(),
                window.ncols(),
                self.config.time_step,
                self.config.input_size
            )));
        }
        Ok(())
    }

    /// Final hidden states of both directions, concatenated
    fn hidden_concat(&self, window: &ArrayView2<'_, f64>) -> Array1<f64> {
        let reversed = reverse_rows(window);
        let fwd = self.forward_cell.forward(*window);
        let bwd = self.backward_cell.forward(reversed.view());

        let mut h_cat = Array1::<f64>::zeros(2 * self.config.hidden_size);
        h_cat
            .slice_mut(s![..self.config.hidden_size])
            .assign(&fwd.h);
        h_cat
            .slice_mut(s![self.config.hidden_size..])
            .assign(&bwd.h);
        h_cat
    }

    /// Fit on supervised sequences with early stopping
    ///
    /// The validation slice is the trailing `validation_split` share of
    /// the sequences; batches run in chronological order with no
    /// shuffling, matching how the sequences were produced.
    pub fn fit(&mut self, windows: &Array3<f64>, targets: &Array2<f64>, options: &FitOptions) -> Result<FitHistory> {
        let n = windows.len_of(Axis(0));
        if n == 0 {
            return Err(ForecastError::DataError(
                "No training sequences; series is shorter than time_step".to_string(),
            ));
        }
        if targets.nrows() != n {
            return Err(ForecastError::DataError(format!(
                "{} windows but {} targets",
                n,
                targets.nrows()
            )));
        }

        let val_size = if options.validation_split > 0.0 && options.validation_split < 1.0 {
            ((n as f64) * options.validation_split).round() as usize
        } else {
            0
        };
        let train_size = n - val_size;
        if train_size == 0 {
            return Err(ForecastError::DataError(
                "Validation split leaves no training sequences".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(options.seed);
        let mut adam = Adam::new(self.config.learning_rate);
        let mut state = OptimizerState::new(self);

        let mut history = FitHistory {
            train_loss: Vec::new(),
            validation_loss: Vec::new(),
            best_epoch: 0,
        };
        let mut best: Option<(f64, BiLstmRegressor)> = None;
        let mut stale_epochs = 0usize;

        for epoch in 0..options.epochs {
            let mut epoch_loss = 0.0;

            let mut start = 0;
            while start < train_size {
                let end = (start + options.batch_size).min(train_size);
                let batch_loss = self.train_batch(
                    windows,
                    targets,
                    start..end,
                    &mut adam,
                    &mut state,
                    &mut rng,
                )?;
                epoch_loss += batch_loss * (end - start) as f64;
                start = end;
            }
            epoch_loss /= train_size as f64;

            // Validation loss, or the training loss when no slice is held out
            let monitored = if val_size > 0 {
                self.evaluate_loss(windows, targets, train_size..n)?
            } else {
                epoch_loss
            };

            history.train_loss.push(epoch_loss);
            history.validation_loss.push(monitored);
            debug!(
                "epoch {}: loss={:.6} val_loss={:.6}",
                epoch, epoch_loss, monitored
            );

            match &best {
                Some((best_loss, _)) if monitored >= *best_loss => {
                    stale_epochs += 1;
                    if stale_epochs >= options.patience {
                        break;
                    }
                }
                _ => {
                    best = Some((monitored, self.clone()));
                    history.best_epoch = epoch;
                    stale_epochs = 0;
                }
            }
        }

        if let Some((_, best_model)) = best {
            *self = best_model;
        }
        Ok(history)
    }

    /// One mini-batch: averaged gradients, one Adam step
    fn train_batch(
        &mut self,
        windows: &Array3<f64>,
        targets: &Array2<f64>,
        range: std::ops::Range<usize>,
        adam: &mut Adam,
        state: &mut OptimizerState,
        rng: &mut StdRng,
    ) -> Result<f64> {
        let h = self.config.hidden_size;
        let batch = range.len();
        let mut grads = BatchGrads::zeros(&self.config);
        let mut loss_sum = 0.0;

        for idx in range {
            let window = windows.index_axis(Axis(0), idx);
            let target = targets.row(idx).to_owned();

            let reversed = reverse_rows(&window);
            let fwd = self.forward_cell.forward(window);
            let bwd = self.backward_cell.forward(reversed.view());

            let mut h_cat = Array1::<f64>::zeros(2 * h);
            h_cat.slice_mut(s![..h]).assign(&fwd.h);
            h_cat.slice_mut(s![h..]).assign(&bwd.h);

            let mask = dropout_mask(2 * h, self.config.dropout, rng);
            let h_drop = &h_cat * &mask;

            let pred = self.dense_w.dot(&h_drop) + &self.dense_b;
            let (loss, d_pred) = huber_loss(&pred, &target, self.config.huber_delta);
            loss_sum += loss;

            // Head gradients
            for (r, &dp) in d_pred.iter().enumerate() {
                for (c, &hv) in h_drop.iter().enumerate() {
                    grads.dense_w[[r, c]] += dp * hv;
                }
            }
            grads.dense_b += &d_pred;

            // Back through dropout into both directions
            let d_h_cat = &self.dense_w.t().dot(&d_pred) * &mask;
            let d_h_fwd = d_h_cat.slice(s![..h]).to_owned();
            let d_h_bwd = d_h_cat.slice(s![h..]).to_owned();

            grads
                .forward
                .add(&self.forward_cell.backward(window, &fwd, &d_h_fwd));
            grads
                .backward
                .add(&self.backward_cell.backward(reversed.view(), &bwd, &d_h_bwd));
        }

        let inv = 1.0 / batch as f64;
        grads.scale(inv);

        adam.step();
        state.apply(adam, self, &grads);

        Ok(loss_sum * inv)
    }

    /// Mean Huber loss over a range of sequences, no dropout
    fn evaluate_loss(
        &self,
        windows: &Array3<f64>,
        targets: &Array2<f64>,
        range: std::ops::Range<usize>,
    ) -> Result<f64> {
        let len = range.len();
        let mut sum = 0.0;
        for idx in range {
            let pred = self.predict(windows.index_axis(Axis(0), idx))?;
            sum += huber_value(&pred, &targets.row(idx).to_owned(), self.config.huber_delta);
        }
        Ok(sum / len as f64)
    }
}

/// A window with its rows in reverse chronological order
fn reverse_rows(window: &ArrayView2<'_, f64>) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros(window.raw_dim());
    let n = window.nrows();
    for i in 0..n {
        out.row_mut(i).assign(&window.row(n - 1 - i));
    }
    out
}

/// Batch gradients for every parameter tensor
struct BatchGrads {
    forward: LstmGrads,
    backward: LstmGrads,
    dense_w: Array2<f64>,
    dense_b: Array1<f64>,
}

impl BatchGrads {
    fn zeros(config: &ModelConfig) -> Self {
        Self {
            forward: LstmGrads::zeros(config.input_size, config.hidden_size),
            backward: LstmGrads::zeros(config.input_size, config.hidden_size),
            dense_w: Array2::zeros((config.output_size, 2 * config.hidden_size)),
            dense_b: Array1::zeros(config.output_size),
        }
    }

    fn scale(&mut self, factor: f64) {
        self.forward.scale(factor);
        self.backward.scale(factor);
        self.dense_w.mapv_inplace(|v| v * factor);
        self.dense_b.mapv_inplace(|v| v * factor);
    }
}

/// Adam moment estimates for every parameter tensor
struct OptimizerState {
    fwd_wx: AdamTensor<ndarray::Ix2>,
    fwd_wh: AdamTensor<ndarray::Ix2>,
    fwd_b: AdamTensor<ndarray::Ix1>,
    bwd_wx: AdamTensor<ndarray::Ix2>,
    bwd_wh: AdamTensor<ndarray::Ix2>,
    bwd_b: AdamTensor<ndarray::Ix1>,
    dense_w: AdamTensor<ndarray::Ix2>,
    dense_b: AdamTensor<ndarray::Ix1>,
}

impl OptimizerState {
    fn new(model: &mut BiLstmRegressor) -> Self {
        let (fx, fh, fb) = model.forward_cell.params_mut();
        let fwd_wx = AdamTensor::zeros_like(fx);
        let fwd_wh = AdamTensor::zeros_like(fh);
        let fwd_b = AdamTensor::zeros_like(fb);
        let (bx, bh, bb) = model.backward_cell.params_mut();
        let bwd_wx = AdamTensor::zeros_like(bx);
        let bwd_wh = AdamTensor::zeros_like(bh);
        let bwd_b = AdamTensor::zeros_like(bb);
        Self {
            fwd_wx,
            fwd_wh,
            fwd_b,
            bwd_wx,
            bwd_wh,
            bwd_b,
            dense_w: AdamTensor::zeros_like(&model.dense_w),
            dense_b: AdamTensor::zeros_like(&model.dense_b),
        }
    }

    fn apply(&mut self, adam: &Adam, model: &mut BiLstmRegressor, grads: &BatchGrads) {
        {
            let (wx, wh, b) = model.forward_cell.params_mut();
            self.fwd_wx.update(adam, wx, &grads.forward.w_x);
            self.fwd_wh.update(adam, wh, &grads.forward.w_h);
            self.fwd_b.update(adam, b, &grads.forward.b);
        }
        {
            let (wx, wh, b) = model.backward_cell.params_mut();
            self.bwd_wx.update(adam, wx, &grads.backward.w_x);
            self.bwd_wh.update(adam, wh, &grads.backward.w_h);
            self.bwd_b.update(adam, b, &grads.backward.b);
        }
        self.dense_w.update(adam, &mut model.dense_w, &grads.dense_w);
        self.dense_b.update(adam, &mut model.dense_b, &grads.dense_b);
    }
}
