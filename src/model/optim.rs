//! Huber loss and the Adam optimizer

use ndarray::{Array, Array1, Dimension};

/// Elementwise Huber loss, averaged over the output vector
///
/// Quadratic inside `delta`, linear outside, which keeps outlier pollutant
/// readings from dominating the gradient. Returns the scalar loss and the
/// gradient with respect to the prediction.
pub fn huber_loss(pred: &Array1<f64>, target: &Array1<f64>, delta: f64) -> (f64, Array1<f64>) {
    let n = pred.len() as f64;
    let mut loss = 0.0;
    let mut grad = Array1::<f64>::zeros(pred.len());

    for (j, (&p, &t)) in pred.iter().zip(target.iter()).enumerate() {
        let e = p - t;
        if e.abs() <= delta {
            loss += 0.5 * e * e;
            grad[j] = e / n;
        } else {
            loss += delta * (e.abs() - 0.5 * delta);
            grad[j] = delta * e.signum() / n;
        }
    }
    (loss / n, grad)
}

/// Scalar Huber loss of a prediction without the gradient
pub fn huber_value(pred: &Array1<f64>, target: &Array1<f64>, delta: f64) -> f64 {
    huber_loss(pred, target, delta).0
}

/// Adam hyperparameters and shared step counter
#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    t: u64,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            t: 0,
        }
    }

    /// Advance the step counter; call once per batch before updates
    pub fn step(&mut self) {
        self.t += 1;
    }

    /// Bias-corrected effective learning rate for the current step
    pub fn alpha(&self) -> f64 {
        let t = self.t.max(1) as f64;
        self.learning_rate * (1.0 - self.beta2.powf(t)).sqrt() / (1.0 - self.beta1.powf(t))
    }
}

/// First/second moment estimates for one parameter tensor
#[derive(Debug, Clone)]
pub struct AdamTensor<D: Dimension> {
    m: Array<f64, D>,
    v: Array<f64, D>,
}

impl<D: Dimension> AdamTensor<D> {
    pub fn zeros_like(param: &Array<f64, D>) -> Self {
        Self {
            m: Array::zeros(param.raw_dim()),
            v: Array::zeros(param.raw_dim()),
        }
    }

    /// One Adam update of `param` given its gradient
    pub fn update(&mut self, adam: &Adam, param: &mut Array<f64, D>, grad: &Array<f64, D>) {
        let alpha = adam.alpha();
        ndarray::Zip::from(param)
            .and(&mut self.m)
            .and(&mut self.v)
            .and(grad)
            .for_each(|p, m, v, &g| {
                *m = adam.beta1 * *m + (1.0 - adam.beta1) * g;
                *v = adam.beta2 * *v + (1.0 - adam.beta2) * g * g;
                *p -= alpha * *m / (v.sqrt() + adam.epsilon);
            });
    }
}
