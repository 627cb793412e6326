//! LSTM cell with full backpropagation through time
//!
//! Sequence-to-vector use: the cell consumes a whole window and exposes
//! only the final hidden state, so gradient enters at the last step and
//! flows back through the cell-state chain.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// One recurrent cell: gate weights over `[x; h_prev]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmCell {
    input_size: usize,
    hidden_size: usize,
    /// Input weights, rows ordered as gates i, f, g, o (4H x D)
    w_x: Array2<f64>,
    /// Recurrent weights (4H x H)
    w_h: Array2<f64>,
    /// Gate biases (4H)
    b: Array1<f64>,
}

/// Per-step activations kept for the backward pass
struct StepCache {
    h_prev: Array1<f64>,
    c_prev: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    tanh_c: Array1<f64>,
}

/// Forward activations of a whole window
pub struct SeqCache {
    steps: Vec<StepCache>,
    /// Final hidden state
    pub h: Array1<f64>,
}

/// Gradients mirroring [`LstmCell`] parameters
#[derive(Debug, Clone)]
pub struct LstmGrads {
    pub w_x: Array2<f64>,
    pub w_h: Array2<f64>,
    pub b: Array1<f64>,
}

impl LstmGrads {
    pub fn zeros(input_size: usize, hidden_size: usize) -> Self {
        Self {
            w_x: Array2::zeros((4 * hidden_size, input_size)),
            w_h: Array2::zeros((4 * hidden_size, hidden_size)),
            b: Array1::zeros(4 * hidden_size),
        }
    }

    pub fn scale(&mut self, factor: f64) {
        self.w_x.mapv_inplace(|v| v * factor);
        self.w_h.mapv_inplace(|v| v * factor);
        self.b.mapv_inplace(|v| v * factor);
    }

    pub fn add(&mut self, other: &Self) {
        self.w_x += &other.w_x;
        self.w_h += &other.w_h;
        self.b += &other.b;
    }
}

impl LstmCell {
    /// Initialize with Xavier-uniform weights and forget-gate bias 1
    pub fn new(input_size: usize, hidden_size: usize, rng: &mut StdRng) -> Self {
        let w_x = xavier(4 * hidden_size, input_size, rng);
        let w_h = xavier(4 * hidden_size, hidden_size, rng);
        let mut b = Array1::zeros(4 * hidden_size);
        // Standard trick: start with an open forget gate
        b.slice_mut(ndarray::s![hidden_size..2 * hidden_size])
            .fill(1.0);
        Self {
            input_size,
            hidden_size,
            w_x,
            w_h,
            b,
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Run the cell over a window (rows = time steps), zero initial state
    pub fn forward(&self, window: ArrayView2<'_, f64>) -> SeqCache {
        let h_size = self.hidden_size;
        let mut h = Array1::<f64>::zeros(h_size);
        let mut c = Array1::<f64>::zeros(h_size);
        let mut steps = Vec::with_capacity(window.nrows());

        for x_t in window.rows() {
            let z = self.gate_preactivations(&x_t, &h);

            let i = z.slice(ndarray::s![..h_size]).mapv(sigmoid);
            let f = z.slice(ndarray::s![h_size..2 * h_size]).mapv(sigmoid);
            let g = z.slice(ndarray::s![2 * h_size..3 * h_size]).mapv(f64::tanh);
            let o = z.slice(ndarray::s![3 * h_size..]).mapv(sigmoid);

            let c_next = &f * &c + &i * &g;
            let tanh_c = c_next.mapv(f64::tanh);
            let h_next = &o * &tanh_c;

            steps.push(StepCache {
                h_prev: h,
                c_prev: c,
                i,
                f,
                g,
                o,
                tanh_c,
            });
            h = h_next;
            c = c_next;
        }

        SeqCache { steps, h }
    }

    fn gate_preactivations(&self, x: &ArrayView1<'_, f64>, h: &Array1<f64>) -> Array1<f64> {
        self.w_x.dot(x) + self.w_h.dot(h) + &self.b
    }

    /// Backpropagate `d_h_final` through the cached window
    ///
    /// Returns parameter gradients; input gradients are not needed since
    /// the window rows are data, not learned values.
    pub fn backward(
        &self,
        window: ArrayView2<'_, f64>,
        cache: &SeqCache,
        d_h_final: &Array1<f64>,
    ) -> LstmGrads {
        let h_size = self.hidden_size;
        let mut grads = LstmGrads::zeros(self.input_size, h_size);

        let mut dh = d_h_final.clone();
        let mut dc = Array1::<f64>::zeros(h_size);

        for (t, step) in cache.steps.iter().enumerate().rev() {
            let x_t = window.row(t);

            let d_o = &dh * &step.tanh_c;
            dc = &dc + &(&dh * &step.o * &step.tanh_c.mapv(|v| 1.0 - v * v));

            let d_i = &dc * &step.g;
            let d_g = &dc * &step.i;
            let d_f = &dc * &step.c_prev;

            let dz_i = &d_i * &step.i * &step.i.mapv(|v| 1.0 - v);
            let dz_f = &d_f * &step.f * &step.f.mapv(|v| 1.0 - v);
            let dz_g = &d_g * &step.g.mapv(|v| 1.0 - v * v);
            let dz_o = &d_o * &step.o * &step.o.mapv(|v| 1.0 - v);

            let mut dz = Array1::<f64>::zeros(4 * h_size);
            dz.slice_mut(ndarray::s![..h_size]).assign(&dz_i);
            dz.slice_mut(ndarray::s![h_size..2 * h_size]).assign(&dz_f);
            dz.slice_mut(ndarray::s![2 * h_size..3 * h_size])
                .assign(&dz_g);
            dz.slice_mut(ndarray::s![3 * h_size..]).assign(&dz_o);

            // Outer products accumulate into the weight gradients
            for (r, &dz_r) in dz.iter().enumerate() {
                for (col, &x_v) in x_t.iter().enumerate() {
                    grads.w_x[[r, col]] += dz_r * x_v;
                }
                for (col, &h_v) in step.h_prev.iter().enumerate() {
                    grads.w_h[[r, col]] += dz_r * h_v;
                }
            }
            grads.b += &dz;

            dh = self.w_h.t().dot(&dz);
            dc = &dc * &step.f;
        }

        grads
    }

    /// Mutable access for the optimizer
    pub fn params_mut(&mut self) -> (&mut Array2<f64>, &mut Array2<f64>, &mut Array1<f64>) {
        (&mut self.w_x, &mut self.w_h, &mut self.b)
    }
}

/// Xavier-uniform initialization
fn xavier(rows: usize, cols: usize, rng: &mut StdRng) -> Array2<f64> {
    let limit = (6.0 / (rows + cols) as f64).sqrt();
    let dist = Uniform::new(-limit, limit);
    Array2::from_shape_fn((rows, cols), |_| dist.sample(rng))
}

/// Inverted dropout mask: zeroed cells are compensated by `1/(1-rate)`
pub fn dropout_mask(len: usize, rate: f64, rng: &mut StdRng) -> Array1<f64> {
    if rate <= 0.0 {
        return Array1::ones(len);
    }
    let keep = 1.0 - rate;
    Array1::from_shape_fn(len, |_| {
        if rng.gen::<f64>() < keep {
            1.0 / keep
        } else {
            0.0
        }
    })
}
