//! Fully connected gesture classifier trained with mini-batch Adam.
//!
//! Architecture: `Dense(128, ReLU) → Dropout(0.2) → Dense(64, ReLU) →
//! Dense(classes, softmax)`, sparse categorical cross-entropy loss. Weights use
//! Glorot-uniform initialization; all randomness comes from a seeded RNG.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::info;

use handsign_core::{DEFAULT_SEED, DEFAULT_TEST_FRACTION};

/// Probabilities are clipped to this before taking the log.
const LOSS_EPSILON: f32 = 1e-7;

/// Hyperparameters of the network harness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub hidden: Vec<usize>,
    /// Dropout rate applied after the first hidden layer while training.
    pub dropout: f32,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            hidden: vec![128, 64],
            dropout: 0.2,
            epochs: 20,
            batch_size: 32,
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            test_fraction: DEFAULT_TEST_FRACTION,
            seed: DEFAULT_SEED,
        }
    }
}

/// One fully connected layer: `output = input · weights + bias`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    /// `(inputs, outputs)`.
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl Dense {
    fn glorot(inputs: usize, outputs: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (inputs + outputs) as f32).sqrt();
        Self {
            weights: Array2::from_shape_fn((inputs, outputs), |_| rng.gen_range(-limit..limit)),
            bias: Array1::zeros(outputs),
        }
    }

    fn forward(&self, input: ArrayView2<f32>) -> Array2<f32> {
        input.dot(&self.weights) + &self.bias
    }
}

/// Loss and accuracy after one epoch, on the training and validation sides.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
    pub val_loss: f32,
    pub val_accuracy: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedForwardNetwork {
    /// Hidden layers followed by the softmax output layer.
    layers: Vec<Dense>,
    dropout: f32,
}

impl FeedForwardNetwork {
    pub fn new(
        inputs: usize,
        hidden: &[usize],
        classes: usize,
        dropout: f32,
        rng: &mut StdRng,
    ) -> Self {
        let mut widths = Vec::with_capacity(hidden.len() + 2);
        widths.push(inputs);
        widths.extend_from_slice(hidden);
        widths.push(classes);

        let layers = widths
            .windows(2)
            .map(|w| Dense::glorot(w[0], w[1], rng))
            .collect();
        Self { layers, dropout }
    }

    pub fn input_width(&self) -> usize {
        self.layers.first().map_or(0, |l| l.weights.nrows())
    }

    pub fn num_classes(&self) -> usize {
        self.layers.last().map_or(0, |l| l.weights.ncols())
    }

    /// Each layer's bias matches its output width and feeds the next layer's input.
    pub(crate) fn is_well_formed(&self) -> bool {
        !self.layers.is_empty()
            && (0.0..1.0).contains(&self.dropout)
            && self
                .layers
                .iter()
                .all(|l| l.bias.len() == l.weights.ncols())
            && self
                .layers
                .windows(2)
                .all(|w| w[0].weights.ncols() == w[1].weights.nrows())
    }

    /// Class probabilities for each row of `x` (dropout disabled).
    pub fn predict_proba(&self, x: ArrayView2<f32>) -> Array2<f32> {
        let last = self.layers.len() - 1;
        let mut activation = x.to_owned();
        for (i, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(activation.view());
            activation = if i == last { softmax(z) } else { z.mapv(relu) };
        }
        activation
    }

    /// Class probabilities for a single feature row.
    pub fn predict_one(&self, features: &[f32]) -> Vec<f32> {
        let row = ArrayView1::from(features).insert_axis(Axis(0));
        self.predict_proba(row).row(0).to_vec()
    }

    /// Mean cross-entropy and accuracy over `x` against integer labels `y`.
    pub fn evaluate(&self, x: ArrayView2<f32>, y: &[usize]) -> (f32, f32) {
        if y.is_empty() {
            return (0.0, 0.0);
        }
        let probs = self.predict_proba(x);
        let (loss, correct) = batch_loss(&probs, y);
        (loss / y.len() as f32, correct as f32 / y.len() as f32)
    }

    /// Train for `config.epochs` epochs, evaluating on `(x_val, y_val)` after each.
    pub fn fit(
        &mut self,
        x_train: ArrayView2<f32>,
        y_train: &[usize],
        x_val: ArrayView2<f32>,
        y_val: &[usize],
        config: &NetworkConfig,
        rng: &mut StdRng,
    ) -> Vec<EpochMetrics> {
        let mut adam = Adam::new(&self.layers, config);
        let mut order: Vec<usize> = (0..y_train.len()).collect();
        let mut history = Vec::with_capacity(config.epochs);
        let batch_size = config.batch_size.max(1);

        for epoch in 1..=config.epochs {
            order.shuffle(rng);
            let mut loss_sum = 0.0f32;
            let mut correct = 0usize;

            for batch in order.chunks(batch_size) {
                let xb = x_train.select(Axis(0), batch);
                let yb: Vec<usize> = batch.iter().map(|&i| y_train[i]).collect();
                let (loss, hits, grads) = self.backprop(xb.view(), &yb, rng);
                loss_sum += loss;
                correct += hits;
                adam.step(&mut self.layers, &grads);
            }

            let n = y_train.len().max(1) as f32;
            let (val_loss, val_accuracy) = self.evaluate(x_val, y_val);
            let metrics = EpochMetrics {
                epoch,
                loss: loss_sum / n,
                accuracy: correct as f32 / n,
                val_loss,
                val_accuracy,
            };
            info!(
                epoch,
                epochs = config.epochs,
                loss = metrics.loss,
                accuracy = metrics.accuracy,
                val_loss,
                val_accuracy,
                "epoch complete"
            );
            history.push(metrics);
        }
        history
    }

    /// Forward and backward pass over one batch with dropout active.
    ///
    /// Returns the summed loss, the number of correct predictions and the
    /// per-layer gradients of the mean loss.
    fn backprop(
        &self,
        x: ArrayView2<f32>,
        y: &[usize],
        rng: &mut StdRng,
    ) -> (f32, usize, Vec<(Array2<f32>, Array1<f32>)>) {
        let last = self.layers.len() - 1;
        // inputs[i] is the input of layer i.
        let mut inputs: Vec<Array2<f32>> = vec![x.to_owned()];
        let mut masks: Vec<Option<Array2<f32>>> = Vec::with_capacity(last);
        let mut probs = Array2::zeros((0, 0));

        for (i, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(inputs[i].view());
            if i == last {
                probs = softmax(z);
                break;
            }
            let mut a = z.mapv(relu);
            let mask = (i == 0 && self.dropout > 0.0).then(|| dropout_mask(a.dim(), self.dropout, rng));
            if let Some(mask) = &mask {
                a *= mask;
            }
            masks.push(mask);
            inputs.push(a);
        }

        let (loss, correct) = batch_loss(&probs, y);

        // d(mean loss)/d(logits) for softmax + cross-entropy.
        let batch = y.len() as f32;
        let mut delta = probs;
        for (mut row, &label) in delta.rows_mut().into_iter().zip(y) {
            row[label] -= 1.0;
        }
        delta /= batch;

        let mut grads = Vec::with_capacity(self.layers.len());
        for i in (0..self.layers.len()).rev() {
            let grad_w = inputs[i].t().dot(&delta);
            let grad_b = delta.sum_axis(Axis(0));
            if i > 0 {
                let mut upstream = delta.dot(&self.layers[i].weights.t());
                if let Some(mask) = &masks[i - 1] {
                    upstream *= mask;
                }
                upstream.zip_mut_with(&inputs[i], |g, &a| {
                    if a <= 0.0 {
                        *g = 0.0;
                    }
                });
                delta = upstream;
            }
            grads.push((grad_w, grad_b));
        }
        grads.reverse();
        (loss, correct, grads)
    }
}

fn relu(x: f32) -> f32 {
    x.max(0.0)
}

/// Row-wise softmax with max subtraction.
fn softmax(mut z: Array2<f32>) -> Array2<f32> {
    for mut row in z.rows_mut() {
        let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row /= sum;
        }
    }
    z
}

/// Inverted dropout: kept units are scaled by `1 / (1 - rate)`.
fn dropout_mask(dim: (usize, usize), rate: f32, rng: &mut StdRng) -> Array2<f32> {
    let keep = 1.0 - rate;
    Array2::from_shape_fn(dim, |_| if rng.r#gen::<f32>() < keep { 1.0 / keep } else { 0.0 })
}

/// Summed cross-entropy and correct-prediction count for one batch.
fn batch_loss(probs: &Array2<f32>, y: &[usize]) -> (f32, usize) {
    let mut loss = 0.0f32;
    let mut correct = 0usize;
    for (row, &label) in probs.rows().into_iter().zip(y) {
        loss -= row[label].clamp(LOSS_EPSILON, 1.0 - LOSS_EPSILON).ln();
        if argmax(row.iter().copied()) == label {
            correct += 1;
        }
    }
    (loss, correct)
}

/// Index of the largest value; the first one wins ties.
pub(crate) fn argmax(values: impl IntoIterator<Item = f32>) -> usize {
    let mut best = (0, f32::NEG_INFINITY);
    for (i, v) in values.into_iter().enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best.0
}

/// Adam with the bias correction folded into the step size.
struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    t: i32,
    m: Vec<(Array2<f32>, Array1<f32>)>,
    v: Vec<(Array2<f32>, Array1<f32>)>,
}

impl Adam {
    fn new(layers: &[Dense], config: &NetworkConfig) -> Self {
        let zeros: Vec<_> = layers
            .iter()
            .map(|l| (Array2::zeros(l.weights.raw_dim()), Array1::zeros(l.bias.raw_dim())))
            .collect();
        Self {
            lr: config.learning_rate,
            beta1: config.beta1,
            beta2: config.beta2,
            epsilon: config.epsilon,
            t: 0,
            m: zeros.clone(),
            v: zeros,
        }
    }

    fn step(&mut self, layers: &mut [Dense], grads: &[(Array2<f32>, Array1<f32>)]) {
        self.t += 1;
        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);
        let alpha = self.lr * (1.0 - b2.powi(self.t)).sqrt() / (1.0 - b1.powi(self.t));

        for (((layer, (gw, gb)), (mw, mb)), (vw, vb)) in layers
            .iter_mut()
            .zip(grads)
            .zip(self.m.iter_mut())
            .zip(self.v.iter_mut())
        {
            update(&mut layer.weights, gw, mw, vw, b1, b2, alpha, eps);
            update(&mut layer.bias, gb, mb, vb, b1, b2, alpha, eps);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn update<D: ndarray::Dimension>(
    param: &mut ndarray::Array<f32, D>,
    grad: &ndarray::Array<f32, D>,
    m: &mut ndarray::Array<f32, D>,
    v: &mut ndarray::Array<f32, D>,
    b1: f32,
    b2: f32,
    alpha: f32,
    eps: f32,
) {
    m.zip_mut_with(grad, |m, &g| *m = b1 * *m + (1.0 - b1) * g);
    v.zip_mut_with(grad, |v, &g| *v = b2 * *v + (1.0 - b2) * g * g);
    ndarray::Zip::from(param)
        .and(&*m)
        .and(&*v)
        .for_each(|p, &m, &v| *p -= alpha * m / (v.sqrt() + eps));
}
