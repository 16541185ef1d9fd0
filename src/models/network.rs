//! Полносвязная нейросеть (DNN) для бинарной классификации
//!
//! Dense + ReLU, BatchNorm и Dropout в скрытых слоях, сигмоида на выходе.
//! Оптимизатор Adam, функция потерь - бинарная кросс-энтропия.
//! Ранняя остановка по валидационной потере с возвратом лучших весов.

use ndarray::{Array, Array1, Array2, Axis, Dimension, Ix1, Ix2, Zip};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::{check_training_data, check_width, Classifier};
use crate::error::{Result, ThyroError};

const BCE_EPSILON: f64 = 1e-7;
const BN_MOMENTUM: f64 = 0.99;
const BN_EPSILON: f64 = 1e-3;
const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiddenLayer {
    pub units: usize,
    pub batch_norm: bool,
    pub dropout: f64,
}

impl HiddenLayer {
    pub fn new(units: usize, batch_norm: bool, dropout: f64) -> Self {
        Self {
            units,
            batch_norm,
            dropout,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkParams {
    pub hidden_layers: Vec<HiddenLayer>,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    /// Эпох без улучшения валидационной потери до остановки
    pub patience: usize,
    pub validation_fraction: f64,
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            hidden_layers: vec![
                HiddenLayer::new(64, true, 0.3),
                HiddenLayer::new(32, true, 0.2),
                HiddenLayer::new(16, false, 0.1),
            ],
            learning_rate: 1e-3,
            epochs: 50,
            batch_size: 32,
            patience: 10,
            validation_fraction: 0.2,
        }
    }
}

impl NetworkParams {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 || self.batch_size == 0 {
            return Err(ThyroError::InvalidConfig(
                "network epochs and batch size must be positive".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0) {
            return Err(ThyroError::InvalidConfig(
                "network learning rate must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(ThyroError::InvalidConfig(format!(
                "validation fraction {} is outside [0, 1)",
                self.validation_fraction
            )));
        }
        for layer in &self.hidden_layers {
            if layer.units == 0 || !(0.0..1.0).contains(&layer.dropout) {
                return Err(ThyroError::InvalidConfig(format!(
                    "invalid hidden layer: {} units, dropout {}",
                    layer.units, layer.dropout
                )));
            }
        }
        Ok(())
    }
}

/// Статистика одной эпохи обучения
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub loss: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
}

/// Обучаемый параметр вместе с моментами Adam
#[derive(Debug, Clone)]
struct Param<D: Dimension> {
    value: Array<f64, D>,
    grad: Array<f64, D>,
    m: Array<f64, D>,
    v: Array<f64, D>,
}

impl<D: Dimension> Param<D> {
    fn new(value: Array<f64, D>) -> Self {
        let zeros = Array::zeros(value.raw_dim());
        Self {
            grad: zeros.clone(),
            m: zeros.clone(),
            v: zeros,
            value,
        }
    }

    fn adam_step(&mut self, learning_rate: f64, step: i32) {
        let correction1 = 1.0 - ADAM_BETA1.powi(step);
        let correction2 = 1.0 - ADAM_BETA2.powi(step);

        Zip::from(&mut self.value)
            .and(&mut self.m)
            .and(&mut self.v)
            .and(&self.grad)
            .for_each(|w, m, v, &g| {
                *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
                *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
                let m_hat = *m / correction1;
                let v_hat = *v / correction2;
                *w -= learning_rate * m_hat / (v_hat.sqrt() + ADAM_EPSILON);
            });
    }
}

#[derive(Debug, Clone)]
struct Dense {
    weights: Param<Ix2>,
    bias: Param<Ix1>,
    input: Array2<f64>,
}

impl Dense {
    /// Инициализация Glorot uniform
    fn new(n_in: usize, n_out: usize, rng: &mut ChaCha8Rng) -> Self {
        let limit = (6.0 / (n_in + n_out) as f64).sqrt();
        let weights = Array2::from_shape_fn((n_in, n_out), |_| rng.gen_range(-limit..limit));
        Self {
            weights: Param::new(weights),
            bias: Param::new(Array1::zeros(n_out)),
            input: Array2::zeros((0, n_in)),
        }
    }

    fn infer(&self, x: &Array2<f64>) -> Array2<f64> {
        x.dot(&self.weights.value) + &self.bias.value
    }

    fn forward(&mut self, x: Array2<f64>) -> Array2<f64> {
        let out = self.infer(&x);
        self.input = x;
        out
    }

    fn backward(&mut self, grad: &Array2<f64>) -> Array2<f64> {
        self.weights.grad = self.input.t().dot(grad);
        self.bias.grad = grad.sum_axis(Axis(0));
        grad.dot(&self.weights.value.t())
    }
}

#[derive(Debug, Clone)]
struct BatchNorm {
    gamma: Param<Ix1>,
    beta: Param<Ix1>,
    moving_mean: Array1<f64>,
    moving_var: Array1<f64>,
    x_hat: Array2<f64>,
    inv_std: Array1<f64>,
}

impl BatchNorm {
    fn new(units: usize) -> Self {
        Self {
            gamma: Param::new(Array1::ones(units)),
            beta: Param::new(Array1::zeros(units)),
            moving_mean: Array1::zeros(units),
            moving_var: Array1::ones(units),
            x_hat: Array2::zeros((0, units)),
            inv_std: Array1::ones(units),
        }
    }

    fn infer(&self, x: &Array2<f64>) -> Array2<f64> {
        let scale = &self.gamma.value / &self.moving_var.mapv(|v| (v + BN_EPSILON).sqrt());
        (x - &self.moving_mean) * &scale + &self.beta.value
    }

    fn forward(&mut self, x: Array2<f64>) -> Array2<f64> {
        let n = x.nrows() as f64;
        let mean = x.sum_axis(Axis(0)) / n;
        let centered = &x - &mean;
        let var = centered.mapv(|v| v * v).sum_axis(Axis(0)) / n;
        let inv_std = var.mapv(|v| 1.0 / (v + BN_EPSILON).sqrt());
        let x_hat = &centered * &inv_std;

        self.moving_mean = &self.moving_mean * BN_MOMENTUM + &mean * (1.0 - BN_MOMENTUM);
        self.moving_var = &self.moving_var * BN_MOMENTUM + &var * (1.0 - BN_MOMENTUM);

        let out = &x_hat * &self.gamma.value + &self.beta.value;
        self.x_hat = x_hat;
        self.inv_std = inv_std;
        out
    }

    fn backward(&mut self, grad: &Array2<f64>) -> Array2<f64> {
        let n = grad.nrows() as f64;
        self.gamma.grad = (grad * &self.x_hat).sum_axis(Axis(0));
        self.beta.grad = grad.sum_axis(Axis(0));

        let dx_hat = grad * &self.gamma.value;
        let sum_dx_hat = dx_hat.sum_axis(Axis(0));
        let sum_dx_hat_x_hat = (&dx_hat * &self.x_hat).sum_axis(Axis(0));

        (dx_hat * n - &sum_dx_hat - &self.x_hat * &sum_dx_hat_x_hat) * &self.inv_std / n
    }
}

#[derive(Debug, Clone)]
enum Layer {
    Dense(Dense),
    Relu { mask: Array2<f64> },
    BatchNorm(BatchNorm),
    Dropout { rate: f64, mask: Array2<f64> },
}

impl Layer {
    fn infer(&self, x: Array2<f64>) -> Array2<f64> {
        match self {
            Layer::Dense(dense) => dense.infer(&x),
            Layer::Relu { .. } => x.mapv(|v| v.max(0.0)),
            Layer::BatchNorm(bn) => bn.infer(&x),
            // На инференсе dropout не применяется
            Layer::Dropout { .. } => x,
        }
    }

    fn forward(&mut self, x: Array2<f64>, rng: &mut ChaCha8Rng) -> Array2<f64> {
        match self {
            Layer::Dense(dense) => dense.forward(x),
            Layer::Relu { mask } => {
                *mask = x.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
                x.mapv(|v| v.max(0.0))
            }
            Layer::BatchNorm(bn) => bn.forward(x),
            Layer::Dropout { rate, mask } => {
                let keep = 1.0 - *rate;
                *mask = Array2::from_shape_fn(x.dim(), |_| {
                    if rng.gen::<f64>() < *rate {
                        0.0
                    } else {
                        1.0 / keep
                    }
                });
                x * &*mask
            }
        }
    }

    fn backward(&mut self, grad: Array2<f64>) -> Array2<f64> {
        match self {
            Layer::Dense(dense) => dense.backward(&grad),
            Layer::Relu { mask } | Layer::Dropout { mask, .. } => grad * &*mask,
            Layer::BatchNorm(bn) => bn.backward(&grad),
        }
    }

    fn update(&mut self, learning_rate: f64, step: i32) {
        match self {
            Layer::Dense(dense) => {
                dense.weights.adam_step(learning_rate, step);
                dense.bias.adam_step(learning_rate, step);
            }
            Layer::BatchNorm(bn) => {
                bn.gamma.adam_step(learning_rate, step);
                bn.beta.adam_step(learning_rate, step);
            }
            Layer::Relu { .. } | Layer::Dropout { .. } => {}
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Средняя бинарная кросс-энтропия с обрезкой вероятностей
fn binary_cross_entropy(probabilities: &Array1<f64>, targets: &Array1<f64>) -> f64 {
    let n = probabilities.len().max(1) as f64;
    probabilities
        .iter()
        .zip(targets.iter())
        .map(|(&p, &t)| {
            let p = p.clamp(BCE_EPSILON, 1.0 - BCE_EPSILON);
            -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
        })
        .sum::<f64>()
        / n
}

pub struct NeuralNetwork {
    params: NetworkParams,
    seed: u64,
    layers: Vec<Layer>,
    n_features: usize,
    history: Vec<EpochRecord>,
    best_epoch: usize,
}

impl NeuralNetwork {
    pub fn new(params: NetworkParams, seed: u64) -> Self {
        Self {
            params,
            seed,
            layers: Vec::new(),
            n_features: 0,
            history: Vec::new(),
            best_epoch: 0,
        }
    }

    /// История обучения по эпохам
    pub fn history(&self) -> &[EpochRecord] {
        &self.history
    }

    /// Эпоха (с 1), веса которой восстановлены после обучения
    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }

    fn build_layers(&self, n_features: usize, rng: &mut ChaCha8Rng) -> Vec<Layer> {
        let mut layers = Vec::new();
        let mut n_in = n_features;

        for hidden in &self.params.hidden_layers {
            layers.push(Layer::Dense(Dense::new(n_in, hidden.units, rng)));
            layers.push(Layer::Relu {
                mask: Array2::zeros((0, hidden.units)),
            });
            if hidden.batch_norm {
                layers.push(Layer::BatchNorm(BatchNorm::new(hidden.units)));
            }
            if hidden.dropout > 0.0 {
                layers.push(Layer::Dropout {
                    rate: hidden.dropout,
                    mask: Array2::zeros((0, hidden.units)),
                });
            }
            n_in = hidden.units;
        }

        // Выходной нейрон, сигмоида применяется отдельно
        layers.push(Layer::Dense(Dense::new(n_in, 1, rng)));
        layers
    }

    fn infer(layers: &[Layer], x: &Array2<f64>) -> Array1<f64> {
        let mut out = x.to_owned();
        for layer in layers {
            out = layer.infer(out);
        }
        out.column(0).mapv(sigmoid)
    }

    fn train_batch(
        layers: &mut [Layer],
        x: Array2<f64>,
        targets: &Array1<f64>,
        learning_rate: f64,
        step: i32,
        rng: &mut ChaCha8Rng,
    ) -> f64 {
        let mut out = x;
        for layer in layers.iter_mut() {
            out = layer.forward(out, rng);
        }
        let probabilities = out.column(0).mapv(sigmoid);
        let loss = binary_cross_entropy(&probabilities, targets);

        // dL/dz для сигмоиды + BCE
        let n = targets.len() as f64;
        let mut grad = ((&probabilities - targets) / n).insert_axis(Axis(1));
        for layer in layers.iter_mut().rev() {
            grad = layer.backward(grad);
        }
        for layer in layers.iter_mut() {
            layer.update(learning_rate, step);
        }

        loss
    }
}

impl Classifier for NeuralNetwork {
    fn name(&self) -> &str {
        "DNN"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_training_data(x, y)?;
        self.params.validate()?;

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut layers = self.build_layers(x.ncols(), &mut rng);

        let n = x.nrows();
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);
        let n_val = (n as f64 * self.params.validation_fraction) as usize;
        let (val_indices, train_indices) = if n_val > 0 && n_val < n {
            let (val, train) = indices.split_at(n_val);
            (val.to_vec(), train.to_vec())
        } else {
            (Vec::new(), indices)
        };

        let x_val = x.select(Axis(0), &val_indices);
        let y_val: Array1<f64> = val_indices.iter().map(|&i| y[i] as f64).collect();

        let mut order = train_indices;
        let mut history = Vec::with_capacity(self.params.epochs);
        let mut best_loss = f64::INFINITY;
        let mut best_layers = layers.clone();
        let mut best_epoch = 0;
        let mut patience_counter = 0usize;
        let mut step = 0i32;

        for epoch in 1..=self.params.epochs {
            order.shuffle(&mut rng);

            let mut epoch_loss = 0.0;
            for batch in order.chunks(self.params.batch_size) {
                let xb = x.select(Axis(0), batch);
                let yb: Array1<f64> = batch.iter().map(|&i| y[i] as f64).collect();
                step = step.saturating_add(1);
                let loss = Self::train_batch(
                    &mut layers,
                    xb,
                    &yb,
                    self.params.learning_rate,
                    step,
                    &mut rng,
                );
                epoch_loss += loss * batch.len() as f64;
            }
            let loss = epoch_loss / order.len() as f64;

            let (val_loss, val_accuracy) = if val_indices.is_empty() {
                (None, None)
            } else {
                let proba = Self::infer(&layers, &x_val);
                let correct = proba
                    .iter()
                    .zip(y_val.iter())
                    .filter(|(p, t)| (**p > 0.5) == (**t > 0.5))
                    .count();
                (
                    Some(binary_cross_entropy(&proba, &y_val)),
                    Some(correct as f64 / y_val.len() as f64),
                )
            };

            let monitored = val_loss.unwrap_or(loss);
            let improved = monitored < best_loss;
            if improved {
                best_loss = monitored;
                best_layers = layers.clone();
                best_epoch = epoch;
                patience_counter = 0;
            } else {
                patience_counter += 1;
            }

            tracing::debug!(
                "DNN epoch {:3} | loss={:.4} val_loss={:.4}{}",
                epoch,
                loss,
                monitored,
                if improved { " *" } else { "" }
            );

            history.push(EpochRecord {
                epoch,
                loss,
                val_loss,
                val_accuracy,
            });

            if patience_counter >= self.params.patience {
                tracing::info!(
                    "DNN early stopping at epoch {} (best epoch {}, val_loss={:.4})",
                    epoch,
                    best_epoch,
                    best_loss
                );
                break;
            }
        }

        self.layers = best_layers;
        self.n_features = x.ncols();
        self.history = history;
        self.best_epoch = best_epoch;
        Ok(())
    }

    fn predict_probability(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.layers.is_empty() {
            return Err(ThyroError::NotFitted("neural network"));
        }
        check_width(self.n_features, x)?;
        Ok(Self::infer(&self.layers, x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs(n: usize, seed: u64) -> (Array2<f64>, Array1<usize>) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut x = Array2::zeros((n, 3));
        let mut y = Array1::zeros(n);
        for i in 0..n {
            let label = usize::from(i % 2 == 0);
            let center = if label == 1 { 0.8 } else { 0.2 };
            for j in 0..3 {
                x[[i, j]] = center + rng.gen_range(-0.1..0.1);
            }
            y[i] = label;
        }
        (x, y)
    }

    fn fast_params() -> NetworkParams {
        NetworkParams {
            learning_rate: 0.01,
            epochs: 60,
            batch_size: 16,
            patience: 60,
            ..NetworkParams::default()
        }
    }

    #[test]
    fn learns_separable_blobs() {
        let (x, y) = blobs(200, 5);
        let mut network = NeuralNetwork::new(fast_params(), 42);
        network.fit(&x, &y).unwrap();

        let predictions = network.predict(&x).unwrap();
        let correct = predictions.iter().zip(y.iter()).filter(|(p, t)| p == t).count();
        assert!(correct >= 180, "only {} of 200 correct", correct);

        let proba = network.predict_probability(&x).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn history_respects_early_stopping() {
        let (x, _) = blobs(120, 9);
        // Случайные метки: валидационная потеря быстро перестаёт падать
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let y: Array1<usize> = (0..120).map(|_| rng.gen_range(0..2)).collect();

        let params = NetworkParams {
            epochs: 100,
            patience: 3,
            ..NetworkParams::default()
        };
        let mut network = NeuralNetwork::new(params, 7);
        network.fit(&x, &y).unwrap();

        let history = network.history();
        assert!(!history.is_empty() && history.len() <= 100);
        assert!(network.best_epoch() >= 1);
        assert!(
            history.len() == 100 || history.len() == network.best_epoch() + 3,
            "stopped at {} with best epoch {}",
            history.len(),
            network.best_epoch()
        );
        assert!(history.iter().all(|r| r.val_loss.is_some()));
    }

    #[test]
    fn same_seed_same_network() {
        let (x, y) = blobs(64, 3);
        let params = NetworkParams {
            epochs: 5,
            ..NetworkParams::default()
        };
        let mut a = NeuralNetwork::new(params.clone(), 11);
        let mut b = NeuralNetwork::new(params, 11);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(
            a.predict_probability(&x).unwrap(),
            b.predict_probability(&x).unwrap()
        );
    }

    #[test]
    fn invalid_validation_fraction_is_rejected() {
        let (x, y) = blobs(10, 0);
        let params = NetworkParams {
            validation_fraction: 1.0,
            ..NetworkParams::default()
        };
        let mut network = NeuralNetwork::new(params, 0);
        assert!(matches!(
            network.fit(&x, &y),
            Err(ThyroError::InvalidConfig(_))
        ));
    }

    #[test]
    fn bce_matches_hand_computation() {
        let p = ndarray::array![0.9, 0.2];
        let t = ndarray::array![1.0, 0.0];
        let expected = -(0.9f64.ln() + 0.8f64.ln()) / 2.0;
        assert!((binary_cross_entropy(&p, &t) - expected).abs() < 1e-12);
    }
}
