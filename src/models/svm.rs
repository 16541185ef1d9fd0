//! SVM с RBF-ядром (SMO) и калибровкой вероятностей по Платту

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::{check_training_data, check_width, Classifier};
use crate::error::{Result, ThyroError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SvmParams {
    pub c: f64,
    /// None = "scale": 1 / (n_features * var(X))
    pub gamma: Option<f64>,
    pub tolerance: f64,
    pub max_passes: usize,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            gamma: None,
            tolerance: 1e-3,
            max_passes: 200,
        }
    }
}

/// Калибровка Платта: P(y=1|f) = 1 / (1 + exp(A*f + B))
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlattScaling {
    pub a: f64,
    pub b: f64,
}

impl Default for PlattScaling {
    fn default() -> Self {
        Self { a: -1.0, b: 0.0 }
    }
}

impl PlattScaling {
    /// Подбор A и B методом Ньютона с бэктрекингом (Lin, Lin, Weng)
    pub fn fit(scores: &[f64], labels: &[bool]) -> Self {
        if scores.is_empty() || scores.len() != labels.len() {
            return Self::default();
        }

        let prior1 = labels.iter().filter(|&&l| l).count() as f64;
        let prior0 = labels.len() as f64 - prior1;
        let hi_target = (prior1 + 1.0) / (prior1 + 2.0);
        let lo_target = 1.0 / (prior0 + 2.0);
        let targets: Vec<f64> = labels
            .iter()
            .map(|&l| if l { hi_target } else { lo_target })
            .collect();

        let objective = |a: f64, b: f64| -> f64 {
            scores
                .iter()
                .zip(targets.iter())
                .map(|(&f, &t)| {
                    let fapb = f * a + b;
                    if fapb >= 0.0 {
                        t * fapb + (1.0 + (-fapb).exp()).ln()
                    } else {
                        (t - 1.0) * fapb + (1.0 + fapb.exp()).ln()
                    }
                })
                .sum()
        };

        let sigma = 1e-12;
        let min_step = 1e-10;
        let mut a = 0.0;
        let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
        let mut fval = objective(a, b);

        for _ in 0..100 {
            let (mut h11, mut h22, mut h21) = (sigma, sigma, 0.0);
            let (mut g1, mut g2) = (0.0, 0.0);

            for (&f, &t) in scores.iter().zip(targets.iter()) {
                let fapb = f * a + b;
                let (p, q) = if fapb >= 0.0 {
                    let e = (-fapb).exp();
                    (e / (1.0 + e), 1.0 / (1.0 + e))
                } else {
                    let e = fapb.exp();
                    (1.0 / (1.0 + e), e / (1.0 + e))
                };
                let d2 = p * q;
                h11 += f * f * d2;
                h22 += d2;
                h21 += f * d2;
                let d1 = t - p;
                g1 += f * d1;
                g2 += d1;
            }

            if g1.abs() < 1e-5 && g2.abs() < 1e-5 {
                break;
            }

            let det = h11 * h22 - h21 * h21;
            let da = -(h22 * g1 - h21 * g2) / det;
            let db = -(-h21 * g1 + h11 * g2) / det;
            let gd = g1 * da + g2 * db;

            let mut step = 1.0;
            while step >= min_step {
                let new_a = a + step * da;
                let new_b = b + step * db;
                let new_f = objective(new_a, new_b);
                if new_f < fval + 1e-4 * step * gd {
                    a = new_a;
                    b = new_b;
                    fval = new_f;
                    break;
                }
                step /= 2.0;
            }

            if step < min_step {
                tracing::debug!("Platt scaling: line search failed");
                break;
            }
        }

        Self { a, b }
    }

    pub fn transform(&self, score: f64) -> f64 {
        let fapb = score * self.a + self.b;
        if fapb >= 0.0 {
            let e = (-fapb).exp();
            e / (1.0 + e)
        } else {
            1.0 / (1.0 + fapb.exp())
        }
    }
}

fn rbf(a: ArrayView1<f64>, b: ArrayView1<f64>, gamma: f64) -> f64 {
    let d: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
    (-gamma * d).exp()
}

/// Решатель SMO (Platt, 1998) с кешем ошибок
struct Smo<'a> {
    x: &'a Array2<f64>,
    y: Vec<f64>,
    c: f64,
    gamma: f64,
    tolerance: f64,
    alpha: Vec<f64>,
    b: f64,
    errors: Vec<f64>,
    rng: ChaCha8Rng,
}

impl<'a> Smo<'a> {
    const EPS: f64 = 1e-5;

    fn kernel(&self, i: usize, j: usize) -> f64 {
        rbf(self.x.row(i), self.x.row(j), self.gamma)
    }

    fn is_bound(&self, i: usize) -> bool {
        self.alpha[i] <= 0.0 || self.alpha[i] >= self.c
    }

    fn solve(&mut self, max_passes: usize) -> usize {
        let n = self.y.len();
        let mut passes = 0;
        let mut examine_all = true;
        let mut num_changed = 0;

        while (num_changed > 0 || examine_all) && passes < max_passes {
            num_changed = 0;
            for i in 0..n {
                if examine_all || !self.is_bound(i) {
                    num_changed += usize::from(self.examine(i));
                }
            }

            if examine_all {
                examine_all = false;
            } else if num_changed == 0 {
                examine_all = true;
            }
            passes += 1;
        }

        passes
    }

    fn examine(&mut self, i2: usize) -> bool {
        let n = self.y.len();
        let r2 = self.errors[i2] * self.y[i2];
        let violates = (r2 < -self.tolerance && self.alpha[i2] < self.c)
            || (r2 > self.tolerance && self.alpha[i2] > 0.0);
        if !violates {
            return false;
        }

        // Вторая точка: максимальный |E1 - E2| среди несвязанных
        let e2 = self.errors[i2];
        let partner = (0..n)
            .filter(|&i| i != i2 && !self.is_bound(i))
            .max_by(|&a, &b| {
                (self.errors[a] - e2)
                    .abs()
                    .partial_cmp(&(self.errors[b] - e2).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        if let Some(i1) = partner {
            if self.take_step(i1, i2) {
                return true;
            }
        }

        let start = self.rng.gen_range(0..n);
        for offset in 0..n {
            let i1 = (start + offset) % n;
            if !self.is_bound(i1) && self.take_step(i1, i2) {
                return true;
            }
        }

        let start = self.rng.gen_range(0..n);
        for offset in 0..n {
            let i1 = (start + offset) % n;
            if self.take_step(i1, i2) {
                return true;
            }
        }

        false
    }

    fn take_step(&mut self, i1: usize, i2: usize) -> bool {
        if i1 == i2 {
            return false;
        }

        let (a1, a2) = (self.alpha[i1], self.alpha[i2]);
        let (y1, y2) = (self.y[i1], self.y[i2]);
        let (e1, e2) = (self.errors[i1], self.errors[i2]);
        let s = y1 * y2;

        let (low, high) = if (y1 - y2).abs() > f64::EPSILON {
            ((a2 - a1).max(0.0), (self.c + a2 - a1).min(self.c))
        } else {
            ((a1 + a2 - self.c).max(0.0), (a1 + a2).min(self.c))
        };
        if high - low < 1e-12 {
            return false;
        }

        let k12 = self.kernel(i1, i2);
        // Для RBF K(x, x) = 1
        let (k11, k22) = (1.0, 1.0);
        let eta = k11 + k22 - 2.0 * k12;
        if eta <= 1e-12 {
            return false;
        }

        let a2_new = (a2 + y2 * (e1 - e2) / eta).clamp(low, high);
        if (a2_new - a2).abs() < Self::EPS * (a2_new + a2 + Self::EPS) {
            return false;
        }
        let a1_new = (a1 + s * (a2 - a2_new)).clamp(0.0, self.c);

        let d1 = y1 * (a1_new - a1);
        let d2 = y2 * (a2_new - a2);
        let b1 = self.b - e1 - d1 * k11 - d2 * k12;
        let b2 = self.b - e2 - d1 * k12 - d2 * k22;
        let b_new = if a1_new > 0.0 && a1_new < self.c {
            b1
        } else if a2_new > 0.0 && a2_new < self.c {
            b2
        } else {
            (b1 + b2) / 2.0
        };
        let db = b_new - self.b;

        for k in 0..self.errors.len() {
            let delta = d1 * self.kernel(i1, k) + d2 * self.kernel(i2, k) + db;
            self.errors[k] += delta;
        }

        self.alpha[i1] = a1_new;
        self.alpha[i2] = a2_new;
        self.b = b_new;
        true
    }
}

pub struct SupportVectorMachine {
    params: SvmParams,
    seed: u64,
    support_vectors: Option<Array2<f64>>,
    dual_coef: Array1<f64>,
    intercept: f64,
    gamma: f64,
    platt: PlattScaling,
}

impl SupportVectorMachine {
    pub fn new(params: SvmParams, seed: u64) -> Self {
        Self {
            params,
            seed,
            support_vectors: None,
            dual_coef: Array1::zeros(0),
            intercept: 0.0,
            gamma: 0.0,
            platt: PlattScaling::default(),
        }
    }

    pub fn n_support(&self) -> usize {
        self.dual_coef.len()
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Значение решающей функции f(x) = sum(alpha_i * y_i * K(sv_i, x)) + b
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let support_vectors = self
            .support_vectors
            .as_ref()
            .ok_or(ThyroError::NotFitted("svm"))?;
        check_width(support_vectors.ncols(), x)?;

        Ok(x.rows()
            .into_iter()
            .map(|row| {
                support_vectors
                    .rows()
                    .into_iter()
                    .zip(self.dual_coef.iter())
                    .map(|(sv, &coef)| coef * rbf(sv, row, self.gamma))
                    .sum::<f64>()
                    + self.intercept
            })
            .collect())
    }
}

impl Classifier for SupportVectorMachine {
    fn name(&self) -> &str {
        "SVM"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_training_data(x, y)?;
        if self.params.c <= 0.0 {
            return Err(ThyroError::InvalidConfig("svm C must be positive".to_string()));
        }
        let positives = y.iter().filter(|&&l| l == 1).count();
        if positives == 0 || positives == y.len() {
            return Err(ThyroError::InvalidInput(
                "svm needs both classes in the training data".to_string(),
            ));
        }

        let gamma = match self.params.gamma {
            Some(gamma) => gamma,
            None => {
                let mean = x.mean().unwrap_or(0.0);
                let variance =
                    x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / x.len() as f64;
                if variance > 0.0 {
                    1.0 / (x.ncols() as f64 * variance)
                } else {
                    1.0
                }
            }
        };

        let y_signed: Vec<f64> = y.iter().map(|&l| if l == 1 { 1.0 } else { -1.0 }).collect();
        let mut smo = Smo {
            x,
            errors: y_signed.iter().map(|v| -v).collect(),
            y: y_signed,
            c: self.params.c,
            gamma,
            tolerance: self.params.tolerance,
            alpha: vec![0.0; x.nrows()],
            b: 0.0,
            rng: ChaCha8Rng::seed_from_u64(self.seed),
        };
        let passes = smo.solve(self.params.max_passes);

        let support: Vec<usize> = (0..x.nrows()).filter(|&i| smo.alpha[i] > 1e-8).collect();
        let dual_coef: Array1<f64> = support.iter().map(|&i| smo.alpha[i] * smo.y[i]).collect();
        let intercept = smo.b;

        tracing::debug!(
            "SVM trained: {} support vectors, gamma={:.4}, {} passes",
            support.len(),
            gamma,
            passes
        );

        self.support_vectors = Some(x.select(Axis(0), &support));
        self.dual_coef = dual_coef;
        self.intercept = intercept;
        self.gamma = gamma;

        // Калибровка на решающей функции обучающей выборки
        let scores = self.decision_function(x)?.to_vec();
        let labels: Vec<bool> = y.iter().map(|&l| l == 1).collect();
        self.platt = PlattScaling::fit(&scores, &labels);

        Ok(())
    }

    fn predict_probability(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let scores = self.decision_function(x)?;
        Ok(scores.mapv(|s| self.platt.transform(s)))
    }

    /// Метка по знаку решающей функции (как в libsvm), а не по вероятности
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let scores = self.decision_function(x)?;
        Ok(scores.mapv(|s| usize::from(s > 0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs(seed: u64) -> (Array2<f64>, Array1<usize>) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let n = 60;
        let mut x = Array2::zeros((n, 2));
        let mut y = Array1::zeros(n);
        for i in 0..n {
            let label = usize::from(i % 2 == 1);
            let center = if label == 1 { 0.75 } else { 0.25 };
            x[[i, 0]] = center + rng.gen_range(-0.15..0.15);
            x[[i, 1]] = center + rng.gen_range(-0.15..0.15);
            y[i] = label;
        }
        (x, y)
    }

    #[test]
    fn separates_blobs() {
        let (x, y) = blobs(1);
        let mut svm = SupportVectorMachine::new(SvmParams::default(), 42);
        svm.fit(&x, &y).unwrap();

        let predictions = svm.predict(&x).unwrap();
        let correct = predictions.iter().zip(y.iter()).filter(|(p, t)| p == t).count();
        assert!(correct >= 57, "only {} of 60 correct", correct);
        assert!(svm.n_support() > 0);
    }

    #[test]
    fn calibrated_probability_follows_decision_value() {
        let (x, y) = blobs(2);
        let mut svm = SupportVectorMachine::new(SvmParams::default(), 42);
        svm.fit(&x, &y).unwrap();

        let probe = ndarray::array![[0.1, 0.1], [0.5, 0.5], [0.9, 0.9]];
        let proba = svm.predict_probability(&probe).unwrap();
        assert!(proba[0] < proba[1] && proba[1] < proba[2]);
        assert!(proba[0] < 0.5 && proba[2] > 0.5);
    }

    #[test]
    fn single_class_is_rejected() {
        let x = ndarray::array![[0.0], [1.0]];
        let y = ndarray::array![1, 1];
        let mut svm = SupportVectorMachine::new(SvmParams::default(), 0);
        assert!(matches!(svm.fit(&x, &y), Err(ThyroError::InvalidInput(_))));
    }

    #[test]
    fn platt_scaling_is_monotone_for_separable_scores() {
        let scores = [-2.0, -1.5, -1.0, 1.0, 1.5, 2.0];
        let labels = [false, false, false, true, true, true];
        let platt = PlattScaling::fit(&scores, &labels);

        assert!(platt.a < 0.0);
        assert!(platt.transform(-2.0) < 0.5);
        assert!(platt.transform(2.0) > 0.5);
        assert!(platt.transform(0.5) < platt.transform(1.0));
    }
}
