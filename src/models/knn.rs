//! K ближайших соседей (евклидово расстояние, равные веса)

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::{check_training_data, check_width, Classifier};
use crate::error::{Result, ThyroError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnParams {
    pub k: usize,
}

impl Default for KnnParams {
    fn default() -> Self {
        Self { k: 5 }
    }
}

pub struct KNearestNeighbors {
    k: usize,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<usize>>,
}

impl KNearestNeighbors {
    pub fn new(params: KnnParams) -> Self {
        Self {
            k: params.k,
            x_train: None,
            y_train: None,
        }
    }
}

impl Classifier for KNearestNeighbors {
    fn name(&self) -> &str {
        "KNN"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_training_data(x, y)?;
        if self.k == 0 || self.k > x.nrows() {
            return Err(ThyroError::InvalidConfig(format!(
                "k = {} is out of range for {} training rows",
                self.k,
                x.nrows()
            )));
        }

        // Ленивая модель: просто запоминаем выборку
        self.x_train = Some(x.to_owned());
        self.y_train = Some(y.to_owned());
        Ok(())
    }

    fn predict_probability(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (x_train, y_train) = match (&self.x_train, &self.y_train) {
            (Some(x_train), Some(y_train)) => (x_train, y_train),
            _ => return Err(ThyroError::NotFitted("knn")),
        };
        check_width(x_train.ncols(), x)?;

        let mut probabilities = Array1::zeros(x.nrows());
        let mut distances: Vec<(f64, usize)> = Vec::with_capacity(x_train.nrows());

        for (i, row) in x.rows().into_iter().enumerate() {
            distances.clear();
            for (j, train_row) in x_train.rows().into_iter().enumerate() {
                let d: f64 = row
                    .iter()
                    .zip(train_row.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum();
                distances.push((d, j));
            }

            // Стабильная сортировка: при равных расстояниях раньше идёт меньший индекс
            distances.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            let positives = distances[..self.k]
                .iter()
                .filter(|&&(_, j)| y_train[j] == 1)
                .count();
            probabilities[i] = positives as f64 / self.k as f64;
        }

        Ok(probabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn probability_is_neighbour_vote_share() {
        let x = array![[0.0], [0.1], [0.2], [1.0], [1.1]];
        let y = array![0, 0, 1, 1, 1];
        let mut knn = KNearestNeighbors::new(KnnParams { k: 3 });
        knn.fit(&x, &y).unwrap();

        let proba = knn.predict_probability(&array![[0.05], [1.05]]).unwrap();
        assert!((proba[0] - 1.0 / 3.0).abs() < 1e-12);
        assert!((proba[1] - 1.0).abs() < 1e-12);
        assert_eq!(knn.predict(&array![[0.05], [1.05]]).unwrap(), array![0, 1]);
    }

    #[test]
    fn k_larger_than_training_set_is_rejected() {
        let mut knn = KNearestNeighbors::new(KnnParams::default());
        let result = knn.fit(&array![[0.0], [1.0]], &array![0, 1]);
        assert!(matches!(result, Err(ThyroError::InvalidConfig(_))));
    }
}
