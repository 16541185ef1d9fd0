/// ML модели

pub mod tree;
pub mod forest;
pub mod network;
pub mod knn;
pub mod svm;
pub mod hybrid;

use ndarray::{Array1, Array2};

use crate::error::{Result, ThyroError};

pub use forest::{ForestParams, RandomForest};
pub use hybrid::{HybridConfig, HybridEnsemble};
pub use knn::{KnnParams, KNearestNeighbors};
pub use network::{EpochRecord, HiddenLayer, NetworkParams, NeuralNetwork};
pub use svm::{PlattScaling, SupportVectorMachine, SvmParams};
pub use tree::{DecisionTree, TreeParams};

/// Общий контракт бинарного классификатора: fit -> predict
pub trait Classifier {
    fn name(&self) -> &str;

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()>;

    /// Вероятность класса 1 (аномалия) для каждой строки, в [0, 1]
    fn predict_probability(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Метка класса: 1, если вероятность строго больше 0.5
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let probabilities = self.predict_probability(x)?;
        Ok(probabilities.mapv(|p| usize::from(p > 0.5)))
    }
}

/// Проверка входа для fit: согласованные размеры, непустая выборка, метки 0/1
pub(crate) fn check_training_data(x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(ThyroError::EmptyDataset);
    }
    if x.nrows() != y.len() {
        return Err(ThyroError::InvalidInput(format!(
            "{} rows but {} labels",
            x.nrows(),
            y.len()
        )));
    }
    if y.iter().any(|&label| label > 1) {
        return Err(ThyroError::InvalidInput("labels must be 0 or 1".to_string()));
    }
    Ok(())
}

pub(crate) fn check_width(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(ThyroError::DimensionMismatch {
            expected,
            got: x.ncols(),
        });
    }
    Ok(())
}
