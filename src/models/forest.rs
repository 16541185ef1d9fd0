//! Random Forest: бэггинг деревьев решений

use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::tree::{DecisionTree, TreeParams};
use super::{check_training_data, check_width, Classifier};
use crate::error::{Result, ThyroError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// None = sqrt(число признаков)
    pub max_features: Option<usize>,
    pub bootstrap: bool,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
        }
    }
}

pub struct RandomForest {
    params: ForestParams,
    seed: u64,
    trees: Vec<DecisionTree>,
    n_features: usize,
    importances: Option<Array1<f64>>,
}

impl RandomForest {
    pub fn new(params: ForestParams, seed: u64) -> Self {
        Self {
            params,
            seed,
            trees: Vec::new(),
            n_features: 0,
            importances: None,
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Средняя по деревьям важность признаков, нормированная к сумме 1
    pub fn feature_importances(&self) -> Result<&Array1<f64>> {
        self.importances
            .as_ref()
            .ok_or(ThyroError::NotFitted("random forest"))
    }
}

impl Classifier for RandomForest {
    fn name(&self) -> &str {
        "Random Forest"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_training_data(x, y)?;
        if self.params.n_trees == 0 {
            return Err(ThyroError::InvalidConfig(
                "random forest needs at least one tree".to_string(),
            ));
        }

        let n_samples = x.nrows();
        let n_features = x.ncols();
        let max_features = self
            .params
            .max_features
            .unwrap_or_else(|| ((n_features as f64).sqrt() as usize).max(1));

        let tree_params = TreeParams {
            max_depth: self.params.max_depth,
            min_samples_split: self.params.min_samples_split,
            min_samples_leaf: self.params.min_samples_leaf,
            max_features: Some(max_features),
        };

        let mut trees = Vec::with_capacity(self.params.n_trees);
        let mut importances = Array1::<f64>::zeros(n_features);

        for t in 0..self.params.n_trees {
            let tree_seed = self.seed.wrapping_add(t as u64);
            let mut rng = ChaCha8Rng::seed_from_u64(tree_seed);

            // Бутстреп-выборка
            let indices: Vec<usize> = if self.params.bootstrap {
                (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
            } else {
                (0..n_samples).collect()
            };

            let mut tree = DecisionTree::new(tree_params.clone(), rng.gen());
            tree.fit_on_indices(x, y, indices)?;
            importances += tree.feature_importances()?;
            trees.push(tree);
        }

        let total = importances.sum();
        if total > 0.0 {
            importances /= total;
        }

        tracing::debug!(
            "Random forest trained: {} trees, {} candidate features per split",
            trees.len(),
            max_features
        );

        self.trees = trees;
        self.n_features = n_features;
        self.importances = Some(importances);
        Ok(())
    }

    fn predict_probability(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(ThyroError::NotFitted("random forest"));
        }
        check_width(self.n_features, x)?;

        let mut scores = Array1::<f64>::zeros(x.nrows());
        for tree in &self.trees {
            scores += &tree.predict_probability(x)?;
        }
        scores /= self.trees.len() as f64;

        Ok(scores)
    }
}
