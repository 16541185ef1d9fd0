//! Дерево решений для классификации (CART, критерий Джини)

use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::{check_training_data, check_width, Classifier};
use crate::error::{Result, ThyroError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Сколько признаков рассматривать на каждом разбиении (None = все)
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

#[derive(Debug, Clone)]
enum TreeNode {
    Leaf {
        probability: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    params: TreeParams,
    seed: u64,
    root: Option<TreeNode>,
    n_features: usize,
    importances: Option<Array1<f64>>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
    left_n: usize,
    left_pos: usize,
}

/// Состояние построения одного дерева
struct Builder<'a> {
    x: &'a Array2<f64>,
    y: &'a Array1<usize>,
    params: &'a TreeParams,
    n_candidates: usize,
    rng: ChaCha8Rng,
    importances: Vec<f64>,
}

fn gini(positives: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = positives as f64 / total as f64;
    2.0 * p * (1.0 - p)
}

impl<'a> Builder<'a> {
    fn build(&mut self, indices: Vec<usize>, depth: usize) -> TreeNode {
        let n = indices.len();
        let positives = indices.iter().filter(|&&i| self.y[i] == 1).count();
        let probability = positives as f64 / n as f64;

        let depth_reached = self.params.max_depth.map_or(false, |max| depth >= max);
        if positives == 0
            || positives == n
            || depth_reached
            || n < self.params.min_samples_split
            || n < 2 * self.params.min_samples_leaf
        {
            return TreeNode::Leaf { probability };
        }

        let best = match self.find_split(&indices, positives) {
            Some(best) => best,
            None => return TreeNode::Leaf { probability },
        };

        // Важность признака: взвешенное уменьшение неоднородности
        let right_n = n - best.left_n;
        let right_pos = positives - best.left_pos;
        let decrease = n as f64 * gini(positives, n)
            - best.left_n as f64 * gini(best.left_pos, best.left_n)
            - right_n as f64 * gini(right_pos, right_n);
        self.importances[best.feature] += decrease.max(0.0);

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.x[[i, best.feature]] <= best.threshold);

        TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.build(left_indices, depth + 1)),
            right: Box::new(self.build(right_indices, depth + 1)),
        }
    }

    fn find_split(&mut self, indices: &[usize], positives: usize) -> Option<BestSplit> {
        let n = indices.len();
        let min_leaf = self.params.min_samples_leaf.max(1);

        let mut features: Vec<usize> = (0..self.x.ncols()).collect();
        features.shuffle(&mut self.rng);

        let mut best: Option<BestSplit> = None;
        let mut visited = 0;

        for feature in features {
            // Лимит кандидатов действует, только если разбиение уже найдено
            if visited >= self.n_candidates && best.is_some() {
                break;
            }

            let mut sorted: Vec<(f64, usize)> = indices
                .iter()
                .map(|&i| (self.x[[i, feature]], self.y[i]))
                .collect();
            sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            if sorted[0].0 == sorted[n - 1].0 {
                continue;
            }
            visited += 1;

            let mut left_pos = 0;
            for i in 0..n - 1 {
                left_pos += sorted[i].1;
                if sorted[i].0 == sorted[i + 1].0 {
                    continue;
                }

                let left_n = i + 1;
                let right_n = n - left_n;
                if left_n < min_leaf || right_n < min_leaf {
                    continue;
                }

                let impurity = (left_n as f64 * gini(left_pos, left_n)
                    + right_n as f64 * gini(positives - left_pos, right_n))
                    / n as f64;

                let improves = best
                    .as_ref()
                    .map_or(true, |b| impurity < b.impurity - 1e-12);
                if improves {
                    let mut threshold = (sorted[i].0 + sorted[i + 1].0) / 2.0;
                    if threshold == sorted[i + 1].0 {
                        threshold = sorted[i].0;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        impurity,
                        left_n,
                        left_pos,
                    });
                }
            }
        }

        best
    }
}

impl DecisionTree {
    pub fn new(params: TreeParams, seed: u64) -> Self {
        Self {
            params,
            seed,
            root: None,
            n_features: 0,
            importances: None,
        }
    }

    /// Обучение на подмножестве строк (индексы могут повторяться, как в бутстрепе)
    pub fn fit_on_indices(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<usize>,
        indices: Vec<usize>,
    ) -> Result<()> {
        check_training_data(x, y)?;
        if indices.is_empty() {
            return Err(ThyroError::EmptyDataset);
        }

        let n_candidates = self
            .params
            .max_features
            .unwrap_or(x.ncols())
            .clamp(1, x.ncols());

        let (root, raw_importances) = {
            let mut builder = Builder {
                x,
                y,
                params: &self.params,
                n_candidates,
                rng: ChaCha8Rng::seed_from_u64(self.seed),
                importances: vec![0.0; x.ncols()],
            };
            let root = builder.build(indices, 0);
            (root, builder.importances)
        };

        let total: f64 = raw_importances.iter().sum();
        let importances = if total > 0.0 {
            raw_importances.iter().map(|v| v / total).collect()
        } else {
            Array1::zeros(x.ncols())
        };

        self.root = Some(root);
        self.n_features = x.ncols();
        self.importances = Some(importances);
        Ok(())
    }

    /// Нормированные важности признаков (сумма = 1)
    pub fn feature_importances(&self) -> Result<&Array1<f64>> {
        self.importances
            .as_ref()
            .ok_or(ThyroError::NotFitted("decision tree"))
    }

    pub fn depth(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        self.root.as_ref().map_or(0, walk)
    }

    fn predict_single(node: &TreeNode, x: &Array2<f64>, row: usize) -> f64 {
        match node {
            TreeNode::Leaf { probability } => *probability,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if x[[row, *feature]] <= *threshold {
                    Self::predict_single(left, x, row)
                } else {
                    Self::predict_single(right, x, row)
                }
            }
        }
    }
}

impl Classifier for DecisionTree {
    fn name(&self) -> &str {
        "Decision Tree"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        self.fit_on_indices(x, y, (0..x.nrows()).collect())
    }

    fn predict_probability(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self
            .root
            .as_ref()
            .ok_or(ThyroError::NotFitted("decision tree"))?;
        check_width(self.n_features, x)?;

        Ok((0..x.nrows())
            .map(|row| Self::predict_single(root, x, row))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn separates_threshold_problem() {
        let x = array![[0.1, 5.0], [0.2, 3.0], [0.3, 4.0], [0.7, 5.0], [0.8, 3.0], [0.9, 4.0]];
        let y = array![0, 0, 0, 1, 1, 1];
        let mut tree = DecisionTree::new(TreeParams::default(), 42);
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.predict(&x).unwrap(), y);
        assert_eq!(tree.depth(), 1);

        let importances = tree.feature_importances().unwrap();
        assert!((importances[0] - 1.0).abs() < 1e-12);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn identical_rows_with_mixed_labels_become_leaf() {
        let x = array![[1.0], [1.0], [1.0], [1.0]];
        let y = array![0, 1, 1, 1];
        let mut tree = DecisionTree::new(TreeParams::default(), 0);
        tree.fit(&x, &y).unwrap();

        let proba = tree.predict_probability(&array![[1.0]]).unwrap();
        assert!((proba[0] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn max_depth_limits_growth() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![0, 1, 0, 1, 0, 1];
        let params = TreeParams {
            max_depth: Some(1),
            ..TreeParams::default()
        };
        let mut tree = DecisionTree::new(params, 1);
        tree.fit(&x, &y).unwrap();
        assert!(tree.depth() <= 1);
    }

    #[test]
    fn predict_before_fit_fails() {
        let tree = DecisionTree::new(TreeParams::default(), 0);
        assert!(matches!(
            tree.predict(&array![[1.0]]),
            Err(ThyroError::NotFitted(_))
        ));
    }

    #[test]
    fn width_mismatch_is_reported() {
        let mut tree = DecisionTree::new(TreeParams::default(), 0);
        tree.fit(&array![[0.0, 1.0], [1.0, 0.0]], &array![0, 1]).unwrap();
        assert!(matches!(
            tree.predict(&array![[0.0]]),
            Err(ThyroError::DimensionMismatch { expected: 2, got: 1 })
        ));
    }
}
