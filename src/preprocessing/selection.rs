//! Отбор признаков: фильтр нулевой дисперсии + ANOVA F-тест (top-K)

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::Serialize;

use crate::error::{Result, ThyroError};

/// Оценка признака после отбора
#[derive(Debug, Clone, Serialize)]
pub struct FeatureScore {
    pub name: String,
    /// None - признак отброшен фильтром дисперсии
    pub f_score: Option<f64>,
    pub selected: bool,
}

/// F-статистика однофакторного дисперсионного анализа признака относительно метки
pub fn anova_f_score(column: ArrayView1<f64>, labels: &Array1<usize>) -> f64 {
    let n = column.len();
    let mut sums = [0.0f64; 2];
    let mut counts = [0usize; 2];
    for (&v, &label) in column.iter().zip(labels.iter()) {
        sums[label] += v;
        counts[label] += 1;
    }

    let groups: Vec<usize> = (0..2).filter(|&c| counts[c] > 0).collect();
    let k = groups.len();
    if k < 2 || n <= k {
        return f64::NAN;
    }

    let grand_mean = column.sum() / n as f64;
    let means = [
        sums[0] / counts[0].max(1) as f64,
        sums[1] / counts[1].max(1) as f64,
    ];

    let ss_between: f64 = groups
        .iter()
        .map(|&c| counts[c] as f64 * (means[c] - grand_mean).powi(2))
        .sum();
    let ss_within: f64 = column
        .iter()
        .zip(labels.iter())
        .map(|(&v, &label)| (v - means[label]).powi(2))
        .sum();

    let df_between = (k - 1) as f64;
    let df_within = (n - k) as f64;
    // 0 / 0 = NaN, x / 0 = inf, как в scipy
    (ss_between / df_between) / (ss_within / df_within)
}

pub struct FeatureSelector {
    k: usize,
    n_input: usize,
    names: Vec<String>,
    scores: Vec<Option<f64>>,
    selected: Option<Vec<usize>>,
}

impl FeatureSelector {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            n_input: 0,
            names: Vec::new(),
            scores: Vec::new(),
            selected: None,
        }
    }

    /// Обучение только на (сбалансированной) обучающей выборке
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>, names: &[String]) -> Result<()> {
        if self.k == 0 {
            return Err(ThyroError::InvalidConfig(
                "feature selector needs k >= 1".to_string(),
            ));
        }
        if x.nrows() == 0 {
            return Err(ThyroError::EmptyDataset);
        }
        if names.len() != x.ncols() {
            return Err(ThyroError::DimensionMismatch {
                expected: names.len(),
                got: x.ncols(),
            });
        }
        if y.len() != x.nrows() {
            return Err(ThyroError::InvalidInput(format!(
                "{} rows but {} labels",
                x.nrows(),
                y.len()
            )));
        }

        // (a) Фильтр константных колонок
        let candidates: Vec<usize> = x
            .axis_iter(Axis(1))
            .enumerate()
            .filter(|(_, column)| {
                let min = column.fold(f64::INFINITY, |acc, &v| acc.min(v));
                let max = column.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
                max - min > 0.0
            })
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            return Err(ThyroError::InvalidInput(
                "all features are constant".to_string(),
            ));
        }

        // (b) F-тест
        let mut scores = vec![None; x.ncols()];
        for &column in &candidates {
            scores[column] = Some(anova_f_score(x.column(column), y));
        }

        // NaN ниже всех, при равенстве выигрывает более поздняя колонка
        let rank = |column: usize| {
            scores[column]
                .filter(|s| !s.is_nan())
                .unwrap_or(f64::NEG_INFINITY)
        };
        let mut ranked = candidates.clone();
        ranked.sort_by(|&a, &b| {
            rank(b)
                .partial_cmp(&rank(a))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.cmp(&a))
        });

        let k = self.k.min(candidates.len());
        let mut selected: Vec<usize> = ranked.into_iter().take(k).collect();
        selected.sort_unstable();

        tracing::info!(
            "Feature selection: {} of {} features pass the variance filter, keeping {}",
            candidates.len(),
            x.ncols(),
            selected.len()
        );

        self.n_input = x.ncols();
        self.names = names.to_vec();
        self.scores = scores;
        self.selected = Some(selected);
        Ok(())
    }

    /// Применение сохранённых индексов колонок к матрице исходной ширины
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let selected = self
            .selected
            .as_ref()
            .ok_or(ThyroError::NotFitted("feature selector"))?;
        if x.ncols() != self.n_input {
            return Err(ThyroError::DimensionMismatch {
                expected: self.n_input,
                got: x.ncols(),
            });
        }
        Ok(x.select(Axis(1), selected))
    }

    pub fn selected_indices(&self) -> Option<&[usize]> {
        self.selected.as_deref()
    }

    pub fn selected_names(&self) -> Vec<String> {
        self.selected
            .as_ref()
            .map(|s| s.iter().map(|&i| self.names[i].clone()).collect())
            .unwrap_or_default()
    }

    /// Число признаков после фильтра дисперсии
    pub fn n_after_variance(&self) -> usize {
        self.scores.iter().filter(|s| s.is_some()).count()
    }

    pub fn scores(&self) -> Vec<FeatureScore> {
        let selected = self.selected.as_deref().unwrap_or(&[]);
        self.names
            .iter()
            .zip(self.scores.iter())
            .enumerate()
            .map(|(i, (name, score))| FeatureScore {
                name: name.clone(),
                f_score: *score,
                selected: selected.contains(&i),
            })
            .collect()
    }
}
