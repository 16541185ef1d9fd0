//! Профиль датасета: качество данных, описательная статистика, корреляции

use std::fmt;

use ndarray::{Array2, ArrayView1};
use serde::Serialize;

use super::table::RawTable;
use crate::types::Dataset;

/// Порог |r|, начиная с которого пара признаков считается сильно коррелированной
pub const HIGH_CORRELATION: f64 = 0.7;

/// Описательная статистика одного признака
#[derive(Debug, Clone, Serialize)]
pub struct FeatureSummary {
    pub name: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrelationPair {
    pub first: String,
    pub second: String,
    pub r: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetProfile {
    pub rows: usize,
    pub columns: usize,
    pub missing_cells: usize,
    pub duplicate_rows: usize,
    pub numeric_columns: usize,
    pub text_columns: usize,
    pub summaries: Vec<FeatureSummary>,
    /// [норма, аномалия]
    pub class_counts: [usize; 2],
    /// норма / аномалия; None, если аномалий нет
    pub imbalance_ratio: Option<f64>,
    pub feature_names: Vec<String>,
    pub correlation: Vec<Vec<f64>>,
    pub high_correlations: Vec<CorrelationPair>,
}

/// Квантиль с линейной интерполяцией по отсортированным значениям
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

pub fn describe(name: &str, values: ArrayView1<f64>) -> FeatureSummary {
    let count = values.len();
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mean = if count > 0 {
        sorted.iter().sum::<f64>() / count as f64
    } else {
        f64::NAN
    };
    // Несмещённая оценка (n - 1)
    let std = if count > 1 {
        (sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64).sqrt()
    } else {
        f64::NAN
    };

    FeatureSummary {
        name: name.to_string(),
        count,
        mean,
        std,
        min: sorted.first().copied().unwrap_or(f64::NAN),
        q25: quantile(&sorted, 0.25),
        median: quantile(&sorted, 0.5),
        q75: quantile(&sorted, 0.75),
        max: sorted.last().copied().unwrap_or(f64::NAN),
    }
}

/// Матрица корреляций Пирсона; для константных колонок - NaN
pub fn correlation_matrix(features: &Array2<f64>) -> Array2<f64> {
    let n = features.nrows() as f64;
    let d = features.ncols();

    let centered: Vec<Vec<f64>> = features
        .columns()
        .into_iter()
        .map(|column| {
            let mean = column.sum() / n;
            column.iter().map(|v| v - mean).collect()
        })
        .collect();
    let norms: Vec<f64> = centered
        .iter()
        .map(|c| c.iter().map(|v| v * v).sum::<f64>().sqrt())
        .collect();

    let mut matrix = Array2::from_elem((d, d), f64::NAN);
    for i in 0..d {
        for j in i..d {
            if norms[i] == 0.0 || norms[j] == 0.0 {
                continue;
            }
            let dot: f64 = centered[i].iter().zip(&centered[j]).map(|(a, b)| a * b).sum();
            let r = (dot / (norms[i] * norms[j])).clamp(-1.0, 1.0);
            matrix[[i, j]] = r;
            matrix[[j, i]] = r;
        }
    }
    matrix
}

impl DatasetProfile {
    pub fn new(table: &RawTable, dataset: &Dataset) -> Self {
        // Служебные колонки не участвуют в статистике качества
        let cleaned = table.without_artifacts();
        let (rows, columns) = cleaned.shape();

        let numeric_columns = (0..columns)
            .filter(|&column| {
                cleaned.rows.iter().all(|row| {
                    row.get(column).map_or(true, |cell| {
                        let cell = cell.trim();
                        cell.is_empty() || cell.parse::<f64>().is_ok()
                    })
                })
            })
            .count();

        let summaries = dataset
            .feature_names
            .iter()
            .zip(dataset.features.columns())
            .map(|(name, column)| describe(name, column))
            .collect();

        let class_counts = dataset.class_counts();
        let imbalance_ratio = if class_counts[1] > 0 {
            Some(class_counts[0] as f64 / class_counts[1] as f64)
        } else {
            None
        };

        let matrix = correlation_matrix(&dataset.features);
        let names = &dataset.feature_names;
        let mut high_correlations = Vec::new();
        for i in 0..names.len() {
            for j in (i + 1)..names.len() {
                let r = matrix[[i, j]];
                if r.abs() > HIGH_CORRELATION {
                    high_correlations.push(CorrelationPair {
                        first: names[i].clone(),
                        second: names[j].clone(),
                        r,
                    });
                }
            }
        }

        Self {
            rows,
            columns,
            missing_cells: cleaned.missing_cells(),
            duplicate_rows: cleaned.duplicate_rows(),
            numeric_columns,
            text_columns: columns - numeric_columns,
            summaries,
            class_counts,
            imbalance_ratio,
            feature_names: names.clone(),
            correlation: matrix.rows().into_iter().map(|r| r.to_vec()).collect(),
            high_correlations,
        }
    }
}

impl fmt::Display for DatasetProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Shape: ({}, {})", self.rows, self.columns)?;
        writeln!(f, "Missing values: {}", self.missing_cells)?;
        writeln!(f, "Duplicate rows: {}", self.duplicate_rows)?;
        writeln!(
            f,
            "Column types: {} numeric, {} text",
            self.numeric_columns, self.text_columns
        )?;

        writeln!(
            f,
            "{:<28} {:>7} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "feature", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
        )?;
        for s in &self.summaries {
            writeln!(
                f,
                "{:<28} {:>7} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
                s.name, s.count, s.mean, s.std, s.min, s.q25, s.median, s.q75, s.max
            )?;
        }

        writeln!(
            f,
            "Class distribution: normal={} anomaly={}",
            self.class_counts[0], self.class_counts[1]
        )?;
        match self.imbalance_ratio {
            Some(ratio) => writeln!(f, "Class imbalance ratio: {:.2}:1", ratio)?,
            None => writeln!(f, "Class imbalance ratio: undefined (no anomalies)")?,
        }

        if !self.high_correlations.is_empty() {
            writeln!(f, "High correlation pairs (|r| > {}):", HIGH_CORRELATION)?;
            for pair in &self.high_correlations {
                writeln!(f, "  {} <-> {}: {:.3}", pair.first, pair.second, pair.r)?;
            }
        }
        Ok(())
    }
}
