/// Типы данных пайплайна

use std::fmt;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ThyroError};

/// Класс записи: 0 = норма, 1 = аномалия
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Normal,
    Anomaly,
}

impl Label {
    pub fn index(self) -> usize {
        match self {
            Label::Normal => 0,
            Label::Anomaly => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Label::Normal),
            1 => Some(Label::Anomaly),
            _ => None,
        }
    }

    /// Коды исходного датасета: "n" / "o" (или уже закодированные 0 / 1)
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "n" | "0" => Some(Label::Normal),
            "o" | "1" => Some(Label::Anomaly),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Label::Normal => "n",
            Label::Anomaly => "o",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Normal => write!(f, "Normal (0)"),
            Label::Anomaly => write!(f, "Anomaly (1)"),
        }
    }
}

/// Количество записей каждого класса: [норма, аномалия]
pub fn class_counts(labels: &Array1<usize>) -> [usize; 2] {
    let mut counts = [0usize; 2];
    for &label in labels.iter() {
        if label < 2 {
            counts[label] += 1;
        }
    }
    counts
}

/// Очищенный датасет: числовые признаки + бинарная метка
#[derive(Debug, Clone)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    pub features: Array2<f64>,
    pub labels: Array1<usize>,
}

impl Dataset {
    pub fn new(
        feature_names: Vec<String>,
        features: Array2<f64>,
        labels: Array1<usize>,
    ) -> Result<Self> {
        if features.ncols() != feature_names.len() {
            return Err(ThyroError::DimensionMismatch {
                expected: feature_names.len(),
                got: features.ncols(),
            });
        }
        if features.nrows() != labels.len() {
            return Err(ThyroError::InvalidInput(format!(
                "{} feature rows but {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        if let Some(bad) = labels.iter().find(|&&l| l > 1) {
            return Err(ThyroError::InvalidInput(format!(
                "label {} is not binary",
                bad
            )));
        }

        Ok(Self {
            feature_names,
            features,
            labels,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.n_samples() == 0
    }

    pub fn class_counts(&self) -> [usize; 2] {
        class_counts(&self.labels)
    }

    /// Доля аномалий (0 для пустого датасета)
    pub fn anomaly_rate(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.class_counts()[1] as f64 / self.n_samples() as f64
    }

    /// Подвыборка строк в заданном порядке (индексы могут повторяться)
    pub fn select_rows(&self, indices: &[usize]) -> Dataset {
        Dataset {
            feature_names: self.feature_names.clone(),
            features: self.features.select(Axis(0), indices),
            labels: self.labels.select(Axis(0), indices),
        }
    }
}

/// Модели, участвующие в сравнении
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    RandomForest,
    NeuralNetwork,
    Hybrid,
    DecisionTree,
    Knn,
    Svm,
}

impl ModelKind {
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::RandomForest => "Random Forest",
            ModelKind::NeuralNetwork => "DNN",
            ModelKind::Hybrid => "Hybrid",
            ModelKind::DecisionTree => "Decision Tree",
            ModelKind::Knn => "KNN",
            ModelKind::Svm => "SVM",
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            ModelKind::RandomForest => "RF",
            ModelKind::NeuralNetwork => "DNN",
            ModelKind::Hybrid => "Hybrid",
            ModelKind::DecisionTree => "DT",
            ModelKind::Knn => "KNN",
            ModelKind::Svm => "SVM",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Предсказания одной модели на тестовой выборке
#[derive(Debug, Clone)]
pub struct ModelOutput {
    pub kind: ModelKind,
    pub name: String,
    pub probabilities: Array1<f64>,
    pub labels: Array1<usize>,
}

impl ModelOutput {
    pub fn new(kind: ModelKind, probabilities: Array1<f64>, labels: Array1<usize>) -> Self {
        Self {
            kind,
            name: kind.display_name().to_string(),
            probabilities,
            labels,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}
