//! Ошибки пайплайна

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThyroError {
    #[error("failed to fetch dataset: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("label column '{0}' is missing")]
    MissingLabel(String),

    #[error("unknown label value '{value}' in row {row}")]
    UnknownLabel { row: usize, value: String },

    #[error("invalid value '{value}' in column '{column}', row {row}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },

    #[error("dataset is empty")]
    EmptyDataset,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0} is not fitted")]
    NotFitted(&'static str),

    #[error("dimension mismatch: expected {expected} features, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("metric is undefined: {0}")]
    UndefinedMetric(String),

    #[error("chart rendering failed: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, ThyroError>;
