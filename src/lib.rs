//! Thyronet - сравнение моделей обнаружения аномалий щитовидной железы

pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod models;
pub mod pipeline;
pub mod preprocessing;
pub mod types;

pub use config::{PipelineConfig, DEFAULT_DATA_URL};
pub use data::{DataSource, DatasetProfile, RawTable, SyntheticSpec};
pub use error::{Result, ThyroError};
pub use evaluation::{MetricReport, ReportStyle, Reporter};
pub use models::Classifier;
pub use pipeline::{Pipeline, PipelineReport, PreparedData, TrainedModels};
pub use types::*;
