//! Конфигурация конвейера

use serde::{Deserialize, Serialize};

use crate::data::SyntheticSpec;
use crate::error::{Result, ThyroError};
use crate::evaluation::ReportStyle;
use crate::models::{ForestParams, HybridConfig, KnnParams, NetworkParams, SvmParams, TreeParams};

pub const DEFAULT_DATA_URL: &str = "https://hebbkx1anhila5yf.public.blob.vercel-storage.com/annthyroid_unsupervised_anomaly_detection%20%281%29-sjO68MzKaASs0l6gSA10YZXwFeJh45.csv";
pub const DEFAULT_LABEL_COLUMN: &str = "Outlier_label";

fn default_data_url() -> String {
    DEFAULT_DATA_URL.to_string()
}

fn default_label_column() -> String {
    DEFAULT_LABEL_COLUMN.to_string()
}

fn default_test_size() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_top_k() -> usize {
    10
}

fn default_threshold() -> f64 {
    0.5
}

/// Параметры всего прогона. Любое поле можно опустить в JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_data_url")]
    pub data_url: String,
    #[serde(default = "default_label_column")]
    pub label_column: String,
    #[serde(default)]
    pub synthetic: SyntheticSpec,
    /// Доля тестовой выборки
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Сколько признаков оставляет F-тест
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Порог вероятности для гибридной метки
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub forest: ForestParams,
    #[serde(default)]
    pub tree: TreeParams,
    #[serde(default)]
    pub network: NetworkParams,
    #[serde(default)]
    pub knn: KnnParams,
    #[serde(default)]
    pub svm: SvmParams,
    #[serde(default)]
    pub hybrid: HybridConfig,
    #[serde(default)]
    pub report: ReportStyle,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_url: default_data_url(),
            label_column: default_label_column(),
            synthetic: SyntheticSpec::default(),
            test_size: default_test_size(),
            seed: default_seed(),
            top_k: default_top_k(),
            threshold: default_threshold(),
            forest: ForestParams::default(),
            tree: TreeParams::default(),
            network: NetworkParams::default(),
            knn: KnnParams::default(),
            svm: SvmParams::default(),
            hybrid: HybridConfig::default(),
            report: ReportStyle::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.label_column.trim().is_empty() {
            return Err(ThyroError::InvalidConfig(
                "label column name is empty".to_string(),
            ));
        }
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(ThyroError::InvalidConfig(format!(
                "test size {} is outside (0, 1)",
                self.test_size
            )));
        }
        if self.top_k == 0 {
            return Err(ThyroError::InvalidConfig("top_k must be positive".to_string()));
        }
        if !(0.0..1.0).contains(&self.threshold) {
            return Err(ThyroError::InvalidConfig(format!(
                "decision threshold {} is outside [0, 1)",
                self.threshold
            )));
        }
        if self.forest.n_trees == 0 {
            return Err(ThyroError::InvalidConfig(
                "random forest needs at least one tree".to_string(),
            ));
        }
        if self.knn.k == 0 {
            return Err(ThyroError::InvalidConfig("knn needs k >= 1".to_string()));
        }
        if !(self.svm.c > 0.0) {
            return Err(ThyroError::InvalidConfig(format!(
                "svm C {} must be positive",
                self.svm.c
            )));
        }
        self.synthetic.validate()?;
        self.network.validate()?;
        self.hybrid.validate()?;
        self.report.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModelKind;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.label_column, "Outlier_label");
        assert_eq!(config.seed, 42);
        assert_eq!(config.top_k, 10);
        assert_eq!(config.forest.n_trees, 100);
        assert_eq!(config.knn.k, 5);
        assert_eq!(
            config.hybrid.members,
            vec![ModelKind::RandomForest, ModelKind::NeuralNetwork]
        );
    }

    #[test]
    fn empty_json_gives_defaults() {
        let config = PipelineConfig::from_json("{}").unwrap();
        assert_eq!(config.data_url, DEFAULT_DATA_URL);
        assert_eq!(config.test_size, 0.2);
        assert_eq!(config.network.epochs, 50);
        assert_eq!(config.report.width, 900);
    }

    #[test]
    fn json_round_trip_keeps_overrides() {
        let mut config = PipelineConfig::default();
        config.seed = 7;
        config.hybrid.weights = vec![2.0, 1.0];
        config.network.patience = 3;

        let text = serde_json::to_string(&config).unwrap();
        let parsed = PipelineConfig::from_json(&text).unwrap();
        assert_eq!(parsed.seed, 7);
        assert_eq!(parsed.hybrid.weights, vec![2.0, 1.0]);
        assert_eq!(parsed.network.patience, 3);
    }

    #[test]
    fn partial_json_overrides_nested_fields() {
        let config =
            PipelineConfig::from_json(r#"{"top_k": 5, "forest": {"n_trees": 10}}"#).unwrap();
        assert_eq!(config.top_k, 5);
        assert_eq!(config.forest.n_trees, 10);
        assert!(config.forest.bootstrap);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        for text in [
            r#"{"test_size": 1.5}"#,
            r#"{"top_k": 0}"#,
            r#"{"threshold": 1.0}"#,
            r#"{"hybrid": {"weights": [1.0]}}"#,
        ] {
            assert!(
                matches!(PipelineConfig::from_json(text), Err(ThyroError::InvalidConfig(_))),
                "accepted {}",
                text
            );
        }
    }
}
