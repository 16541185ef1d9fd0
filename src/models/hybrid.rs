//! Гибридная модель: взвешенное среднее вероятностей нескольких моделей

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ThyroError};
use crate::types::{ModelKind, ModelOutput};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    pub members: Vec<ModelKind>,
    /// Пустой список = равные веса
    pub weights: Vec<f64>,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            members: vec![ModelKind::RandomForest, ModelKind::NeuralNetwork],
            weights: Vec::new(),
        }
    }
}

impl HybridConfig {
    pub fn validate(&self) -> Result<()> {
        if self.members.is_empty() {
            return Err(ThyroError::InvalidConfig(
                "hybrid needs at least one member".to_string(),
            ));
        }
        if self.members.contains(&ModelKind::Hybrid) {
            return Err(ThyroError::InvalidConfig(
                "hybrid cannot include itself".to_string(),
            ));
        }
        if !self.weights.is_empty() {
            if self.weights.len() != self.members.len() {
                return Err(ThyroError::InvalidConfig(format!(
                    "{} hybrid weights for {} members",
                    self.weights.len(),
                    self.members.len()
                )));
            }
            if self.weights.iter().any(|w| !w.is_finite() || *w < 0.0)
                || self.weights.iter().sum::<f64>() <= 0.0
            {
                return Err(ThyroError::InvalidConfig(
                    "hybrid weights must be non-negative with a positive sum".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Вес каждого участника (равные, если не заданы)
    pub fn effective_weights(&self) -> Vec<f64> {
        if self.weights.is_empty() {
            vec![1.0; self.members.len()]
        } else {
            self.weights.clone()
        }
    }

    /// Например, "Hybrid (RF+DNN)"
    pub fn display_name(&self) -> String {
        let members: Vec<&str> = self.members.iter().map(|m| m.short_name()).collect();
        format!("Hybrid ({})", members.join("+"))
    }
}

#[derive(Debug, Clone)]
pub struct HybridEnsemble {
    config: HybridConfig,
    threshold: f64,
}

impl HybridEnsemble {
    pub fn new(config: HybridConfig, threshold: f64) -> Result<Self> {
        config.validate()?;
        if !(0.0..1.0).contains(&threshold) {
            return Err(ThyroError::InvalidConfig(format!(
                "decision threshold {} is outside [0, 1)",
                threshold
            )));
        }
        Ok(Self { config, threshold })
    }

    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    /// Объединение выходов участников: p = sum(w_i * p_i) / sum(w_i), метка 1 при p > порога
    pub fn combine(&self, outputs: &[ModelOutput]) -> Result<ModelOutput> {
        let weights = self.config.effective_weights();
        let total: f64 = weights.iter().sum();

        let mut combined: Option<Array1<f64>> = None;
        for (kind, weight) in self.config.members.iter().zip(weights.iter()) {
            let output = outputs.iter().find(|o| o.kind == *kind).ok_or_else(|| {
                ThyroError::InvalidConfig(format!("hybrid member {} has no predictions", kind))
            })?;

            match combined.as_mut() {
                None => combined = Some(&output.probabilities * *weight),
                Some(acc) => {
                    if acc.len() != output.probabilities.len() {
                        return Err(ThyroError::InvalidInput(format!(
                            "{} predicts {} rows, expected {}",
                            kind,
                            output.probabilities.len(),
                            acc.len()
                        )));
                    }
                    acc.scaled_add(*weight, &output.probabilities);
                }
            }
        }

        let probabilities = combined.ok_or(ThyroError::EmptyDataset)? / total;
        let labels = probabilities.mapv(|p| usize::from(p > self.threshold));

        Ok(ModelOutput::new(ModelKind::Hybrid, probabilities, labels)
            .with_name(self.config.display_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn output(kind: ModelKind, probabilities: Array1<f64>) -> ModelOutput {
        let labels = probabilities.mapv(|p| usize::from(p > 0.5));
        ModelOutput::new(kind, probabilities, labels)
    }

    #[test]
    fn default_hybrid_is_mean_of_forest_and_network() {
        let rf = array![0.9, 0.2, 0.6, 0.5];
        let dnn = array![0.7, 0.1, 0.3, 0.5];
        let outputs = vec![
            output(ModelKind::RandomForest, rf.clone()),
            output(ModelKind::NeuralNetwork, dnn.clone()),
            output(ModelKind::Knn, array![1.0, 1.0, 1.0, 1.0]),
        ];

        let hybrid = HybridEnsemble::new(HybridConfig::default(), 0.5).unwrap();
        let combined = hybrid.combine(&outputs).unwrap();

        assert_eq!(combined.kind, ModelKind::Hybrid);
        assert_eq!(combined.name, "Hybrid (RF+DNN)");
        for i in 0..4 {
            assert_eq!(combined.probabilities[i], (rf[i] + dnn[i]) / 2.0);
        }
        // 0.45 и ровно 0.5 дают класс 0
        assert_eq!(combined.labels, array![1, 0, 0, 0]);
    }

    #[test]
    fn weights_shift_the_average() {
        let config = HybridConfig {
            members: vec![ModelKind::RandomForest, ModelKind::Svm],
            weights: vec![3.0, 1.0],
        };
        let outputs = vec![
            output(ModelKind::RandomForest, array![1.0]),
            output(ModelKind::Svm, array![0.0]),
        ];
        let combined = HybridEnsemble::new(config, 0.5)
            .unwrap()
            .combine(&outputs)
            .unwrap();
        assert!((combined.probabilities[0] - 0.75).abs() < 1e-12);
        assert_eq!(combined.name, "Hybrid (RF+SVM)");
    }

    #[test]
    fn missing_member_is_a_config_error() {
        let hybrid = HybridEnsemble::new(HybridConfig::default(), 0.5).unwrap();
        let outputs = vec![output(ModelKind::RandomForest, array![0.3])];
        assert!(matches!(
            hybrid.combine(&outputs),
            Err(ThyroError::InvalidConfig(_))
        ));
    }

    #[test]
    fn invalid_weights_are_rejected() {
        let config = HybridConfig {
            weights: vec![1.0],
            ..HybridConfig::default()
        };
        assert!(HybridEnsemble::new(config, 0.5).is_err());

        let config = HybridConfig {
            members: vec![ModelKind::Hybrid],
            weights: Vec::new(),
        };
        assert!(config.validate().is_err());
    }
}
