//! Сравнение моделей: метрики, рейтинг, выводы и графики

use std::fmt;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::charts::{self, parse_hex_color, Figure};
use super::metrics::MetricReport;
use crate::data::DatasetProfile;
use crate::error::{Result, ThyroError};
use crate::types::{ModelKind, ModelOutput};

/// Сколько признаков показывать в выводах
const TOP_FEATURES: usize = 5;
const TOP_INDICATORS: usize = 3;

/// Оформление отчёта и поведение при неопределённых метриках
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportStyle {
    pub width: u32,
    pub height: u32,
    /// Цвета моделей, "#rrggbb"
    pub palette: Vec<String>,
    /// Цвета классов [норма, аномалия]
    pub class_colors: Vec<String>,
    pub render_charts: bool,
    /// Логировать ли метрики, заменённые нулём
    pub warn_undefined_metrics: bool,
}

impl Default for ReportStyle {
    fn default() -> Self {
        Self {
            width: 900,
            height: 600,
            palette: ["#e74c3c", "#3498db", "#2ecc71", "#f39c12", "#9b59b6", "#e67e22"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            class_colors: vec!["#3498db".to_string(), "#e74c3c".to_string()],
            render_charts: true,
            warn_undefined_metrics: false,
        }
    }
}

impl ReportStyle {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ThyroError::InvalidConfig(format!(
                "plot size {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.palette.is_empty() {
            return Err(ThyroError::InvalidConfig("palette is empty".to_string()));
        }
        if self.class_colors.len() != 2 {
            return Err(ThyroError::InvalidConfig(
                "exactly two class colors are required".to_string(),
            ));
        }
        for color in self.palette.iter().chain(self.class_colors.iter()) {
            parse_hex_color(color)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedModel {
    pub rank: usize,
    pub kind: ModelKind,
    pub model: String,
    pub roc_auc: f64,
    pub recall: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Выводы для клинического применения
#[derive(Debug, Clone, Serialize)]
pub struct ClinicalInsights {
    pub top_features: Vec<FeatureImportance>,
    pub best_model: String,
    pub best_roc_auc: f64,
    pub best_recall: f64,
    pub indicators: Vec<String>,
    pub recommendations: Vec<String>,
}

impl fmt::Display for ClinicalInsights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "1. TOP CONTRIBUTING FEATURES FOR THYROID ANOMALY DETECTION:")?;
        for (i, item) in self.top_features.iter().enumerate() {
            writeln!(f, "   {}. {}: {:.4}", i + 1, item.feature, item.importance)?;
        }
        writeln!(f, "2. MODEL PERFORMANCE INSIGHTS:")?;
        writeln!(
            f,
            "   Best overall model: {} (ROC-AUC: {:.4})",
            self.best_model, self.best_roc_auc
        )?;
        writeln!(
            f,
            "   Best sensitivity: {:.2} ({:.0}% of anomalies detected)",
            self.best_recall,
            self.best_recall * 100.0
        )?;
        writeln!(f, "3. CLINICAL RECOMMENDATIONS:")?;
        writeln!(f, "   Key thyroid indicators to monitor:")?;
        for indicator in &self.indicators {
            writeln!(f, "   - {}", indicator)?;
        }
        writeln!(f, "   Deployment recommendations:")?;
        for recommendation in &self.recommendations {
            writeln!(f, "   - {}", recommendation)?;
        }
        Ok(())
    }
}

/// Построитель отчёта. Только читает результаты моделей.
pub struct Reporter {
    style: ReportStyle,
}

impl Reporter {
    pub fn new(style: ReportStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &ReportStyle {
        &self.style
    }

    /// Метрики каждой модели относительно нетронутых тестовых меток
    pub fn evaluate(
        &self,
        truth: &Array1<usize>,
        outputs: &[ModelOutput],
    ) -> Result<Vec<MetricReport>> {
        outputs
            .iter()
            .map(|output| {
                let report = MetricReport::evaluate(truth, output)?;
                tracing::info!(
                    "{}: accuracy={:.4} precision={:.4} recall={:.4} f1={:.4} roc_auc={:.4}",
                    report.model,
                    report.accuracy,
                    report.precision,
                    report.recall,
                    report.f1,
                    report.roc_auc
                );
                if self.style.warn_undefined_metrics && !report.undefined.is_empty() {
                    tracing::warn!(
                        "{}: {} undefined (division by zero), reported as 0",
                        report.model,
                        report.undefined.join(", ")
                    );
                }
                Ok(report)
            })
            .collect()
    }

    /// Рейтинг по ROC-AUC (при равенстве сохраняется исходный порядок)
    pub fn rank(reports: &[MetricReport]) -> Vec<RankedModel> {
        let mut order: Vec<&MetricReport> = reports.iter().collect();
        order.sort_by(|a, b| {
            b.roc_auc
                .partial_cmp(&a.roc_auc)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order
            .into_iter()
            .enumerate()
            .map(|(i, report)| RankedModel {
                rank: i + 1,
                kind: report.kind,
                model: report.model.clone(),
                roc_auc: report.roc_auc,
                recall: report.recall,
            })
            .collect()
    }

    pub fn insights(
        &self,
        feature_names: &[String],
        importances: &[f64],
        reports: &[MetricReport],
    ) -> Result<ClinicalInsights> {
        let ranking = Self::rank(reports);
        let best = ranking.first().ok_or(ThyroError::EmptyDataset)?;

        let mut features: Vec<FeatureImportance> = feature_names
            .iter()
            .zip(importances.iter())
            .map(|(name, &importance)| FeatureImportance {
                feature: name.clone(),
                importance,
            })
            .collect();
        features.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let indicators = features
            .iter()
            .take(TOP_INDICATORS)
            .map(|f| f.feature.clone())
            .collect();
        features.truncate(TOP_FEATURES);

        Ok(ClinicalInsights {
            top_features: features,
            best_model: best.model.clone(),
            best_roc_auc: best.roc_auc,
            best_recall: best.recall,
            indicators,
            recommendations: [
                "Use Random Forest for primary screening",
                "Implement Hybrid model for critical cases",
                "High sensitivity ensures minimal false negatives",
                "Manual review recommended for borderline cases",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        })
    }

    /// Все графики отчёта; пусто, если отрисовка отключена
    pub fn render_figures(
        &self,
        profile: &DatasetProfile,
        selected_features: &[String],
        importances: &[f64],
        reports: &[MetricReport],
    ) -> Result<Vec<Figure>> {
        if !self.style.render_charts {
            return Ok(Vec::new());
        }

        let mut figures = vec![
            charts::class_distribution_bar(&self.style, profile.class_counts)?,
            charts::class_distribution_pie(&self.style, profile.class_counts)?,
            charts::roc_auc_comparison(&self.style, reports)?,
            charts::feature_importance(&self.style, selected_features, importances)?,
        ];

        if let Some(hybrid) = reports.iter().find(|r| r.kind == ModelKind::Hybrid) {
            figures.push(charts::confusion_heatmap(
                &self.style,
                "Confusion Matrix - Hybrid Model",
                &hybrid.confusion,
            )?);
        }

        figures.push(charts::roc_curves(&self.style, reports)?);
        figures.push(charts::correlation_heatmap(
            &self.style,
            &profile.feature_names,
            &profile.correlation,
        )?);

        tracing::debug!("Rendered {} figures", figures.len());
        Ok(figures)
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(ReportStyle::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn outputs() -> (Array1<usize>, Vec<ModelOutput>) {
        let truth = array![0, 0, 1, 1];
        let good = ModelOutput::new(
            ModelKind::RandomForest,
            array![0.1, 0.2, 0.8, 0.9],
            array![0, 0, 1, 1],
        );
        let weak = ModelOutput::new(ModelKind::Knn, array![0.1, 0.4, 0.35, 0.8], array![0, 0, 0, 1]);
        let silent = ModelOutput::new(ModelKind::Svm, array![0.3, 0.2, 0.4, 0.1], array![0, 0, 0, 0]);
        (truth, vec![weak, good, silent])
    }

    #[test]
    fn ranking_orders_by_roc_auc() {
        let (truth, outputs) = outputs();
        let reports = Reporter::default().evaluate(&truth, &outputs).unwrap();
        let ranking = Reporter::rank(&reports);

        assert_eq!(ranking[0].kind, ModelKind::RandomForest);
        assert_eq!(ranking[0].rank, 1);
        assert_eq!(ranking[1].kind, ModelKind::Knn);
        assert_eq!(ranking[2].kind, ModelKind::Svm);
    }

    #[test]
    fn undefined_precision_is_zero_and_flagged() {
        let (truth, outputs) = outputs();
        let reports = Reporter::default().evaluate(&truth, &outputs).unwrap();
        let silent = &reports[2];
        assert_eq!(silent.precision, 0.0);
        assert!(silent.undefined.contains(&"precision".to_string()));
    }

    #[test]
    fn insights_pick_top_features_and_best_model() {
        let (truth, outputs) = outputs();
        let reporter = Reporter::default();
        let reports = reporter.evaluate(&truth, &outputs).unwrap();

        let names: Vec<String> = ["TSH", "FTI", "Age", "T3", "TT4", "Sex"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let importances = [0.3, 0.25, 0.05, 0.2, 0.15, 0.05];
        let insights = reporter.insights(&names, &importances, &reports).unwrap();

        assert_eq!(insights.top_features.len(), 5);
        assert_eq!(insights.top_features[0].feature, "TSH");
        assert_eq!(insights.indicators, vec!["TSH", "FTI", "T3"]);
        assert_eq!(insights.best_model, "Random Forest");
        assert_eq!(insights.best_recall, 1.0);
    }

    #[test]
    fn style_validation_catches_bad_colors() {
        let mut style = ReportStyle::default();
        assert!(style.validate().is_ok());
        style.palette.push("blue".to_string());
        assert!(matches!(style.validate(), Err(ThyroError::InvalidConfig(_))));
    }
}
