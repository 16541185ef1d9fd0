/// Оценка моделей и отчётность

pub mod charts;
pub mod metrics;
pub mod report;

pub use charts::Figure;
pub use metrics::{
    roc_auc, roc_curve, ClassMetrics, ClassificationReport, ConfusionMatrix, MetricReport,
    RocCurve,
};
pub use report::{ClinicalInsights, FeatureImportance, RankedModel, ReportStyle, Reporter};
