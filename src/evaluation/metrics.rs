//! Метрики бинарной классификации
//!
//! Матрица ошибок, accuracy / precision / recall / F1, ROC-AUC по рангам,
//! ROC-кривая и отчёт по классам.

use std::fmt;

use ndarray::Array1;
use serde::Serialize;

use crate::error::{Result, ThyroError};
use crate::types::{Label, ModelKind, ModelOutput};

/// Матрица ошибок, в виде массива [[tn, fp], [fn, tp]]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConfusionMatrix {
    pub tn: usize,
    pub fp: usize,
    pub fn_count: usize,
    pub tp: usize,
}

fn ratio(numerator: usize, denominator: usize) -> Option<f64> {
    if denominator == 0 {
        None
    } else {
        Some(numerator as f64 / denominator as f64)
    }
}

fn harmonic(precision: Option<f64>, recall: Option<f64>) -> Option<f64> {
    match (precision, recall) {
        (Some(p), Some(r)) if p + r > 0.0 => Some(2.0 * p * r / (p + r)),
        (Some(_), Some(_)) => Some(0.0),
        _ => None,
    }
}

fn check_lengths(truth: usize, predicted: usize) -> Result<()> {
    if truth != predicted {
        return Err(ThyroError::InvalidInput(format!(
            "{} true labels but {} predictions",
            truth, predicted
        )));
    }
    if truth == 0 {
        return Err(ThyroError::EmptyDataset);
    }
    Ok(())
}

impl ConfusionMatrix {
    pub fn from_labels(truth: &Array1<usize>, predicted: &Array1<usize>) -> Result<Self> {
        check_lengths(truth.len(), predicted.len())?;

        let mut matrix = Self::default();
        for (&t, &p) in truth.iter().zip(predicted.iter()) {
            match (t, p) {
                (0, 0) => matrix.tn += 1,
                (0, _) => matrix.fp += 1,
                (_, 0) => matrix.fn_count += 1,
                _ => matrix.tp += 1,
            }
        }
        Ok(matrix)
    }

    pub fn as_array(&self) -> [[usize; 2]; 2] {
        [[self.tn, self.fp], [self.fn_count, self.tp]]
    }

    pub fn total(&self) -> usize {
        self.tn + self.fp + self.fn_count + self.tp
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tn + self.tp, self.total()).unwrap_or(0.0)
    }

    /// None, если модель не предсказала ни одного положительного
    pub fn precision(&self) -> Option<f64> {
        ratio(self.tp, self.tp + self.fp)
    }

    /// None, если в истинных метках нет положительных
    pub fn recall(&self) -> Option<f64> {
        ratio(self.tp, self.tp + self.fn_count)
    }

    pub fn f1(&self) -> Option<f64> {
        harmonic(self.precision(), self.recall())
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[[{:>5} {:>5}]", self.tn, self.fp)?;
        write!(f, " [{:>5} {:>5}]]", self.fn_count, self.tp)
    }
}

/// Средние ранги значений (1..n), для равных значений - среднее их рангов
fn average_ranks(scores: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[a]
            .partial_cmp(&scores[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0; scores.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // Позиции start..end получают ранги start+1..=end
        let rank = (start + 1 + end) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = rank;
        }
        start = end;
    }
    ranks
}

/// ROC-AUC через статистику Манна-Уитни; совпадающие оценки учитываются как 1/2
pub fn roc_auc(truth: &Array1<usize>, scores: &Array1<f64>) -> Result<f64> {
    check_lengths(truth.len(), scores.len())?;

    let positives = truth.iter().filter(|&&t| t == 1).count();
    let negatives = truth.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(ThyroError::UndefinedMetric(
            "ROC-AUC needs both classes in the true labels".to_string(),
        ));
    }

    let ranks = average_ranks(&scores.to_vec());
    let positive_rank_sum: f64 = truth
        .iter()
        .zip(ranks.iter())
        .filter(|(&t, _)| t == 1)
        .map(|(_, &r)| r)
        .sum();

    let p = positives as f64;
    let n = negatives as f64;
    Ok((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

/// Точки ROC-кривой; первая точка (0, 0) с порогом +inf
#[derive(Debug, Clone, Serialize)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub thresholds: Vec<f64>,
}

/// ROC-кривая с удалением промежуточных коллинеарных точек
pub fn roc_curve(truth: &Array1<usize>, scores: &Array1<f64>) -> Result<RocCurve> {
    check_lengths(truth.len(), scores.len())?;

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Накопленные tp/fp на каждом различном пороге
    let mut fps = Vec::new();
    let mut tps = Vec::new();
    let mut thresholds = Vec::new();
    let (mut tp, mut fp) = (0usize, 0usize);
    for (position, &i) in order.iter().enumerate() {
        if truth[i] == 1 {
            tp += 1;
        } else {
            fp += 1;
        }
        let last = position + 1 == order.len();
        if last || scores[order[position + 1]] != scores[i] {
            fps.push(fp as f64);
            tps.push(tp as f64);
            thresholds.push(scores[i]);
        }
    }

    let (total_fp, total_tp) = (fp as f64, tp as f64);
    if total_fp == 0.0 || total_tp == 0.0 {
        return Err(ThyroError::UndefinedMetric(
            "ROC curve needs both classes in the true labels".to_string(),
        ));
    }

    // Точка остаётся, если в ней меняется наклон
    let keep: Vec<usize> = (0..fps.len())
        .filter(|&i| {
            if i == 0 || i + 1 == fps.len() {
                return true;
            }
            let d_fp = fps[i + 1] - 2.0 * fps[i] + fps[i - 1];
            let d_tp = tps[i + 1] - 2.0 * tps[i] + tps[i - 1];
            d_fp != 0.0 || d_tp != 0.0
        })
        .collect();

    let mut curve = RocCurve {
        fpr: vec![0.0],
        tpr: vec![0.0],
        thresholds: vec![f64::INFINITY],
    };
    for i in keep {
        curve.fpr.push(fps[i] / total_fp);
        curve.tpr.push(tps[i] / total_tp);
        curve.thresholds.push(thresholds[i]);
    }
    Ok(curve)
}

/// Метрики одного класса
#[derive(Debug, Clone, Serialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Отчёт по классам с macro и weighted средними
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    /// Неопределённые значения (деление на ноль) заменяются нулём
    pub fn from_confusion(matrix: &ConfusionMatrix) -> Self {
        let per_class = |tp: usize, fp: usize, fn_count: usize, label: Label| {
            let precision = ratio(tp, tp + fp);
            let recall = ratio(tp, tp + fn_count);
            ClassMetrics {
                label: label.index().to_string(),
                precision: precision.unwrap_or(0.0),
                recall: recall.unwrap_or(0.0),
                f1: harmonic(precision, recall).unwrap_or(0.0),
                support: tp + fn_count,
            }
        };

        let normal = per_class(matrix.tn, matrix.fn_count, matrix.fp, Label::Normal);
        let anomaly = per_class(matrix.tp, matrix.fp, matrix.fn_count, Label::Anomaly);
        let total = matrix.total();

        let average = |label: &str, weight: &dyn Fn(&ClassMetrics) -> f64| {
            let classes = [&normal, &anomaly];
            let norm: f64 = classes.iter().map(|c| weight(c)).sum();
            let mean = |value: fn(&ClassMetrics) -> f64| {
                if norm == 0.0 {
                    0.0
                } else {
                    classes.iter().map(|c| weight(c) * value(c)).sum::<f64>() / norm
                }
            };
            ClassMetrics {
                label: label.to_string(),
                precision: mean(|c| c.precision),
                recall: mean(|c| c.recall),
                f1: mean(|c| c.f1),
                support: total,
            }
        };
        let macro_avg = average("macro avg", &|_: &ClassMetrics| 1.0);
        let weighted_avg = average("weighted avg", &|c: &ClassMetrics| c.support as f64);

        Self {
            classes: vec![normal, anomaly],
            accuracy: matrix.accuracy(),
            macro_avg,
            weighted_avg,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                c.label, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for c in [&self.macro_avg, &self.weighted_avg] {
            writeln!(
                f,
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                c.label, c.precision, c.recall, c.f1, c.support
            )?;
        }
        Ok(())
    }
}

/// Полный набор метрик одной модели на тестовой выборке
#[derive(Debug, Clone, Serialize)]
pub struct MetricReport {
    pub kind: ModelKind,
    pub model: String,
    pub confusion: ConfusionMatrix,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub roc_auc: f64,
    pub classification: ClassificationReport,
    pub roc: RocCurve,
    /// Метрики, заменённые нулём из-за деления на ноль
    pub undefined: Vec<String>,
}

impl MetricReport {
    pub fn evaluate(truth: &Array1<usize>, output: &ModelOutput) -> Result<Self> {
        let confusion = ConfusionMatrix::from_labels(truth, &output.labels)?;

        let mut undefined = Vec::new();
        let mut defined = |name: &str, value: Option<f64>| {
            value.unwrap_or_else(|| {
                undefined.push(name.to_string());
                0.0
            })
        };
        let precision = defined("precision", confusion.precision());
        let recall = defined("recall", confusion.recall());
        let f1 = defined("f1", confusion.f1());

        Ok(Self {
            kind: output.kind,
            model: output.name.clone(),
            accuracy: confusion.accuracy(),
            precision,
            recall,
            f1,
            roc_auc: roc_auc(truth, &output.probabilities)?,
            classification: ClassificationReport::from_confusion(&confusion),
            roc: roc_curve(truth, &output.probabilities)?,
            confusion,
            undefined,
        })
    }
}

impl fmt::Display for MetricReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} Results:", self.model)?;
        writeln!(f, "{}", self.confusion)?;
        write!(f, "{}", self.classification)?;
        write!(f, "ROC-AUC: {:.4}", self.roc_auc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn confusion_matrix_layout() {
        let truth = array![0, 0, 0, 1, 1, 1, 1];
        let predicted = array![0, 1, 0, 1, 0, 1, 1];
        let m = ConfusionMatrix::from_labels(&truth, &predicted).unwrap();

        assert_eq!(m.as_array(), [[2, 1], [1, 3]]);
        assert!((m.accuracy() - 5.0 / 7.0).abs() < 1e-12);
        assert_eq!(m.precision(), Some(0.75));
        assert_eq!(m.recall(), Some(0.75));
        assert!((m.f1().unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn precision_is_undefined_without_positive_predictions() {
        let m = ConfusionMatrix::from_labels(&array![0, 1], &array![0, 0]).unwrap();
        assert_eq!(m.precision(), None);
        assert_eq!(m.recall(), Some(0.0));
        assert_eq!(m.f1(), None);
    }

    #[test]
    fn roc_auc_counts_ties_as_half() {
        let truth = array![0, 0, 1, 1];
        assert_eq!(roc_auc(&truth, &array![0.1, 0.4, 0.35, 0.8]).unwrap(), 0.75);
        assert_eq!(roc_auc(&truth, &array![0.5, 0.5, 0.5, 0.5]).unwrap(), 0.5);
        assert_eq!(roc_auc(&truth, &array![0.1, 0.2, 0.3, 0.4]).unwrap(), 1.0);
        // Одна пара с равными оценками: (3 + 0.5) / 4
        assert_eq!(roc_auc(&truth, &array![0.1, 0.5, 0.5, 0.9]).unwrap(), 0.875);
    }

    #[test]
    fn roc_auc_requires_both_classes() {
        assert!(matches!(
            roc_auc(&array![1, 1], &array![0.2, 0.9]),
            Err(ThyroError::UndefinedMetric(_))
        ));
    }

    #[test]
    fn roc_curve_drops_collinear_points() {
        let truth = array![0, 0, 1, 1];
        let curve = roc_curve(&truth, &array![0.1, 0.4, 0.35, 0.8]).unwrap();
        assert_eq!(curve.fpr, vec![0.0, 0.0, 0.5, 0.5, 1.0]);
        assert_eq!(curve.tpr, vec![0.0, 0.5, 0.5, 1.0, 1.0]);
        assert_eq!(curve.thresholds[1], 0.8);
        assert!(curve.thresholds[0].is_infinite());

        // Идеальный классификатор: (0,0) -> (0,1) -> (1,1)
        let curve = roc_curve(&truth, &array![0.1, 0.2, 0.8, 0.9]).unwrap();
        assert_eq!(curve.fpr, vec![0.0, 0.0, 0.0, 1.0]);
        assert_eq!(curve.tpr, vec![0.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn classification_report_averages() {
        let m = ConfusionMatrix {
            tn: 8,
            fp: 2,
            fn_count: 1,
            tp: 4,
        };
        let report = ClassificationReport::from_confusion(&m);

        assert_eq!(report.classes[0].support, 10);
        assert_eq!(report.classes[1].support, 5);
        assert!((report.classes[0].precision - 8.0 / 9.0).abs() < 1e-12);
        assert!((report.classes[1].recall - 0.8).abs() < 1e-12);

        let expected_macro = (0.8 + 0.8) / 2.0;
        assert!((report.macro_avg.recall - expected_macro).abs() < 1e-12);
        let expected_weighted = (10.0 * 0.8 + 5.0 * 0.8) / 15.0;
        assert!((report.weighted_avg.recall - expected_weighted).abs() < 1e-12);
    }
}
