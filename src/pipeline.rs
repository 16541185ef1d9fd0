//! Сквозной прогон: очистка -> разбиение -> балансировка -> отбор -> масштаб -> модели -> отчёт

use std::fmt;

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::data::{DatasetProfile, RawTable};
use crate::error::Result;
use crate::evaluation::{
    ClinicalInsights, FeatureImportance, Figure, MetricReport, RankedModel, Reporter,
};
use crate::models::{
    Classifier, DecisionTree, EpochRecord, HybridEnsemble, KNearestNeighbors, NeuralNetwork,
    RandomForest, SupportVectorMachine,
};
use crate::preprocessing::{
    oversample_minority, stratified_split, BalanceSummary, FeatureScore, FeatureSelector,
    MinMaxScaler, SplitSummary,
};
use crate::types::{ModelKind, ModelOutput};

/// Данные, готовые к обучению: отобранные и масштабированные признаки
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub profile: DatasetProfile,
    pub split: SplitSummary,
    pub balance: BalanceSummary,
    pub feature_scores: Vec<FeatureScore>,
    pub selected_features: Vec<String>,
    /// Индексы тестовых строк в очищенном датасете
    pub test_indices: Vec<usize>,
    pub x_train: Array2<f64>,
    pub y_train: Array1<usize>,
    pub x_test: Array2<f64>,
    pub y_test: Array1<usize>,
}

/// Выходы всех моделей на тестовой выборке
#[derive(Debug, Clone)]
pub struct TrainedModels {
    /// Порядок: RF, DNN, Hybrid, DT, KNN, SVM
    pub outputs: Vec<ModelOutput>,
    /// Важности RF по отобранным признакам
    pub forest_importances: Array1<f64>,
    pub network_history: Vec<EpochRecord>,
    pub best_epoch: usize,
}

impl TrainedModels {
    pub fn output(&self, kind: ModelKind) -> Option<&ModelOutput> {
        self.outputs.iter().find(|o| o.kind == kind)
    }
}

/// Всё, что производит один прогон
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub generated_at: DateTime<Utc>,
    pub profile: DatasetProfile,
    pub split: SplitSummary,
    pub balance: BalanceSummary,
    pub feature_scores: Vec<FeatureScore>,
    pub selected_features: Vec<String>,
    pub feature_importances: Vec<FeatureImportance>,
    pub network_history: Vec<EpochRecord>,
    pub best_epoch: usize,
    pub reports: Vec<MetricReport>,
    pub ranking: Vec<RankedModel>,
    pub insights: ClinicalInsights,
    #[serde(skip)]
    pub figures: Vec<Figure>,
}

impl PipelineReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== THYROID ANOMALY DETECTION REPORT ===")?;
        writeln!(f, "Generated at: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(f)?;
        writeln!(f, "--- Dataset ---")?;
        write!(f, "{}", self.profile)?;
        writeln!(f)?;

        writeln!(f, "--- Preprocessing ---")?;
        writeln!(
            f,
            "Training set: {} rows {:?}, test set: {} rows {:?}",
            self.split.train_size,
            self.split.train_counts,
            self.split.test_size,
            self.split.test_counts
        )?;
        writeln!(
            f,
            "Class balancing: {:?} -> {:?}",
            self.balance.before, self.balance.after
        )?;
        writeln!(f, "Selected features: {}", self.selected_features.join(", "))?;
        writeln!(
            f,
            "Neural network: {} epochs, best epoch {}",
            self.network_history.len(),
            self.best_epoch
        )?;
        writeln!(f)?;

        writeln!(f, "--- Model evaluation ---")?;
        for report in &self.reports {
            writeln!(f, "{}", report)?;
        }

        writeln!(f, "--- Ranking by ROC-AUC ---")?;
        writeln!(f, "{:<6} {:<18} {:>8} {:>8}", "rank", "model", "roc_auc", "recall")?;
        for entry in &self.ranking {
            writeln!(
                f,
                "{:<6} {:<18} {:>8.4} {:>8.4}",
                entry.rank, entry.model, entry.roc_auc, entry.recall
            )?;
        }
        writeln!(f)?;

        writeln!(f, "--- Clinical insights ---")?;
        write!(f, "{}", self.insights)?;
        if !self.figures.is_empty() {
            writeln!(f)?;
            writeln!(f, "Figures rendered: {}", self.figures.len())?;
        }
        Ok(())
    }
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Очистка, разбиение, балансировка, отбор признаков и масштабирование.
    /// Селектор и скейлер обучаются только на обучающей выборке.
    pub fn prepare(&self, table: &RawTable) -> Result<PreparedData> {
        let config = &self.config;

        let dataset = table.clean(&config.label_column)?;
        let profile = DatasetProfile::new(table, &dataset);
        tracing::info!(
            "Cleaned dataset: {} rows, {} features, class counts {:?}",
            dataset.n_samples(),
            dataset.n_features(),
            dataset.class_counts()
        );

        let split = stratified_split(&dataset, config.test_size, config.seed)?;
        let (balanced, balance) = oversample_minority(&split.train, config.seed)?;

        let mut selector = FeatureSelector::new(config.top_k);
        selector.fit(&balanced.features, &balanced.labels, &balanced.feature_names)?;
        let train_selected = selector.transform(&balanced.features)?;
        let test_selected = selector.transform(&split.test.features)?;
        let selected_features = selector.selected_names();
        tracing::info!("Selected features: {}", selected_features.join(", "));

        let mut scaler = MinMaxScaler::new();
        let x_train = scaler.fit_transform(&train_selected)?;
        let x_test = scaler.transform(&test_selected)?;

        Ok(PreparedData {
            profile,
            split: split.summary(),
            balance,
            feature_scores: selector.scores(),
            selected_features,
            test_indices: split.test_indices,
            x_train,
            y_train: balanced.labels,
            x_test,
            y_test: split.test.labels,
        })
    }

    /// Обучение всех моделей и сборка гибрида
    pub fn train(&self, data: &PreparedData) -> Result<TrainedModels> {
        let config = &self.config;

        let mut forest = RandomForest::new(config.forest.clone(), config.seed);
        let rf = fit_and_predict(&mut forest, ModelKind::RandomForest, data)?;
        let forest_importances = forest.feature_importances()?.clone();

        let mut network = NeuralNetwork::new(config.network.clone(), config.seed);
        let dnn = fit_and_predict(&mut network, ModelKind::NeuralNetwork, data)?;

        let mut tree = DecisionTree::new(config.tree.clone(), config.seed);
        let dt = fit_and_predict(&mut tree, ModelKind::DecisionTree, data)?;

        let mut knn = KNearestNeighbors::new(config.knn.clone());
        let knn_output = fit_and_predict(&mut knn, ModelKind::Knn, data)?;

        let mut svm = SupportVectorMachine::new(config.svm.clone(), config.seed);
        let svm_output = fit_and_predict(&mut svm, ModelKind::Svm, data)?;

        // Участники гибрида берутся из любых обученных моделей
        let mut outputs = vec![rf, dnn, dt, knn_output, svm_output];
        let ensemble = HybridEnsemble::new(config.hybrid.clone(), config.threshold)?;
        let hybrid = ensemble.combine(&outputs)?;
        outputs.insert(2, hybrid);

        Ok(TrainedModels {
            outputs,
            forest_importances,
            network_history: network.history().to_vec(),
            best_epoch: network.best_epoch(),
        })
    }

    pub fn run(&self, table: &RawTable) -> Result<PipelineReport> {
        tracing::info!("Step 1/4: preparing data");
        let data = self.prepare(table)?;

        tracing::info!("Step 2/4: training models");
        let trained = self.train(&data)?;

        tracing::info!("Step 3/4: evaluating models");
        let reporter = Reporter::new(self.config.report.clone());
        let reports = reporter.evaluate(&data.y_test, &trained.outputs)?;
        let ranking = Reporter::rank(&reports);
        let importances = trained.forest_importances.to_vec();
        let insights = reporter.insights(&data.selected_features, &importances, &reports)?;

        tracing::info!("Step 4/4: rendering figures");
        let figures = reporter.render_figures(
            &data.profile,
            &data.selected_features,
            &importances,
            &reports,
        )?;

        let feature_importances = data
            .selected_features
            .iter()
            .zip(importances.iter())
            .map(|(name, &importance)| FeatureImportance {
                feature: name.clone(),
                importance,
            })
            .collect();

        Ok(PipelineReport {
            generated_at: Utc::now(),
            profile: data.profile,
            split: data.split,
            balance: data.balance,
            feature_scores: data.feature_scores,
            selected_features: data.selected_features,
            feature_importances,
            network_history: trained.network_history,
            best_epoch: trained.best_epoch,
            reports,
            ranking,
            insights,
            figures,
        })
    }
}

fn fit_and_predict<M: Classifier>(
    model: &mut M,
    kind: ModelKind,
    data: &PreparedData,
) -> Result<ModelOutput> {
    tracing::info!("Training {} on {} rows", model.name(), data.x_train.nrows());
    model.fit(&data.x_train, &data.y_train)?;
    let probabilities = model.predict_probability(&data.x_test)?;
    let labels = model.predict(&data.x_test)?;
    Ok(ModelOutput::new(kind, probabilities, labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SyntheticSpec;

    fn small_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.forest.n_trees = 10;
        config.network.epochs = 5;
        config.report.render_charts = false;
        config
    }

    fn table(rows: usize) -> RawTable {
        SyntheticSpec {
            rows,
            seed: 42,
            anomaly_rate: 0.2,
        }
        .generate("Outlier_label")
        .unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = PipelineConfig::default();
        config.test_size = 0.0;
        assert!(Pipeline::new(config).is_err());
    }

    #[test]
    fn prepare_keeps_widths_consistent() {
        let pipeline = Pipeline::new(small_config()).unwrap();
        let data = pipeline.prepare(&table(200)).unwrap();

        assert_eq!(data.x_train.ncols(), data.x_test.ncols());
        assert_eq!(data.x_train.ncols(), data.selected_features.len());
        assert!(data.selected_features.len() <= 10);
        assert_eq!(data.x_test.nrows(), data.y_test.len());
        assert_eq!(data.balance.after[0], data.balance.after[1]);
    }

    #[test]
    fn run_reports_every_model() {
        let pipeline = Pipeline::new(small_config()).unwrap();
        let report = pipeline.run(&table(200)).unwrap();

        let kinds: Vec<ModelKind> = report.reports.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ModelKind::RandomForest,
                ModelKind::NeuralNetwork,
                ModelKind::Hybrid,
                ModelKind::DecisionTree,
                ModelKind::Knn,
                ModelKind::Svm,
            ]
        );
        assert_eq!(report.ranking.len(), 6);
        assert!(report.figures.is_empty());

        let json = report.to_json().unwrap();
        assert!(json.contains("\"ranking\""));
        assert!(!json.contains("\"figures\""));
        assert!(report.to_string().contains("Ranking by ROC-AUC"));
    }

    #[test]
    fn hybrid_members_can_be_any_trained_models() {
        let mut config = small_config();
        config.hybrid.members = vec![ModelKind::RandomForest, ModelKind::Svm];
        let pipeline = Pipeline::new(config).unwrap();
        let data = pipeline.prepare(&table(200)).unwrap();
        let trained = pipeline.train(&data).unwrap();

        let kinds: Vec<ModelKind> = trained.outputs.iter().map(|o| o.kind).collect();
        assert_eq!(kinds[2], ModelKind::Hybrid);
        assert_eq!(kinds.len(), 6);

        let rf = trained.output(ModelKind::RandomForest).unwrap();
        let svm = trained.output(ModelKind::Svm).unwrap();
        let hybrid = trained.output(ModelKind::Hybrid).unwrap();
        assert_eq!(hybrid.name, "Hybrid (RF+SVM)");
        for i in 0..hybrid.probabilities.len() {
            let expected = (rf.probabilities[i] + svm.probabilities[i]) / 2.0;
            assert!((hybrid.probabilities[i] - expected).abs() < 1e-12);
        }
    }
}
