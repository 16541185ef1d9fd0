use thyronet::{
    DataSource, ModelKind, Pipeline, PipelineConfig, RawTable, SyntheticSpec, ThyroError,
};

fn quick_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.forest.n_trees = 20;
    config.network.epochs = 10;
    config.svm.max_passes = 20;
    config.report.render_charts = false;
    config
}

fn synthetic_table(seed: u64) -> RawTable {
    SyntheticSpec {
        rows: 1000,
        seed,
        anomaly_rate: 0.07,
    }
    .generate("Outlier_label")
    .unwrap()
}

#[test]
fn synthetic_run_holds_out_200_rows() {
    let pipeline = Pipeline::new(quick_config()).unwrap();
    let data = pipeline.prepare(&synthetic_table(42)).unwrap();

    assert_eq!(data.split.test_size, 200);
    assert_eq!(data.split.train_size + data.split.test_size, 1000);
    assert_eq!(data.x_test.nrows(), 200);

    // Тестовая выборка не балансируется
    assert_eq!(data.split.test_counts.iter().sum::<usize>(), 200);
    assert_eq!(data.balance.before, data.split.train_counts);
    assert_eq!(data.balance.after[0], data.balance.after[1]);
}

#[test]
fn split_is_reproducible_for_a_seed() {
    let pipeline = Pipeline::new(quick_config()).unwrap();
    let first = pipeline.prepare(&synthetic_table(42)).unwrap();
    let second = pipeline.prepare(&synthetic_table(42)).unwrap();

    assert_eq!(first.test_indices, second.test_indices);
    assert_eq!(first.selected_features, second.selected_features);
    assert_eq!(first.x_train, second.x_train);
}

#[test]
fn scaled_training_features_lie_in_unit_interval() {
    let pipeline = Pipeline::new(quick_config()).unwrap();
    let data = pipeline.prepare(&synthetic_table(7)).unwrap();

    assert!(data.x_train.iter().all(|&v| (0.0..=1.0).contains(&v)));
    assert_eq!(data.x_train.ncols(), data.x_test.ncols());
    assert!(data.selected_features.len() <= 10);
}

#[test]
fn hybrid_is_the_mean_of_forest_and_network() {
    let pipeline = Pipeline::new(quick_config()).unwrap();
    let data = pipeline.prepare(&synthetic_table(42)).unwrap();
    let trained = pipeline.train(&data).unwrap();

    let rf = trained.output(ModelKind::RandomForest).unwrap();
    let dnn = trained.output(ModelKind::NeuralNetwork).unwrap();
    let hybrid = trained.output(ModelKind::Hybrid).unwrap();

    for i in 0..hybrid.probabilities.len() {
        let expected = (rf.probabilities[i] + dnn.probabilities[i]) / 2.0;
        assert!((hybrid.probabilities[i] - expected).abs() < 1e-12);
        assert_eq!(hybrid.labels[i], usize::from(hybrid.probabilities[i] > 0.5));
    }
    assert!(hybrid
        .probabilities
        .iter()
        .all(|&p| (0.0..=1.0).contains(&p)));
}

#[tokio::test]
async fn synthetic_source_runs_end_to_end() {
    let mut config = quick_config();
    config.report.render_charts = true;
    let source = DataSource::Synthetic(config.synthetic.clone());
    let table = source.load(&config.label_column).await.unwrap();

    let report = Pipeline::new(config).unwrap().run(&table).unwrap();
    assert_eq!(report.reports.len(), 6);
    assert_eq!(report.ranking[0].rank, 1);
    assert!(report
        .ranking
        .windows(2)
        .all(|w| w[0].roc_auc >= w[1].roc_auc));
    assert_eq!(report.insights.top_features.len(), 5);
    assert_eq!(report.figures.len(), 7);
    assert!(report.figures.iter().all(|f| f.svg.contains("<svg")));
}

#[test]
fn missing_label_column_is_fatal() {
    let table = RawTable::from_csv_str("TSH;FTI\n0.1;0.2\n0.3;0.4\n").unwrap();
    let pipeline = Pipeline::new(quick_config()).unwrap();
    assert!(matches!(
        pipeline.run(&table),
        Err(ThyroError::MissingLabel(_))
    ));
}
