/// Консольный прогон конвейера

use anyhow::Context;

use thyronet::{DataSource, Pipeline, PipelineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Инициализация логирования
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = PipelineConfig::default();
    let pipeline = Pipeline::new(config.clone()).context("invalid pipeline configuration")?;

    let remote = DataSource::Remote {
        url: config.data_url.clone(),
    };
    let table = match remote.load(&config.label_column).await {
        Ok(table) => table,
        Err(err) => {
            tracing::warn!("Could not load {}: {}", remote.describe(), err);
            let fallback = DataSource::Synthetic(config.synthetic.clone());
            tracing::warn!("Falling back to {}", fallback.describe());
            fallback
                .load(&config.label_column)
                .await
                .context("failed to generate synthetic dataset")?
        }
    };

    let report = pipeline.run(&table).context("pipeline run failed")?;
    println!("{}", report);
    Ok(())
}
