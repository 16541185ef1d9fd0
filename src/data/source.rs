//! Источники данных: HTTP, локальный файл, синтетика

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::synthetic::SyntheticSpec;
use super::table::RawTable;
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Однократный HTTP GET, тело - CSV с ';'
    Remote { url: String },
    File { path: PathBuf },
    Synthetic(SyntheticSpec),
}

impl DataSource {
    pub fn describe(&self) -> String {
        match self {
            DataSource::Remote { url } => format!("remote CSV ({})", url),
            DataSource::File { path } => format!("local CSV ({})", path.display()),
            DataSource::Synthetic(spec) => {
                format!("synthetic ({} rows, seed {})", spec.rows, spec.seed)
            }
        }
    }

    /// Загрузка сырой таблицы. Ошибки не скрываются: выбор запасного
    /// источника остаётся за вызывающим кодом.
    pub async fn load(&self, label_column: &str) -> Result<RawTable> {
        let table = match self {
            DataSource::Remote { url } => {
                let response = reqwest::Client::builder()
                    .user_agent(concat!("thyronet/", env!("CARGO_PKG_VERSION")))
                    .build()?
                    .get(url)
                    .send()
                    .await?
                    .error_for_status()?;
                let text = response.text().await?;
                RawTable::from_csv_str(&text)?
            }
            DataSource::File { path } => {
                let file = File::open(path)?;
                RawTable::from_reader(BufReader::new(file))?
            }
            DataSource::Synthetic(spec) => spec.generate(label_column)?,
        };

        let (rows, columns) = table.shape();
        tracing::info!(
            "Loaded {} rows x {} columns from {}",
            rows,
            columns,
            self.describe()
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn loads_local_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Age;TSH;Outlier_label;").unwrap();
        writeln!(file, "0.5;0.01;n;").unwrap();
        writeln!(file, "0.6;0.02;o;").unwrap();

        let source = DataSource::File {
            path: file.path().to_path_buf(),
        };
        let table = source.load("Outlier_label").await.unwrap();
        assert_eq!(table.shape(), (2, 4));

        let dataset = table.clean("Outlier_label").unwrap();
        assert_eq!(dataset.class_counts(), [1, 1]);
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let source = DataSource::File {
            path: PathBuf::from("/definitely/not/here.csv"),
        };
        assert!(matches!(
            source.load("Outlier_label").await,
            Err(crate::error::ThyroError::Io(_))
        ));
    }

    #[tokio::test]
    async fn synthetic_source_uses_label_column() {
        let source = DataSource::Synthetic(SyntheticSpec {
            rows: 10,
            ..SyntheticSpec::default()
        });
        let table = source.load("target").await.unwrap();
        assert_eq!(table.headers.last().map(String::as_str), Some("target"));
    }
}
