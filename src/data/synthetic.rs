//! Синтетический датасет со схемой annthyroid
//!
//! Используется, когда удалённый источник недоступен.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::table::RawTable;
use crate::error::{Result, ThyroError};
use crate::types::Label;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticSpec {
    pub rows: usize,
    pub seed: u64,
    /// Априорная доля аномалий ("o")
    pub anomaly_rate: f64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            rows: 1000,
            seed: 42,
            anomaly_rate: 0.07,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Column {
    Uniform(f64, f64),
    Bernoulli(f64),
}

const COLUMNS: [(&str, Column); 21] = [
    ("Age", Column::Uniform(0.0, 1.0)),
    ("Sex", Column::Bernoulli(0.5)),
    ("on_thyroxine", Column::Bernoulli(0.1)),
    ("query_on_thyroxine", Column::Bernoulli(0.05)),
    ("on_antithyroid_medication", Column::Bernoulli(0.05)),
    ("sick", Column::Bernoulli(0.1)),
    ("pregnant", Column::Bernoulli(0.05)),
    ("thyroid_surgery", Column::Bernoulli(0.02)),
    ("I131_treatment", Column::Bernoulli(0.02)),
    ("query_hypothyroid", Column::Bernoulli(0.1)),
    ("query_hyperthyroid", Column::Bernoulli(0.1)),
    ("lithium", Column::Bernoulli(0.01)),
    ("goitre", Column::Bernoulli(0.05)),
    ("tumor", Column::Bernoulli(0.02)),
    ("hypopituitary", Column::Bernoulli(0.01)),
    ("psych", Column::Bernoulli(0.05)),
    ("TSH", Column::Uniform(0.0, 0.1)),
    ("T3_measured", Column::Uniform(0.0, 0.1)),
    ("TT4_measured", Column::Uniform(50.0, 150.0)),
    ("T4U_measured", Column::Uniform(50.0, 150.0)),
    ("FTI_measured", Column::Uniform(50.0, 150.0)),
];

impl SyntheticSpec {
    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 {
            return Err(ThyroError::InvalidConfig(
                "synthetic dataset needs at least one row".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.anomaly_rate) {
            return Err(ThyroError::InvalidConfig(format!(
                "synthetic anomaly rate {} is outside [0, 1]",
                self.anomaly_rate
            )));
        }
        Ok(())
    }

    /// Генерация таблицы; значения пишутся строками, как после чтения CSV
    pub fn generate(&self, label_column: &str) -> Result<RawTable> {
        self.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let mut headers: Vec<String> = COLUMNS.iter().map(|(name, _)| name.to_string()).collect();
        headers.push(label_column.to_string());

        let rows = (0..self.rows)
            .map(|_| {
                let mut row: Vec<String> = COLUMNS
                    .iter()
                    .map(|(_, column)| match *column {
                        Column::Uniform(low, high) => rng.gen_range(low..high).to_string(),
                        Column::Bernoulli(p) => u8::from(rng.gen_bool(p)).to_string(),
                    })
                    .collect();
                let label = if rng.gen_bool(self.anomaly_rate) {
                    Label::Anomaly
                } else {
                    Label::Normal
                };
                row.push(label.code().to_string());
                row
            })
            .collect();

        tracing::debug!(
            "Generated synthetic dataset: {} rows, {} columns, seed {}",
            self.rows,
            headers.len(),
            self.seed
        );

        Ok(RawTable::new(headers, rows))
    }
}
