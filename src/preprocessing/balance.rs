//! Балансировка классов простым оверсэмплингом меньшинства

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::error::{Result, ThyroError};
use crate::types::Dataset;

#[derive(Debug, Clone, Serialize)]
pub struct BalanceSummary {
    pub before: [usize; 2],
    pub after: [usize; 2],
}

/// Строки большинства, затем выборка меньшинства с возвращением
/// до размера большинства. Только для обучающей выборки.
pub fn oversample_minority(dataset: &Dataset, seed: u64) -> Result<(Dataset, BalanceSummary)> {
    let before = dataset.class_counts();
    if before[0] == 0 || before[1] == 0 {
        return Err(ThyroError::InvalidInput(format!(
            "cannot balance classes {:?}: one class is empty",
            before
        )));
    }
    if before[0] == before[1] {
        tracing::info!("Classes already balanced: {} per class", before[0]);
        return Ok((dataset.clone(), BalanceSummary { before, after: before }));
    }

    let (majority, minority) = if before[0] > before[1] { (0, 1) } else { (1, 0) };
    let majority_rows: Vec<usize> = (0..dataset.n_samples())
        .filter(|&i| dataset.labels[i] == majority)
        .collect();
    let minority_rows: Vec<usize> = (0..dataset.n_samples())
        .filter(|&i| dataset.labels[i] == minority)
        .collect();

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut indices = majority_rows.clone();
    indices.extend(
        (0..majority_rows.len()).map(|_| minority_rows[rng.gen_range(0..minority_rows.len())]),
    );

    let balanced = dataset.select_rows(&indices);
    let after = balanced.class_counts();
    tracing::info!(
        "Oversampled minority class: {:?} -> {:?}",
        before,
        after
    );

    Ok((balanced, BalanceSummary { before, after }))
}
