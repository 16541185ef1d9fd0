//! Стратифицированное разбиение на обучающую и тестовую выборки

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::error::{Result, ThyroError};
use crate::types::Dataset;

#[derive(Debug, Clone)]
pub struct Split {
    pub train: Dataset,
    pub test: Dataset,
    /// Индексы строк исходного датасета
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SplitSummary {
    pub train_size: usize,
    pub test_size: usize,
    pub train_counts: [usize; 2],
    pub test_counts: [usize; 2],
}

impl Split {
    pub fn summary(&self) -> SplitSummary {
        SplitSummary {
            train_size: self.train.n_samples(),
            test_size: self.test.n_samples(),
            train_counts: self.train.class_counts(),
            test_counts: self.test.class_counts(),
        }
    }
}

/// Число тестовых строк на класс: пол пропорциональной доли,
/// остаток - классам с наибольшей дробной частью
fn allocate_test_counts(class_sizes: [usize; 2], n_test: usize) -> [usize; 2] {
    let n: usize = class_sizes.iter().sum();
    let shares: Vec<f64> = class_sizes
        .iter()
        .map(|&size| n_test as f64 * size as f64 / n as f64)
        .collect();

    let mut counts = [shares[0].floor() as usize, shares[1].floor() as usize];
    let mut leftover = n_test - counts.iter().sum::<usize>();

    let mut order = [0usize, 1];
    order.sort_by(|&a, &b| {
        let fa = shares[a] - shares[a].floor();
        let fb = shares[b] - shares[b].floor();
        fb.partial_cmp(&fa).unwrap_or(std::cmp::Ordering::Equal)
    });

    for class in order.iter().cycle() {
        if leftover == 0 {
            break;
        }
        if counts[*class] < class_sizes[*class] {
            counts[*class] += 1;
            leftover -= 1;
        }
    }
    counts
}

/// Разбиение с сохранением доли классов; ceil(n * test_size) строк в тест
pub fn stratified_split(dataset: &Dataset, test_size: f64, seed: u64) -> Result<Split> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(ThyroError::InvalidConfig(format!(
            "test_size {} is outside (0, 1)",
            test_size
        )));
    }
    let n = dataset.n_samples();
    if n == 0 {
        return Err(ThyroError::EmptyDataset);
    }

    let n_test = (n as f64 * test_size).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(ThyroError::InvalidConfig(format!(
            "test_size {} leaves an empty partition for {} rows",
            test_size, n
        )));
    }

    let mut by_class: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
    for (i, &label) in dataset.labels.iter().enumerate() {
        by_class[label].push(i);
    }
    let test_counts = allocate_test_counts([by_class[0].len(), by_class[1].len()], n_test);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train_indices = Vec::with_capacity(n - n_test);
    let mut test_indices = Vec::with_capacity(n_test);
    for (members, &take) in by_class.iter_mut().zip(test_counts.iter()) {
        members.shuffle(&mut rng);
        test_indices.extend_from_slice(&members[..take]);
        train_indices.extend_from_slice(&members[take..]);
    }
    train_indices.shuffle(&mut rng);
    test_indices.shuffle(&mut rng);

    let split = Split {
        train: dataset.select_rows(&train_indices),
        test: dataset.select_rows(&test_indices),
        train_indices,
        test_indices,
    };

    let summary = split.summary();
    tracing::info!(
        "Split: train={} ({}+{}) test={} ({}+{})",
        summary.train_size,
        summary.train_counts[0],
        summary.train_counts[1],
        summary.test_size,
        summary.test_counts[0],
        summary.test_counts[1]
    );

    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn dataset(n: usize, anomalies: usize) -> Dataset {
        let features = Array2::from_shape_fn((n, 2), |(i, j)| (i * 2 + j) as f64);
        let labels: Array1<usize> = (0..n).map(|i| usize::from(i < anomalies)).collect();
        Dataset::new(vec!["a".into(), "b".into()], features, labels).unwrap()
    }

    #[test]
    fn partitions_are_disjoint_and_exhaustive() {
        let ds = dataset(1000, 70);
        let split = stratified_split(&ds, 0.2, 42).unwrap();

        assert_eq!(split.test.n_samples(), 200);
        assert_eq!(split.train.n_samples(), 800);
        assert_eq!(split.test.class_counts(), [186, 14]);

        let mut all: Vec<usize> = split
            .train_indices
            .iter()
            .chain(split.test_indices.iter())
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn rows_follow_their_indices() {
        let ds = dataset(50, 10);
        let split = stratified_split(&ds, 0.3, 1).unwrap();
        for (row, &source) in split.test_indices.iter().enumerate() {
            assert_eq!(split.test.features[[row, 0]], ds.features[[source, 0]]);
            assert_eq!(split.test.labels[row], ds.labels[source]);
        }
    }

    #[test]
    fn same_seed_same_assignment() {
        let ds = dataset(120, 9);
        let a = stratified_split(&ds, 0.2, 42).unwrap();
        let b = stratified_split(&ds, 0.2, 42).unwrap();
        assert_eq!(a.test_indices, b.test_indices);

        let c = stratified_split(&ds, 0.2, 43).unwrap();
        assert_ne!(a.test_indices, c.test_indices);
    }

    #[test]
    fn leftover_slots_go_to_largest_remainders() {
        // 10 * 7/13 = 5.38, 10 * 6/13 = 4.62 -> 5 + 5
        assert_eq!(allocate_test_counts([7, 6], 10), [5, 5]);
        assert_eq!(allocate_test_counts([930, 70], 200), [186, 14]);
    }

    #[test]
    fn invalid_test_size_is_rejected() {
        let ds = dataset(10, 2);
        assert!(matches!(
            stratified_split(&ds, 0.0, 0),
            Err(ThyroError::InvalidConfig(_))
        ));
        assert!(matches!(
            stratified_split(&ds, 1.0, 0),
            Err(ThyroError::InvalidConfig(_))
        ));
    }
}
