//! Min-max масштабирование признаков

use ndarray::{Array1, Array2, Axis};

use crate::error::{Result, ThyroError};

pub struct MinMaxScaler {
    min: Option<Array1<f64>>,
    range: Option<Array1<f64>>,
}

impl MinMaxScaler {
    pub fn new() -> Self {
        Self {
            min: None,
            range: None,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(ThyroError::EmptyDataset);
        }

        let min = x.fold_axis(Axis(0), f64::INFINITY, |acc, &v| acc.min(v));
        let max = x.fold_axis(Axis(0), f64::NEG_INFINITY, |acc, &v| acc.max(v));

        // Нулевой размах: масштаб 1, чтобы избежать деления на ноль
        let range = (&max - &min).mapv(|r| if r > 0.0 { r } else { 1.0 });

        self.min = Some(min);
        self.range = Some(range);
        Ok(())
    }

    /// (x - min) / range по статистикам обучающей выборки; значения вне [0, 1] допустимы
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (min, range) = match (&self.min, &self.range) {
            (Some(min), Some(range)) => (min, range),
            _ => return Err(ThyroError::NotFitted("min-max scaler")),
        };
        if x.ncols() != min.len() {
            return Err(ThyroError::DimensionMismatch {
                expected: min.len(),
                got: x.ncols(),
            });
        }

        Ok((x - min) / range)
    }

    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    pub fn data_min(&self) -> Option<&Array1<f64>> {
        self.min.as_ref()
    }

    pub fn data_range(&self) -> Option<&Array1<f64>> {
        self.range.as_ref()
    }
}

impl Default for MinMaxScaler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn training_data_lands_in_unit_interval() {
        let x = array![[1.0, 10.0, 5.0], [3.0, 20.0, 5.0], [2.0, 15.0, 5.0]];
        let mut scaler = MinMaxScaler::new();
        let scaled = scaler.fit_transform(&x).unwrap();

        assert!(scaled.iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(scaled.column(0).to_vec(), vec![0.0, 1.0, 0.5]);
        // Константная колонка: (5 - 5) / 1
        assert_eq!(scaled.column(2).to_vec(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_data_uses_training_statistics() {
        let mut scaler = MinMaxScaler::new();
        scaler.fit(&array![[0.0], [10.0]]).unwrap();
        let scaled = scaler.transform(&array![[-5.0], [20.0]]).unwrap();
        assert_eq!(scaled.column(0).to_vec(), vec![-0.5, 2.0]);
    }

    #[test]
    fn errors_before_fit_and_on_width_mismatch() {
        let mut scaler = MinMaxScaler::default();
        assert!(matches!(
            scaler.transform(&array![[1.0]]),
            Err(ThyroError::NotFitted(_))
        ));

        scaler.fit(&array![[1.0, 2.0]]).unwrap();
        assert!(matches!(
            scaler.transform(&array![[1.0]]),
            Err(ThyroError::DimensionMismatch { expected: 2, got: 1 })
        ));
    }
}
