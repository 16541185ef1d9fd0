//! Сырая таблица из CSV и её очистка до числового датасета

use std::collections::HashSet;
use std::io::Read;

use ndarray::{Array1, Array2};

use crate::error::{Result, ThyroError};
use crate::types::{Dataset, Label};

/// Разделитель исходного датасета
pub const DELIMITER: u8 = b';';

/// Таблица как она есть в источнике: заголовки и строковые ячейки
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn is_missing(cell: &str) -> bool {
    let cell = cell.trim();
    cell.is_empty() || cell.eq_ignore_ascii_case("nan") || cell.eq_ignore_ascii_case("na")
}

/// Служебные колонки: "Unnamed: N", ";" и пустые (хвостовой разделитель)
pub(crate) fn is_artifact_column(name: &str) -> bool {
    let name = name.trim();
    name.starts_with("Unnamed") || name == ";" || name.is_empty()
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Чтение CSV с разделителем ';'. Короткие строки дополняются пустыми ячейками.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(DELIMITER)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let width = headers.len();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(width, String::new());
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    pub fn from_csv_str(text: &str) -> Result<Self> {
        Self::from_reader(text.as_bytes())
    }

    /// (строки, колонки)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.headers.len())
    }

    pub fn missing_cells(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|row| row.iter())
            .filter(|cell| is_missing(cell))
            .count()
    }

    /// Количество строк, полностью повторяющих одну из предыдущих
    pub fn duplicate_rows(&self) -> usize {
        let mut seen = HashSet::with_capacity(self.rows.len());
        self.rows.iter().filter(|row| !seen.insert(row.as_slice())).count()
    }

    /// Таблица без служебных колонок, имена без пробелов по краям
    pub fn without_artifacts(&self) -> RawTable {
        let kept: Vec<usize> = self
            .headers
            .iter()
            .enumerate()
            .filter(|(_, name)| !is_artifact_column(name))
            .map(|(i, _)| i)
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                kept.iter()
                    .map(|&i| row.get(i).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        RawTable::new(self.clean_headers(), rows)
    }

    /// Имена колонок после очистки (без служебных, без пробелов по краям)
    pub fn clean_headers(&self) -> Vec<String> {
        self.headers
            .iter()
            .filter(|name| !is_artifact_column(name))
            .map(|name| name.trim().to_string())
            .collect()
    }

    /// Очистка: удаление служебных колонок, кодирование метки, разбор чисел
    pub fn clean(&self, label_column: &str) -> Result<Dataset> {
        let kept: Vec<(usize, String)> = self
            .headers
            .iter()
            .enumerate()
            .filter(|(_, name)| !is_artifact_column(name))
            .map(|(i, name)| (i, name.trim().to_string()))
            .collect();

        let label_index = kept
            .iter()
            .find(|(_, name)| name == label_column)
            .map(|(i, _)| *i)
            .ok_or_else(|| ThyroError::MissingLabel(label_column.to_string()))?;

        let feature_columns: Vec<(usize, String)> = kept
            .into_iter()
            .filter(|(i, _)| *i != label_index)
            .collect();

        if self.rows.is_empty() {
            return Err(ThyroError::EmptyDataset);
        }

        let n_rows = self.rows.len();
        let n_features = feature_columns.len();
        let mut values = Vec::with_capacity(n_rows * n_features);
        let mut labels = Vec::with_capacity(n_rows);

        for (row_index, row) in self.rows.iter().enumerate() {
            let raw_label = row.get(label_index).map(String::as_str).unwrap_or("");
            let label = Label::from_code(raw_label).ok_or_else(|| ThyroError::UnknownLabel {
                row: row_index,
                value: raw_label.to_string(),
            })?;
            labels.push(label.index());

            for (column, name) in &feature_columns {
                let cell = row.get(*column).map(String::as_str).unwrap_or("");
                let value = cell
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| ThyroError::InvalidValue {
                        column: name.clone(),
                        row: row_index,
                        value: cell.to_string(),
                    })?;
                values.push(value);
            }
        }

        let features = Array2::from_shape_vec((n_rows, n_features), values)
            .map_err(|e| ThyroError::InvalidInput(e.to_string()))?;
        let names = feature_columns.into_iter().map(|(_, name)| name).collect();

        Dataset::new(names, features, Array1::from(labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Age;Sex; TSH ;Outlier_label;\n\
                          0.73;0;0.0006;n;\n\
                          0.24;0;0.00025;n;\n\
                          0.47;1;0.0019;o;\n\
                          0.24;0;0.00025;n;\n";

    #[test]
    fn reads_semicolon_csv_with_trailing_separator() {
        let table = RawTable::from_csv_str(SAMPLE).unwrap();
        assert_eq!(table.shape(), (4, 5));
        assert_eq!(table.headers[4], "");
        assert_eq!(table.duplicate_rows(), 1);
    }

    #[test]
    fn clean_drops_artifacts_and_encodes_labels() {
        let table = RawTable::from_csv_str(SAMPLE).unwrap();
        let dataset = table.clean("Outlier_label").unwrap();

        assert_eq!(dataset.feature_names, vec!["Age", "Sex", "TSH"]);
        assert_eq!(dataset.n_samples(), 4);
        assert_eq!(dataset.labels.to_vec(), vec![0, 0, 1, 0]);
        assert!((dataset.features[[2, 2]] - 0.0019).abs() < 1e-12);
    }

    #[test]
    fn unnamed_and_semicolon_columns_are_removed() {
        let table = RawTable::new(
            vec![
                "Unnamed: 0".into(),
                "Age".into(),
                ";".into(),
                "Outlier_label".into(),
            ],
            vec![vec!["0".into(), "0.5".into(), "x".into(), "o".into()]],
        );
        assert_eq!(table.clean_headers(), vec!["Age", "Outlier_label"]);

        let dataset = table.clean("Outlier_label").unwrap();
        assert_eq!(dataset.feature_names, vec!["Age"]);
        assert_eq!(dataset.labels.to_vec(), vec![1]);
    }

    #[test]
    fn padded_unnamed_header_is_removed() {
        let table = RawTable::new(
            vec![" Unnamed: 0".into(), " Age ".into(), "Outlier_label".into()],
            vec![vec!["0".into(), "0.5".into(), "n".into()]],
        );
        assert_eq!(table.clean_headers(), vec!["Age", "Outlier_label"]);

        let dataset = table.clean("Outlier_label").unwrap();
        assert_eq!(dataset.feature_names, vec!["Age"]);
        assert!(dataset
            .feature_names
            .iter()
            .all(|name| !name.starts_with("Unnamed")));
    }

    #[test]
    fn without_artifacts_drops_trailing_column() {
        let table = RawTable::from_csv_str(SAMPLE).unwrap();
        let cleaned = table.without_artifacts();

        assert_eq!(cleaned.shape(), (4, 4));
        assert_eq!(cleaned.headers, vec!["Age", "Sex", "TSH", "Outlier_label"]);
        assert_eq!(cleaned.missing_cells(), 0);
        assert_eq!(cleaned.duplicate_rows(), 1);
    }

    #[test]
    fn missing_label_column_is_fatal() {
        let table = RawTable::from_csv_str("Age;Sex\n0.1;1\n").unwrap();
        assert!(matches!(
            table.clean("Outlier_label"),
            Err(ThyroError::MissingLabel(name)) if name == "Outlier_label"
        ));
    }

    #[test]
    fn unknown_label_and_bad_cells_are_reported() {
        let table = RawTable::from_csv_str("Age;Outlier_label\n0.1;x\n").unwrap();
        assert!(matches!(
            table.clean("Outlier_label"),
            Err(ThyroError::UnknownLabel { row: 0, .. })
        ));

        let table = RawTable::from_csv_str("Age;Outlier_label\n0.1;n\n;o\n").unwrap();
        assert_eq!(table.missing_cells(), 1);
        assert!(matches!(
            table.clean("Outlier_label"),
            Err(ThyroError::InvalidValue { row: 1, .. })
        ));
    }
}
