//! Row-oriented CSV table shared by every stage
//!
//! Cells are kept as text so source columns pass through ingestion
//! untouched; numeric parsing happens only for the columns a stage needs.

use std::path::Path;

use csv::{ReaderBuilder, Writer};

use crate::error::TransformError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn read_csv(path: &Path) -> Result<Self, csv::Error> {
        let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), csv::Error> {
        let mut writer = Writer::from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Build a numeric table, one header per column
    pub fn from_matrix(headers: Vec<String>, rows: &[Vec<f64>]) -> Self {
        Self {
            headers,
            rows: rows
                .iter()
                .map(|row| row.iter().map(f64::to_string).collect())
                .collect(),
        }
    }

    pub fn from_column(header: &str, values: &[f64]) -> Self {
        Self {
            headers: vec![header.to_string()],
            rows: values.iter().map(|v| vec![v.to_string()]).collect(),
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Rows at `indices`, in that order
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            headers: self.headers.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Copy of the table without column `name`
    pub fn without_column(&self, name: &str) -> Self {
        match self.column_index(name) {
            None => self.clone(),
            Some(idx) => Self {
                headers: drop_at(&self.headers, idx),
                rows: self.rows.iter().map(|row| drop_at(row, idx)).collect(),
            },
        }
    }

    /// Parse a column into optional floats; empty and `NaN` cells are `None`
    pub fn numeric_column(&self, name: &str) -> Result<Vec<Option<f64>>, TransformError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| TransformError::UnknownFeature {
                column: name.to_string(),
            })?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row, cells)| {
                let raw = cells.get(idx).map(String::as_str).unwrap_or("");
                parse_cell(raw).ok_or_else(|| TransformError::InvalidValue {
                    column: name.to_string(),
                    row,
                    value: raw.to_string(),
                })
            })
            .collect()
    }

    /// Every cell parsed as a finite float, row by row
    pub fn to_matrix(&self) -> Result<Vec<Vec<f64>>, TransformError> {
        self.rows
            .iter()
            .enumerate()
            .map(|(row, cells)| {
                cells
                    .iter()
                    .zip(&self.headers)
                    .map(|(raw, column)| match parse_cell(raw) {
                        Some(Some(v)) => Ok(v),
                        _ => Err(TransformError::InvalidValue {
                            column: column.clone(),
                            row,
                            value: raw.clone(),
                        }),
                    })
                    .collect::<Result<Vec<f64>, _>>()
            })
            .collect()
    }
}

fn drop_at(values: &[String], idx: usize) -> Vec<String> {
    values
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != idx)
        .map(|(_, v)| v.clone())
        .collect()
}

/// `Some(None)` for a missing cell, `None` for text that is not a finite
/// number (`inf` included)
pub fn parse_cell(raw: &str) -> Option<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Some(None);
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite()).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut table = Table::new(vec!["a".into(), "b".into(), "c".into()]);
        table.push_row(vec!["1".into(), "x".into(), "2.5".into()]);
        table.push_row(vec!["".into(), "y".into(), "NaN".into()]);
        table
    }

    #[test]
    fn test_parse_cell() {
        assert_eq!(parse_cell("1.5"), Some(Some(1.5)));
        assert_eq!(parse_cell(" 3 "), Some(Some(3.0)));
        assert_eq!(parse_cell(""), Some(None));
        assert_eq!(parse_cell("nan"), Some(None));
        assert_eq!(parse_cell("abc"), None);
        assert_eq!(parse_cell("inf"), None);
        assert_eq!(parse_cell("-Infinity"), None);
        assert_eq!(parse_cell("1e400"), None);
    }

    #[test]
    fn test_numeric_column_marks_missing_cells() {
        let table = sample();
        assert_eq!(table.numeric_column("a").unwrap(), vec![Some(1.0), None]);
        assert!(matches!(
            table.numeric_column("b"),
            Err(TransformError::InvalidValue { row: 0, .. })
        ));
        assert!(matches!(
            table.numeric_column("zzz"),
            Err(TransformError::UnknownFeature { .. })
        ));
    }

    #[test]
    fn test_without_column() {
        let table = sample().without_column("b");
        assert_eq!(table.headers(), &["a".to_string(), "c".to_string()]);
        assert_eq!(table.rows()[0], vec!["1".to_string(), "2.5".to_string()]);
    }

    #[test]
    fn test_csv_round_trip_preserves_floats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        let rows = vec![vec![0.1 + 0.2, -1.0e-7], vec![1234.5678, 0.0]];
        Table::from_matrix(vec!["x".into(), "y".into()], &rows)
            .write_csv(&path)
            .unwrap();

        let loaded = Table::read_csv(&path).unwrap();
        assert_eq!(loaded.to_matrix().unwrap(), rows);
    }
}
