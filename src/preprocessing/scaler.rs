use serde::{Deserialize, Serialize};

use crate::error::TransformError;

/// Z-score scaling with the population standard deviation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(columns: &[Vec<f64>]) -> Result<Self, TransformError> {
        let mut means = Vec::with_capacity(columns.len());
        let mut scales = Vec::with_capacity(columns.len());
        for column in columns {
            if column.is_empty() {
                return Err(TransformError::EmptyPartition);
            }
            let n = column.len() as f64;
            let mean = column.iter().sum::<f64>() / n;
            let variance = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();
            means.push(mean);
            // constant columns map to zero instead of dividing by zero
            scales.push(if std < 1e-10 { 1.0 } else { std });
        }
        Ok(Self { means, scales })
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    /// Column-major in, column-major out
    pub fn transform(&self, columns: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, TransformError> {
        if columns.len() != self.means.len() {
            return Err(TransformError::LengthMismatch {
                expected: self.means.len(),
                found: columns.len(),
            });
        }
        Ok(columns
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(column, (mean, scale))| column.iter().map(|v| (v - mean) / scale).collect())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standardizes_columns() {
        let scaler = StandardScaler::fit(&[vec![1.0, 2.0, 3.0, 4.0]]).unwrap();
        assert_eq!(scaler.means(), &[2.5]);
        assert!((scaler.scales()[0] - 1.118033988749895).abs() < 1e-12);

        let out = scaler.transform(&[vec![2.5, 4.0]]).unwrap();
        assert_eq!(out[0][0], 0.0);
        assert!((out[0][1] - 1.3416407864998738).abs() < 1e-12);
    }

    #[test]
    fn test_constant_column_maps_to_zero() {
        let scaler = StandardScaler::fit(&[vec![5.0, 5.0, 5.0]]).unwrap();
        assert_eq!(scaler.scales(), &[1.0]);
        assert_eq!(scaler.transform(&[vec![5.0]]).unwrap(), vec![vec![0.0]]);
    }

    #[test]
    fn test_width_mismatch() {
        let scaler = StandardScaler::fit(&[vec![1.0, 2.0]]).unwrap();
        assert!(matches!(
            scaler.transform(&[vec![1.0], vec![2.0]]),
            Err(TransformError::LengthMismatch { expected: 1, found: 2 })
        ));
    }
}
