//! Regression scores used to compare candidates

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionScores {
    /// Root Mean Square Error
    pub rmse: f64,
    /// Mean Square Error
    pub mse: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// R² (coefficient of determination)
    pub r2: f64,
}

impl RegressionScores {
    /// Calculate scores from actual and predicted values
    pub fn calculate(actual: &[f64], predicted: &[f64]) -> Result<Self, MetricsError> {
        if actual.len() != predicted.len() {
            return Err(MetricsError::DimensionMismatch {
                actual: actual.len(),
                predicted: predicted.len(),
            });
        }

        if actual.is_empty() {
            return Err(MetricsError::EmptyData);
        }

        let n = actual.len() as f64;

        let mae = actual
            .iter()
            .zip(predicted)
            .map(|(a, p)| (a - p).abs())
            .sum::<f64>()
            / n;

        let ss_res: f64 = actual
            .iter()
            .zip(predicted)
            .map(|(a, p)| (a - p).powi(2))
            .sum();
        let mse = ss_res / n;
        let rmse = mse.sqrt();

        let mean_actual = actual.iter().sum::<f64>() / n;
        let ss_tot: f64 = actual.iter().map(|a| (a - mean_actual).powi(2)).sum();
        let r2 = if ss_tot > 1e-10 {
            1.0 - ss_res / ss_tot
        } else {
            0.0
        };

        Ok(Self { rmse, mse, mae, r2 })
    }
}

impl fmt::Display for RegressionScores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RMSE={:.3}, MSE={:.3}, MAE={:.3}, R²={:.4}",
            self.rmse, self.mse, self.mae, self.r2
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricsError {
    #[error("Dimension mismatch: actual={actual}, predicted={predicted}")]
    DimensionMismatch { actual: usize, predicted: usize },

    #[error("Empty data provided")]
    EmptyData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_prediction() {
        let actual = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let scores = RegressionScores::calculate(&actual, &actual).unwrap();

        assert_eq!(scores.mae, 0.0);
        assert_eq!(scores.mse, 0.0);
        assert_eq!(scores.rmse, 0.0);
        assert_eq!(scores.r2, 1.0);
    }

    #[test]
    fn test_known_errors() {
        let actual = vec![100.0, 200.0, 300.0, 400.0];
        let predicted = vec![110.0, 190.0, 330.0, 400.0];

        let scores = RegressionScores::calculate(&actual, &predicted).unwrap();

        assert_eq!(scores.mae, 12.5); // (10 + 10 + 30 + 0) / 4
        assert_eq!(scores.mse, 275.0); // (100 + 100 + 900 + 0) / 4
        assert!((scores.rmse - 275.0f64.sqrt()).abs() < 1e-12);
        assert!(scores.r2 > 0.97);
    }

    #[test]
    fn test_dimension_mismatch() {
        let result = RegressionScores::calculate(&[1.0, 2.0, 3.0], &[1.0, 2.0]);
        assert_eq!(
            result.unwrap_err(),
            MetricsError::DimensionMismatch { actual: 3, predicted: 2 }
        );
    }

    #[test]
    fn test_empty_data() {
        assert_eq!(
            RegressionScores::calculate(&[], &[]).unwrap_err(),
            MetricsError::EmptyData
        );
    }
}
