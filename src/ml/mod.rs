//! Machine Learning Module
//!
//! Regression candidates for hourly load forecasting and the machinery to
//! compare them:
//! - [`Regressor`] is the fit/predict capability every candidate satisfies
//! - [`models`] builds the candidate roster and the serializable [`models::Estimator`]
//! - [`training`] evaluates candidates on held-out data and picks the winner
//! - [`metrics`] scores predictions (RMSE, MSE, MAE, R²)
//!
//! Tree learners live in [`tree`], [`boosting`] and [`adaboost`]; the
//! random forest and decision tree candidates wrap SmartCore.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod adaboost;
pub mod boosting;
pub mod metrics;
pub mod models;
pub mod smartcore;
pub mod training;
pub mod tree;

pub use metrics::{MetricsError, RegressionScores};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model has not been fitted")]
    NotFitted,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Backend(String),

    #[error("model serialization failed: {0}")]
    Serialization(String),

    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

/// Fit/predict contract shared by every candidate
#[cfg_attr(test, mockall::automock)]
pub trait Regressor {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<(), ModelError>;

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, ModelError>;

    /// Human-readable configuration, recorded in the results table
    fn describe(&self) -> String;

    /// Opaque blob that reloads into an equivalent fitted model
    fn to_bytes(&self) -> Result<Vec<u8>, ModelError>;
}

/// Metadata stored next to a persisted model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_id: String,
    pub name: String,
    pub spec: String,
    pub trained_at: DateTime<Utc>,
    pub training_samples: usize,
    pub feature_names: Vec<String>,
    pub scores: RegressionScores,
}

/// Check a training set is non-empty, rectangular, finite and aligned.
/// Returns the feature count.
pub fn validate_training_input(x: &[Vec<f64>], y: &[f64]) -> Result<usize, ModelError> {
    if x.is_empty() || y.is_empty() {
        return Err(ModelError::InvalidInput("cannot train on empty dataset".into()));
    }
    if x.len() != y.len() {
        return Err(ModelError::InvalidInput(format!(
            "feature and target count mismatch: {} features, {} targets",
            x.len(),
            y.len()
        )));
    }
    let n_features = x[0].len();
    if n_features == 0 {
        return Err(ModelError::InvalidInput("feature rows are empty".into()));
    }
    validate_rows(x, n_features)?;
    if y.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::InvalidInput("targets must be finite".into()));
    }
    Ok(n_features)
}

/// Check every row has `n_features` finite values
pub fn validate_rows(x: &[Vec<f64>], n_features: usize) -> Result<(), ModelError> {
    for (i, row) in x.iter().enumerate() {
        if row.len() != n_features {
            return Err(ModelError::InvalidInput(format!(
                "row {i} has {} features, expected {n_features}",
                row.len()
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::InvalidInput(format!("row {i} has non-finite values")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_training_input() {
        let x = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        assert_eq!(validate_training_input(&x, &[1.0, 2.0]).unwrap(), 2);

        assert!(validate_training_input(&[], &[]).is_err());
        assert!(validate_training_input(&x, &[1.0]).is_err());
        assert!(validate_training_input(&x, &[1.0, f64::NAN]).is_err());

        let ragged = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(validate_training_input(&ragged, &[1.0, 2.0]).is_err());
    }
}
