//! Feature preprocessing
//!
//! A [`Preprocessor`] holds configuration only. Fitting it on the training
//! partition yields a [`FittedPreprocessor`] (column selection, mean
//! imputation, standard scaling) whose learned state is read-only, so the
//! same parameters apply to every partition it transforms.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::artifacts;
use crate::error::{Result, Stage, TransformError};
use crate::features::{CALENDAR_COLUMNS, DEFAULT_FEATURE_COLUMNS};
use crate::table::Table;

pub mod imputer;
pub mod scaler;

pub use imputer::MeanImputer;
pub use scaler::StandardScaler;

/// Which feature columns reach the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FeatureSelection {
    /// A fixed list of columns, in the given order
    Columns { columns: Vec<String> },
    /// The `k` calendar columns most correlated (absolute Pearson) with the
    /// target on the training partition
    TopK { k: usize },
}

impl Default for FeatureSelection {
    fn default() -> Self {
        Self::Columns {
            columns: DEFAULT_FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    selection: FeatureSelection,
}

impl Preprocessor {
    pub fn new(selection: FeatureSelection) -> Self {
        Self { selection }
    }

    pub fn selection(&self) -> &FeatureSelection {
        &self.selection
    }

    /// Learn selection, imputation and scaling from the training partition
    pub fn fit(&self, features: &Table, target: &[f64]) -> Result<FittedPreprocessor, TransformError> {
        if features.is_empty() {
            return Err(TransformError::EmptyPartition);
        }
        if features.len() != target.len() {
            return Err(TransformError::LengthMismatch {
                expected: features.len(),
                found: target.len(),
            });
        }

        let columns = match &self.selection {
            FeatureSelection::Columns { columns } => columns.clone(),
            FeatureSelection::TopK { k } => rank_by_correlation(features, target, *k)?,
        };

        let raw = select_columns(features, &columns)?;
        let imputer = MeanImputer::fit(&raw, &columns)?;
        let scaler = StandardScaler::fit(&imputer.transform(&raw)?)?;
        debug!(columns = ?columns, "preprocessor fitted");

        Ok(FittedPreprocessor {
            columns,
            imputer,
            scaler,
        })
    }
}

/// Learned preprocessing state; `transform` never mutates it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    columns: Vec<String>,
    imputer: MeanImputer,
    scaler: StandardScaler,
}

impl FittedPreprocessor {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn imputer(&self) -> &MeanImputer {
        &self.imputer
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    /// Row-major matrix with one column per selected feature
    pub fn transform(&self, features: &Table) -> Result<Vec<Vec<f64>>, TransformError> {
        let raw = select_columns(features, &self.columns)?;
        let scaled = self.scaler.transform(&self.imputer.transform(&raw)?)?;
        Ok(transpose(&scaled, features.len()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        artifacts::save_binary(Stage::Transformation, self, path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        artifacts::load_binary(Stage::Transformation, path)
    }
}

fn select_columns(features: &Table, columns: &[String]) -> Result<Vec<Vec<Option<f64>>>, TransformError> {
    columns.iter().map(|c| features.numeric_column(c)).collect()
}

fn transpose(columns: &[Vec<f64>], n_rows: usize) -> Vec<Vec<f64>> {
    (0..n_rows)
        .map(|row| columns.iter().map(|column| column[row]).collect())
        .collect()
}

/// Calendar columns present in `features`, best `k` by |r| with the target,
/// returned in calendar order
fn rank_by_correlation(
    features: &Table,
    target: &[f64],
    k: usize,
) -> Result<Vec<String>, TransformError> {
    let candidates: Vec<&str> = CALENDAR_COLUMNS
        .iter()
        .copied()
        .filter(|c| features.has_column(c))
        .collect();
    if k == 0 || k > candidates.len() {
        return Err(TransformError::InvalidSelection {
            k,
            available: candidates.len(),
        });
    }

    let mut scored = Vec::with_capacity(candidates.len());
    for (position, name) in candidates.iter().enumerate() {
        let column = features.numeric_column(name)?;
        scored.push((position, pearson(&column, target).abs()));
    }
    // stable sort keeps calendar order among equal scores
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut chosen: Vec<usize> = scored.iter().take(k).map(|(p, _)| *p).collect();
    chosen.sort_unstable();
    Ok(chosen.into_iter().map(|p| candidates[p].to_string()).collect())
}

/// Correlation over rows where the feature is observed; 0.0 when undefined
fn pearson(feature: &[Option<f64>], target: &[f64]) -> f64 {
    let pairs: Vec<(f64, f64)> = feature
        .iter()
        .zip(target)
        .filter_map(|(x, y)| x.map(|x| (x, *y)))
        .collect();
    if pairs.len() < 2 {
        return 0.0;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }
    let denom = (var_x * var_y).sqrt();
    if denom < 1e-12 || !denom.is_finite() {
        0.0
    } else {
        cov / denom
    }
}
