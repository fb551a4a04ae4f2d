use serde::{Deserialize, Serialize};

use crate::error::TransformError;

/// Replaces missing cells with the training mean of their column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanImputer {
    means: Vec<f64>,
}

impl MeanImputer {
    /// `columns` are column-major; `names` label errors
    pub fn fit(columns: &[Vec<Option<f64>>], names: &[String]) -> Result<Self, TransformError> {
        let means = columns
            .iter()
            .zip(names)
            .map(|(column, name)| {
                let observed: Vec<f64> = column.iter().flatten().copied().collect();
                if observed.is_empty() {
                    return Err(TransformError::EmptyColumn(name.clone()));
                }
                Ok(observed.iter().sum::<f64>() / observed.len() as f64)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { means })
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn transform(&self, columns: &[Vec<Option<f64>>]) -> Result<Vec<Vec<f64>>, TransformError> {
        if columns.len() != self.means.len() {
            return Err(TransformError::LengthMismatch {
                expected: self.means.len(),
                found: columns.len(),
            });
        }
        Ok(columns
            .iter()
            .zip(&self.means)
            .map(|(column, mean)| column.iter().map(|v| v.unwrap_or(*mean)).collect())
            .collect())
    }
}
