//! AdaBoost.R2 regression
//!
//! Each round draws a weighted bootstrap sample, fits a shallow tree on it
//! and reweights the training rows by their linear loss. Predictions are the
//! weighted median of the estimator outputs.

use ordered_float::OrderedFloat;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::tree::{RegressionTree, TreeParams};
use super::{validate_rows, validate_training_input, ModelError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaBoostParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub seed: u64,
}

impl Default for AdaBoostParams {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            learning_rate: 1.0,
            max_depth: 3,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaBoostRegressor {
    params: AdaBoostParams,
    estimators: Vec<RegressionTree>,
    weights: Vec<f64>,
    n_features: usize,
}

impl AdaBoostRegressor {
    pub fn new(params: AdaBoostParams) -> Self {
        Self {
            params,
            estimators: Vec::new(),
            weights: Vec::new(),
            n_features: 0,
        }
    }

    pub fn params(&self) -> &AdaBoostParams {
        &self.params
    }

    /// Number of estimators kept after early stopping
    pub fn len(&self) -> usize {
        self.estimators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.estimators.is_empty()
    }

    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<(), ModelError> {
        if self.params.learning_rate <= 0.0 || self.params.n_estimators == 0 {
            return Err(ModelError::InvalidInput(
                "n_estimators and learning_rate must be positive".into(),
            ));
        }
        let n_features = validate_training_input(x, y)?;

        let n = y.len();
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut sample_weights = vec![1.0 / n as f64; n];
        self.estimators.clear();
        self.weights.clear();

        for round in 0..self.params.n_estimators {
            let sampler = WeightedIndex::new(&sample_weights)
                .map_err(|e| ModelError::Backend(format!("sample weights: {e}")))?;
            let bootstrap: Vec<usize> = (0..n).map(|_| sampler.sample(&mut rng)).collect();

            let mut tree = RegressionTree::new(TreeParams {
                max_depth: Some(self.params.max_depth),
                seed: self.params.seed.wrapping_add(round as u64),
                ..TreeParams::default()
            });
            tree.fit_indices(x, y, bootstrap)?;

            let errors: Vec<f64> = x
                .iter()
                .zip(y)
                .map(|(row, target)| (tree.predict_row(row) - target).abs())
                .collect();
            let max_error = errors.iter().copied().fold(0.0, f64::max);

            if max_error <= 0.0 {
                // perfect fit ends boosting
                self.estimators.push(tree);
                self.weights.push(1.0);
                break;
            }

            // linear loss
            let estimator_error: f64 = errors
                .iter()
                .zip(&sample_weights)
                .map(|(e, w)| w * e / max_error)
                .sum();

            if estimator_error >= 0.5 {
                // keep a too-weak first estimator so the ensemble is usable
                if self.estimators.is_empty() {
                    self.estimators.push(tree);
                    self.weights.push(1.0);
                }
                break;
            }

            let beta = estimator_error / (1.0 - estimator_error);
            let estimator_weight = self.params.learning_rate * (1.0 / beta.max(f64::MIN_POSITIVE)).ln();

            for (weight, error) in sample_weights.iter_mut().zip(&errors) {
                *weight *= beta.powf((1.0 - error / max_error) * self.params.learning_rate);
            }
            // rows at the maximum error keep weight beta^0, so the sum stays positive
            let total: f64 = sample_weights.iter().sum();
            sample_weights.iter_mut().for_each(|w| *w /= total);

            self.estimators.push(tree);
            self.weights.push(estimator_weight);
        }

        self.n_features = n_features;
        Ok(())
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        if self.estimators.is_empty() {
            return Err(ModelError::NotFitted);
        }
        validate_rows(x, self.n_features)?;
        Ok(x.iter().map(|row| self.weighted_median(row)).collect())
    }

    fn weighted_median(&self, row: &[f64]) -> f64 {
        let mut outputs: Vec<(f64, f64)> = self
            .estimators
            .iter()
            .zip(&self.weights)
            .map(|(tree, weight)| (tree.predict_row(row), *weight))
            .collect();
        outputs.sort_by_key(|(prediction, _)| OrderedFloat(*prediction));

        let half = outputs.iter().map(|(_, w)| w).sum::<f64>() / 2.0;
        let mut cumulative = 0.0;
        for (prediction, weight) in &outputs {
            cumulative += weight;
            if cumulative >= half {
                return *prediction;
            }
        }
        outputs.last().map_or(0.0, |(prediction, _)| *prediction)
    }
}
