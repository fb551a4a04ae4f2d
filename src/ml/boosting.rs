//! Boosted tree ensembles
//!
//! - [`GradientBoostingRegressor`]: least-squares boosting of shallow CART trees
//! - [`BoostedTreesRegressor`]: second-order boosting with regularized leaf
//!   weights `w* = -G / (H + λ)` and a `gamma` minimum split gain
//!
//! Both start from the training mean and add shrunken tree outputs.

use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::tree::{RegressionTree, TreeParams};
use super::{validate_rows, validate_training_input, ModelError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for GradientBoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    params: GradientBoostingParams,
    init: f64,
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl GradientBoostingRegressor {
    pub fn new(params: GradientBoostingParams) -> Self {
        Self {
            params,
            init: 0.0,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    pub fn params(&self) -> &GradientBoostingParams {
        &self.params
    }

    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<(), ModelError> {
        if self.params.learning_rate <= 0.0 {
            return Err(ModelError::InvalidInput("learning_rate must be positive".into()));
        }
        self.n_features = validate_training_input(x, y)?;

        self.init = y.iter().sum::<f64>() / y.len() as f64;
        self.trees.clear();
        let mut predictions = vec![self.init; y.len()];

        for round in 0..self.params.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&predictions).map(|(t, p)| t - p).collect();
            let mut tree = RegressionTree::new(TreeParams {
                max_depth: Some(self.params.max_depth),
                min_samples_leaf: self.params.min_samples_leaf,
                seed: self.params.seed.wrapping_add(round as u64),
                ..TreeParams::default()
            });
            tree.fit(x, &residuals)?;

            for (prediction, row) in predictions.iter_mut().zip(x) {
                *prediction += self.params.learning_rate * tree.predict_row(row);
            }
            self.trees.push(tree);
        }
        Ok(())
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        if self.n_features == 0 {
            return Err(ModelError::NotFitted);
        }
        validate_rows(x, self.n_features)?;
        Ok(x.iter()
            .map(|row| {
                self.init
                    + self
                        .trees
                        .iter()
                        .map(|t| self.params.learning_rate * t.predict_row(row))
                        .sum::<f64>()
            })
            .collect())
    }
}

/// Hyperparameters of the second-order boosted trees; these are the
/// dimensions the tuner searches over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedTreesParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    /// Minimum hessian sum (row count under squared loss) per child
    pub min_child_weight: f64,
    /// L2 regularization on leaf weights
    pub reg_lambda: f64,
    /// Minimum gain required to split
    pub gamma: f64,
    /// Fraction of features sampled for each tree
    pub colsample_bytree: f64,
    pub seed: u64,
}

impl Default for BoostedTreesParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            gamma: 0.0,
            colsample_bytree: 1.0,
            seed: 42,
        }
    }
}

impl BoostedTreesParams {
    fn check(&self) -> Result<(), ModelError> {
        if self.learning_rate <= 0.0 || !self.learning_rate.is_finite() {
            return Err(ModelError::InvalidInput("learning_rate must be positive".into()));
        }
        if !(self.colsample_bytree > 0.0 && self.colsample_bytree <= 1.0) {
            return Err(ModelError::InvalidInput(
                "colsample_bytree must be in (0, 1]".into(),
            ));
        }
        if self.reg_lambda < 0.0 || self.gamma < 0.0 || self.min_child_weight < 0.0 {
            return Err(ModelError::InvalidInput(
                "reg_lambda, gamma and min_child_weight must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum BoostNode {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<BoostNode>,
        right: Box<BoostNode>,
    },
}

impl BoostNode {
    fn predict(&self, sample: &[f64]) -> f64 {
        match self {
            BoostNode::Leaf { weight } => *weight,
            BoostNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if sample[*feature] <= *threshold {
                    left.predict(sample)
                } else {
                    right.predict(sample)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedTreesRegressor {
    params: BoostedTreesParams,
    base_score: f64,
    trees: Vec<BoostNode>,
    n_features: usize,
}

impl BoostedTreesRegressor {
    pub fn new(params: BoostedTreesParams) -> Self {
        Self {
            params,
            base_score: 0.0,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    pub fn params(&self) -> &BoostedTreesParams {
        &self.params
    }

    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<(), ModelError> {
        self.params.check()?;
        self.n_features = validate_training_input(x, y)?;

        let n = y.len();
        self.base_score = y.iter().sum::<f64>() / n as f64;
        self.trees.clear();

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let n_cols = ((self.n_features as f64 * self.params.colsample_bytree).round() as usize)
            .clamp(1, self.n_features);
        let mut all_features: Vec<usize> = (0..self.n_features).collect();
        let mut predictions = vec![self.base_score; n];

        for _ in 0..self.params.n_estimators {
            // squared loss: g = prediction - target, h = 1
            let gradients: Vec<f64> = predictions.iter().zip(y).map(|(p, t)| p - t).collect();

            let mut features = if n_cols < self.n_features {
                all_features.shuffle(&mut rng);
                all_features[..n_cols].to_vec()
            } else {
                all_features.clone()
            };
            features.sort_unstable();

            let tree = self.grow(x, &gradients, (0..n).collect(), &features, 0);
            for (prediction, row) in predictions.iter_mut().zip(x) {
                *prediction += self.params.learning_rate * tree.predict(row);
            }
            self.trees.push(tree);
        }
        Ok(())
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        if self.n_features == 0 {
            return Err(ModelError::NotFitted);
        }
        validate_rows(x, self.n_features)?;
        Ok(x.iter()
            .map(|row| {
                self.base_score
                    + self
                        .trees
                        .iter()
                        .map(|t| self.params.learning_rate * t.predict(row))
                        .sum::<f64>()
            })
            .collect())
    }

    fn leaf_weight(&self, g_sum: f64, h_sum: f64) -> f64 {
        -g_sum / (h_sum + self.params.reg_lambda)
    }

    fn grow(
        &self,
        x: &[Vec<f64>],
        gradients: &[f64],
        indices: Vec<usize>,
        features: &[usize],
        depth: usize,
    ) -> BoostNode {
        let g_sum: f64 = indices.iter().map(|&i| gradients[i]).sum();
        let h_sum = indices.len() as f64;
        let weight = self.leaf_weight(g_sum, h_sum);

        if depth >= self.params.max_depth || indices.len() < 2 {
            return BoostNode::Leaf { weight };
        }

        let Some((feature, threshold)) = self.best_split(x, gradients, &indices, features, g_sum)
        else {
            return BoostNode::Leaf { weight };
        };

        let (left, right): (Vec<usize>, Vec<usize>) =
            indices.into_iter().partition(|&i| x[i][feature] <= threshold);
        if left.is_empty() || right.is_empty() {
            return BoostNode::Leaf { weight };
        }

        BoostNode::Split {
            feature,
            threshold,
            left: Box::new(self.grow(x, gradients, left, features, depth + 1)),
            right: Box::new(self.grow(x, gradients, right, features, depth + 1)),
        }
    }

    fn best_split(
        &self,
        x: &[Vec<f64>],
        gradients: &[f64],
        indices: &[usize],
        features: &[usize],
        g_total: f64,
    ) -> Option<(usize, f64)> {
        let lambda = self.params.reg_lambda;
        let h_total = indices.len() as f64;
        let parent = g_total * g_total / (h_total + lambda);
        let mut best: Option<(usize, f64, f64)> = None;
        let mut order = indices.to_vec();

        for &feature in features {
            order.sort_by_key(|&i| OrderedFloat(x[i][feature]));
            let mut g_left = 0.0;
            for pos in 0..order.len() - 1 {
                g_left += gradients[order[pos]];
                let current = x[order[pos]][feature];
                let next = x[order[pos + 1]][feature];
                if current == next {
                    continue;
                }

                let h_left = (pos + 1) as f64;
                let h_right = h_total - h_left;
                if h_left < self.params.min_child_weight || h_right < self.params.min_child_weight {
                    continue;
                }

                let g_right = g_total - g_left;
                let gain = 0.5
                    * (g_left * g_left / (h_left + lambda) + g_right * g_right / (h_right + lambda)
                        - parent);
                if gain > self.params.gamma && best.map_or(true, |b| gain > b.2) {
                    let mid = current + (next - current) / 2.0;
                    let threshold = if mid < next { mid } else { current };
                    best = Some((feature, threshold, gain));
                }
            }
        }

        best.map(|(feature, threshold, _)| (feature, threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::RegressionScores;

    fn regression_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..80)
            .map(|i| vec![(i % 24) as f64, (i / 24) as f64, ((i * 7) % 5) as f64])
            .collect();
        let y: Vec<f64> = x
            .iter()
            .map(|r| 100.0 + 10.0 * (r[0] / 4.0).sin() + 3.0 * r[1])
            .collect();
        (x, y)
    }

    fn mean_baseline_rmse(y: &[f64]) -> f64 {
        let mean = y.iter().sum::<f64>() / y.len() as f64;
        RegressionScores::calculate(y, &vec![mean; y.len()]).unwrap().rmse
    }

    #[test]
    fn test_gradient_boosting_beats_mean() {
        let (x, y) = regression_data();
        let mut model = GradientBoostingRegressor::new(GradientBoostingParams::default());
        model.fit(&x, &y).unwrap();

        let rmse = RegressionScores::calculate(&y, &model.predict(&x).unwrap()).unwrap().rmse;
        assert!(rmse < mean_baseline_rmse(&y) * 0.2, "rmse {rmse}");
    }

    #[test]
    fn test_zero_rounds_predicts_mean() {
        let (x, y) = regression_data();
        let mut model = GradientBoostingRegressor::new(GradientBoostingParams {
            n_estimators: 0,
            ..GradientBoostingParams::default()
        });
        model.fit(&x, &y).unwrap();
        let mean = y.iter().sum::<f64>() / y.len() as f64;
        assert!((model.predict(&x[..1]).unwrap()[0] - mean).abs() < 1e-9);
    }

    #[test]
    fn test_boosted_trees_beats_mean() {
        let (x, y) = regression_data();
        let mut model = BoostedTreesRegressor::new(BoostedTreesParams::default());
        model.fit(&x, &y).unwrap();

        let rmse = RegressionScores::calculate(&y, &model.predict(&x).unwrap()).unwrap().rmse;
        assert!(rmse < mean_baseline_rmse(&y) * 0.2, "rmse {rmse}");
    }

    #[test]
    fn test_large_gamma_prevents_splits() {
        let (x, y) = regression_data();
        let mut model = BoostedTreesRegressor::new(BoostedTreesParams {
            gamma: 1e12,
            ..BoostedTreesParams::default()
        });
        model.fit(&x, &y).unwrap();

        // only leaves: every row gets the same prediction
        let predictions = model.predict(&x).unwrap();
        assert!(predictions.iter().all(|p| (p - predictions[0]).abs() < 1e-9));
    }

    #[test]
    fn test_column_sampling_is_seeded() {
        let (x, y) = regression_data();
        let params = BoostedTreesParams {
            n_estimators: 20,
            colsample_bytree: 0.4,
            ..BoostedTreesParams::default()
        };
        let mut a = BoostedTreesRegressor::new(params.clone());
        let mut b = BoostedTreesRegressor::new(params);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_rejects_invalid_params() {
        let (x, y) = regression_data();
        let mut model = BoostedTreesRegressor::new(BoostedTreesParams {
            colsample_bytree: 0.0,
            ..BoostedTreesParams::default()
        });
        assert!(matches!(model.fit(&x, &y), Err(ModelError::InvalidInput(_))));
    }

    #[test]
    fn test_predict_before_fit() {
        let model = BoostedTreesRegressor::new(BoostedTreesParams::default());
        assert!(matches!(model.predict(&[vec![1.0]]), Err(ModelError::NotFitted)));
        let model = GradientBoostingRegressor::new(GradientBoostingParams::default());
        assert!(matches!(model.predict(&[vec![1.0]]), Err(ModelError::NotFitted)));
    }
}
