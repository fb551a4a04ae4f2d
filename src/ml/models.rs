//! Candidate roster
//!
//! [`CandidateKind`] names the six regressors the training stage compares;
//! [`Estimator`] is the closed set of fitted models that can be persisted
//! and reloaded.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};

use super::adaboost::{AdaBoostParams, AdaBoostRegressor};
use super::boosting::{
    BoostedTreesParams, BoostedTreesRegressor, GradientBoostingParams, GradientBoostingRegressor,
};
use super::smartcore::{DecisionTreeParams, ForestParams, SmartcoreDecisionTree, SmartcoreRandomForest};
use super::tree::{RegressionTree, SplitStrategy, TreeParams};
use super::{ModelError, Regressor};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    #[strum(serialize = "Random Forest")]
    RandomForest,
    #[strum(serialize = "XGBoost")]
    #[serde(rename = "xgboost")]
    XGBoost,
    #[strum(serialize = "Decision Tree")]
    DecisionTree,
    #[strum(serialize = "Gradient Boosting")]
    GradientBoosting,
    #[strum(serialize = "Ada Boost")]
    AdaBoost,
    #[strum(serialize = "Extra Tree")]
    ExtraTree,
}

impl CandidateKind {
    /// All six candidates in evaluation order
    pub fn default_roster() -> Vec<Self> {
        Self::iter().collect()
    }

    /// Unfitted estimator with default hyperparameters and the given seed
    pub fn build(self, seed: u64) -> Estimator {
        match self {
            Self::RandomForest => Estimator::RandomForest(SmartcoreRandomForest::new(ForestParams {
                seed,
                ..ForestParams::default()
            })),
            Self::XGBoost => Estimator::BoostedTrees(BoostedTreesRegressor::new(BoostedTreesParams {
                seed,
                ..BoostedTreesParams::default()
            })),
            Self::DecisionTree => {
                Estimator::DecisionTree(SmartcoreDecisionTree::new(DecisionTreeParams::default()))
            }
            Self::GradientBoosting => {
                Estimator::GradientBoosting(GradientBoostingRegressor::new(GradientBoostingParams {
                    seed,
                    ..GradientBoostingParams::default()
                }))
            }
            Self::AdaBoost => Estimator::AdaBoost(AdaBoostRegressor::new(AdaBoostParams {
                seed,
                ..AdaBoostParams::default()
            })),
            Self::ExtraTree => Estimator::ExtraTree(RegressionTree::new(TreeParams {
                split: SplitStrategy::Random,
                seed,
                ..TreeParams::default()
            })),
        }
    }
}

/// Every concrete model the pipeline can persist
#[derive(Debug, Serialize, Deserialize)]
pub enum Estimator {
    RandomForest(SmartcoreRandomForest),
    BoostedTrees(BoostedTreesRegressor),
    DecisionTree(SmartcoreDecisionTree),
    GradientBoosting(GradientBoostingRegressor),
    AdaBoost(AdaBoostRegressor),
    ExtraTree(RegressionTree),
}

impl Estimator {
    pub fn boosted_trees(params: BoostedTreesParams) -> Self {
        Self::BoostedTrees(BoostedTreesRegressor::new(params))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        bincode::deserialize(bytes).map_err(|e| ModelError::Serialization(e.to_string()))
    }
}

impl Regressor for Estimator {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<(), ModelError> {
        match self {
            Self::RandomForest(m) => m.fit(x, y),
            Self::BoostedTrees(m) => m.fit(x, y),
            Self::DecisionTree(m) => m.fit(x, y),
            Self::GradientBoosting(m) => m.fit(x, y),
            Self::AdaBoost(m) => m.fit(x, y),
            Self::ExtraTree(m) => m.fit(x, y),
        }
    }

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        match self {
            Self::RandomForest(m) => m.predict(x),
            Self::BoostedTrees(m) => m.predict(x),
            Self::DecisionTree(m) => m.predict(x),
            Self::GradientBoosting(m) => m.predict(x),
            Self::AdaBoost(m) => m.predict(x),
            Self::ExtraTree(m) => m.predict(x),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::RandomForest(m) => format!("RandomForestRegressor({:?})", m.params()),
            Self::BoostedTrees(m) => format!("BoostedTreesRegressor({:?})", m.params()),
            Self::DecisionTree(m) => format!("DecisionTreeRegressor({:?})", m.params()),
            Self::GradientBoosting(m) => format!("GradientBoostingRegressor({:?})", m.params()),
            Self::AdaBoost(m) => format!("AdaBoostRegressor({:?})", m.params()),
            Self::ExtraTree(m) => format!("ExtraTreeRegressor({:?})", m.params()),
        }
    }

    fn to_bytes(&self) -> Result<Vec<u8>, ModelError> {
        bincode::serialize(self).map_err(|e| ModelError::Serialization(e.to_string()))
    }
}

/// A named entry in the roster
pub struct Candidate {
    pub name: String,
    pub model: Box<dyn Regressor>,
}

impl Candidate {
    pub fn new(name: impl Into<String>, model: Box<dyn Regressor>) -> Self {
        Self {
            name: name.into(),
            model,
        }
    }
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Candidate")
            .field("name", &self.name)
            .field("model", &self.model.describe())
            .finish()
    }
}

/// Build unfitted candidates in roster order
pub fn build_roster(kinds: &[CandidateKind], seed: u64) -> Vec<Candidate> {
    kinds
        .iter()
        .map(|kind| Candidate::new(kind.to_string(), Box::new(kind.build(seed))))
        .collect()
}
