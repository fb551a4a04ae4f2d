//! Discrete search space for the boosted-trees tuner

use std::collections::BTreeMap;
use std::fmt;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ml::boosting::BoostedTreesParams;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
}

impl ParameterValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Int(v) => *v as f64,
            Self::Float(v) => *v,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// One sampled configuration, keyed by parameter name
pub type TrialParams = BTreeMap<String, ParameterValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Parameter {
    /// `low..=high` in steps of `step`
    IntRange { low: i64, high: i64, step: i64 },
    /// `low + i * step` for every value not above `high`
    FloatRange { low: f64, high: f64, step: f64 },
    Choice(Vec<f64>),
}

impl Parameter {
    /// Every value this parameter can take, ascending
    pub fn values(&self) -> Vec<ParameterValue> {
        match self {
            Self::IntRange { low, high, step } => (*low..=*high)
                .step_by((*step).max(1) as usize)
                .map(ParameterValue::Int)
                .collect(),
            Self::FloatRange { low, high, step } => {
                let count = ((high - low) / step + 1e-9).floor() as usize + 1;
                (0..count)
                    .map(|i| ParameterValue::Float(round(low + i as f64 * step)))
                    .collect()
            }
            Self::Choice(options) => options.iter().copied().map(ParameterValue::Float).collect(),
        }
    }

    fn sample(&self, rng: &mut StdRng) -> Option<ParameterValue> {
        match self {
            Self::IntRange { low, high, step } => {
                let step = (*step).max(1);
                let slots = (high - low) / step;
                Some(ParameterValue::Int(low + rng.gen_range(0..=slots) * step))
            }
            Self::FloatRange { .. } | Self::Choice(_) => self.values().choose(rng).copied(),
        }
    }
}

// 0.01 + 3 * 0.05 should print as 0.16
fn round(value: f64) -> f64 {
    (value * 1e9).round() / 1e9
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSpace {
    parameters: Vec<(String, Parameter)>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn add(mut self, name: impl Into<String>, parameter: Parameter) -> Self {
        self.parameters.push((name.into(), parameter));
        self
    }

    pub fn parameters(&self) -> &[(String, Parameter)] {
        &self.parameters
    }

    /// Search space over the boosted-trees hyperparameters
    pub fn boosted_trees() -> Self {
        Self::new()
            .add(
                "n_estimators",
                Parameter::IntRange {
                    low: 100,
                    high: 1000,
                    step: 100,
                },
            )
            .add(
                "learning_rate",
                Parameter::FloatRange {
                    low: 0.01,
                    high: 0.3,
                    step: 0.05,
                },
            )
            .add("max_depth", Parameter::IntRange { low: 3, high: 20, step: 1 })
            .add(
                "min_child_weight",
                Parameter::IntRange { low: 1, high: 10, step: 1 },
            )
            .add("colsample_bytree", Parameter::Choice(vec![0.3, 0.4, 0.5, 0.7]))
            .add("gamma", Parameter::Choice(vec![0.0, 0.1, 0.2, 0.3, 0.4]))
    }

    /// Draw one value per parameter
    pub fn sample(&self, rng: &mut StdRng) -> TrialParams {
        self.parameters
            .iter()
            .filter_map(|(name, parameter)| parameter.sample(rng).map(|v| (name.clone(), v)))
            .collect()
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new()
    }
}

/// Boosted-trees parameters from a sampled trial; unsampled fields keep
/// their defaults
pub fn boosted_trees_params(params: &TrialParams, seed: u64) -> Result<BoostedTreesParams, String> {
    let defaults = BoostedTreesParams::default();
    let get = |name: &str| params.get(name).map(ParameterValue::as_f64);
    let count = |name: &str, fallback: usize| -> Result<usize, String> {
        match get(name) {
            None => Ok(fallback),
            Some(v) if v >= 0.0 && v.fract() == 0.0 => Ok(v as usize),
            Some(v) => Err(format!("{name} must be a non-negative integer, got {v}")),
        }
    };

    Ok(BoostedTreesParams {
        n_estimators: count("n_estimators", defaults.n_estimators)?,
        learning_rate: get("learning_rate").unwrap_or(defaults.learning_rate),
        max_depth: count("max_depth", defaults.max_depth)?,
        min_child_weight: get("min_child_weight").unwrap_or(defaults.min_child_weight),
        reg_lambda: get("reg_lambda").unwrap_or(defaults.reg_lambda),
        gamma: get("gamma").unwrap_or(defaults.gamma),
        colsample_bytree: get("colsample_bytree").unwrap_or(defaults.colsample_bytree),
        seed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_learning_rate_grid() {
        let values: Vec<f64> = Parameter::FloatRange {
            low: 0.01,
            high: 0.3,
            step: 0.05,
        }
        .values()
        .iter()
        .map(ParameterValue::as_f64)
        .collect();
        assert_eq!(values, vec![0.01, 0.06, 0.11, 0.16, 0.21, 0.26]);
    }

    #[test]
    fn test_samples_stay_in_space() {
        let space = SearchSpace::boosted_trees();
        let mut rng = StdRng::seed_from_u64(123);
        for _ in 0..200 {
            let params = space.sample(&mut rng);
            assert_eq!(params.len(), 6);

            let n = params["n_estimators"].as_f64();
            assert!((100.0..=1000.0).contains(&n) && n % 100.0 == 0.0);
            let depth = params["max_depth"].as_f64();
            assert!((3.0..=20.0).contains(&depth));
            let mcw = params["min_child_weight"].as_f64();
            assert!((1.0..=10.0).contains(&mcw));
            assert!([0.3, 0.4, 0.5, 0.7].contains(&params["colsample_bytree"].as_f64()));
            assert!([0.0, 0.1, 0.2, 0.3, 0.4].contains(&params["gamma"].as_f64()));
        }
    }

    #[test]
    fn test_sampling_is_seeded() {
        let space = SearchSpace::boosted_trees();
        let a = space.sample(&mut StdRng::seed_from_u64(5));
        let b = space.sample(&mut StdRng::seed_from_u64(5));
        assert_eq!(a, b);
    }

    #[test]
    fn test_boosted_trees_params() {
        let mut params = TrialParams::new();
        params.insert("n_estimators".into(), ParameterValue::Int(300));
        params.insert("max_depth".into(), ParameterValue::Int(4));
        params.insert("gamma".into(), ParameterValue::Float(0.2));

        let built = boosted_trees_params(&params, 42).unwrap();
        assert_eq!(built.n_estimators, 300);
        assert_eq!(built.max_depth, 4);
        assert_eq!(built.gamma, 0.2);
        assert_eq!(built.learning_rate, BoostedTreesParams::default().learning_rate);
        assert_eq!(built.seed, 42);

        params.insert("max_depth".into(), ParameterValue::Float(2.5));
        assert!(boosted_trees_params(&params, 42).is_err());
    }

    #[test]
    fn test_params_serialize_flat() {
        let mut params = TrialParams::new();
        params.insert("max_depth".into(), ParameterValue::Int(6));
        params.insert("gamma".into(), ParameterValue::Float(0.1));
        assert_eq!(
            serde_json::to_string(&params).unwrap(),
            r#"{"gamma":0.1,"max_depth":6}"#
        );
    }
}
