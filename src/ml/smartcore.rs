//! SmartCore model wrappers
//!
//! The random forest and decision tree candidates delegate to SmartCore.
//! Both wrappers keep their own serializable parameters so the results table
//! can describe them and the fitted model can travel inside a bincode blob.

use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};

use super::{validate_rows, validate_training_input, ModelError};

type ForestModel = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;
type TreeModel = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Row-major rows into a SmartCore matrix
pub fn to_dense(x: &[Vec<f64>]) -> DenseMatrix<f64> {
    let n_samples = x.len();
    let n_features = x.first().map_or(0, Vec::len);
    let flat: Vec<f64> = x.iter().flat_map(|row| row.iter().copied()).collect();
    DenseMatrix::new(n_samples, n_features, flat, false)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<u16>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

impl ForestParams {
    fn to_smartcore(&self) -> RandomForestRegressorParameters {
        RandomForestRegressorParameters {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            min_samples_split: self.min_samples_split,
            n_trees: self.n_trees,
            m: None,
            keep_samples: false,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SmartcoreRandomForest {
    params: ForestParams,
    model: Option<ForestModel>,
    n_features: usize,
}

impl SmartcoreRandomForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            model: None,
            n_features: 0,
        }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<(), ModelError> {
        let n_features = validate_training_input(x, y)?;
        let model = ForestModel::fit(&to_dense(x), &y.to_vec(), self.params.to_smartcore())
            .map_err(|e| ModelError::Backend(format!("RandomForest training failed: {e:?}")))?;
        self.model = Some(model);
        self.n_features = n_features;
        Ok(())
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        let model = self.model.as_ref().ok_or(ModelError::NotFitted)?;
        validate_rows(x, self.n_features)?;
        if x.is_empty() {
            return Ok(Vec::new());
        }
        model
            .predict(&to_dense(x))
            .map_err(|e| ModelError::Backend(format!("RandomForest prediction failed: {e:?}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTreeParams {
    pub max_depth: Option<u16>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for DecisionTreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SmartcoreDecisionTree {
    params: DecisionTreeParams,
    model: Option<TreeModel>,
    n_features: usize,
}

impl SmartcoreDecisionTree {
    pub fn new(params: DecisionTreeParams) -> Self {
        Self {
            params,
            model: None,
            n_features: 0,
        }
    }

    pub fn params(&self) -> &DecisionTreeParams {
        &self.params
    }

    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<(), ModelError> {
        let n_features = validate_training_input(x, y)?;
        let params = DecisionTreeRegressorParameters {
            max_depth: self.params.max_depth,
            min_samples_leaf: self.params.min_samples_leaf,
            min_samples_split: self.params.min_samples_split,
            ..Default::default()
        };
        let model = TreeModel::fit(&to_dense(x), &y.to_vec(), params)
            .map_err(|e| ModelError::Backend(format!("DecisionTree training failed: {e:?}")))?;
        self.model = Some(model);
        self.n_features = n_features;
        Ok(())
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        let model = self.model.as_ref().ok_or(ModelError::NotFitted)?;
        validate_rows(x, self.n_features)?;
        if x.is_empty() {
            return Ok(Vec::new());
        }
        model
            .predict(&to_dense(x))
            .map_err(|e| ModelError::Backend(format!("DecisionTree prediction failed: {e:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // y = 2*x1 + 3*x2
    fn linear_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = vec![
            vec![1.0, 1.0],
            vec![2.0, 1.0],
            vec![1.0, 2.0],
            vec![2.0, 2.0],
            vec![3.0, 3.0],
            vec![4.0, 2.0],
            vec![2.0, 4.0],
            vec![3.0, 1.0],
            vec![1.0, 3.0],
            vec![4.0, 4.0],
        ];
        let y = x.iter().map(|r| 2.0 * r[0] + 3.0 * r[1]).collect();
        (x, y)
    }

    #[test]
    fn test_train_random_forest() {
        let (x, y) = linear_data();
        let mut model = SmartcoreRandomForest::new(ForestParams {
            n_trees: 10,
            max_depth: Some(5),
            ..ForestParams::default()
        });
        model.fit(&x, &y).unwrap();

        let predictions = model.predict(&[vec![2.5, 2.5]]).unwrap();
        assert_eq!(predictions.len(), 1);
        assert!(predictions[0] > 5.0 && predictions[0] < 20.0);
    }

    #[test]
    fn test_decision_tree_memorizes_training_rows() {
        let (x, y) = linear_data();
        let mut model = SmartcoreDecisionTree::new(DecisionTreeParams::default());
        model.fit(&x, &y).unwrap();

        let predictions = model.predict(&x).unwrap();
        for (p, t) in predictions.iter().zip(&y) {
            assert!((p - t).abs() < 1e-9);
        }
    }

    #[test]
    fn test_forest_survives_bincode() {
        let (x, y) = linear_data();
        let mut model = SmartcoreRandomForest::new(ForestParams {
            n_trees: 5,
            ..ForestParams::default()
        });
        model.fit(&x, &y).unwrap();

        let bytes = bincode::serialize(&model).unwrap();
        let restored: SmartcoreRandomForest = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored.predict(&x).unwrap(), model.predict(&x).unwrap());
    }

    #[test]
    fn test_predict_before_fit() {
        let model = SmartcoreDecisionTree::new(DecisionTreeParams::default());
        assert!(matches!(model.predict(&[vec![1.0, 2.0]]), Err(ModelError::NotFitted)));
    }
}
