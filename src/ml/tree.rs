//! CART regression tree
//!
//! Shared base learner for the boosted ensembles and the extremely
//! randomized tree candidate. Splits minimise the summed squared error of
//! the children; with [`SplitStrategy::Random`] each feature gets a single
//! uniformly drawn threshold and the best of those is kept.

use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{validate_rows, validate_training_input, ModelError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitStrategy {
    /// Exhaustive search over midpoints between distinct values
    Best,
    /// One random threshold per feature (extremely randomized trees)
    Random,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub split: SplitStrategy,
    pub seed: u64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            split: SplitStrategy::Best,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, sample: &[f64]) -> f64 {
        match self {
            Node::Leaf { value } => *value,
            Node::Split {
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

    fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 0,
            Node::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// Σ_left² / n_left + Σ_right² / n_right; larger means lower SSE
    score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    params: TreeParams,
    root: Option<Node>,
    n_features: usize,
}

impl RegressionTree {
    pub fn new(params: TreeParams) -> Self {
        Self {
            params,
            root: None,
            n_features: 0,
        }
    }

    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<(), ModelError> {
        validate_training_input(x, y)?;
        self.fit_indices(x, y, (0..x.len()).collect())
    }

    /// Fit on the rows at `indices`; repeats are allowed (bootstrap samples)
    pub fn fit_indices(
        &mut self,
        x: &[Vec<f64>],
        y: &[f64],
        indices: Vec<usize>,
    ) -> Result<(), ModelError> {
        if indices.is_empty() {
            return Err(ModelError::InvalidInput("cannot grow a tree on zero samples".into()));
        }
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        self.n_features = x[0].len();
        self.root = Some(self.grow(x, y, indices, 0, &mut rng));
        Ok(())
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        let root = self.root.as_ref().ok_or(ModelError::NotFitted)?;
        validate_rows(x, self.n_features)?;
        Ok(x.iter().map(|row| root.predict(row)).collect())
    }

    /// Prediction for a single, already validated row
    pub(crate) fn predict_row(&self, row: &[f64]) -> f64 {
        self.root.as_ref().map_or(0.0, |root| root.predict(row))
    }

    pub fn depth(&self) -> Option<usize> {
        self.root.as_ref().map(Node::depth)
    }

    fn grow(
        &self,
        x: &[Vec<f64>],
        y: &[f64],
        indices: Vec<usize>,
        depth: usize,
        rng: &mut StdRng,
    ) -> Node {
        let n = indices.len();
        let sum: f64 = indices.iter().map(|&i| y[i]).sum();
        let value = sum / n as f64;

        let min_leaf = self.params.min_samples_leaf.max(1);
        let at_max_depth = self.params.max_depth.is_some_and(|d| depth >= d);
        let constant = indices.iter().all(|&i| y[i] == y[indices[0]]);
        if at_max_depth
            || constant
            || n < self.params.min_samples_split.max(2)
            || n < 2 * min_leaf
        {
            return Node::Leaf { value };
        }

        let candidate = match self.params.split {
            SplitStrategy::Best => best_split(x, y, &indices, min_leaf),
            SplitStrategy::Random => random_split(x, y, &indices, min_leaf, rng),
        };

        // a split must reduce the squared error of the parent
        let parent_score = sum * sum / n as f64;
        let Some(split) = candidate.filter(|c| c.score > parent_score + 1e-9 * parent_score.abs().max(1.0)) else {
            return Node::Leaf { value };
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| x[i][split.feature] <= split.threshold);
        if left.is_empty() || right.is_empty() {
            return Node::Leaf { value };
        }

        Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(self.grow(x, y, left, depth + 1, rng)),
            right: Box::new(self.grow(x, y, right, depth + 1, rng)),
        }
    }
}

fn best_split(x: &[Vec<f64>], y: &[f64], indices: &[usize], min_leaf: usize) -> Option<SplitCandidate> {
    let n = indices.len();
    let total: f64 = indices.iter().map(|&i| y[i]).sum();
    let mut best: Option<SplitCandidate> = None;
    let mut order = indices.to_vec();

    for feature in 0..x[indices[0]].len() {
        order.sort_by_key(|&i| OrderedFloat(x[i][feature]));

        let mut left_sum = 0.0;
        for pos in 0..n - 1 {
            left_sum += y[order[pos]];
            let n_left = pos + 1;
            let n_right = n - n_left;
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }

            let current = x[order[pos]][feature];
            let next = x[order[pos + 1]][feature];
            if current == next {
                continue;
            }

            let right_sum = total - left_sum;
            let score = left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64;
            if best.map_or(true, |b| score > b.score) {
                let mid = current + (next - current) / 2.0;
                // midpoint can round up to `next` for adjacent floats
                let threshold = if mid < next { mid } else { current };
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    score,
                });
            }
        }
    }

    best
}

fn random_split(
    x: &[Vec<f64>],
    y: &[f64],
    indices: &[usize],
    min_leaf: usize,
    rng: &mut StdRng,
) -> Option<SplitCandidate> {
    let mut best: Option<SplitCandidate> = None;

    for feature in 0..x[indices[0]].len() {
        let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
            (lo.min(x[i][feature]), hi.max(x[i][feature]))
        });
        if lo >= hi {
            continue;
        }

        let threshold = rng.gen_range(lo..hi);
        let (mut left_sum, mut n_left, mut right_sum, mut n_right) = (0.0, 0usize, 0.0, 0usize);
        for &i in indices {
            if x[i][feature] <= threshold {
                left_sum += y[i];
                n_left += 1;
            } else {
                right_sum += y[i];
                n_right += 1;
            }
        }
        if n_left < min_leaf || n_right < min_leaf {
            continue;
        }

        let score = left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64;
        if best.map_or(true, |b| score > b.score) {
            best = Some(SplitCandidate {
                feature,
                threshold,
                score,
            });
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let y: Vec<f64> = (0..20).map(|i| if i < 10 { 1.0 } else { 5.0 }).collect();
        (x, y)
    }

    #[test]
    fn test_best_split_finds_step() {
        let (x, y) = step_data();
        let mut tree = RegressionTree::new(TreeParams {
            max_depth: Some(1),
            ..TreeParams::default()
        });
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.depth(), Some(1));
        let predictions = tree.predict(&[vec![3.0, 0.0], vec![15.0, 0.0], vec![9.5, 2.0]]).unwrap();
        assert_eq!(predictions, vec![1.0, 5.0, 1.0]);
    }

    #[test]
    fn test_unbounded_tree_fits_training_data() {
        let x: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..30).map(|i| ((i * 7) % 11) as f64).collect();
        let mut tree = RegressionTree::new(TreeParams::default());
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_min_samples_leaf_is_respected() {
        let (x, y) = step_data();
        let mut tree = RegressionTree::new(TreeParams {
            min_samples_leaf: 15,
            ..TreeParams::default()
        });
        tree.fit(&x, &y).unwrap();
        // no split leaves 15 rows on both sides of 20
        assert_eq!(tree.depth(), Some(0));
        assert_eq!(tree.predict(&[vec![0.0, 0.0]]).unwrap(), vec![3.0]);
    }

    #[test]
    fn test_random_split_is_seeded() {
        let x: Vec<Vec<f64>> = (0..50).map(|i| vec![i as f64, ((i * 13) % 7) as f64]).collect();
        let y: Vec<f64> = x.iter().map(|r| r[0] * 2.0 + r[1]).collect();
        let params = TreeParams {
            split: SplitStrategy::Random,
            max_depth: Some(4),
            seed: 9,
            ..TreeParams::default()
        };

        let mut a = RegressionTree::new(params.clone());
        let mut b = RegressionTree::new(params);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_predict_before_fit() {
        let tree = RegressionTree::new(TreeParams::default());
        assert!(matches!(tree.predict(&[vec![1.0]]), Err(ModelError::NotFitted)));
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let (x, y) = step_data();
        let mut tree = RegressionTree::new(TreeParams::default());
        tree.fit(&x, &y).unwrap();
        assert!(tree.predict(&[vec![1.0]]).is_err());
    }
}
