//! Candidate evaluation and selection
//!
//! Each candidate is fitted on the training pair and scored on the held-out
//! pair. Failures are recorded per candidate; the winner is the successful
//! candidate with the lowest finite RMSE, earlier roster entries winning ties.

use std::fs::File;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::models::{Candidate, Estimator};
use super::{ModelError, ModelMetadata, RegressionScores};
use crate::artifacts;
use crate::error::{PipelineError, Result, Stage};

/// Held-out evaluation data shared by every candidate
#[derive(Debug, Clone, Copy)]
pub struct EvaluationSet<'a> {
    pub x_train: &'a [Vec<f64>],
    pub y_train: &'a [f64],
    pub x_test: &'a [Vec<f64>],
    pub y_test: &'a [f64],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CandidateStatus {
    Succeeded(RegressionScores),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub name: String,
    pub spec: String,
    pub status: CandidateStatus,
}

impl CandidateResult {
    pub fn scores(&self) -> Option<&RegressionScores> {
        match &self.status {
            CandidateStatus::Succeeded(scores) => Some(scores),
            CandidateStatus::Failed(_) => None,
        }
    }

    pub fn rmse(&self) -> Option<f64> {
        self.scores().map(|s| s.rmse)
    }
}

/// Fit one candidate and score it on the test pair
pub fn evaluate(candidate: &mut Candidate, data: EvaluationSet<'_>) -> Result<RegressionScores, ModelError> {
    candidate.model.fit(data.x_train, data.y_train)?;
    let predictions = candidate.model.predict(data.x_test)?;
    Ok(RegressionScores::calculate(data.y_test, &predictions)?)
}

/// Evaluate the roster in order.
///
/// With `isolate_failures` a failing candidate is recorded and the rest still
/// run; otherwise the first failure aborts with [`PipelineError::ModelFit`].
pub fn evaluate_roster(
    candidates: &mut [Candidate],
    data: EvaluationSet<'_>,
    isolate_failures: bool,
) -> Result<Vec<CandidateResult>> {
    let mut results = Vec::with_capacity(candidates.len());

    for candidate in candidates.iter_mut() {
        let spec = candidate.model.describe();
        let status = match evaluate(candidate, data) {
            Ok(scores) => {
                info!(
                    candidate = %candidate.name,
                    rmse = scores.rmse,
                    mse = scores.mse,
                    mae = scores.mae,
                    r2 = scores.r2,
                    "candidate evaluated"
                );
                CandidateStatus::Succeeded(scores)
            }
            Err(source) if !isolate_failures => {
                return Err(PipelineError::ModelFit {
                    candidate: candidate.name.clone(),
                    source,
                });
            }
            Err(e) => {
                warn!(candidate = %candidate.name, error = %e, "candidate failed");
                CandidateStatus::Failed(e.to_string())
            }
        };

        results.push(CandidateResult {
            name: candidate.name.clone(),
            spec,
            status,
        });
    }

    Ok(results)
}

/// Index of the lowest finite RMSE; the first one wins ties
pub fn select_best(rmses: impl IntoIterator<Item = Option<f64>>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, rmse) in rmses.into_iter().enumerate() {
        let Some(rmse) = rmse.filter(|r| r.is_finite()) else {
            continue;
        };
        if best.map_or(true, |(_, current)| rmse < current) {
            best = Some((index, rmse));
        }
    }
    best.map(|(index, _)| index)
}

#[derive(Debug, Serialize)]
struct ResultRow<'a> {
    #[serde(rename = "Model")]
    model: &'a str,
    #[serde(rename = "Model_specs")]
    spec: &'a str,
    #[serde(rename = "Status")]
    status: &'a str,
    #[serde(rename = "RMSE")]
    rmse: Option<f64>,
    #[serde(rename = "MSE")]
    mse: Option<f64>,
    #[serde(rename = "MAE")]
    mae: Option<f64>,
    #[serde(rename = "R2")]
    r2: Option<f64>,
}

/// Comparison table, one row per candidate in roster order
pub fn write_results(results: &[CandidateResult], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        artifacts::ensure_dir(Stage::Training, parent)?;
    }
    let persist = |e: csv::Error| PipelineError::persist(Stage::Training, path, e);

    let file = File::create(path).map_err(|e| PipelineError::persist(Stage::Training, path, e))?;
    let mut writer = csv::Writer::from_writer(file);
    for result in results {
        let scores = result.scores();
        let status = match &result.status {
            CandidateStatus::Succeeded(_) => "ok",
            CandidateStatus::Failed(error) => error.as_str(),
        };
        writer
            .serialize(ResultRow {
                model: &result.name,
                spec: &result.spec,
                status,
                rmse: scores.map(|s| s.rmse),
                mse: scores.map(|s| s.mse),
                mae: scores.map(|s| s.mae),
                r2: scores.map(|s| s.r2),
            })
            .map_err(persist)?;
    }
    writer
        .flush()
        .map_err(|e| PipelineError::persist(Stage::Training, path, e))?;
    Ok(())
}

/// Persisted form of a fitted model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub metadata: ModelMetadata,
    pub model_bytes: Vec<u8>,
}

impl ModelArtifact {
    pub fn new(
        candidate: &Candidate,
        scores: RegressionScores,
        training_samples: usize,
        feature_names: Vec<String>,
    ) -> Result<Self, ModelError> {
        let metadata = ModelMetadata {
            model_id: format!(
                "{}_{}",
                candidate.name.to_lowercase().replace(' ', "_"),
                uuid::Uuid::new_v4()
            ),
            name: candidate.name.clone(),
            spec: candidate.model.describe(),
            trained_at: Utc::now(),
            training_samples,
            feature_names,
            scores,
        };
        Ok(Self {
            metadata,
            model_bytes: candidate.model.to_bytes()?,
        })
    }

    pub fn estimator(&self) -> Result<Estimator, ModelError> {
        Estimator::from_bytes(&self.model_bytes)
    }

    pub fn save(&self, stage: Stage, path: &Path) -> Result<()> {
        artifacts::save_binary(stage, self, path)
    }

    pub fn load(stage: Stage, path: &Path) -> Result<Self> {
        artifacts::load_binary(stage, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{MockRegressor, Regressor};
    use rstest::rstest;

    fn constant_mock(value: f64) -> MockRegressor {
        let mut mock = MockRegressor::new();
        mock.expect_fit().returning(|_, _| Ok(()));
        mock.expect_predict().returning(move |x| Ok(vec![value; x.len()]));
        mock.expect_describe().return_const(format!("Constant({value})"));
        mock
    }

    fn failing_mock() -> MockRegressor {
        let mut mock = MockRegressor::new();
        mock.expect_fit()
            .returning(|_, _| Err(ModelError::Backend("singular matrix".into())));
        mock.expect_predict().never();
        mock.expect_describe().return_const("Broken()".to_string());
        mock
    }

    fn data() -> (Vec<Vec<f64>>, Vec<f64>) {
        (vec![vec![0.0], vec![1.0]], vec![0.0, 0.0])
    }

    #[rstest]
    #[case(vec![Some(12.0), Some(10.0)], Some(1))]
    #[case(vec![Some(10.0), Some(10.0)], Some(0))]
    #[case(vec![None, Some(3.0), Some(3.0)], Some(1))]
    #[case(vec![Some(f64::NAN), Some(f64::INFINITY), Some(9.0)], Some(2))]
    #[case(vec![None, Some(f64::NAN)], None)]
    #[case(vec![], None)]
    fn test_select_best(#[case] rmses: Vec<Option<f64>>, #[case] expected: Option<usize>) {
        assert_eq!(select_best(rmses), expected);
    }

    #[test]
    fn test_failures_are_isolated() {
        let (x, y) = data();
        let mut roster = vec![
            Candidate::new("twelve", Box::new(constant_mock(12.0))),
            Candidate::new("broken", Box::new(failing_mock())),
            Candidate::new("ten", Box::new(constant_mock(10.0))),
        ];
        let set = EvaluationSet {
            x_train: &x,
            y_train: &y,
            x_test: &x,
            y_test: &y,
        };

        let results = evaluate_roster(&mut roster, set, true).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].rmse(), Some(12.0));
        assert!(matches!(&results[1].status, CandidateStatus::Failed(e) if e.contains("singular")));
        assert_eq!(results[2].spec, "Constant(10)");

        let best = select_best(results.iter().map(CandidateResult::rmse));
        assert_eq!(best, Some(2));
    }

    #[test]
    fn test_failure_aborts_without_isolation() {
        let (x, y) = data();
        let mut roster = vec![
            Candidate::new("broken", Box::new(failing_mock())),
            Candidate::new("never reached", Box::new(MockRegressor::new())),
        ];
        let set = EvaluationSet {
            x_train: &x,
            y_train: &y,
            x_test: &x,
            y_test: &y,
        };

        let err = evaluate_roster(&mut roster, set, false).unwrap_err();
        assert!(matches!(err, PipelineError::ModelFit { ref candidate, .. } if candidate == "broken"));
    }

    #[test]
    fn test_wrong_prediction_length_is_a_failure() {
        let (x, y) = data();
        let mut mock = MockRegressor::new();
        mock.expect_fit().returning(|_, _| Ok(()));
        mock.expect_predict().returning(|_| Ok(vec![1.0]));
        let mut candidate = Candidate::new("short", Box::new(mock));
        let set = EvaluationSet {
            x_train: &x,
            y_train: &y,
            x_test: &x,
            y_test: &y,
        };
        assert!(matches!(evaluate(&mut candidate, set), Err(ModelError::Metrics(_))));
    }

    #[test]
    fn test_results_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_data").join("model_results.csv");
        let results = vec![
            CandidateResult {
                name: "Decision Tree".into(),
                spec: "DecisionTreeRegressor()".into(),
                status: CandidateStatus::Succeeded(RegressionScores {
                    rmse: 2.0,
                    mse: 4.0,
                    mae: 1.5,
                    r2: 0.5,
                }),
            },
            CandidateResult {
                name: "Ada Boost".into(),
                spec: "AdaBoostRegressor()".into(),
                status: CandidateStatus::Failed("boom".into()),
            },
        ];
        write_results(&results, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Model,Model_specs,Status,RMSE,MSE,MAE,R2");
        assert_eq!(lines[1], "Decision Tree,DecisionTreeRegressor(),ok,2.0,4.0,1.5,0.5");
        assert_eq!(lines[2], "Ada Boost,AdaBoostRegressor(),boom,,,,");
    }

    #[test]
    fn test_model_artifact_round_trip() {
        use crate::ml::models::CandidateKind;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pkl");
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..20).map(|i| (i * 3 % 5) as f64).collect();

        let mut candidate = Candidate::new("Extra Tree", Box::new(CandidateKind::ExtraTree.build(42)));
        candidate.model.fit(&x, &y).unwrap();
        let scores = RegressionScores::calculate(&y, &candidate.model.predict(&x).unwrap()).unwrap();

        let artifact = ModelArtifact::new(&candidate, scores, x.len(), vec!["hour".into()]).unwrap();
        artifact.save(Stage::Training, &path).unwrap();

        let loaded = ModelArtifact::load(Stage::Training, &path).unwrap();
        assert_eq!(loaded.metadata.name, "Extra Tree");
        assert!(loaded.metadata.model_id.starts_with("extra_tree_"));
        assert_eq!(
            loaded.estimator().unwrap().predict(&x).unwrap(),
            candidate.model.predict(&x).unwrap()
        );
    }
}
