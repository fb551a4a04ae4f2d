//! Hyperparameter search over the boosted-trees candidate
//!
//! The tuner is a standalone utility: it reads the transformed artifacts
//! once, runs seeded random trials until the trial count or the wall-clock
//! budget runs out, and reports the configuration with the lowest test MSE.
//! Nothing it writes feeds back into the training stage.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::artifacts::ArtifactLayout;
use crate::config::TuningConfig;
use crate::error::{PipelineError, Result, Stage};
use crate::ml::models::{Candidate, Estimator};
use crate::ml::training::ModelArtifact;
use crate::ml::{ModelError, RegressionScores, Regressor};
use crate::pipeline::transformation::{TransformationArtifacts, TransformedData};
use crate::telemetry::StageContext;

pub mod search_space;
pub mod study;

pub use search_space::{boosted_trees_params, Parameter, ParameterValue, SearchSpace, TrialParams};
pub use study::{OptimizeDirection, Study, TrialResult, TrialState};

/// Seed every trial model is built with, so trials differ only in the
/// sampled parameters
pub const TRIAL_RANDOM_STATE: u64 = 42;

#[derive(Debug, Clone, Serialize)]
pub struct TuningReport {
    pub best_params: TrialParams,
    pub best_value: f64,
    pub finished_trials: usize,
    pub failed_trials: usize,
    pub trials: Vec<TrialResult>,
    pub tuned_model: Option<PathBuf>,
}

pub struct Tuner {
    config: TuningConfig,
    layout: ArtifactLayout,
    ctx: StageContext,
    space: SearchSpace,
    data: TransformedData,
}

impl Tuner {
    /// Load the transformed artifacts once for every trial
    pub fn new(config: TuningConfig, layout: ArtifactLayout, ctx: StageContext) -> Result<Self> {
        let artifacts = TransformationArtifacts::from_layout(&layout);
        let data = TransformedData::load(&artifacts, Stage::Tuning)?;
        Ok(Self::with_data(config, layout, ctx, data))
    }

    pub fn with_data(
        config: TuningConfig,
        layout: ArtifactLayout,
        ctx: StageContext,
        data: TransformedData,
    ) -> Self {
        Self {
            config,
            layout,
            ctx,
            space: SearchSpace::boosted_trees(),
            data,
        }
    }

    pub fn with_search_space(mut self, space: SearchSpace) -> Self {
        self.space = space;
        self
    }

    pub fn tune(&self) -> Result<TuningReport> {
        let _guard = self.ctx.span().enter();
        info!(
            n_trials = self.config.n_trials,
            timeout_secs = self.config.timeout_secs,
            "starting hyperparameter search"
        );

        let study = self.run_study();
        let best = study
            .best_trial()
            .ok_or_else(|| PipelineError::Tuning(format!(
                "none of {} trials completed",
                study.trials.len()
            )))?;
        let best_params = best.params.clone();
        let best_value = best.value().unwrap_or(f64::NAN);

        let tuned_model = if self.config.persist_best {
            Some(self.persist(&best_params)?)
        } else {
            None
        };

        let report = TuningReport {
            best_params,
            best_value,
            finished_trials: study.finished_trials(),
            failed_trials: study.failed_trials(),
            trials: study.trials,
            tuned_model,
        };

        let summary = serde_json::to_string(&report.best_params)
            .map_err(|e| PipelineError::Tuning(e.to_string()))?;
        info!(
            best_params = %summary,
            best_value = report.best_value,
            finished_trials = report.finished_trials,
            failed_trials = report.failed_trials,
            "hyperparameter search completed"
        );
        Ok(report)
    }

    fn run_study(&self) -> Study {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut study = Study::new(OptimizeDirection::Minimize);
        let budget = Duration::from_secs(self.config.timeout_secs);
        let start = Instant::now();

        for trial_id in 0..self.config.n_trials {
            if start.elapsed() >= budget {
                info!(trial_id, "tuning timeout reached");
                break;
            }

            let trial_start = Instant::now();
            let params = self.space.sample(&mut rng);
            let state = match self.objective(&params) {
                Ok(value) => {
                    debug!(trial_id, mse = value, "trial complete");
                    TrialState::Complete { value }
                }
                Err(e) => {
                    warn!(trial_id, error = %e, "trial failed");
                    TrialState::Failed {
                        error: e.to_string(),
                    }
                }
            };

            study.add_trial(TrialResult {
                trial_id,
                params,
                state,
                duration_secs: trial_start.elapsed().as_secs_f64(),
            });
        }

        study.total_duration_secs = start.elapsed().as_secs_f64();
        study
    }

    /// Test-set MSE of a freshly fitted model
    fn objective(&self, params: &TrialParams) -> Result<f64, ModelError> {
        let estimator = self.fit(params)?;
        let predictions = estimator.predict(&self.data.x_test)?;
        Ok(RegressionScores::calculate(&self.data.y_test, &predictions)?.mse)
    }

    fn fit(&self, params: &TrialParams) -> Result<Estimator, ModelError> {
        let params = boosted_trees_params(params, TRIAL_RANDOM_STATE).map_err(ModelError::InvalidInput)?;
        let mut estimator = Estimator::boosted_trees(params);
        estimator.fit(&self.data.x_train, &self.data.y_train)?;
        Ok(estimator)
    }

    /// Refit the winning parameters and write `tuned_model.pkl`
    fn persist(&self, params: &TrialParams) -> Result<PathBuf> {
        let path = self.layout.tuned_model();
        let to_persist = |e: ModelError| PipelineError::persist(Stage::Tuning, &path, e);

        let estimator = self.fit(params).map_err(to_persist)?;
        let predictions = estimator.predict(&self.data.x_test).map_err(to_persist)?;
        let scores = RegressionScores::calculate(&self.data.y_test, &predictions)
            .map_err(|e| to_persist(e.into()))?;

        let candidate = Candidate::new("XGBoost (tuned)", Box::new(estimator));
        let artifact = ModelArtifact::new(
            &candidate,
            scores,
            self.data.y_train.len(),
            self.data.feature_names.clone(),
        )
        .map_err(to_persist)?;
        artifact.save(Stage::Tuning, &path)?;
        info!(path = %path.display(), rmse = scores.rmse, "tuned model written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> TransformedData {
        let x: Vec<Vec<f64>> = (0..60).map(|i| vec![(i % 24) as f64, (i % 7) as f64]).collect();
        let y: Vec<f64> = x.iter().map(|r| 10.0 + r[0] * 1.5 - r[1]).collect();
        TransformedData {
            x_train: x[..48].to_vec(),
            y_train: y[..48].to_vec(),
            x_test: x[48..].to_vec(),
            y_test: y[48..].to_vec(),
            feature_names: vec!["hour".into(), "dayofweek".into()],
            artifacts: TransformationArtifacts::from_layout(&ArtifactLayout::default()),
        }
    }

    fn small_space() -> SearchSpace {
        SearchSpace::new()
            .add("n_estimators", Parameter::IntRange { low: 5, high: 20, step: 5 })
            .add("max_depth", Parameter::IntRange { low: 2, high: 4, step: 1 })
            .add("learning_rate", Parameter::Choice(vec![0.1, 0.3]))
    }

    fn tuner(root: &std::path::Path, config: TuningConfig) -> Tuner {
        Tuner::with_data(
            config,
            ArtifactLayout::new(root),
            StageContext::standalone(Stage::Tuning),
            data(),
        )
        .with_search_space(small_space())
    }

    #[test]
    fn test_tune_reports_best_of_trials() {
        let dir = tempfile::tempdir().unwrap();
        let config = TuningConfig {
            enabled: true,
            n_trials: 6,
            persist_best: false,
            ..TuningConfig::default()
        };

        let report = tuner(dir.path(), config).tune().unwrap();
        assert_eq!(report.finished_trials, 6);
        assert_eq!(report.failed_trials, 0);
        assert_eq!(report.trials.len(), 6);
        let lowest = report
            .trials
            .iter()
            .filter_map(TrialResult::value)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(report.best_value, lowest);
        assert!(report.tuned_model.is_none());
    }

    #[test]
    fn test_tune_is_seeded() {
        let dir = tempfile::tempdir().unwrap();
        let config = TuningConfig {
            n_trials: 4,
            persist_best: false,
            ..TuningConfig::default()
        };
        let a = tuner(dir.path(), config.clone()).tune().unwrap();
        let b = tuner(dir.path(), config).tune().unwrap();
        assert_eq!(a.best_params, b.best_params);
        assert_eq!(a.best_value, b.best_value);
    }

    #[test]
    fn test_timeout_stops_search_early() {
        let dir = tempfile::tempdir().unwrap();
        let config = TuningConfig {
            n_trials: 1_000_000,
            timeout_secs: 1,
            persist_best: false,
            ..TuningConfig::default()
        };
        let space = SearchSpace::new()
            .add("n_estimators", Parameter::IntRange { low: 300, high: 300, step: 1 })
            .add("max_depth", Parameter::IntRange { low: 6, high: 6, step: 1 });

        let started = Instant::now();
        let report = tuner(dir.path(), config).with_search_space(space).tune().unwrap();
        assert!(report.trials.len() < 1_000_000);
        assert!(report.finished_trials >= 1);
        assert!(report.best_value.is_finite());
        // the budget is checked before each trial, so at most one trial overruns it
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[test]
    fn test_all_trials_failing_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let space = small_space().add("colsample_bytree", Parameter::Choice(vec![0.0]));
        let config = TuningConfig {
            n_trials: 3,
            persist_best: false,
            ..TuningConfig::default()
        };

        let err = tuner(dir.path(), config).with_search_space(space).tune().unwrap_err();
        assert!(matches!(err, PipelineError::Tuning(_)));
    }

    #[test]
    fn test_persists_tuned_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = TuningConfig {
            n_trials: 2,
            ..TuningConfig::default()
        };

        let report = tuner(dir.path(), config).tune().unwrap();
        let path = report.tuned_model.unwrap();
        assert_eq!(path, ArtifactLayout::new(dir.path()).tuned_model());

        let artifact = ModelArtifact::load(Stage::Tuning, &path).unwrap();
        assert_eq!(artifact.metadata.feature_names, ["hour", "dayofweek"]);
        assert!((artifact.metadata.scores.mse - report.best_value).abs() < 1e-9);
    }

    #[test]
    fn test_new_requires_transformed_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let err = Tuner::new(
            TuningConfig::default(),
            ArtifactLayout::new(dir.path()),
            StageContext::standalone(Stage::Tuning),
        )
        .err()
        .unwrap();
        assert_eq!(err.stage(), Some(Stage::Tuning));
    }
}
