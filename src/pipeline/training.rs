//! Training stage: evaluate the roster, persist the comparison table and the
//! best model

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::transformation::{TransformationArtifacts, TransformedData};
use crate::artifacts::ArtifactLayout;
use crate::config::TrainingConfig;
use crate::error::{PipelineError, Result, Stage};
use crate::ml::models::{build_roster, Candidate};
use crate::ml::training::{
    evaluate_roster, select_best, write_results, CandidateResult, EvaluationSet, ModelArtifact,
};
use crate::ml::RegressionScores;
use crate::telemetry::StageContext;

/// Paths written by the training stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingArtifacts {
    pub results: PathBuf,
    pub model: PathBuf,
}

#[derive(Debug)]
pub struct TrainingOutcome {
    /// One entry per roster candidate, in roster order
    pub results: Vec<CandidateResult>,
    /// The fitted winner
    pub best: Candidate,
    pub best_name: String,
    pub best_scores: RegressionScores,
    pub artifacts: TrainingArtifacts,
}

pub struct ModelTraining {
    config: TrainingConfig,
    layout: ArtifactLayout,
    ctx: StageContext,
    feature_names: Vec<String>,
}

impl ModelTraining {
    pub fn new(config: TrainingConfig, layout: ArtifactLayout, ctx: StageContext) -> Self {
        Self {
            config,
            layout,
            ctx,
            feature_names: Vec::new(),
        }
    }

    /// Column names recorded in the persisted model's metadata
    pub fn with_feature_names(mut self, feature_names: Vec<String>) -> Self {
        self.feature_names = feature_names;
        self
    }

    /// Read the transformed CSVs written by the transformation stage
    pub fn load_transformed(&self, artifacts: &TransformationArtifacts) -> Result<TransformedData> {
        TransformedData::load(artifacts, Stage::Training)
    }

    /// Train on a loaded or in-memory transformed dataset
    pub fn run(self, data: &TransformedData) -> Result<TrainingOutcome> {
        self.with_feature_names(data.feature_names.clone()).fit_and_select(
            &data.x_train,
            &data.y_train,
            &data.x_test,
            &data.y_test,
        )
    }

    /// Fit the configured roster and keep the lowest-RMSE candidate
    pub fn fit_and_select(
        &self,
        x_train: &[Vec<f64>],
        y_train: &[f64],
        x_test: &[Vec<f64>],
        y_test: &[f64],
    ) -> Result<TrainingOutcome> {
        let roster = build_roster(&self.config.roster, self.config.seed);
        self.fit_and_select_from(roster, x_train, y_train, x_test, y_test)
    }

    /// Same as [`Self::fit_and_select`] with an explicit roster
    pub fn fit_and_select_from(
        &self,
        mut roster: Vec<Candidate>,
        x_train: &[Vec<f64>],
        y_train: &[f64],
        x_test: &[Vec<f64>],
        y_test: &[f64],
    ) -> Result<TrainingOutcome> {
        let _guard = self.ctx.span().enter();
        info!(
            candidates = roster.len(),
            train_rows = x_train.len(),
            test_rows = x_test.len(),
            "starting model training"
        );

        let data = EvaluationSet {
            x_train,
            y_train,
            x_test,
            y_test,
        };
        let results = evaluate_roster(&mut roster, data, self.config.isolate_failures)?;

        let outputs = TrainingArtifacts {
            results: self.layout.model_results(),
            model: self.layout.model(),
        };
        write_results(&results, &outputs.results)?;

        let index = select_best(results.iter().map(CandidateResult::rmse))
            .ok_or(PipelineError::NoViableCandidate)?;
        let best_scores = *results[index]
            .scores()
            .ok_or(PipelineError::NoViableCandidate)?;
        let best = roster
            .into_iter()
            .nth(index)
            .ok_or(PipelineError::NoViableCandidate)?;

        let artifact = ModelArtifact::new(&best, best_scores, y_train.len(), self.feature_names.clone())
            .map_err(|e| PipelineError::persist(Stage::Training, &outputs.model, e))?;
        artifact.save(Stage::Training, &outputs.model)?;

        info!(
            model = %best.name,
            rmse = best_scores.rmse,
            r2 = best_scores.r2,
            "best model selected"
        );

        Ok(TrainingOutcome {
            best_name: best.name.clone(),
            best,
            best_scores,
            results,
            artifacts: outputs,
        })
    }
}
