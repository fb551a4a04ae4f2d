//! Stage orchestration
//!
//! A [`Pipeline`] runs ingestion, transformation and training in order,
//! handing each stage the artifact record of the previous one. Every stage
//! can also be built on its own and pointed at files from an earlier run.

use std::path::PathBuf;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Result, Stage};
use crate::ml::training::CandidateResult;
use crate::ml::RegressionScores;
use crate::telemetry::StageContext;
use crate::tuning::{Tuner, TuningReport};

pub mod ingestion;
pub mod training;
pub mod transformation;

pub use ingestion::{shuffle_split, DataIngestion, IngestionArtifacts};
pub use training::{ModelTraining, TrainingArtifacts, TrainingOutcome};
pub use transformation::{DataTransformation, TransformationArtifacts, TransformedData};

/// Summary of one end-to-end run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub ingestion: IngestionArtifacts,
    pub transformation: TransformationArtifacts,
    pub training: TrainingArtifacts,
    pub results: Vec<CandidateResult>,
    pub best_model: String,
    pub best_scores: RegressionScores,
    pub feature_names: Vec<String>,
}

pub struct Pipeline {
    config: Config,
    run_id: Uuid,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn context(&self, stage: Stage) -> StageContext {
        StageContext::new(self.run_id, stage)
    }

    pub fn ingestion(&self) -> DataIngestion {
        DataIngestion::new(
            self.config.data.clone(),
            self.config.split.clone(),
            self.config.layout(),
            self.context(Stage::Ingestion),
        )
    }

    pub fn transformation(&self) -> DataTransformation {
        DataTransformation::new(
            self.config.data.clone(),
            self.config.preprocessing.clone(),
            self.config.layout(),
            self.context(Stage::Transformation),
        )
    }

    pub fn training(&self) -> ModelTraining {
        ModelTraining::new(
            self.config.training.clone(),
            self.config.layout(),
            self.context(Stage::Training),
        )
    }

    /// Tuner over the transformed artifacts of the configured root
    pub fn tuner(&self) -> Result<Tuner> {
        Tuner::new(
            self.config.tuning.clone(),
            self.config.layout(),
            self.context(Stage::Tuning),
        )
    }

    /// Ingestion, transformation and training on the configured source
    pub fn run(&self) -> Result<PipelineReport> {
        let source: PathBuf = self.config.data.source_path.clone();
        info!(run_id = %self.run_id, source = %source.display(), "pipeline started");

        let ingested = self.ingestion().split(&source)?;
        let transformed = self.transformation().transform(&ingested.train, &ingested.test)?;
        let outcome = self.training().run(&transformed)?;

        info!(
            run_id = %self.run_id,
            best_model = %outcome.best_name,
            rmse = outcome.best_scores.rmse,
            "pipeline completed"
        );

        Ok(PipelineReport {
            run_id: self.run_id,
            ingestion: ingested,
            transformation: transformed.artifacts,
            training: outcome.artifacts,
            results: outcome.results,
            best_model: outcome.best_name,
            best_scores: outcome.best_scores,
            feature_names: transformed.feature_names,
        })
    }

    /// Standalone hyperparameter search; needs transformed artifacts on disk
    pub fn tune(&self) -> Result<TuningReport> {
        self.tuner()?.tune()
    }
}
