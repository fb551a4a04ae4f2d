use std::path::PathBuf;

use strum::Display;
use thiserror::Error;

use crate::ml::ModelError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Ingestion,
    Transformation,
    Training,
    Tuning,
}

/// Failures while separating, fitting or applying the preprocessor
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("column '{column}' missing from {}", path.display())]
    MissingColumn { column: String, path: PathBuf },

    #[error("column '{column}' missing from feature frame")]
    UnknownFeature { column: String },

    #[error("invalid value '{value}' in column '{column}' at row {row}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },

    #[error("missing target value in column '{column}' at row {row}")]
    MissingTarget { column: String, row: usize },

    #[error("column '{0}' has no observed values to fit on")]
    EmptyColumn(String),

    #[error("cannot fit preprocessor on an empty partition")]
    EmptyPartition,

    #[error("expected {expected} values, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("cannot select {k} features from {available} candidates")]
    InvalidSelection { k: usize, available: usize },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage}: failed to load {}: {source}", path.display())]
    DataLoad {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("transformation: {0}")]
    Transform(#[from] TransformError),

    #[error("{stage}: failed to persist {}: {source}", path.display())]
    Persist {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("training: candidate '{candidate}' failed: {source}")]
    ModelFit {
        candidate: String,
        #[source]
        source: ModelError,
    },

    #[error("training: no candidate produced a usable score")]
    NoViableCandidate,

    #[error("tuning: {0}")]
    Tuning(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn data_load(stage: Stage, path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        Self::DataLoad {
            stage,
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn persist(stage: Stage, path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        Self::Persist {
            stage,
            path: path.into(),
            source: source.into(),
        }
    }

    /// Stage that raised the error
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::DataLoad { stage, .. } | Self::Persist { stage, .. } => Some(*stage),
            Self::Transform(_) => Some(Stage::Transformation),
            Self::ModelFit { .. } | Self::NoViableCandidate => Some(Stage::Training),
            Self::Tuning(_) => Some(Stage::Tuning),
            Self::Config(_) => None,
        }
    }
}
