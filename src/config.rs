use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::artifacts::ArtifactLayout;
use crate::error::PipelineError;
use crate::features::CALENDAR_COLUMNS;
use crate::ml::models::CandidateKind;
use crate::preprocessing::FeatureSelection;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub artifacts: ArtifactsConfig,
    #[validate(nested)]
    pub data: DataConfig,
    #[validate(nested)]
    pub split: SplitConfig,
    #[validate(nested)]
    pub preprocessing: PreprocessingConfig,
    #[validate(nested)]
    pub training: TrainingConfig,
    #[validate(nested)]
    pub tuning: TuningConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ArtifactsConfig {
    pub root: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self { root: PathBuf::from("artifacts") }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DataConfig {
    pub source_path: PathBuf,
    #[validate(length(min = 1))]
    pub timestamp_column: String,
    #[validate(length(min = 1))]
    pub target_column: String,
    /// chrono format string; the common ISO layouts are tried when unset
    pub timestamp_format: Option<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from("data/PJME_hourly.csv"),
            timestamp_column: "Datetime".to_string(),
            target_column: "PJME_MW".to_string(),
            timestamp_format: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SplitConfig {
    #[validate(range(min = 0.01, max = 0.99))]
    pub test_ratio: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_ratio: 0.2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct PreprocessingConfig {
    pub selection: FeatureSelection,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TrainingConfig {
    #[validate(length(min = 1))]
    pub roster: Vec<CandidateKind>,
    /// Record a failing candidate and keep evaluating the rest
    pub isolate_failures: bool,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            roster: CandidateKind::default_roster(),
            isolate_failures: true,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TuningConfig {
    pub enabled: bool,
    #[validate(range(min = 1))]
    pub n_trials: usize,
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
    pub seed: u64,
    /// Refit the winning parameters and write `tuned_model.pkl`
    pub persist_best: bool,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            n_trials: 100,
            timeout_secs: 600,
            seed: 123,
            persist_best: true,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Defaults, then the TOML file (if present), then `PIPELINE__` env vars
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PIPELINE__").split("__"));
        let cfg: Config = figment
            .extract()
            .context("failed to extract pipeline configuration")?;
        cfg.check()?;
        Ok(cfg)
    }

    /// Field-level validation plus the cross-field rules validator can't express
    pub fn check(&self) -> Result<(), PipelineError> {
        self.validate()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        if self.data.timestamp_column == self.data.target_column {
            return Err(PipelineError::Config(
                "timestamp and target columns must differ".to_string(),
            ));
        }

        for (role, column) in [
            ("timestamp", &self.data.timestamp_column),
            ("target", &self.data.target_column),
        ] {
            if CALENDAR_COLUMNS.contains(&column.as_str()) {
                return Err(PipelineError::Config(format!(
                    "{role} column '{column}' collides with a derived calendar feature"
                )));
            }
        }

        match &self.preprocessing.selection {
            FeatureSelection::Columns { columns } if columns.is_empty() => {
                return Err(PipelineError::Config(
                    "feature selection needs at least one column".to_string(),
                ));
            }
            FeatureSelection::Columns { columns }
                if columns.iter().any(|c| c == &self.data.target_column) =>
            {
                return Err(PipelineError::Config(format!(
                    "target column '{}' cannot be a feature",
                    self.data.target_column
                )));
            }
            FeatureSelection::TopK { k } if *k == 0 => {
                return Err(PipelineError::Config(
                    "top-k feature selection needs k >= 1".to_string(),
                ));
            }
            _ => {}
        }

        if let Some(dup) = self.training.roster.iter().duplicates().next() {
            return Err(PipelineError::Config(format!(
                "candidate '{dup}' listed more than once in the roster"
            )));
        }

        Ok(())
    }

    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(&self.artifacts.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.check().is_ok());
        assert_eq!(cfg.split.test_ratio, 0.2);
        assert_eq!(cfg.split.seed, 42);
        assert_eq!(cfg.training.roster.len(), 6);
        assert_eq!(cfg.data.target_column, "PJME_MW");
    }

    #[test]
    fn test_rejects_out_of_range_ratio() {
        let mut cfg = Config::default();
        cfg.split.test_ratio = 1.5;
        assert!(matches!(cfg.check(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_rejects_empty_roster() {
        let mut cfg = Config::default();
        cfg.training.roster.clear();
        assert!(cfg.check().is_err());
    }

    #[test]
    fn test_rejects_duplicate_candidates() {
        let mut cfg = Config::default();
        cfg.training.roster = vec![CandidateKind::DecisionTree, CandidateKind::DecisionTree];
        assert!(cfg.check().is_err());
    }

    #[test]
    fn test_rejects_calendar_named_columns() {
        let mut cfg = Config::default();
        cfg.data.target_column = "hour".into();
        assert!(matches!(cfg.check(), Err(PipelineError::Config(ref msg)) if msg.contains("hour")));

        let mut cfg = Config::default();
        cfg.data.timestamp_column = "year".into();
        assert!(cfg.check().is_err());
    }

    #[test]
    fn test_rejects_zero_k() {
        let mut cfg = Config::default();
        cfg.preprocessing.selection = FeatureSelection::TopK { k: 0 };
        assert!(cfg.check().is_err());
    }

    #[test]
    fn test_load_merges_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(
            &path,
            r#"
[split]
test_ratio = 0.25
seed = 7

[training]
roster = ["decision_tree", "xgboost"]
isolate_failures = false
seed = 1

[preprocessing.selection]
strategy = "top_k"
k = 3
"#,
        )
        .unwrap();

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.split.test_ratio, 0.25);
        assert_eq!(cfg.split.seed, 7);
        assert_eq!(
            cfg.training.roster,
            vec![CandidateKind::DecisionTree, CandidateKind::XGBoost]
        );
        assert!(!cfg.training.isolate_failures);
        assert_eq!(cfg.preprocessing.selection, FeatureSelection::TopK { k: 3 });
        // untouched sections keep their defaults
        assert_eq!(cfg.data.timestamp_column, "Datetime");
    }
}
