//! Artifact layout and persistence helpers
//!
//! Every stage writes to a fixed path under the artifact root:
//!
//! ```text
//! data/{raw_data.csv, train_data.csv, test_data.csv}
//! preprocessor/preprocessor.pkl
//! transformed_data/{train_features.csv, train_labels.csv, test_features.csv, test_labels.csv}
//! model_data/{model_results.csv, model.pkl, tuned_model.pkl}
//! ```
//!
//! The `.pkl` files are bincode blobs.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result, Stage};

pub const DATA_DIR: &str = "data";
pub const PREPROCESSOR_DIR: &str = "preprocessor";
pub const TRANSFORMED_DIR: &str = "transformed_data";
pub const MODEL_DIR: &str = "model_data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn raw_data(&self) -> PathBuf {
        self.data_dir().join("raw_data.csv")
    }

    pub fn train_data(&self) -> PathBuf {
        self.data_dir().join("train_data.csv")
    }

    pub fn test_data(&self) -> PathBuf {
        self.data_dir().join("test_data.csv")
    }

    pub fn preprocessor_dir(&self) -> PathBuf {
        self.root.join(PREPROCESSOR_DIR)
    }

    pub fn preprocessor(&self) -> PathBuf {
        self.preprocessor_dir().join("preprocessor.pkl")
    }

    pub fn transformed_dir(&self) -> PathBuf {
        self.root.join(TRANSFORMED_DIR)
    }

    pub fn train_features(&self) -> PathBuf {
        self.transformed_dir().join("train_features.csv")
    }

    pub fn train_labels(&self) -> PathBuf {
        self.transformed_dir().join("train_labels.csv")
    }

    pub fn test_features(&self) -> PathBuf {
        self.transformed_dir().join("test_features.csv")
    }

    pub fn test_labels(&self) -> PathBuf {
        self.transformed_dir().join("test_labels.csv")
    }

    pub fn model_dir(&self) -> PathBuf {
        self.root.join(MODEL_DIR)
    }

    pub fn model_results(&self) -> PathBuf {
        self.model_dir().join("model_results.csv")
    }

    pub fn model(&self) -> PathBuf {
        self.model_dir().join("model.pkl")
    }

    pub fn tuned_model(&self) -> PathBuf {
        self.model_dir().join("tuned_model.pkl")
    }
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self::new("artifacts")
    }
}

/// Create `dir` and its parents if absent
pub fn ensure_dir(stage: Stage, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| PipelineError::persist(stage, dir, e))
}

/// Write `value` as a bincode blob, creating the parent directory
pub fn save_binary<T: Serialize>(stage: Stage, value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(stage, parent)?;
    }
    let file = File::create(path).map_err(|e| PipelineError::persist(stage, path, e))?;
    let mut writer = BufWriter::new(file);
    bincode::serialize_into(&mut writer, value)
        .map_err(|e| PipelineError::persist(stage, path, e))?;
    writer
        .flush()
        .map_err(|e| PipelineError::persist(stage, path, e))?;
    debug!(path = %path.display(), "binary artifact written");
    Ok(())
}

pub fn load_binary<T: DeserializeOwned>(stage: Stage, path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| PipelineError::data_load(stage, path, e))?;
    bincode::deserialize_from(BufReader::new(file))
        .map_err(|e| PipelineError::data_load(stage, path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = ArtifactLayout::new("artifacts");
        assert_eq!(layout.raw_data(), Path::new("artifacts/data/raw_data.csv"));
        assert_eq!(layout.train_data(), Path::new("artifacts/data/train_data.csv"));
        assert_eq!(
            layout.preprocessor(),
            Path::new("artifacts/preprocessor/preprocessor.pkl")
        );
        assert_eq!(
            layout.test_labels(),
            Path::new("artifacts/transformed_data/test_labels.csv")
        );
        assert_eq!(
            layout.model_results(),
            Path::new("artifacts/model_data/model_results.csv")
        );
        assert_eq!(layout.tuned_model(), Path::new("artifacts/model_data/tuned_model.pkl"));
    }

    #[test]
    fn test_binary_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("blob.pkl");
        let value = vec![(1u32, "one".to_string()), (2, "two".to_string())];

        save_binary(Stage::Training, &value, &path).unwrap();
        let loaded: Vec<(u32, String)> = load_binary(Stage::Training, &path).unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn test_load_missing_blob_is_data_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_binary::<Vec<u8>>(Stage::Training, &dir.path().join("absent.pkl"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::DataLoad { stage: Stage::Training, .. }));
    }
}
