//! Transformation stage: fit the preprocessor on train, apply it to both
//! partitions and persist the transformed matrices

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::artifacts::{self, ArtifactLayout};
use crate::config::{DataConfig, PreprocessingConfig};
use crate::error::{PipelineError, Result, Stage, TransformError};
use crate::preprocessing::{FeatureSelection, Preprocessor};
use crate::table::Table;
use crate::telemetry::StageContext;

/// Paths written by [`DataTransformation::transform`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationArtifacts {
    pub preprocessor: PathBuf,
    pub train_features: PathBuf,
    pub train_labels: PathBuf,
    pub test_features: PathBuf,
    pub test_labels: PathBuf,
}

impl TransformationArtifacts {
    pub fn from_layout(layout: &ArtifactLayout) -> Self {
        Self {
            preprocessor: layout.preprocessor(),
            train_features: layout.train_features(),
            train_labels: layout.train_labels(),
            test_features: layout.test_features(),
            test_labels: layout.test_labels(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformedData {
    pub x_train: Vec<Vec<f64>>,
    pub x_test: Vec<Vec<f64>>,
    pub y_train: Vec<f64>,
    pub y_test: Vec<f64>,
    pub feature_names: Vec<String>,
    pub artifacts: TransformationArtifacts,
}

impl TransformedData {
    /// Read the four transformed CSVs back; errors are attributed to `stage`
    pub fn load(artifacts: &TransformationArtifacts, stage: Stage) -> Result<Self> {
        let (feature_names, x_train) = read_matrix(&artifacts.train_features, stage)?;
        let (test_names, x_test) = read_matrix(&artifacts.test_features, stage)?;
        if test_names != feature_names {
            return Err(PipelineError::data_load(
                stage,
                &artifacts.test_features,
                format!("feature columns {test_names:?} differ from training columns {feature_names:?}"),
            ));
        }
        let y_train = read_labels(&artifacts.train_labels, stage)?;
        let y_test = read_labels(&artifacts.test_labels, stage)?;

        for (rows, labels, path) in [
            (x_train.len(), y_train.len(), &artifacts.train_labels),
            (x_test.len(), y_test.len(), &artifacts.test_labels),
        ] {
            if rows != labels {
                return Err(PipelineError::data_load(
                    stage,
                    path,
                    TransformError::LengthMismatch {
                        expected: rows,
                        found: labels,
                    },
                ));
            }
        }

        Ok(Self {
            x_train,
            x_test,
            y_train,
            y_test,
            feature_names,
            artifacts: artifacts.clone(),
        })
    }
}

fn read_matrix(path: &Path, stage: Stage) -> Result<(Vec<String>, Vec<Vec<f64>>)> {
    let table = Table::read_csv(path).map_err(|e| PipelineError::data_load(stage, path, e))?;
    let matrix = table
        .to_matrix()
        .map_err(|e| PipelineError::data_load(stage, path, e))?;
    Ok((table.headers().to_vec(), matrix))
}

fn read_labels(path: &Path, stage: Stage) -> Result<Vec<f64>> {
    let (headers, matrix) = read_matrix(path, stage)?;
    if headers.len() != 1 {
        return Err(PipelineError::data_load(
            stage,
            path,
            format!("expected one label column, found {}", headers.len()),
        ));
    }
    Ok(matrix.into_iter().map(|row| row[0]).collect())
}

pub struct DataTransformation {
    data: DataConfig,
    preprocessing: PreprocessingConfig,
    layout: ArtifactLayout,
    ctx: StageContext,
}

impl DataTransformation {
    pub fn new(
        data: DataConfig,
        preprocessing: PreprocessingConfig,
        layout: ArtifactLayout,
        ctx: StageContext,
    ) -> Self {
        Self {
            data,
            preprocessing,
            layout,
            ctx,
        }
    }

    /// Unfitted preprocessor for the configured feature selection
    pub fn build_preprocessor(&self) -> Preprocessor {
        Preprocessor::new(self.preprocessing.selection.clone())
    }

    pub fn transform(&self, train_path: &Path, test_path: &Path) -> Result<TransformedData> {
        let _guard = self.ctx.span().enter();
        info!(train = %train_path.display(), test = %test_path.display(), "starting data transformation");

        let train = Table::read_csv(train_path)
            .map_err(|e| PipelineError::data_load(Stage::Transformation, train_path, e))?;
        let test = Table::read_csv(test_path)
            .map_err(|e| PipelineError::data_load(Stage::Transformation, test_path, e))?;

        let (train_features, y_train) = self.separate(&train, train_path)?;
        let (test_features, y_test) = self.separate(&test, test_path)?;

        if let FeatureSelection::Columns { columns } = &self.preprocessing.selection {
            require_columns(&train_features, columns, train_path)?;
            require_columns(&test_features, columns, test_path)?;
        }

        let fitted = self.build_preprocessor().fit(&train_features, &y_train)?;
        // top-k picks its columns on train; test must carry them too
        require_columns(&test_features, fitted.columns(), test_path)?;

        let x_train = fitted.transform(&train_features)?;
        let x_test = fitted.transform(&test_features)?;
        let feature_names = fitted.columns().to_vec();

        let outputs = TransformationArtifacts::from_layout(&self.layout);
        artifacts::ensure_dir(Stage::Transformation, &self.layout.transformed_dir())?;
        // matrices are only written once the preprocessor that produced them is on disk
        fitted.save(&outputs.preprocessor)?;
        let target = &self.data.target_column;
        for (table, path) in [
            (Table::from_matrix(feature_names.clone(), &x_train), &outputs.train_features),
            (Table::from_column(target, &y_train), &outputs.train_labels),
            (Table::from_matrix(feature_names.clone(), &x_test), &outputs.test_features),
            (Table::from_column(target, &y_test), &outputs.test_labels),
        ] {
            table
                .write_csv(path)
                .map_err(|e| PipelineError::persist(Stage::Transformation, path, e))?;
        }

        info!(
            features = ?feature_names,
            train_rows = x_train.len(),
            test_rows = x_test.len(),
            "data transformation completed"
        );

        Ok(TransformedData {
            x_train,
            x_test,
            y_train,
            y_test,
            feature_names,
            artifacts: outputs,
        })
    }

    /// Split a partition into its feature table and target values
    fn separate(&self, table: &Table, path: &Path) -> Result<(Table, Vec<f64>), TransformError> {
        let target = &self.data.target_column;
        if !table.has_column(target) {
            return Err(TransformError::MissingColumn {
                column: target.clone(),
                path: path.to_path_buf(),
            });
        }

        let values = table
            .numeric_column(target)?
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                value.ok_or_else(|| TransformError::MissingTarget {
                    column: target.clone(),
                    row,
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        let features = table
            .without_column(target)
            .without_column(&self.data.timestamp_column);
        Ok((features, values))
    }
}

fn require_columns(table: &Table, columns: &[String], path: &Path) -> Result<(), TransformError> {
    match columns.iter().find(|c| !table.has_column(c)) {
        Some(column) => Err(TransformError::MissingColumn {
            column: column.clone(),
            path: path.to_path_buf(),
        }),
        None => Ok(()),
    }
}
