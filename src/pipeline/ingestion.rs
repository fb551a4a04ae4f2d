//! Ingestion stage: raw CSV in, feature-augmented raw/train/test CSVs out

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::artifacts::{self, ArtifactLayout};
use crate::config::{DataConfig, SplitConfig};
use crate::error::{PipelineError, Result, Stage};
use crate::features::{CalendarFeatures, TimestampParser, CALENDAR_COLUMNS};
use crate::table::{parse_cell, Table};
use crate::telemetry::StageContext;

/// Paths written by [`DataIngestion::split`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionArtifacts {
    pub train: PathBuf,
    pub test: PathBuf,
    pub raw: PathBuf,
    pub train_rows: usize,
    pub test_rows: usize,
}

pub struct DataIngestion {
    data: DataConfig,
    split: SplitConfig,
    layout: ArtifactLayout,
    ctx: StageContext,
}

impl DataIngestion {
    pub fn new(data: DataConfig, split: SplitConfig, layout: ArtifactLayout, ctx: StageContext) -> Self {
        Self {
            data,
            split,
            layout,
            ctx,
        }
    }

    /// Load `source`, derive calendar features, split and persist.
    ///
    /// Raw rows keep source order; train and test rows follow the shuffled
    /// index order.
    pub fn split(&self, source: &Path) -> Result<IngestionArtifacts> {
        let _guard = self.ctx.span().enter();
        info!(source = %source.display(), "starting data ingestion");

        let raw = self.load(source)?;
        let (train_idx, test_idx) = shuffle_split(raw.len(), self.split.test_ratio, self.split.seed)
            .ok_or_else(|| {
                PipelineError::data_load(
                    Stage::Ingestion,
                    source,
                    format!(
                        "{} rows cannot be split at test ratio {} with both partitions non-empty",
                        raw.len(),
                        self.split.test_ratio
                    ),
                )
            })?;

        let train = raw.select_rows(&train_idx);
        let test = raw.select_rows(&test_idx);

        artifacts::ensure_dir(Stage::Ingestion, &self.layout.data_dir())?;
        let outputs = IngestionArtifacts {
            train: self.layout.train_data(),
            test: self.layout.test_data(),
            raw: self.layout.raw_data(),
            train_rows: train.len(),
            test_rows: test.len(),
        };
        for (table, path) in [(&raw, &outputs.raw), (&train, &outputs.train), (&test, &outputs.test)] {
            table
                .write_csv(path)
                .map_err(|e| PipelineError::persist(Stage::Ingestion, path, e))?;
        }

        info!(
            rows = raw.len(),
            train_rows = outputs.train_rows,
            test_rows = outputs.test_rows,
            "data ingestion completed"
        );
        Ok(outputs)
    }

    /// Source table with the calendar columns appended
    fn load(&self, source: &Path) -> Result<Table> {
        let fail = |msg: String| PipelineError::data_load(Stage::Ingestion, source, msg);

        for column in [&self.data.timestamp_column, &self.data.target_column] {
            if CALENDAR_COLUMNS.contains(&column.as_str()) {
                return Err(fail(format!(
                    "column '{column}' would be overwritten by the derived calendar feature"
                )));
            }
        }

        let table = Table::read_csv(source)
            .map_err(|e| PipelineError::data_load(Stage::Ingestion, source, e))?;

        let ts_col = table
            .column_index(&self.data.timestamp_column)
            .ok_or_else(|| fail(format!("timestamp column '{}' not found", self.data.timestamp_column)))?;
        let target_col = table
            .column_index(&self.data.target_column)
            .ok_or_else(|| fail(format!("target column '{}' not found", self.data.target_column)))?;
        if table.len() < 2 {
            return Err(fail(format!("need at least 2 rows, found {}", table.len())));
        }

        let parser = TimestampParser::new(self.data.timestamp_format.clone());
        let mut calendar = Vec::with_capacity(table.len());
        for (row, cells) in table.rows().iter().enumerate() {
            let raw_ts = cells.get(ts_col).map(String::as_str).unwrap_or("");
            let timestamp = parser
                .parse(raw_ts)
                .ok_or_else(|| fail(format!("unparsable timestamp '{raw_ts}' at row {row}")))?;

            // empty targets pass through; transformation rejects them
            let raw_target = cells.get(target_col).map(String::as_str).unwrap_or("");
            if parse_cell(raw_target).is_none() {
                return Err(fail(format!(
                    "target '{raw_target}' at row {row} is not a finite number"
                )));
            }

            calendar.push(CalendarFeatures::from_timestamp(timestamp).to_cells());
        }

        // derived columns replace same-named source columns
        let mut base = table;
        for column in CALENDAR_COLUMNS {
            if base.has_column(column) {
                debug!(column, "replacing source column with derived feature");
                base = base.without_column(column);
            }
        }

        let mut headers = base.headers().to_vec();
        headers.extend(CALENDAR_COLUMNS.iter().map(|c| c.to_string()));
        let mut augmented = Table::new(headers);
        for (cells, derived) in base.rows().iter().zip(calendar) {
            let mut row = cells.clone();
            row.extend(derived);
            augmented.push_row(row);
        }
        Ok(augmented)
    }
}

/// Seeded shuffle of `0..n` into (train, test) index lists.
///
/// The test partition takes the first `ceil(n * test_ratio)` shuffled
/// indices. `None` when either partition would be empty.
pub fn shuffle_split(n: usize, test_ratio: f64, seed: u64) -> Option<(Vec<usize>, Vec<usize>)> {
    // the epsilon absorbs representation error such as 0.2 * 5
    let n_test = (n as f64 * test_ratio - 1e-9).ceil().max(0.0) as usize;
    if n_test == 0 || n_test >= n {
        return None;
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Some((train, indices))
}
