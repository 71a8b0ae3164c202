use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use crate::dataset::{Dataset, FeatureRow, FEATURE_COLUMNS, NUM_FEATURES, TARGET_COLUMN};
use crate::error::{Error, Result};

/// DataLoader reads the precomputed sensor feature table from CSV
pub struct DataLoader {
    path: PathBuf,
}

impl DataLoader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the raw CSV into a DataFrame. Fails if the file is absent or
    /// cannot be parsed.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load_frame(&self) -> Result<DataFrame> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(self.path.clone()))?
            .finish()?;
        debug!(shape = ?df.shape(), "CSV loaded");
        Ok(df)
    }

    /// Loads the file and converts it into typed feature rows.
    pub fn load_dataset(&self) -> Result<Dataset> {
        let df = self.load_frame()?;
        let dataset = frame_to_dataset(df)?;
        info!(rows = dataset.len(), path = %self.path.display(), "Dataset loaded");
        Ok(dataset)
    }
}

/// Selects the feature and label columns (in matrix order) and converts each
/// row. Extra columns are ignored.
pub fn frame_to_dataset(df: DataFrame) -> Result<Dataset> {
    for name in FEATURE_COLUMNS.iter().chain(std::iter::once(&TARGET_COLUMN)) {
        if df.get_column_index(name).is_none() {
            return Err(Error::MissingColumn(name.to_string()));
        }
    }

    let mut columns: Vec<Expr> = FEATURE_COLUMNS
        .iter()
        .map(|name| col(*name).cast(DataType::Float32))
        .collect();
    columns.push(col(TARGET_COLUMN).cast(DataType::Float64));

    let frame = df.lazy().select(columns).collect()?;
    let height = frame.height();

    let mut features = vec![[0.0f32; NUM_FEATURES]; height];
    let mut labels = Vec::with_capacity(height);

    for (col_idx, series) in frame.iter().enumerate() {
        if col_idx < NUM_FEATURES {
            for (row_idx, value) in series.f32()?.into_iter().enumerate() {
                features[row_idx][col_idx] = value.ok_or_else(|| Error::NullValue {
                    column: FEATURE_COLUMNS[col_idx].to_string(),
                    row: row_idx,
                })?;
            }
        } else {
            for (row_idx, value) in series.f64()?.into_iter().enumerate() {
                let value = value.ok_or_else(|| Error::NullValue {
                    column: TARGET_COLUMN.to_string(),
                    row: row_idx,
                })?;
                labels.push(label_from_value(row_idx, value)?);
            }
        }
    }

    let rows = features
        .into_iter()
        .zip(labels)
        .map(|(features, label)| FeatureRow { features, label })
        .collect();
    Ok(Dataset::new(rows))
}

fn label_from_value(row: usize, value: f64) -> Result<u32> {
    if value.fract() != 0.0 || value < 0.0 || value > u32::MAX as f64 {
        return Err(Error::InvalidLabel { row, value });
    }
    Ok(value as u32)
}
