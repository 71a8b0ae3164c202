use std::path::PathBuf;

use polars::error::PolarsError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Data loading error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Null value in column {column} at row {row}")]
    NullValue { column: String, row: usize },

    #[error("Invalid label {value} at row {row}: expected a non-negative integer")]
    InvalidLabel { row: usize, value: f64 },

    #[error("Label {label} at row {row} is outside 0..{num_class}")]
    LabelOutOfRange {
        row: usize,
        label: f32,
        num_class: usize,
    },

    #[error("Length mismatch: {expected} labels but {actual} values")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Split of {rows} rows with test_size {test_size} leaves an empty partition")]
    EmptySplit { rows: usize, test_size: f64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Model error: {0}")]
    Model(String),

    #[cfg(feature = "xgboost")]
    #[error("XGBoost error: {0}")]
    XGBoost(#[from] xgboost::XGBError),

    #[error("Tracking store error at {path}: {source}")]
    Store {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Tracking record error: {0}")]
    Record(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn store(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Store {
            path: path.into(),
            source,
        }
    }
}
