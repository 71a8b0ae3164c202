pub mod config;
pub mod data_loader;
pub mod dataset;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod tracking;

pub use config::Config;
pub use data_loader::DataLoader;
pub use dataset::{DMatrix, Dataset, FeatureRow};
pub use error::{Error, Result};
pub use models::{GbdtOneVsRest, Model};
#[cfg(feature = "xgboost")]
pub use models::XGBoostModel;
pub use pipeline::RunSummary;
