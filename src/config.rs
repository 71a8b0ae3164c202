use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::Level;

use crate::error::{Error, Result};

/// Everything a training run needs. The defaults are the constants the
/// pipeline has always used, so running without a config file trains the
/// same model on the same data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_path: PathBuf,
    pub num_round: usize,
    pub log_level: String,
    pub split: SplitParams,
    pub booster: BoosterParams,
    pub tracking: TrackingParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitParams {
    /// Fraction of rows held out for evaluation.
    pub test_size: f64,
    /// `None` shuffles from entropy, so partitions differ between runs.
    pub seed: Option<u64>,
}

/// Which backend trains the model. `gbtree` is only available with the
/// `xgboost` feature, and is the default when it is enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoosterKind {
    #[serde(rename = "gbtree")]
    #[cfg_attr(feature = "xgboost", default)]
    GbTree,
    #[serde(rename = "gbdt-ovr")]
    #[cfg_attr(not(feature = "xgboost"), default)]
    GbdtOneVsRest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Objective {
    #[serde(rename = "multi:softmax")]
    MultiSoftmax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvalMetric {
    #[serde(rename = "mlogloss")]
    MLogLoss,
    #[serde(rename = "merror")]
    MError,
}

impl EvalMetric {
    pub fn name(self) -> &'static str {
        match self {
            Self::MLogLoss => "mlogloss",
            Self::MError => "merror",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoosterParams {
    pub booster: BoosterKind,
    pub objective: Objective,
    pub num_class: usize,
    /// Minimum loss reduction required to keep a split.
    pub gamma: f64,
    pub max_depth: usize,
    /// L2 regularization on leaf weights.
    pub lambda: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub min_child_weight: f64,
    /// Learning rate.
    pub eta: f64,
    pub seed: u64,
    pub nthread: usize,
    pub eval_metric: EvalMetric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingParams {
    pub root: PathBuf,
    pub experiment_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("../data/weardatafeature.csv"),
            num_round: 10,
            log_level: "info".to_string(),
            split: SplitParams::default(),
            booster: BoosterParams::default(),
            tracking: TrackingParams::default(),
        }
    }
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            test_size: 0.25,
            seed: None,
        }
    }
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            booster: BoosterKind::default(),
            objective: Objective::MultiSoftmax,
            num_class: 4,
            gamma: 0.1,
            max_depth: 12,
            lambda: 2.0,
            subsample: 0.7,
            colsample_bytree: 0.7,
            min_child_weight: 3.0,
            eta: 0.007,
            seed: 1000,
            nthread: 4,
            eval_metric: EvalMetric::MLogLoss,
        }
    }
}

impl Default for TrackingParams {
    fn default() -> Self {
        Self {
            root: PathBuf::from("mlruns"),
            experiment_name: "Default".to_string(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path` when it exists, otherwise falls back to the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        let split = &self.split;
        if !(split.test_size > 0.0 && split.test_size < 1.0) {
            return Err(invalid(format!(
                "split.test_size must be in (0, 1), got {}",
                split.test_size
            )));
        }
        if self.num_round == 0 {
            return Err(invalid("num_round must be at least 1"));
        }
        self.log_level()?;

        let b = &self.booster;
        if b.booster == BoosterKind::GbTree && !cfg!(feature = "xgboost") {
            return Err(invalid("booster \"gbtree\" needs the `xgboost` feature"));
        }
        if b.num_class < 2 {
            return Err(invalid(format!("num_class must be at least 2, got {}", b.num_class)));
        }
        if b.max_depth == 0 {
            return Err(invalid("max_depth must be at least 1"));
        }
        for (name, ratio) in [("subsample", b.subsample), ("colsample_bytree", b.colsample_bytree)] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(invalid(format!("{name} must be in (0, 1], got {ratio}")));
            }
        }
        if b.eta <= 0.0 {
            return Err(invalid(format!("eta must be positive, got {}", b.eta)));
        }
        if b.lambda < 0.0 || b.gamma < 0.0 || b.min_child_weight < 0.0 {
            return Err(invalid("lambda, gamma and min_child_weight must be non-negative"));
        }
        if b.nthread == 0 {
            return Err(invalid("nthread must be at least 1"));
        }
        Ok(())
    }

    pub fn log_level(&self) -> Result<Level> {
        Level::from_str(&self.log_level)
            .map_err(|_| invalid(format!("unknown log_level {:?}", self.log_level)))
    }
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidConfig(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_training_constants() {
        let config = Config::default();
        assert_eq!(config.num_round, 10);
        assert_eq!(config.booster.num_class, 4);
        assert_eq!(config.booster.max_depth, 12);
        assert!((config.booster.eta - 0.007).abs() < 1e-12);
        assert!((config.split.test_size - 0.25).abs() < 1e-12);
        assert!(config.split.seed.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            num_round = 3

            [booster]
            booster = "gbdt-ovr"
            eval_metric = "merror"
            nthread = 1

            [split]
            seed = 42
            "#,
        )
        .unwrap();

        assert_eq!(config.num_round, 3);
        assert_eq!(config.booster.booster, BoosterKind::GbdtOneVsRest);
        assert_eq!(config.booster.eval_metric, EvalMetric::MError);
        assert_eq!(config.booster.max_depth, 12);
        assert_eq!(config.split.seed, Some(42));
        assert_eq!(config.tracking.experiment_name, "Default");
    }

    #[test]
    fn test_validate_rejects_bad_ratios() {
        let mut config = Config::default();
        config.split.test_size = 1.0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = Config::default();
        config.booster.subsample = 0.0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = Config::default();
        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_backend_follows_features() {
        let config = Config::default();
        if cfg!(feature = "xgboost") {
            assert_eq!(config.booster.booster, BoosterKind::GbTree);
        } else {
            assert_eq!(config.booster.booster, BoosterKind::GbdtOneVsRest);
        }
    }

    #[cfg(not(feature = "xgboost"))]
    #[test]
    fn test_gbtree_without_feature_is_rejected() {
        let mut config = Config::default();
        config.booster.booster = BoosterKind::GbTree;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let config = Config::load_or_default("does/not/exist.toml").unwrap();
        assert_eq!(config, Config::default());
    }
}
