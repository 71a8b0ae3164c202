use gbdt::{config::Config as GBDTConfig, gradient_boost::GBDT};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info, instrument};

use super::traits::{IntoDataVec, Model, ModelFactory};
use crate::config::{BoosterParams, EvalMetric};
use crate::dataset::DMatrix;
use crate::error::{Error, Result};
use crate::metrics::{argmax, merror, multi_logloss, softmax_in_place};

const META_FILE: &str = "ovr.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OvrMeta {
    params: BoosterParams,
    num_round: usize,
    num_feature: usize,
}

/// One binary `gbdt` model per class; the highest score wins.
pub struct GbdtOneVsRest {
    params: BoosterParams,
    num_round: usize,
    num_feature: usize,
    models: Vec<GBDT>,
}

impl GbdtOneVsRest {
    pub fn new(params: BoosterParams, num_round: usize) -> Self {
        Self {
            params,
            num_round,
            num_feature: 0,
            models: Vec::new(),
        }
    }

    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let meta: OvrMeta = serde_json::from_reader(BufReader::new(File::open(dir.join(META_FILE))?))?;
        let models = (0..meta.params.num_class)
            .map(|class| {
                let path = class_model_path(dir, class)?;
                GBDT::load_model(&path).map_err(|e| Error::Model(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            params: meta.params,
            num_round: meta.num_round,
            num_feature: meta.num_feature,
            models,
        })
    }

    pub fn num_class(&self) -> usize {
        self.params.num_class
    }

    pub fn num_boosted_rounds(&self) -> usize {
        if self.models.is_empty() {
            0
        } else {
            self.num_round
        }
    }

    fn gbdt_config(&self) -> GBDTConfig {
        let mut config = GBDTConfig::new();
        config.set_feature_size(self.num_feature);
        config.set_max_depth(self.params.max_depth as u32);
        config.set_iterations(self.num_round);
        config.set_shrinkage(self.params.eta as f32);
        config.set_loss("LogLikelyhood");
        // Margins start at 0 (p = 0.5). The fitted log-odds bias is infinite
        // for a class with no rows in the training split.
        config.enabled_initial_guess(true);
        config.set_debug(false);
        config.set_data_sample_ratio(self.params.subsample);
        config.set_feature_sample_ratio(self.params.colsample_bytree);
        config.set_training_optimization_level(2);
        config
    }

    /// Row-major per-class scores.
    fn scores(&self, data: &DMatrix) -> Result<Vec<f32>> {
        if self.models.is_empty() {
            return Err(Error::Model("model not trained".to_string()));
        }
        if data.num_cols() != self.num_feature {
            return Err(Error::Model(format!(
                "expected {} features, got {}",
                self.num_feature,
                data.num_cols()
            )));
        }
        let test_data = data.into_data_vec();
        let k = self.models.len();
        let mut scores = vec![0.0f32; data.num_rows() * k];
        for (class, model) in self.models.iter().enumerate() {
            for (row, score) in model.predict(&test_data).into_iter().enumerate() {
                scores[row * k + class] = score;
            }
        }
        Ok(scores)
    }

    /// `[round]\t<name>-<metric>:<value>...` for the last boosted round.
    fn eval_line(&self, watchlist: &[(&DMatrix, &str)]) -> Result<String> {
        let k = self.models.len();
        let metric = self.params.eval_metric;
        let mut line = format!("[{}]", self.num_round.saturating_sub(1));
        for (data, name) in watchlist {
            // Scores are independent per class; softmax turns them into a
            // distribution for the log loss.
            let mut probs = self.scores(data)?;
            softmax_in_place(&mut probs, k);
            let value = match metric {
                EvalMetric::MLogLoss => multi_logloss(&probs, data.get_label(), k)?,
                EvalMetric::MError => merror(&probs, data.get_label(), k)?,
            };
            line.push_str(&format!("\t{name}-{}:{value:.5}", metric.name()));
        }
        Ok(line)
    }
}

impl Model for GbdtOneVsRest {
    #[instrument(skip_all, fields(rows = train.num_rows(), classes = self.params.num_class))]
    fn train(&mut self, train: &DMatrix, watchlist: &[(&DMatrix, &str)]) -> Result<()> {
        let k = self.params.num_class;
        train.check_labels(k)?;
        for (data, _) in watchlist {
            data.check_labels(k)?;
        }
        if train.num_rows() == 0 {
            return Err(Error::Model("training matrix is empty".to_string()));
        }
        self.num_feature = train.num_cols();

        let config = self.gbdt_config();
        self.models = (0..k)
            .map(|class| {
                let mut train_data = train.into_one_vs_rest(class);
                let mut gbdt = GBDT::new(&config);
                gbdt.fit(&mut train_data);
                debug!(class, "One-vs-rest model fitted");
                gbdt
            })
            .collect();

        if !watchlist.is_empty() {
            let line = self.eval_line(watchlist)?;
            info!("{line}");
        }
        Ok(())
    }

    fn predict(&self, data: &DMatrix) -> Result<Vec<f32>> {
        let k = self.models.len();
        Ok(self
            .scores(data)?
            .chunks(k)
            .map(|row| argmax(row) as f32)
            .collect())
    }

    fn save(&self, dir: &Path) -> Result<()> {
        for (class, model) in self.models.iter().enumerate() {
            let path = class_model_path(dir, class)?;
            model
                .save_model(&path)
                .map_err(|e| Error::Model(e.to_string()))?;
        }
        let meta = OvrMeta {
            params: self.params.clone(),
            num_round: self.num_round,
            num_feature: self.num_feature,
        };
        fs::write(dir.join(META_FILE), serde_json::to_vec_pretty(&meta)?)?;
        Ok(())
    }

    fn flavor(&self) -> &'static str {
        "gbdt-ovr"
    }
}

impl ModelFactory for GbdtOneVsRest {
    type ModelType = Self;

    fn create(params: &BoosterParams, num_round: usize) -> Result<Self::ModelType> {
        Ok(Self::new(params.clone(), num_round))
    }
}

fn class_model_path(dir: &Path, class: usize) -> Result<String> {
    let path = dir.join(format!("class_{class}.model"));
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| Error::Model(format!("non UTF-8 model path {}", path.display())))
}
