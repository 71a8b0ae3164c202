use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, instrument};
use xgboost::parameters::learning::{
    EvaluationMetric, LearningTaskParametersBuilder, Metrics, Objective as XGBObjective,
};
use xgboost::parameters::tree::TreeBoosterParametersBuilder;
use xgboost::parameters::{
    BoosterParameters, BoosterParametersBuilder, BoosterType, TrainingParametersBuilder,
};
use xgboost::{Booster, DMatrix as XGBMatrix};

use super::traits::{Model, ModelFactory};
use crate::config::{BoosterParams, EvalMetric, Objective};
use crate::dataset::DMatrix;
use crate::error::{Error, Result};

const MODEL_FILE: &str = "model.xgb";
const META_FILE: &str = "xgboost.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct XGBoostMeta {
    params: BoosterParams,
    num_round: usize,
    num_feature: usize,
}

/// Native XGBoost booster. Per-round watchlist lines are emitted by
/// `Booster::train` through the `log` facade.
pub struct XGBoostModel {
    booster: Option<Booster>,
    params: BoosterParams,
    num_round: usize,
    num_feature: usize,
}

impl XGBoostModel {
    pub fn new(params: BoosterParams, num_round: usize) -> Self {
        Self {
            booster: None,
            params,
            num_round,
            num_feature: 0,
        }
    }

    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let meta: XGBoostMeta =
            serde_json::from_reader(BufReader::new(File::open(dir.join(META_FILE))?))?;
        Ok(Self {
            booster: Some(Booster::load(dir.join(MODEL_FILE))?),
            params: meta.params,
            num_round: meta.num_round,
            num_feature: meta.num_feature,
        })
    }

    pub fn num_class(&self) -> usize {
        self.params.num_class
    }

    pub fn num_boosted_rounds(&self) -> usize {
        if self.booster.is_some() {
            self.num_round
        } else {
            0
        }
    }

    fn booster_parameters(&self) -> Result<BoosterParameters> {
        let p = &self.params;
        let objective = match p.objective {
            Objective::MultiSoftmax => XGBObjective::MultiSoftmax(p.num_class as u32),
        };
        let metric = match p.eval_metric {
            EvalMetric::MLogLoss => EvaluationMetric::MultiClassLogLoss,
            EvalMetric::MError => EvaluationMetric::MultiClassErrorRate,
        };
        let learning_params = LearningTaskParametersBuilder::default()
            .objective(objective)
            .eval_metrics(Metrics::Custom(vec![metric]))
            .seed(p.seed)
            .build()
            .map_err(Error::Model)?;

        let tree_params = TreeBoosterParametersBuilder::default()
            .eta(p.eta as f32)
            .gamma(p.gamma as f32)
            .max_depth(p.max_depth as u32)
            .lambda(p.lambda as f32)
            .subsample(p.subsample as f32)
            .colsample_bytree(p.colsample_bytree as f32)
            .min_child_weight(p.min_child_weight as f32)
            .build()
            .map_err(Error::Model)?;

        BoosterParametersBuilder::default()
            .booster_type(BoosterType::Tree(tree_params))
            .learning_params(learning_params)
            .threads(Some(p.nthread as u32))
            .verbose(false)
            .build()
            .map_err(Error::Model)
    }

    fn check_features(&self, data: &DMatrix) -> Result<()> {
        if data.num_cols() != self.num_feature {
            return Err(Error::Model(format!(
                "expected {} features, got {}",
                self.num_feature,
                data.num_cols()
            )));
        }
        Ok(())
    }
}

impl Model for XGBoostModel {
    #[instrument(skip_all, fields(rows = train.num_rows(), rounds = self.num_round))]
    fn train(&mut self, train: &DMatrix, watchlist: &[(&DMatrix, &str)]) -> Result<()> {
        let k = self.params.num_class;
        train.check_labels(k)?;
        for (data, _) in watchlist {
            data.check_labels(k)?;
        }
        if train.num_rows() == 0 {
            return Err(Error::Model("training matrix is empty".to_string()));
        }

        let dtrain = to_xgb_matrix(train)?;
        let evals = watchlist
            .iter()
            .map(|(data, name)| Ok((to_xgb_matrix(data)?, *name)))
            .collect::<Result<Vec<_>>>()?;
        let eval_sets: Vec<(&XGBMatrix, &str)> =
            evals.iter().map(|(matrix, name)| (matrix, *name)).collect();

        let training_params = TrainingParametersBuilder::default()
            .dtrain(&dtrain)
            .boost_rounds(self.num_round as u32)
            .booster_params(self.booster_parameters()?)
            .evaluation_sets(if eval_sets.is_empty() {
                None
            } else {
                Some(&eval_sets[..])
            })
            .build()
            .map_err(Error::Model)?;

        self.booster = Some(Booster::train(&training_params)?);
        self.num_feature = train.num_cols();
        debug!(rounds = self.num_round, "Booster trained");
        Ok(())
    }

    fn predict(&self, data: &DMatrix) -> Result<Vec<f32>> {
        let booster = self
            .booster
            .as_ref()
            .ok_or_else(|| Error::Model("model not trained".to_string()))?;
        self.check_features(data)?;
        Ok(booster.predict(&to_xgb_matrix(data)?)?)
    }

    fn save(&self, dir: &Path) -> Result<()> {
        let booster = self
            .booster
            .as_ref()
            .ok_or_else(|| Error::Model("model not trained".to_string()))?;
        booster.save(dir.join(MODEL_FILE))?;
        let meta = XGBoostMeta {
            params: self.params.clone(),
            num_round: self.num_round,
            num_feature: self.num_feature,
        };
        fs::write(dir.join(META_FILE), serde_json::to_vec_pretty(&meta)?)?;
        Ok(())
    }

    fn flavor(&self) -> &'static str {
        "gbtree"
    }
}

impl ModelFactory for XGBoostModel {
    type ModelType = Self;

    fn create(params: &BoosterParams, num_round: usize) -> Result<Self::ModelType> {
        Ok(Self::new(params.clone(), num_round))
    }
}

fn to_xgb_matrix(data: &DMatrix) -> Result<XGBMatrix> {
    let mut matrix = XGBMatrix::from_dense(&data.to_dense(), data.num_rows())?;
    matrix.set_labels(data.get_label())?;
    Ok(matrix)
}
