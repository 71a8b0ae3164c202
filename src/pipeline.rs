use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::data_loader::DataLoader;
use crate::dataset::DMatrix;
use crate::error::{Error, Result};
use crate::metrics::{error_rate, eval_metrics, RegressionMetrics};
use crate::models::{self, Model};
use crate::tracking::{ActiveRun, FileStore, RunStatus};

/// Artifact name the trained model is logged under.
pub const MODEL_ARTIFACT: &str = "model";

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub experiment_id: String,
    pub run_id: String,
    pub train_rows: usize,
    pub test_rows: usize,
    pub error_rate: f64,
    pub metrics: RegressionMetrics,
    pub predictions: Vec<f32>,
}

/// Load, split, train, evaluate and log one run.
#[instrument(skip_all, fields(data = %config.data_path.display()))]
pub fn run(config: &Config) -> Result<RunSummary> {
    config.validate()?;

    let dataset = DataLoader::new(&config.data_path).load_dataset()?;
    let (train, test) = dataset.train_test_split(config.split.test_size, config.split.seed)?;
    info!(train = train.len(), test = test.len(), "Split dataset");

    let xgtrain = DMatrix::from_dataset(&train);
    let xgtest = DMatrix::from_dataset(&test);
    let mut model = models::build(&config.booster, config.num_round)?;
    debug!(flavor = model.flavor(), ?config.booster, "Model configured");

    let store = FileStore::open(&config.tracking.root)?;
    let experiment = store.get_or_create_experiment(&config.tracking.experiment_name)?;
    let active = store.start_run(&experiment)?;

    match train_and_log(&active, model.as_mut(), &xgtrain, &xgtest) {
        Ok((error_rate, metrics, predictions)) => {
            let record = active.end(RunStatus::Success)?;
            Ok(RunSummary {
                experiment_id: record.experiment_id().to_string(),
                run_id: record.run_id().to_string(),
                train_rows: train.len(),
                test_rows: test.len(),
                error_rate,
                metrics,
                predictions,
            })
        }
        Err(err) => Err(fail_run(active, err)),
    }
}

/// Ends the run as `Failed` and hands back the error that caused it. A store
/// error while ending is only logged.
fn fail_run(active: ActiveRun<'_>, err: Error) -> Error {
    if let Err(end_err) = active.end(RunStatus::Failed) {
        warn!(%end_err, cause = %err, "Failed to mark run as failed");
    }
    err
}

fn train_and_log(
    active: &ActiveRun<'_>,
    model: &mut dyn Model,
    xgtrain: &DMatrix,
    xgtest: &DMatrix,
) -> Result<(f64, RegressionMetrics, Vec<f32>)> {
    let watchlist = [(xgtest, "eval"), (xgtrain, "train")];
    model.train(xgtrain, &watchlist)?;

    let preds = model.predict(xgtest)?;
    let labels = xgtest.get_label();
    let error_rate = error_rate(&preds, labels)?;
    let metrics = eval_metrics(labels, &preds)?;
    info!(error_rate, rmse = metrics.rmse, mae = metrics.mae, r2 = metrics.r2, "Evaluated test split");

    active.log_metric("rmse", metrics.rmse)?;
    active.log_metric("r2", metrics.r2)?;
    active.log_metric("mae", metrics.mae)?;
    active.log_model(MODEL_ARTIFACT, &*model)?;

    Ok((error_rate, metrics, preds))
}
