//! End-to-end runs of the training pipeline against a scratch tracking store.

use std::fs;
use std::path::Path;

use wear_boost::config::{BoosterKind, Config};
use wear_boost::dataset::{FEATURE_COLUMNS, TARGET_COLUMN};
use wear_boost::pipeline;
use wear_boost::tracking::{FileStore, RunStatus};
use wear_boost::{Error, GbdtOneVsRest};

/// 20 rows, class 1 dominant (14 rows), two rows each of 0, 2 and 3.
fn write_dominant_class_csv(path: &Path) {
    let labels = [1, 1, 0, 1, 1, 2, 1, 1, 3, 1, 1, 0, 1, 1, 2, 1, 1, 3, 1, 1];
    let mut out = String::new();
    out.push_str(&FEATURE_COLUMNS.join(","));
    out.push(',');
    out.push_str(TARGET_COLUMN);
    out.push('\n');
    for (i, label) in labels.iter().enumerate() {
        let values: Vec<String> = (0..FEATURE_COLUMNS.len())
            .map(|j| format!("{:.3}", (*label as f32) * 2.0 + ((i * 3 + j) % 7) as f32 * 0.05))
            .collect();
        out.push_str(&values.join(","));
        out.push_str(&format!(",{label}\n"));
    }
    fs::write(path, out).unwrap();
}

fn config_for(dir: &Path) -> Config {
    let data_path = dir.join("weardatafeature.csv");
    write_dominant_class_csv(&data_path);

    let mut config = Config::default();
    config.data_path = data_path;
    config.tracking.root = dir.join("mlruns");
    config.booster.booster = BoosterKind::GbdtOneVsRest;
    config.booster.nthread = 2;
    config
}

#[test]
fn test_run_logs_three_metrics_and_one_model() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());

    let summary = pipeline::run(&config).unwrap();

    assert_eq!(summary.train_rows + summary.test_rows, 20);
    assert_eq!(summary.test_rows, 5);
    assert!((0.0..=1.0).contains(&summary.error_rate));
    assert!(summary.metrics.rmse >= 0.0);
    assert!(summary.metrics.mae >= 0.0);
    assert!(summary.metrics.r2 <= 1.0);
    assert!(summary
        .predictions
        .iter()
        .all(|p| [0.0, 1.0, 2.0, 3.0].contains(p)));

    let store = FileStore::open(&config.tracking.root).unwrap();
    let run = store.get_run(&summary.experiment_id, &summary.run_id).unwrap();
    assert_eq!(run.status(), RunStatus::Success);

    let metrics = store
        .metrics_for_run(&summary.experiment_id, &summary.run_id)
        .unwrap();
    let keys: Vec<&str> = metrics.iter().map(|m| m.key()).collect();
    assert_eq!(keys, ["mae", "r2", "rmse"]);

    let artifacts = store
        .artifacts_for_run(&summary.experiment_id, &summary.run_id)
        .unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].key(), pipeline::MODEL_ARTIFACT);
}

#[test]
fn test_logged_model_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    let summary = pipeline::run(&config).unwrap();

    let store = FileStore::open(&config.tracking.root).unwrap();
    let model_dir = store.artifact_dir(
        &summary.experiment_id,
        &summary.run_id,
        pipeline::MODEL_ARTIFACT,
    );
    let model = GbdtOneVsRest::load(model_dir).unwrap();
    assert_eq!(model.num_boosted_rounds(), config.num_round);
    assert_eq!(model.num_class(), 4);
}

#[test]
fn test_fixed_seed_repeats_partitions_and_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(dir.path());
    config.split.seed = Some(42);
    // gbdt draws its row and feature samples from thread_rng.
    config.booster.subsample = 1.0;
    config.booster.colsample_bytree = 1.0;

    let first = pipeline::run(&config).unwrap();
    let second = pipeline::run(&config).unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.predictions, second.predictions);
    assert_eq!(first.metrics, second.metrics);
    assert_eq!(first.error_rate, second.error_rate);

    let store = FileStore::open(&config.tracking.root).unwrap();
    assert_eq!(store.list_runs(&first.experiment_id).unwrap().len(), 2);
}

#[test]
fn test_gbdt_one_vs_rest_artifact_flavor() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(dir.path());
    config.num_round = 3;

    let summary = pipeline::run(&config).unwrap();
    assert!((0.0..=1.0).contains(&summary.error_rate));

    let store = FileStore::open(&config.tracking.root).unwrap();
    let artifacts = store
        .artifacts_for_run(&summary.experiment_id, &summary.run_id)
        .unwrap();
    assert_eq!(artifacts[0].flavor(), "gbdt-ovr");
}

#[cfg(feature = "xgboost")]
#[test]
fn test_xgboost_backend_logs_reloadable_model() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(dir.path());
    config.booster.booster = BoosterKind::GbTree;
    config.split.seed = Some(7);

    let summary = pipeline::run(&config).unwrap();
    assert!(summary
        .predictions
        .iter()
        .all(|p| [0.0, 1.0, 2.0, 3.0].contains(p)));

    let store = FileStore::open(&config.tracking.root).unwrap();
    let artifacts = store
        .artifacts_for_run(&summary.experiment_id, &summary.run_id)
        .unwrap();
    assert_eq!(artifacts[0].flavor(), "gbtree");

    let model_dir = store.artifact_dir(
        &summary.experiment_id,
        &summary.run_id,
        pipeline::MODEL_ARTIFACT,
    );
    let model = wear_boost::XGBoostModel::load(model_dir).unwrap();
    assert_eq!(model.num_boosted_rounds(), config.num_round);
}

#[cfg(not(feature = "xgboost"))]
#[test]
fn test_gbtree_without_feature_fails_before_any_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(dir.path());
    config.booster.booster = BoosterKind::GbTree;

    assert!(matches!(pipeline::run(&config), Err(Error::InvalidConfig(_))));
    assert!(!config.tracking.root.exists());
}

#[test]
fn test_training_failure_marks_run_failed() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(dir.path());
    // id 3 is outside 0..3
    config.booster.num_class = 3;

    let result = pipeline::run(&config);
    assert!(matches!(result, Err(Error::LabelOutOfRange { .. })));

    let store = FileStore::open(&config.tracking.root).unwrap();
    let runs = store.list_runs("0").unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status(), RunStatus::Failed);
    assert!(store
        .metrics_for_run("0", runs[0].run_id())
        .unwrap()
        .is_empty());
}

#[test]
fn test_missing_column_fails_before_any_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(dir.path());
    let csv = fs::read_to_string(&config.data_path).unwrap();
    let broken = dir.path().join("broken.csv");
    fs::write(&broken, csv.replacen("x_avg", "x_mean", 1)).unwrap();
    config.data_path = broken;

    assert!(matches!(pipeline::run(&config), Err(Error::MissingColumn(name)) if name == "x_avg"));
    assert!(!config.tracking.root.exists());
}

#[test]
fn test_missing_file_is_a_data_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_path = dir.path().join("absent.csv");
    config.tracking.root = dir.path().join("mlruns");

    assert!(pipeline::run(&config).is_err());
}
