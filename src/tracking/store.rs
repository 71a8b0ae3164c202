//! File-backed tracking store.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<experiment_id>/meta.json
//! <root>/<experiment_id>/<run_id>/meta.json
//! <root>/<experiment_id>/<run_id>/metrics/<key>        "<timestamp_ms> <value> <step>" per line
//! <root>/<experiment_id>/<run_id>/artifacts/<name>/    model files + MLmodel.json
//! ```

use chrono::DateTime;
use glob::{glob, Pattern};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use super::records::{ArtifactRecord, ExperimentRecord, MetricRecord, RunRecord};
use super::session::ActiveRun;
use crate::error::{Error, Result};

const META_FILE: &str = "meta.json";
pub const ARTIFACT_META_FILE: &str = "MLmodel.json";

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| Error::store(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn list_experiments(&self) -> Result<Vec<ExperimentRecord>> {
        let mut experiments: Vec<ExperimentRecord> = self
            .glob_files(&[Pattern::escape(&self.root.to_string_lossy()), "*".into(), META_FILE.into()])?
            .iter()
            .map(|path| read_json(path))
            .collect::<Result<_>>()?;
        experiments.sort_by_key(|e| e.experiment_id().parse::<u64>().unwrap_or(u64::MAX));
        Ok(experiments)
    }

    /// Looks an experiment up by name, creating it with the next free
    /// numeric id when absent.
    pub fn get_or_create_experiment(&self, name: &str) -> Result<ExperimentRecord> {
        let experiments = self.list_experiments()?;
        if let Some(existing) = experiments.iter().find(|e| e.name() == name) {
            return Ok(existing.clone());
        }

        let next_id = experiments
            .iter()
            .filter_map(|e| e.experiment_id().parse::<u64>().ok())
            .max()
            .map_or(0, |id| id + 1);
        let experiment = ExperimentRecord::new(next_id.to_string(), name);
        let dir = self.root.join(experiment.experiment_id());
        fs::create_dir_all(&dir).map_err(|e| Error::store(&dir, e))?;
        write_json(&dir.join(META_FILE), &experiment)?;
        info!(experiment_id = experiment.experiment_id(), name, "Created experiment");
        Ok(experiment)
    }

    /// Starts a new run. The returned session finalizes the run when ended
    /// or dropped.
    pub fn start_run(&self, experiment: &ExperimentRecord) -> Result<ActiveRun<'_>> {
        let run_id = Uuid::new_v4().simple().to_string();
        let run = RunRecord::start(run_id, experiment.experiment_id());
        let dir = self.run_dir(run.experiment_id(), run.run_id());
        for sub in ["metrics", "artifacts"] {
            let path = dir.join(sub);
            fs::create_dir_all(&path).map_err(|e| Error::store(&path, e))?;
        }
        self.write_run(&run)?;
        info!(run_id = run.run_id(), experiment_id = run.experiment_id(), "Run started");
        Ok(ActiveRun::new(self, run))
    }

    pub fn get_run(&self, experiment_id: &str, run_id: &str) -> Result<RunRecord> {
        read_json(&self.run_dir(experiment_id, run_id).join(META_FILE))
    }

    pub fn list_runs(&self, experiment_id: &str) -> Result<Vec<RunRecord>> {
        let exp_dir = self.root.join(experiment_id);
        let mut runs: Vec<RunRecord> = self
            .glob_files(&[Pattern::escape(&exp_dir.to_string_lossy()), "*".into(), META_FILE.into()])?
            .iter()
            .map(|path| read_json(path))
            .collect::<Result<_>>()?;
        runs.sort_by_key(RunRecord::started_at);
        Ok(runs)
    }

    /// All metric points of a run, ordered by key then step.
    pub fn metrics_for_run(&self, experiment_id: &str, run_id: &str) -> Result<Vec<MetricRecord>> {
        let metrics_dir = self.run_dir(experiment_id, run_id).join("metrics");
        let mut metrics = Vec::new();
        for path in self.glob_files(&[Pattern::escape(&metrics_dir.to_string_lossy()), "*".into()])? {
            let key = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let contents = fs::read_to_string(&path).map_err(|e| Error::store(&path, e))?;
            for line in contents.lines().filter(|l| !l.trim().is_empty()) {
                metrics.push(parse_metric_line(run_id, &key, line)?);
            }
        }
        metrics.sort_by(|a, b| a.key().cmp(b.key()).then(a.step().cmp(&b.step())));
        Ok(metrics)
    }

    pub fn artifacts_for_run(&self, experiment_id: &str, run_id: &str) -> Result<Vec<ArtifactRecord>> {
        let artifacts_dir = self.run_dir(experiment_id, run_id).join("artifacts");
        let mut artifacts: Vec<ArtifactRecord> = self
            .glob_files(&[
                Pattern::escape(&artifacts_dir.to_string_lossy()),
                "*".into(),
                ARTIFACT_META_FILE.into(),
            ])?
            .iter()
            .map(|path| read_json(path))
            .collect::<Result<_>>()?;
        artifacts.sort_by(|a, b| a.key().cmp(b.key()));
        Ok(artifacts)
    }

    pub fn artifact_dir(&self, experiment_id: &str, run_id: &str, name: &str) -> PathBuf {
        self.run_dir(experiment_id, run_id).join("artifacts").join(name)
    }

    pub(crate) fn run_dir(&self, experiment_id: &str, run_id: &str) -> PathBuf {
        self.root.join(experiment_id).join(run_id)
    }

    pub(crate) fn write_run(&self, run: &RunRecord) -> Result<()> {
        let path = self.run_dir(run.experiment_id(), run.run_id()).join(META_FILE);
        write_json(&path, run)?;
        debug!(run_id = run.run_id(), status = ?run.status(), "Run record written");
        Ok(())
    }

    pub(crate) fn append_metric(&self, experiment_id: &str, metric: &MetricRecord) -> Result<()> {
        let path = self
            .run_dir(experiment_id, metric.run_id())
            .join("metrics")
            .join(metric.key());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::store(&path, e))?;
        writeln!(
            file,
            "{} {} {}",
            metric.timestamp().timestamp_millis(),
            metric.value(),
            metric.step()
        )
        .map_err(|e| Error::store(&path, e))
    }

    /// Hashes the files in an artifact directory and writes its descriptor.
    pub(crate) fn seal_artifact(
        &self,
        dir: &Path,
        run_id: &str,
        name: &str,
        flavor: &str,
    ) -> Result<ArtifactRecord> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| Error::store(dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .filter(|path| path.file_name().map_or(true, |n| n != ARTIFACT_META_FILE))
            .collect();
        files.sort();

        let mut hasher = Sha256::new();
        let mut size_bytes = 0u64;
        let mut names = Vec::with_capacity(files.len());
        for path in &files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let bytes = fs::read(path).map_err(|e| Error::store(path, e))?;
            hasher.update(name.as_bytes());
            hasher.update(&bytes);
            size_bytes += bytes.len() as u64;
            names.push(name);
        }
        let cas_hash = format!("sha256:{:x}", hasher.finalize());

        let record = ArtifactRecord::new(run_id, name, flavor, cas_hash, size_bytes, names);
        write_json(&dir.join(ARTIFACT_META_FILE), &record)?;
        Ok(record)
    }

    fn glob_files(&self, parts: &[String]) -> Result<Vec<PathBuf>> {
        let pattern = parts.join("/");
        let paths = glob(&pattern)
            .map_err(|e| Error::Record(format!("bad glob pattern {pattern}: {e}")))?
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect();
        Ok(paths)
    }
}

/// Metric and artifact names become file names.
pub(crate) fn validate_name(kind: &str, name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ' '));
    if ok {
        Ok(())
    } else {
        Err(Error::Record(format!("invalid {kind} name {name:?}")))
    }
}

fn parse_metric_line(run_id: &str, key: &str, line: &str) -> Result<MetricRecord> {
    let bad = || Error::Record(format!("malformed metric line for {key}: {line:?}"));
    let mut fields = line.split_whitespace();
    let millis: i64 = fields.next().and_then(|v| v.parse().ok()).ok_or_else(bad)?;
    let value: f64 = fields.next().and_then(|v| v.parse().ok()).ok_or_else(bad)?;
    let step: u64 = fields.next().and_then(|v| v.parse().ok()).ok_or_else(bad)?;
    let timestamp = DateTime::from_timestamp_millis(millis).ok_or_else(bad)?;
    Ok(MetricRecord::with_timestamp(run_id, key, step, value, timestamp))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(path, bytes).map_err(|e| Error::store(path, e))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|e| Error::store(path, e))?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_experiment_ids_are_sequential_and_reused_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let default = store.get_or_create_experiment("Default").unwrap();
        let other = store.get_or_create_experiment("wear").unwrap();
        let again = store.get_or_create_experiment("Default").unwrap();

        assert_eq!(default.experiment_id(), "0");
        assert_eq!(other.experiment_id(), "1");
        assert_eq!(again, default);
        assert_eq!(store.list_experiments().unwrap().len(), 2);
    }

    #[test]
    fn test_metric_lines_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let experiment = store.get_or_create_experiment("Default").unwrap();
        let run = store.start_run(&experiment).unwrap();
        let run_id = run.run_id().to_string();

        run.log_metric("rmse", 0.123_456_789).unwrap();
        run.log_metric("mae", 2.5).unwrap();
        run.end(crate::tracking::RunStatus::Success).unwrap();

        let metrics = store.metrics_for_run("0", &run_id).unwrap();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].key(), "mae");
        assert_eq!(metrics[1].key(), "rmse");
        assert_eq!(metrics[1].value(), 0.123_456_789);
        assert_eq!(metrics[1].step(), 0);
    }

    #[test]
    fn test_malformed_metric_line() {
        assert!(parse_metric_line("r", "rmse", "123 abc 0").is_err());
        assert!(parse_metric_line("r", "rmse", "123 1.5").is_err());
        let metric = parse_metric_line("r", "rmse", "1700000000000 1.5 3").unwrap();
        assert_eq!(metric.step(), 3);
        assert_eq!(metric.timestamp().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("metric", "rmse").is_ok());
        assert!(validate_name("metric", "eval-mlogloss").is_ok());
        assert!(validate_name("metric", "../escape").is_err());
        assert!(validate_name("metric", "").is_err());
        assert!(validate_name("artifact", "a/b").is_err());
    }
}
