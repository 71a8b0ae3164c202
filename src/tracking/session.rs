use std::fs;
use tracing::{info, warn};

use super::records::{ArtifactRecord, MetricRecord, RunRecord, RunStatus};
use super::store::{validate_name, FileStore};
use crate::error::{Error, Result};
use crate::models::Model;

/// A run that is still open. Ending it records the final status; dropping it
/// without `end` records `Failed`, so a run never stays `Running` after the
/// session goes out of scope.
pub struct ActiveRun<'a> {
    store: &'a FileStore,
    run: RunRecord,
    ended: bool,
}

impl<'a> ActiveRun<'a> {
    pub(crate) fn new(store: &'a FileStore, run: RunRecord) -> Self {
        Self {
            store,
            run,
            ended: false,
        }
    }

    pub fn run_id(&self) -> &str {
        self.run.run_id()
    }

    pub fn record(&self) -> &RunRecord {
        &self.run
    }

    pub fn log_metric(&self, key: &str, value: f64) -> Result<MetricRecord> {
        validate_name("metric", key)?;
        let metric = MetricRecord::new(self.run.run_id(), key, 0, value);
        self.store.append_metric(self.run.experiment_id(), &metric)?;
        info!(key, value, "Logged metric");
        Ok(metric)
    }

    /// Saves `model` under `artifacts/<name>/` and records its descriptor.
    pub fn log_model(&self, name: &str, model: &dyn Model) -> Result<ArtifactRecord> {
        validate_name("artifact", name)?;
        let dir = self
            .store
            .artifact_dir(self.run.experiment_id(), self.run.run_id(), name);
        if dir.exists() {
            return Err(Error::Record(format!("artifact {name:?} already logged")));
        }
        fs::create_dir_all(&dir).map_err(|e| Error::store(&dir, e))?;

        let sealed = model.save(&dir).and_then(|()| {
            self.store
                .seal_artifact(&dir, self.run.run_id(), name, model.flavor())
        });
        let record = match sealed {
            Ok(record) => record,
            Err(err) => {
                // A half-written artifact would block any retry under the same name.
                if let Err(rm_err) = fs::remove_dir_all(&dir) {
                    warn!(name, %rm_err, "Failed to remove incomplete artifact");
                }
                return Err(err);
            }
        };
        info!(
            name,
            flavor = record.flavor(),
            hash = record.cas_hash(),
            bytes = record.size_bytes(),
            "Logged model"
        );
        Ok(record)
    }

    pub fn end(mut self, status: RunStatus) -> Result<RunRecord> {
        self.run.complete(status);
        self.store.write_run(&self.run)?;
        self.ended = true;
        info!(run_id = self.run.run_id(), ?status, "Run ended");
        Ok(self.run.clone())
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        self.run.complete(RunStatus::Failed);
        if let Err(err) = self.store.write_run(&self.run) {
            warn!(run_id = self.run.run_id(), %err, "Failed to finalize dropped run");
        } else {
            warn!(run_id = self.run.run_id(), "Run dropped without end; marked failed");
        }
    }
}
