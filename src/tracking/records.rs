//! Records persisted by the tracking store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named group of runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentRecord {
    experiment_id: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl ExperimentRecord {
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run is executing and still accepts metrics and artifacts.
    Running,
    /// Run ended normally.
    Success,
    /// Run ended on an error, or was dropped without being ended.
    Failed,
}

/// One execution of an experiment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    run_id: String,
    experiment_id: String,
    status: RunStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    /// Create a run in `Running` state, started now.
    #[must_use]
    pub fn start(run_id: impl Into<String>, experiment_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            experiment_id: experiment_id.into(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Finalize the run with `status` and stamp the end time.
    pub fn complete(&mut self, status: RunStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }
}

/// A single scalar metric point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    run_id: String,
    key: String,
    step: u64,
    value: f64,
    timestamp: DateTime<Utc>,
}

impl MetricRecord {
    #[must_use]
    pub fn new(run_id: impl Into<String>, key: impl Into<String>, step: u64, value: f64) -> Self {
        Self::with_timestamp(run_id, key, step, value, Utc::now())
    }

    #[must_use]
    pub fn with_timestamp(
        run_id: impl Into<String>,
        key: impl Into<String>,
        step: u64,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            key: key.into(),
            step,
            value,
            timestamp,
        }
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub const fn step(&self) -> u64 {
        self.step
    }

    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Descriptor of a logged model directory.
///
/// `cas_hash` is `sha256:<hex>` over the artifact's files, taken in name
/// order, each contributing its name followed by its contents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRecord {
    run_id: String,
    key: String,
    flavor: String,
    cas_hash: String,
    size_bytes: u64,
    files: Vec<String>,
    created_at: DateTime<Utc>,
}

impl ArtifactRecord {
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        key: impl Into<String>,
        flavor: impl Into<String>,
        cas_hash: impl Into<String>,
        size_bytes: u64,
        files: Vec<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            key: key.into(),
            flavor: flavor.into(),
            cas_hash: cas_hash.into(),
            size_bytes,
            files,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn flavor(&self) -> &str {
        &self.flavor
    }

    #[must_use]
    pub fn cas_hash(&self) -> &str {
        &self.cas_hash
    }

    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    #[must_use]
    pub fn files(&self) -> &[String] {
        &self.files
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
