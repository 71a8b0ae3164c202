//! Local run tracking.
//!
//! ```text
//! ExperimentRecord (1) ──< RunRecord (N)
//!                              ├──< MetricRecord (N)
//!                              └──< ArtifactRecord (N)
//! ```
//!
//! A run is opened with [`FileStore::start_run`] and lives as an
//! [`ActiveRun`] until it is ended or dropped.

mod records;
mod session;
mod store;

pub use records::{ArtifactRecord, ExperimentRecord, MetricRecord, RunRecord, RunStatus};
pub use session::ActiveRun;
pub use store::{FileStore, ARTIFACT_META_FILE};
