//! The workload runtime as seen by the collector.
//!
//! A runtime reports point-in-time [`WorkloadStats`] for a workload and names
//! the network sandbox the workload is attached to. A workload that exists but
//! is not running is reported as [`RuntimeError::NotRunning`], which the
//! collector treats as an expected, silent condition.

mod cgroup;

use std::path::PathBuf;

pub use cgroup::{CgroupLine, CgroupLineError, CgroupRuntime, parse_cgroup_line};

use crate::fsutil::FileOpenError;
use crate::stats::{StatParseError, WorkloadStats};
use crate::workload::{SandboxID, WorkloadID};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("workload `{0}` is not running")]
    NotRunning(WorkloadID),
    #[error("unknown workload `{0}`")]
    UnknownWorkload(WorkloadID),
    #[error(transparent)]
    FileOpen(#[from] FileOpenError),
    #[error("failed to parse stat file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: StatParseError,
    },
    #[error("failed to read cgroup file `{path}`: {source}")]
    ReadCgroupFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid cgroup file `{path}`: {source}")]
    InvalidCgroupLine {
        path: PathBuf,
        #[source]
        source: CgroupLineError,
    },
    #[error("no cgroup v2 entry in `{path}`")]
    MissingUnifiedHierarchy { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Reports resource usage of individual workloads.
pub trait StatsProvider: Send + Sync {
    /// Returns the current counters of the workload.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::NotRunning`] if the workload is known but not
    /// currently running, any other variant on failure.
    fn stats(&self, id: &WorkloadID) -> Result<WorkloadStats>;

    /// Returns the network sandbox of the workload, if it has one.
    fn sandbox_id(&self, id: &WorkloadID) -> Option<SandboxID>;
}
