use std::path::PathBuf;
use std::time::Duration;

use crate::broker::{DEFAULT_BUFFER, MAX_BUFFER};
use crate::workload::WorkloadID;

pub const INTERVAL_VAR: &str = "CREO_STATS_INTERVAL_MS";
pub const BUFFER_VAR: &str = "CREO_STATS_BUFFER";
pub const ROOTFS_VAR: &str = "ROOTFS_MOUNT_PATH";
pub const CGROUP_ROOT_VAR: &str = "CGROUP_ROOT";
pub const WORKLOADS_VAR: &str = "CREO_STATS_WORKLOADS";

const DEFAULT_INTERVAL_MS: u64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for `{var}`: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::InvalidValue {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Settings of the `creo-stats` binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub interval: Duration,
    pub buffer: usize,
    pub rootfs: PathBuf,
    pub cgroup_root: PathBuf,
    /// Workloads to monitor together with the pid of their init process.
    pub workloads: Vec<(WorkloadID, u32)>,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let interval_ms = match lookup(INTERVAL_VAR) {
            Some(raw) => parse_positive(INTERVAL_VAR, &raw)?,
            None => DEFAULT_INTERVAL_MS,
        };
        let buffer = match lookup(BUFFER_VAR) {
            Some(raw) => parse_buffer(&raw)?,
            None => DEFAULT_BUFFER,
        };

        let rootfs = lookup(ROOTFS_VAR)
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/"));
        let cgroup_root = lookup(CGROUP_ROOT_VAR)
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| rootfs.join("sys/fs/cgroup"));

        let workloads = match lookup(WORKLOADS_VAR) {
            Some(raw) => parse_workloads(&raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            interval: Duration::from_millis(interval_ms),
            buffer,
            rootfs,
            cgroup_root,
            workloads,
        })
    }
}

fn parse_positive(var: &'static str, raw: &str) -> Result<u64> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::invalid(var, raw, "must be greater than zero")),
        Ok(value) => Ok(value),
        Err(err) => Err(ConfigError::invalid(var, raw, err)),
    }
}

fn parse_buffer(raw: &str) -> Result<usize> {
    let buffer = parse_positive(BUFFER_VAR, raw)?;
    match usize::try_from(buffer) {
        Ok(buffer) if buffer <= MAX_BUFFER => Ok(buffer),
        _ => Err(ConfigError::invalid(
            BUFFER_VAR,
            raw,
            format!("must not exceed {MAX_BUFFER}"),
        )),
    }
}

/// Parses `<workload-id>=<pid>` pairs separated by commas. Empty items are skipped.
fn parse_workloads(raw: &str) -> Result<Vec<(WorkloadID, u32)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (id, pid) = item
                .split_once('=')
                .ok_or_else(|| ConfigError::invalid(WORKLOADS_VAR, item, "expected `<id>=<pid>`"))?;
            let id = WorkloadID::new(id.trim())
                .map_err(|err| ConfigError::invalid(WORKLOADS_VAR, item, err))?;
            let pid = pid
                .trim()
                .parse::<u32>()
                .map_err(|err| ConfigError::invalid(WORKLOADS_VAR, item, err))?;
            Ok((id, pid))
        })
        .collect()
}
