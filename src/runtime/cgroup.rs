use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use dashmap::DashMap;

use super::{Result, RuntimeError, StatsProvider};
use crate::fsutil;
use crate::stats::{
    self, CpuStat, KeyValueStat, MemoryLimit, MemoryUsage, SingleLineStat, WorkloadStats,
};
use crate::workload::{SandboxID, WorkloadID};

/// A workload tracked by [`CgroupRuntime`].
#[derive(Debug, Clone)]
struct MonitoredWorkload {
    pid: u32,
    cgroup_dir: PathBuf,
}

/// A [`StatsProvider`] reading cgroup v2 files of registered workloads.
///
/// The sandbox of a workload is its pid, so it pairs with
/// [`ProcNetController`](crate::network::ProcNetController).
#[derive(Debug)]
pub struct CgroupRuntime {
    rootfs: PathBuf,
    cgroup_root: PathBuf,
    workloads: DashMap<WorkloadID, MonitoredWorkload>,
}

impl CgroupRuntime {
    /// Creates a runtime resolving `proc/` below `rootfs` and cgroups below `cgroup_root`.
    pub fn new(rootfs: impl Into<PathBuf>, cgroup_root: impl Into<PathBuf>) -> Self {
        Self {
            rootfs: rootfs.into(),
            cgroup_root: cgroup_root.into(),
            workloads: DashMap::new(),
        }
    }

    /// Registers the workload whose init process is `pid`.
    ///
    /// The cgroup directory is resolved from `/proc/<pid>/cgroup`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cgroup file cannot be read or has no cgroup v2 entry.
    pub fn register(&self, id: WorkloadID, pid: u32) -> Result<()> {
        let cgroup_dir = self.resolve_cgroup_dir(pid)?;
        log::debug!("registered workload {id}: pid={pid}, cgroup={}", cgroup_dir.display());
        self.register_with_cgroup(id, pid, cgroup_dir);
        Ok(())
    }

    /// Registers a workload with an already known cgroup directory.
    pub fn register_with_cgroup(&self, id: WorkloadID, pid: u32, cgroup_dir: impl Into<PathBuf>) {
        self.workloads.insert(
            id,
            MonitoredWorkload {
                pid,
                cgroup_dir: cgroup_dir.into(),
            },
        );
    }

    pub fn unregister(&self, id: &WorkloadID) {
        self.workloads.remove(id);
    }

    fn resolve_cgroup_dir(&self, pid: u32) -> Result<PathBuf> {
        let path = self.rootfs.join(format!("proc/{pid}/cgroup"));
        let mut buf = fsutil::open_file_reader(&path)?;
        let mut line = String::with_capacity(255);

        loop {
            line.clear();
            let n = buf
                .read_line(&mut line)
                .map_err(|source| RuntimeError::ReadCgroupFile {
                    path: path.clone(),
                    source,
                })?;
            if n == 0 {
                return Err(RuntimeError::MissingUnifiedHierarchy { path });
            }

            let cgl = parse_cgroup_line(&line).map_err(|source| RuntimeError::InvalidCgroupLine {
                path: path.clone(),
                source,
            })?;
            if cgl.hierarchy_id != 0 || !cgl.controller_list.is_empty() {
                log::trace!("skipping cgroup v1 entry `{}`", line.trim());
                continue;
            }

            let cgroup_path = cgl.cgroup_path.strip_prefix('/').unwrap_or(cgl.cgroup_path);
            return Ok(self.cgroup_root.join(cgroup_path));
        }
    }
}

fn read_stat<T>(
    dir: &Path,
    file: &str,
    parse: impl FnOnce(&mut BufReader<File>) -> stats::Result<T>,
) -> Result<Option<T>> {
    let path = dir.join(file);
    let Some(mut reader) = fsutil::open_optional_file_reader(&path)? else {
        return Ok(None);
    };
    parse(&mut reader)
        .map(Some)
        .map_err(|source| RuntimeError::Parse { path, source })
}

fn read_workload_stats(cgroup_dir: &Path) -> Result<WorkloadStats> {
    Ok(WorkloadStats {
        cpu_stat: read_stat(cgroup_dir, "cpu.stat", CpuStat::from_reader)?,
        memory_usage: read_stat(cgroup_dir, "memory.current", |r| {
            <MemoryUsage as SingleLineStat>::from_reader(r)
        })?,
        memory_limit: read_stat(cgroup_dir, "memory.max", |r| {
            <MemoryLimit as SingleLineStat>::from_reader(r)
        })?,
    })
}

impl StatsProvider for CgroupRuntime {
    fn stats(&self, id: &WorkloadID) -> Result<WorkloadStats> {
        let cgroup_dir = self
            .workloads
            .get(id)
            .map(|w| w.cgroup_dir.clone())
            .ok_or_else(|| RuntimeError::UnknownWorkload(id.clone()))?;

        if !cgroup_dir.is_dir() {
            return Err(RuntimeError::NotRunning(id.clone()));
        }

        // The cgroup may vanish while its files are read.
        match read_workload_stats(&cgroup_dir) {
            Err(_) if !cgroup_dir.is_dir() => Err(RuntimeError::NotRunning(id.clone())),
            stats => stats,
        }
    }

    fn sandbox_id(&self, id: &WorkloadID) -> Option<SandboxID> {
        self.workloads
            .get(id)
            .map(|w| SandboxID::new(w.pid.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CgroupLineError {
    #[error("invalid cgroup line format: {0}")]
    InvalidFormat(String),
    #[error("invalid hierarchy id in cgroup line: {0}")]
    InvalidHierarchyID(String),
    #[error("too many separators: {0}")]
    TooManySeparators(String),
}

/// One line of `/proc/<pid>/cgroup`: `<hierarchy-id>:<controller-list>:<cgroup-path>`.
///
/// For cgroup v2 the hierarchy id is always `0` and the controller list is empty.
#[derive(Debug, PartialEq, Eq)]
pub struct CgroupLine<'a> {
    pub hierarchy_id: u32,
    pub controller_list: Vec<&'a str>,
    pub cgroup_path: &'a str,
}

pub fn parse_cgroup_line(line: &str) -> std::result::Result<CgroupLine<'_>, CgroupLineError> {
    let line = line.trim_end();
    let mut it = line.split(':');
    let hierarchy_id = it
        .next()
        .ok_or_else(|| CgroupLineError::InvalidFormat(line.to_owned()))?
        .parse::<u32>()
        .map_err(|_| CgroupLineError::InvalidHierarchyID(line.to_owned()))?;
    let controller_list = it
        .next()
        .ok_or_else(|| CgroupLineError::InvalidFormat(line.to_owned()))?;
    let controller_list: Vec<&str> = if controller_list.is_empty() {
        Vec::default()
    } else {
        controller_list.split(',').collect()
    };
    let cgroup_path = it
        .next()
        .ok_or_else(|| CgroupLineError::InvalidFormat(line.to_owned()))?;
    if it.next().is_some() {
        return Err(CgroupLineError::TooManySeparators(line.to_owned()));
    }

    Ok(CgroupLine {
        hierarchy_id,
        controller_list,
        cgroup_path,
    })
}
