//! Types describing one published resource-usage sample of a workload.
//!
//! # Main types
//!
//! - [`StatsSample`]: what subscribers receive. It combines the workload's own
//!   counters, the host-wide CPU usage of the tick that produced it, and the
//!   workload's network interface counters.
//! - [`WorkloadStats`]: point-in-time counters reported by the runtime for a
//!   single workload, parsed from cgroup v2 files.
//! - [`InterfaceCounters`]: cumulative counters of one network interface.
//!
//! Every counter is cumulative; rates are left to the consumer, which has to
//! diff two samples.

mod cpu;
mod error;
mod memory;
mod parser;

pub use cpu::CpuStat;
pub use error::{Result, StatParseError};
pub use memory::{MemoryLimit, MemoryUsage};
pub use parser::{KeyValueStat, SingleLineStat};

use crate::workload::WorkloadID;

/// Resource counters of a single workload as reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct WorkloadStats {
    /// CPU accounting from `cpu.stat`.
    pub cpu_stat: Option<CpuStat>,
    /// Memory usage from `memory.current`.
    pub memory_usage: Option<MemoryUsage>,
    /// Memory limit from `memory.max`.
    pub memory_limit: Option<MemoryLimit>,
}

/// Cumulative counters of one network interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct InterfaceCounters {
    pub name: String,
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub rx_dropped: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    pub tx_dropped: u64,
}

/// One sample delivered to the subscribers of a workload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StatsSample {
    workload_id: WorkloadID,
    stats: WorkloadStats,
    /// Host CPU time in nanoseconds since boot. Identical for every sample of one tick.
    system_usage: u64,
    interfaces: Vec<InterfaceCounters>,
}

impl StatsSample {
    pub fn new(workload_id: WorkloadID, stats: WorkloadStats, system_usage: u64) -> Self {
        Self {
            workload_id,
            stats,
            system_usage,
            interfaces: Vec::new(),
        }
    }

    /// Attaches the workload's network interface counters.
    pub fn with_interfaces(mut self, interfaces: Vec<InterfaceCounters>) -> Self {
        self.interfaces = interfaces;
        self
    }

    pub fn workload_id(&self) -> &WorkloadID {
        &self.workload_id
    }

    pub fn stats(&self) -> &WorkloadStats {
        &self.stats
    }

    pub fn system_usage(&self) -> u64 {
        self.system_usage
    }

    pub fn interfaces(&self) -> &[InterfaceCounters] {
        &self.interfaces
    }
}
