//! Parsing of the cgroup v2 `cpu.stat` file.
//!
//! ```rust
//! use creo_stats::stats::{CpuStat, KeyValueStat};
//!
//! let data = "usage_usec 1000\nuser_usec 600\nsystem_usec 400\n";
//! let stat = CpuStat::from_reader(&mut data.as_bytes()).unwrap();
//! assert_eq!(stat.usage_usec, 1000);
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use super::KeyValueStat;

/// Cumulative CPU accounting of one cgroup.
///
/// Times are in microseconds (`_usec`), the rest are counts (`nr_*`).
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct CpuStat {
    /// Total CPU time consumed (user + system).
    pub usage_usec: u64,
    /// Time spent in user space.
    pub user_usec: u64,
    /// Time spent in kernel space.
    pub system_usec: u64,
    /// Enforcement periods that have elapsed.
    pub nr_periods: u64,
    /// Periods in which the cgroup was throttled.
    pub nr_throttled: u64,
    /// Total time the cgroup was throttled.
    pub throttled_usec: u64,
}

static CPU_STAT_HANDLERS: LazyLock<HashMap<&'static str, fn(&mut CpuStat, u64)>> =
    LazyLock::new(|| {
        let mut map: HashMap<&'static str, fn(&mut CpuStat, u64)> = HashMap::with_capacity(6);
        map.insert("usage_usec", |s, v| s.usage_usec = v);
        map.insert("user_usec", |s, v| s.user_usec = v);
        map.insert("system_usec", |s, v| s.system_usec = v);
        map.insert("nr_periods", |s, v| s.nr_periods = v);
        map.insert("nr_throttled", |s, v| s.nr_throttled = v);
        map.insert("throttled_usec", |s, v| s.throttled_usec = v);
        map
    });

impl KeyValueStat for CpuStat {
    const ALLOW_DUPLICATE_KEYS: bool = false;

    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &CPU_STAT_HANDLERS
    }
}
