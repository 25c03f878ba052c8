//! Host-wide CPU usage sampling.
//!
//! Reads the aggregate `cpu` line of `/proc/stat` (see `proc_stat(5)`), sums
//! the first seven tick counters (user, nice, system, idle, iowait, irq,
//! softirq) and converts them to nanoseconds using the clock tick rate of the
//! host. The result is cumulative since boot; rates need two samples.

use std::io::BufRead;
use std::num::ParseIntError;
use std::path::PathBuf;

use crate::fsutil;

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Number of tick counters summed from the `cpu` line.
const CPU_FIELDS: usize = 7;

/// Errors that may occur while sampling host CPU usage.
#[derive(Debug, thiserror::Error)]
pub enum SystemUsageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid number of cpu fields: expected at least {expected}, found {found}")]
    MalformedFieldCount { expected: usize, found: usize },
    #[error("unable to convert value `{value}` to int: {source}")]
    MalformedFieldValue {
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("invalid stat format: no `cpu` line found")]
    MalformedFormat,
}

pub type Result<T> = std::result::Result<T, SystemUsageError>;

/// A source of cumulative host CPU usage.
pub trait SystemUsageSource: Send + Sync {
    /// Returns the host's cumulative CPU time in nanoseconds.
    fn sample(&self) -> Result<u64>;
}

/// Samples host CPU usage from a `/proc/stat` formatted file.
#[derive(Debug, Clone)]
pub struct ProcStatSampler {
    path: PathBuf,
    clock_ticks_per_second: u64,
}

impl ProcStatSampler {
    /// Creates a sampler for `path`, capturing the host's clock tick rate once.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_clock_ticks(path, clock_ticks_per_second())
    }

    /// Creates a sampler with an explicit clock tick rate.
    pub fn with_clock_ticks(path: impl Into<PathBuf>, clock_ticks_per_second: u64) -> Self {
        Self {
            path: path.into(),
            clock_ticks_per_second: clock_ticks_per_second.max(1),
        }
    }
}

impl SystemUsageSource for ProcStatSampler {
    fn sample(&self) -> Result<u64> {
        let mut reader = fsutil::open_file_reader(&self.path).map_err(|err| err.source)?;
        system_cpu_usage(&mut reader, self.clock_ticks_per_second)
    }
}

/// Parses a `/proc/stat` formatted stream and returns the host CPU usage in
/// nanoseconds.
///
/// # Errors
///
/// - [`SystemUsageError::Io`] if reading fails.
/// - [`SystemUsageError::MalformedFieldCount`] if the `cpu` line has fewer than
///   seven counters.
/// - [`SystemUsageError::MalformedFieldValue`] if one of the seven counters is
///   not an unsigned integer.
/// - [`SystemUsageError::MalformedFormat`] if the stream has no `cpu` line.
///
/// # Examples
///
/// ```
/// use creo_stats::sampler::system_cpu_usage;
///
/// let data = "cpu 10 20 30 40 50 60 70 999\n";
/// let usage = system_cpu_usage(&mut data.as_bytes(), 100).unwrap();
/// assert_eq!(usage, 2_800_000_000);
/// ```
pub fn system_cpu_usage<R: BufRead>(buf: &mut R, clock_ticks_per_second: u64) -> Result<u64> {
    let mut line = String::with_capacity(128);
    while buf.read_line(&mut line)? != 0 {
        let mut parts = line.split_whitespace();
        if parts.next() != Some("cpu") {
            line.clear();
            continue;
        }

        let fields: Vec<&str> = parts.take(CPU_FIELDS).collect();
        if fields.len() < CPU_FIELDS {
            return Err(SystemUsageError::MalformedFieldCount {
                expected: CPU_FIELDS + 1,
                found: fields.len() + 1,
            });
        }

        let mut total_ticks: u128 = 0;
        for field in fields {
            let ticks =
                field
                    .parse::<u64>()
                    .map_err(|source| SystemUsageError::MalformedFieldValue {
                        value: field.to_string(),
                        source,
                    })?;
            total_ticks += u128::from(ticks);
        }

        let nanos = total_ticks * NANOS_PER_SECOND / u128::from(clock_ticks_per_second.max(1));
        return Ok(u64::try_from(nanos).unwrap_or(u64::MAX));
    }

    Err(SystemUsageError::MalformedFormat)
}

/// Returns the number of clock ticks per second (`USER_HZ`) of the host.
fn clock_ticks_per_second() -> u64 {
    // SAFETY: `sysconf` only reads a system constant and has no side effects.
    let hz = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if hz > 0 { hz as u64 } else { 100 }
}
