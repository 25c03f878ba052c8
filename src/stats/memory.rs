//! Parsing of the single-value cgroup v2 memory files `memory.current` and
//! `memory.max`.

use super::SingleLineStat;
use super::error::{Result, StatParseError};

/// Current memory usage of a cgroup, from `memory.current`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct MemoryUsage {
    pub usage_bytes: u64,
}

/// Memory limit of a cgroup, from `memory.max`.
///
/// `None` means the kernel reported `max`, i.e. no limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct MemoryLimit {
    pub limit_bytes: Option<u64>,
}

fn parse_u64(value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|source| StatParseError::InvalidValue {
            value: value.to_string(),
            source,
        })
}

impl SingleLineStat for MemoryUsage {
    fn from_value(value: &str) -> Result<Self> {
        Ok(Self {
            usage_bytes: parse_u64(value)?,
        })
    }
}

impl SingleLineStat for MemoryLimit {
    fn from_value(value: &str) -> Result<Self> {
        if value == "max" {
            return Ok(Self { limit_bytes: None });
        }
        Ok(Self {
            limit_bytes: Some(parse_u64(value)?),
        })
    }
}
