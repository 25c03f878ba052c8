use std::collections::HashMap;
use std::io::BufRead;
use std::num::ParseIntError;
use std::path::PathBuf;

use super::{InterfaceStatistics, NetworkController, NetworkError, Result, Sandbox};
use crate::fsutil;
use crate::workload::SandboxID;

/// Number of counter columns per interface in `/proc/<pid>/net/dev`.
const NET_DEV_FIELDS: usize = 16;

/// Column of the first transmit counter.
const TX_OFFSET: usize = 8;

const LOOPBACK_INTERFACE: &str = "lo";

#[derive(Debug, thiserror::Error)]
pub enum NetDevParseError {
    #[error("interface `{iface}` has {found} counters, expected {expected}", expected = NET_DEV_FIELDS)]
    TooFewFields { iface: String, found: usize },
    #[error("invalid counter `{value}` for interface `{iface}`: {source}")]
    InvalidValue {
        iface: String,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("error during I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolves sandboxes through procfs: a sandbox id is the pid of a process
/// living in the workload's network namespace.
#[derive(Debug, Clone)]
pub struct ProcNetController {
    rootfs: PathBuf,
}

impl ProcNetController {
    /// Creates a controller resolving `proc/` below `rootfs`.
    pub fn new(rootfs: impl Into<PathBuf>) -> Self {
        Self {
            rootfs: rootfs.into(),
        }
    }
}

impl NetworkController for ProcNetController {
    fn sandbox_by_id(&self, id: &SandboxID) -> Result<Box<dyn Sandbox>> {
        let pid = id
            .as_ref()
            .parse::<u32>()
            .map_err(|_| NetworkError::InvalidSandboxID(id.clone()))?;

        let proc_dir = self.rootfs.join(format!("proc/{pid}"));
        if !proc_dir.is_dir() {
            return Err(NetworkError::SandboxNotFound(id.clone()));
        }

        Ok(Box::new(ProcSandbox {
            id: id.clone(),
            net_dev_path: proc_dir.join("net/dev"),
        }))
    }
}

/// A network namespace observed through `/proc/<pid>/net/dev`.
#[derive(Debug)]
pub struct ProcSandbox {
    id: SandboxID,
    net_dev_path: PathBuf,
}

impl Sandbox for ProcSandbox {
    fn statistics(&self) -> Result<HashMap<String, InterfaceStatistics>> {
        let mut reader = fsutil::open_file_reader(&self.net_dev_path)?;
        parse_net_dev(&mut reader).map_err(|source| NetworkError::Statistics {
            sandbox: self.id.clone(),
            source,
        })
    }
}

/// Parses a `/proc/net/dev` formatted stream into per-interface counters.
///
/// The two header lines are skipped and the loopback interface is left out.
///
/// # Errors
///
/// Returns a [`NetDevParseError`] if reading fails, an interface line has
/// fewer than 16 counters, or a used counter is not an unsigned integer.
pub fn parse_net_dev<R: BufRead>(
    buf: &mut R,
) -> std::result::Result<HashMap<String, InterfaceStatistics>, NetDevParseError> {
    let mut interfaces = HashMap::new();
    let mut line = String::new();

    for _ in 0..2 {
        buf.read_line(&mut line)?;
        line.clear();
    }

    while buf.read_line(&mut line)? != 0 {
        if let Some((iface, data)) = line.trim().split_once(':') {
            let iface = iface.trim();
            if iface != LOOPBACK_INTERFACE {
                let fields: Vec<&str> = data.split_whitespace().collect();
                let stats = stats_from_fields(iface, &fields)?;
                interfaces.insert(iface.to_string(), stats);
            }
        }
        line.clear();
    }

    Ok(interfaces)
}

fn stats_from_fields(
    iface: &str,
    fields: &[&str],
) -> std::result::Result<InterfaceStatistics, NetDevParseError> {
    if fields.len() < NET_DEV_FIELDS {
        return Err(NetDevParseError::TooFewFields {
            iface: iface.to_string(),
            found: fields.len(),
        });
    }

    let field = |idx: usize| {
        fields[idx]
            .parse::<u64>()
            .map_err(|source| NetDevParseError::InvalidValue {
                iface: iface.to_string(),
                value: fields[idx].to_string(),
                source,
            })
    };

    Ok(InterfaceStatistics {
        rx_bytes: field(0)?,
        rx_packets: field(1)?,
        rx_errors: field(2)?,
        rx_dropped: field(3)?,
        tx_bytes: field(TX_OFFSET)?,
        tx_packets: field(TX_OFFSET + 1)?,
        tx_errors: field(TX_OFFSET + 2)?,
        tx_dropped: field(TX_OFFSET + 3)?,
    })
}
