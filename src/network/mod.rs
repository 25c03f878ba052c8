//! Network counters of workloads.
//!
//! The network subsystem is reached through two traits:
//!
//! - [`NetworkController`] resolves the sandbox (network namespace) a workload
//!   is attached to.
//! - [`Sandbox`] reports raw per-interface counters of that sandbox.
//!
//! [`network_stats`] adapts those raw counters into [`InterfaceCounters`]
//! records for [`StatsSample`](crate::stats::StatsSample)s.
//! [`ProcNetController`] is the procfs-backed implementation used on Linux hosts.

mod procfs;

use std::collections::HashMap;

pub use procfs::{NetDevParseError, ProcNetController, ProcSandbox, parse_net_dev};

use crate::fsutil::FileOpenError;
use crate::stats::InterfaceCounters;
use crate::workload::SandboxID;

/// Raw counters of one interface as reported by a [`Sandbox`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceStatistics {
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub rx_dropped: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    pub tx_dropped: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("sandbox `{0}` not found")]
    SandboxNotFound(SandboxID),
    #[error("invalid sandbox id `{0}`")]
    InvalidSandboxID(SandboxID),
    #[error(transparent)]
    FileOpen(#[from] FileOpenError),
    #[error("failed to read statistics of sandbox `{sandbox}`: {source}")]
    Statistics {
        sandbox: SandboxID,
        #[source]
        source: NetDevParseError,
    },
}

pub type Result<T> = std::result::Result<T, NetworkError>;

/// Looks up network sandboxes by id.
pub trait NetworkController: Send + Sync {
    fn sandbox_by_id(&self, id: &SandboxID) -> Result<Box<dyn Sandbox>>;
}

/// A network sandbox owning one or more interfaces.
pub trait Sandbox: Send {
    /// Returns the raw counters of every interface, keyed by interface name.
    fn statistics(&self) -> Result<HashMap<String, InterfaceStatistics>>;
}

/// Returns the interface counters of the sandbox `sandbox_id`.
///
/// Each interface is converted 1:1; nothing is aggregated across interfaces.
/// The order of the returned list is unspecified.
///
/// # Errors
///
/// Returns the controller's error if the sandbox lookup fails, or the
/// sandbox's error if its statistics cannot be read.
pub fn network_stats(
    controller: &dyn NetworkController,
    sandbox_id: &SandboxID,
) -> Result<Vec<InterfaceCounters>> {
    let sandbox = controller.sandbox_by_id(sandbox_id)?;
    let stats = sandbox.statistics()?;

    Ok(stats
        .into_iter()
        .map(|(name, stats)| convert_interface_statistics(name, &stats))
        .collect())
}

fn convert_interface_statistics(name: String, stats: &InterfaceStatistics) -> InterfaceCounters {
    InterfaceCounters {
        name,
        rx_bytes: stats.rx_bytes,
        rx_packets: stats.rx_packets,
        rx_errors: stats.rx_errors,
        rx_dropped: stats.rx_dropped,
        tx_bytes: stats.tx_bytes,
        tx_packets: stats.tx_packets,
        tx_errors: stats.tx_errors,
        tx_dropped: stats.tx_dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSandbox(Result<HashMap<String, InterfaceStatistics>>);

    impl Sandbox for FakeSandbox {
        fn statistics(&self) -> Result<HashMap<String, InterfaceStatistics>> {
            match &self.0 {
                Ok(stats) => Ok(stats.clone()),
                Err(_) => Err(NetworkError::SandboxNotFound(SandboxID::new("gone"))),
            }
        }
    }

    struct FakeController {
        interfaces: HashMap<String, InterfaceStatistics>,
    }

    impl NetworkController for FakeController {
        fn sandbox_by_id(&self, id: &SandboxID) -> Result<Box<dyn Sandbox>> {
            match id.as_ref() {
                "sb-1" => Ok(Box::new(FakeSandbox(Ok(self.interfaces.clone())))),
                "sb-broken" => Ok(Box::new(FakeSandbox(Err(
                    NetworkError::SandboxNotFound(id.clone()),
                )))),
                _ => Err(NetworkError::SandboxNotFound(id.clone())),
            }
        }
    }

    fn controller() -> FakeController {
        let eth0 = InterfaceStatistics {
            rx_bytes: 1,
            rx_packets: 2,
            rx_errors: 3,
            rx_dropped: 4,
            tx_bytes: 5,
            tx_packets: 6,
            tx_errors: 7,
            tx_dropped: 8,
        };
        let eth1 = InterfaceStatistics {
            rx_bytes: 100,
            ..Default::default()
        };
        FakeController {
            interfaces: HashMap::from([("eth0".to_string(), eth0), ("eth1".to_string(), eth1)]),
        }
    }

    #[test]
    fn test_converts_each_interface() {
        let mut counters = network_stats(&controller(), &SandboxID::new("sb-1")).unwrap();
        counters.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(
            counters,
            vec![
                InterfaceCounters {
                    name: "eth0".to_string(),
                    rx_bytes: 1,
                    rx_packets: 2,
                    rx_errors: 3,
                    rx_dropped: 4,
                    tx_bytes: 5,
                    tx_packets: 6,
                    tx_errors: 7,
                    tx_dropped: 8,
                },
                InterfaceCounters {
                    name: "eth1".to_string(),
                    rx_bytes: 100,
                    ..Default::default()
                },
            ]
        );
    }

    #[test]
    fn test_lookup_failure() {
        let err = network_stats(&controller(), &SandboxID::new("unknown")).unwrap_err();
        assert!(matches!(err, NetworkError::SandboxNotFound(ref id) if id.as_ref() == "unknown"));
    }

    #[test]
    fn test_statistics_failure() {
        assert!(network_stats(&controller(), &SandboxID::new("sb-broken")).is_err());
    }
}
