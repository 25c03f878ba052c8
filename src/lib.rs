//! Creo Stats: periodic resource-usage sampling of running workloads, fanned
//! out to any number of concurrent subscribers.
//!
//! A [`collector::Collector`] ticks at a fixed interval. Each tick it takes
//! one host CPU sample, reads the cgroup v2 counters and network interface
//! counters of every workload somebody is subscribed to, and publishes one
//! [`stats::StatsSample`] per workload through that workload's
//! [`broker::Broker`]. Workloads nobody observes are never sampled.
pub mod broker;
pub mod collector;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod network;
pub mod registry;
pub mod runtime;
pub mod sampler;
pub mod stats;
pub mod workload;

use std::io::Write;
use std::sync::Arc;

use collector::Collector;
use config::Config;
use network::ProcNetController;
use registry::Registry;
use runtime::CgroupRuntime;
use sampler::ProcStatSampler;

/// Samples the workloads configured through the environment and prints every
/// sample as one JSON document per line on stdout.
///
/// Returns once every subscription has ended.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or a configured workload
/// cannot be resolved to its cgroup.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    log::debug!("Configuration: {config:?}");

    let runtime = Arc::new(CgroupRuntime::new(&config.rootfs, &config.cgroup_root));
    for (id, pid) in &config.workloads {
        runtime.register(id.clone(), *pid)?;
        log::info!("Monitoring workload {id} (pid {pid})");
    }
    if config.workloads.is_empty() {
        log::warn!(
            "No workloads configured, set `{}` to `<id>=<pid>,...`",
            config::WORKLOADS_VAR
        );
    }

    let registry = Arc::new(Registry::new(config.buffer));
    let handle = Collector::new(
        registry,
        runtime,
        Arc::new(ProcNetController::new(&config.rootfs)),
        Arc::new(ProcStatSampler::new(config.rootfs.join("proc/stat"))),
    )
    .start(config.interval);

    let mut printers = tokio::task::JoinSet::new();
    for (id, _) in &config.workloads {
        let mut subscription = handle.subscribe(id);
        let id = id.clone();
        printers.spawn(async move {
            while let Some(sample) = subscription.recv().await {
                let line = match serde_json::to_string(&*sample) {
                    Ok(line) => line,
                    Err(err) => {
                        log::error!("Failed to serialize sample of {id}: {err}");
                        continue;
                    }
                };
                if let Err(err) = writeln!(std::io::stdout().lock(), "{line}") {
                    log::error!("Failed to write sample of {id}: {err}");
                    break;
                }
            }
            log::info!("Subscription to {id} ended");
        });
    }

    while let Some(res) = printers.join_next().await {
        res?;
    }
    Ok(())
}
