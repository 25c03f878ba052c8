//! The periodic sampling loop.
//!
//! On every tick the collector copies the registered `(workload, broker)`
//! pairs out of the [`Registry`], takes one host CPU sample shared by all of
//! them, fetches each workload's stats on the blocking pool, decorates them
//! with network counters and publishes the result through the workload's
//! broker. Nothing is sampled while nobody is subscribed.
//!
//! Errors never leave a tick: a failed host sample skips the whole tick, a
//! failed workload is skipped for this tick only, and a workload that is not
//! running is skipped without logging.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::broker::Subscription;
use crate::error::ResultOkLogExt;
use crate::network::{self, NetworkController};
use crate::registry::Registry;
use crate::runtime::{RuntimeError, StatsProvider};
use crate::sampler::SystemUsageSource;
use crate::stats::StatsSample;
use crate::workload::WorkloadID;

const LOG_TARGET: &str = "stats collector";

/// Samples registered workloads and publishes their stats.
pub struct Collector {
    registry: Arc<Registry>,
    runtime: Arc<dyn StatsProvider>,
    network: Arc<dyn NetworkController>,
    system: Arc<dyn SystemUsageSource>,
}

impl Collector {
    pub fn new(
        registry: Arc<Registry>,
        runtime: Arc<dyn StatsProvider>,
        network: Arc<dyn NetworkController>,
        system: Arc<dyn SystemUsageSource>,
    ) -> Self {
        Self {
            registry,
            runtime,
            network,
            system,
        }
    }

    /// Spawns the collection loop on the current tokio runtime, ticking every `interval`.
    ///
    /// The loop runs for the lifetime of the runtime; there is no way to stop it.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero or if called outside of a tokio runtime.
    pub fn start(self, interval: Duration) -> CollectorHandle {
        let registry = Arc::clone(&self.registry);
        tokio::spawn(self.run(interval));
        CollectorHandle { registry }
    }

    async fn run(self, interval: Duration) {
        let mut interval = tokio::time::interval(interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    /// Runs a single collection cycle.
    pub async fn tick(&self) {
        let pairs = self.registry.snapshot();
        if pairs.is_empty() {
            return;
        }

        let before = Instant::now();
        let system = Arc::clone(&self.system);
        let system_usage = match tokio::task::spawn_blocking(move || system.sample()).await {
            Ok(Ok(system_usage)) => system_usage,
            Ok(Err(err)) => {
                log::error!(target: LOG_TARGET, "collecting system cpu usage: {err}");
                return;
            }
            Err(err) => {
                log::error!(target: LOG_TARGET, "collecting system cpu usage: task failed: {err}");
                return;
            }
        };

        let mut tasks = JoinSet::new();
        for (id, broker) in pairs {
            let runtime = Arc::clone(&self.runtime);
            let network = Arc::clone(&self.network);
            tasks.spawn_blocking(move || {
                let published = collect_sample(&*runtime, &*network, &id, system_usage)
                    .map(|sample| broker.publish(sample));
                (id, broker, published)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, broker, Some(0))) => {
                    if self.registry.release_if_idle(&id, &broker) {
                        log::debug!(target: LOG_TARGET, "released workload {id}: no subscription left");
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    log::error!(target: LOG_TARGET, "collecting workload stats: task failed: {err}")
                }
            }
        }

        log::trace!(
            target: LOG_TARGET,
            "collection tick took {} nanoseconds",
            before.elapsed().as_nanos()
        );
    }
}

/// Builds the sample of one workload, or `None` if it has to be skipped this tick.
fn collect_sample(
    runtime: &dyn StatsProvider,
    network: &dyn NetworkController,
    id: &WorkloadID,
    system_usage: u64,
) -> Option<StatsSample> {
    let stats = match runtime.stats(id) {
        Ok(stats) => stats,
        Err(RuntimeError::NotRunning(_)) => return None,
        Err(err) => {
            log::error!(target: LOG_TARGET, "collecting stats for {id}: {err}");
            return None;
        }
    };

    let mut sample = StatsSample::new(id.clone(), stats, system_usage);
    if let Some(sandbox_id) = runtime.sandbox_id(id) {
        if let Some(interfaces) = network::network_stats(network, &sandbox_id)
            .ok_log(&format_args!("collecting network stats for {id}"))
        {
            sample = sample.with_interfaces(interfaces);
        }
    }
    Some(sample)
}

/// Subscription surface of a started [`Collector`].
#[derive(Debug, Clone)]
pub struct CollectorHandle {
    registry: Arc<Registry>,
}

impl CollectorHandle {
    /// Starts delivering samples of `id` to a new subscription.
    pub fn subscribe(&self, id: &WorkloadID) -> Subscription {
        self.registry.subscribe(id)
    }

    /// Ends one subscription of `id`.
    pub fn unsubscribe(&self, id: &WorkloadID, subscription: &Subscription) {
        self.registry.unsubscribe(id, subscription)
    }

    /// Ends every subscription of `id` and stops sampling it.
    pub fn stop_collection(&self, id: &WorkloadID) {
        self.registry.stop_collection(id)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::network::{InterfaceStatistics, NetworkError, Sandbox};
    use crate::sampler::SystemUsageError;
    use crate::stats::WorkloadStats;
    use crate::workload::SandboxID;

    #[derive(Default)]
    struct FakeSystem {
        calls: AtomicUsize,
        fail: bool,
    }

    impl SystemUsageSource for FakeSystem {
        fn sample(&self) -> crate::sampler::Result<u64> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as u64;
            if self.fail {
                return Err(SystemUsageError::MalformedFormat);
            }
            Ok(1_000 + n)
        }
    }

    #[derive(Default)]
    struct FakeRuntime {
        not_running: HashSet<String>,
        failing: HashSet<String>,
        slow: HashSet<String>,
    }

    impl StatsProvider for FakeRuntime {
        fn stats(&self, id: &WorkloadID) -> crate::runtime::Result<WorkloadStats> {
            if self.slow.contains(id.as_ref()) {
                std::thread::sleep(Duration::from_millis(300));
            }
            if self.not_running.contains(id.as_ref()) {
                return Err(RuntimeError::NotRunning(id.clone()));
            }
            if self.failing.contains(id.as_ref()) {
                return Err(RuntimeError::UnknownWorkload(id.clone()));
            }
            Ok(WorkloadStats::default())
        }

        fn sandbox_id(&self, id: &WorkloadID) -> Option<SandboxID> {
            Some(SandboxID::new(id.as_ref()))
        }
    }

    struct FakeSandbox;

    impl Sandbox for FakeSandbox {
        fn statistics(&self) -> crate::network::Result<HashMap<String, InterfaceStatistics>> {
            Ok(HashMap::from([(
                "eth0".to_string(),
                InterfaceStatistics {
                    rx_bytes: 42,
                    ..Default::default()
                },
            )]))
        }
    }

    /// Knows every sandbox except `no-net`.
    struct FakeNetwork;

    impl NetworkController for FakeNetwork {
        fn sandbox_by_id(&self, id: &SandboxID) -> crate::network::Result<Box<dyn Sandbox>> {
            if id.as_ref() == "no-net" {
                return Err(NetworkError::SandboxNotFound(id.clone()));
            }
            Ok(Box::new(FakeSandbox))
        }
    }

    fn id(raw: &str) -> WorkloadID {
        WorkloadID::new(raw).unwrap()
    }

    fn collector(runtime: FakeRuntime, system: Arc<FakeSystem>) -> (Collector, CollectorHandle) {
        let registry = Arc::new(Registry::default());
        let collector = Collector::new(
            Arc::clone(&registry),
            Arc::new(runtime),
            Arc::new(FakeNetwork),
            system,
        );
        let handle = CollectorHandle { registry };
        (collector, handle)
    }

    #[tokio::test]
    async fn test_empty_registry_skips_system_sample() {
        let system = Arc::new(FakeSystem::default());
        let (collector, _handle) = collector(FakeRuntime::default(), Arc::clone(&system));

        collector.tick().await;
        collector.tick().await;
        assert_eq!(system.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tick_publishes_decorated_sample() {
        let system = Arc::new(FakeSystem::default());
        let (collector, handle) = collector(FakeRuntime::default(), Arc::clone(&system));
        let mut a = handle.subscribe(&id("a"));
        let mut b = handle.subscribe(&id("b"));

        collector.tick().await;
        assert_eq!(system.calls.load(Ordering::SeqCst), 1);

        let sa = a.try_recv().unwrap().expect("sample for a");
        let sb = b.try_recv().unwrap().expect("sample for b");
        assert_eq!(sa.workload_id(), &id("a"));
        assert_eq!(sa.system_usage(), 1_000);
        assert_eq!(sa.system_usage(), sb.system_usage());
        assert_eq!(sa.interfaces().len(), 1);
        assert_eq!(sa.interfaces()[0].name, "eth0");
        assert_eq!(sa.interfaces()[0].rx_bytes, 42);

        collector.tick().await;
        assert_eq!(a.try_recv().unwrap().unwrap().system_usage(), 1_001);
    }

    #[tokio::test]
    async fn test_network_failure_still_publishes() {
        let (collector, handle) = collector(FakeRuntime::default(), Arc::default());
        let mut sub = handle.subscribe(&id("no-net"));

        collector.tick().await;
        let sample = sub.try_recv().unwrap().expect("sample without interfaces");
        assert!(sample.interfaces().is_empty());
    }

    #[tokio::test]
    async fn test_failed_system_sample_aborts_tick() {
        let system = Arc::new(FakeSystem {
            fail: true,
            ..Default::default()
        });
        let runtime = FakeRuntime::default();
        let (collector, handle) = collector(runtime, Arc::clone(&system));
        let mut sub = handle.subscribe(&id("a"));

        collector.tick().await;
        collector.tick().await;
        assert_eq!(system.calls.load(Ordering::SeqCst), 2);
        assert_eq!(sub.try_recv(), Ok(None));
        assert_eq!(handle.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_workloads_are_skipped_but_stay_registered() {
        let runtime = FakeRuntime {
            not_running: HashSet::from(["stopped".to_string()]),
            failing: HashSet::from(["broken".to_string()]),
            ..Default::default()
        };
        let (collector, handle) = collector(runtime, Arc::default());
        let mut stopped = handle.subscribe(&id("stopped"));
        let mut broken = handle.subscribe(&id("broken"));
        let mut healthy = handle.subscribe(&id("healthy"));

        collector.tick().await;
        assert_eq!(stopped.try_recv(), Ok(None));
        assert_eq!(broken.try_recv(), Ok(None));
        assert!(healthy.try_recv().unwrap().is_some());
        assert_eq!(handle.registry().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_workload_does_not_delay_others() {
        let runtime = FakeRuntime {
            slow: HashSet::from(["slow".to_string()]),
            ..Default::default()
        };
        let (collector, handle) = collector(runtime, Arc::default());
        let _slow = handle.subscribe(&id("slow"));
        let mut fast = handle.subscribe(&id("fast"));

        let collector = Arc::new(collector);
        let tick = tokio::spawn({
            let collector = Arc::clone(&collector);
            async move { collector.tick().await }
        });

        let sample = tokio::time::timeout(Duration::from_millis(250), fast.recv())
            .await
            .expect("fast workload published before the slow one finished");
        assert!(sample.is_some());
        tick.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_subscriptions_release_workload() {
        let (collector, handle) = collector(FakeRuntime::default(), Arc::default());
        let sub = handle.subscribe(&id("a"));
        drop(sub);

        collector.tick().await;
        assert!(handle.registry().is_empty());
    }

    #[tokio::test]
    async fn test_stop_collection_ends_streams_and_sampling() {
        let system = Arc::new(FakeSystem::default());
        let (collector, handle) = collector(FakeRuntime::default(), Arc::clone(&system));
        let mut a = handle.subscribe(&id("a"));
        let mut b = handle.subscribe(&id("a"));

        handle.stop_collection(&id("a"));
        collector.tick().await;
        assert!(a.recv().await.is_none());
        assert!(b.recv().await.is_none());
        assert_eq!(system.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_keeps_other_subscriptions() {
        let (collector, handle) = collector(FakeRuntime::default(), Arc::default());
        let mut a = handle.subscribe(&id("w"));
        let mut b = handle.subscribe(&id("w"));

        handle.unsubscribe(&id("w"), &a);
        collector.tick().await;
        assert!(a.recv().await.is_none());
        assert!(b.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_started_loop_delivers_samples() {
        let registry = Arc::new(Registry::default());
        let handle = Collector::new(
            registry,
            Arc::new(FakeRuntime::default()),
            Arc::new(FakeNetwork),
            Arc::new(FakeSystem::default()),
        )
        .start(Duration::from_millis(10));

        let mut sub = handle.subscribe(&id("a"));
        let first = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .unwrap()
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(second.system_usage() > first.system_usage());
    }
}
