use std::sync::Arc;

use dashmap::DashMap;

use crate::broker::{Broker, DEFAULT_BUFFER, Subscription};
use crate::workload::WorkloadID;

/// Maps workloads to the [`Broker`] publishing their samples.
///
/// A broker is created on the first subscription for a workload and removed
/// together with its last subscription, so every entry has at least one live
/// subscription. All operations only hold a map shard lock for the duration of
/// an insert, remove or pointer copy.
#[derive(Debug)]
pub struct Registry {
    publishers: DashMap<WorkloadID, Arc<Broker>>,
    buffer: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl Registry {
    /// Creates an empty registry whose brokers buffer `buffer` samples per subscription.
    pub fn new(buffer: usize) -> Self {
        Self {
            publishers: DashMap::new(),
            buffer,
        }
    }

    /// Returns a new subscription to the samples of `id`, creating its broker if needed.
    pub fn subscribe(&self, id: &WorkloadID) -> Subscription {
        let broker = self
            .publishers
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Broker::new(self.buffer)));
        broker.subscribe()
    }

    /// Ends `subscription`; the workload is dropped once it has no subscription left.
    pub fn unsubscribe(&self, id: &WorkloadID, subscription: &Subscription) {
        self.publishers.remove_if(id, |_, broker| {
            broker.evict(subscription.id());
            broker.is_empty()
        });
    }

    /// Ends every subscription of `id` and stops collecting its samples.
    pub fn stop_collection(&self, id: &WorkloadID) {
        if let Some((_, broker)) = self.publishers.remove(id) {
            broker.close();
        }
    }

    /// Removes `broker` from `id` if it is still registered there and has no
    /// subscription left, e.g. after every receiver was dropped.
    pub fn release_if_idle(&self, id: &WorkloadID, broker: &Arc<Broker>) -> bool {
        self.publishers
            .remove_if(id, |_, registered| {
                Arc::ptr_eq(registered, broker) && registered.is_empty()
            })
            .is_some()
    }

    /// Copies the current `(workload, broker)` pairs.
    pub fn snapshot(&self) -> Vec<(WorkloadID, Arc<Broker>)> {
        self.publishers
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    pub fn broker(&self, id: &WorkloadID) -> Option<Arc<Broker>> {
        self.publishers.get(id).map(|broker| Arc::clone(broker.value()))
    }

    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}
