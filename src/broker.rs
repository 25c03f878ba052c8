//! One-to-many delivery of [`StatsSample`]s for a single workload.
//!
//! Every [`Subscription`] owns a bounded `tokio::sync::broadcast` channel of
//! its own. Publishing never waits for a consumer: when a subscriber's buffer
//! is full the oldest unread sample is overwritten, so a slow consumer skips
//! samples but always gets to the newest one, and never sees them out of order.
//!
//! Dropping the sending half is the end-of-stream signal. [`Broker::evict`]
//! does that for one subscription, [`Broker::close`] for all of them.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::stats::StatsSample;

/// Default number of unread samples kept per subscription.
pub const DEFAULT_BUFFER: usize = 64;

/// Upper bound of the per-subscription buffer. Every slot is allocated up front.
pub const MAX_BUFFER: usize = 65_536;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique identifier of a [`Subscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionID(u64);

impl SubscriptionID {
    fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriptionID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returned by [`Subscription::try_recv`] once the stream has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("subscription closed")]
pub struct Closed;

/// The receiving end of one delivery stream.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionID,
    rx: broadcast::Receiver<Arc<StatsSample>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionID {
        self.id
    }

    /// Waits for the next sample.
    ///
    /// Returns `None` once the subscription was evicted or its broker closed
    /// and every sample published before that has been received.
    pub async fn recv(&mut self) -> Option<Arc<StatsSample>> {
        loop {
            match self.rx.recv().await {
                Ok(sample) => return Some(sample),
                Err(RecvError::Lagged(skipped)) => {
                    log::debug!("subscription {} skipped {skipped} samples", self.id);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next sample without waiting, `Ok(None)` if there is none yet.
    ///
    /// # Errors
    ///
    /// Returns [`Closed`] once the stream has ended.
    pub fn try_recv(&mut self) -> Result<Option<Arc<StatsSample>>, Closed> {
        loop {
            match self.rx.try_recv() {
                Ok(sample) => return Ok(Some(sample)),
                Err(TryRecvError::Lagged(skipped)) => {
                    log::debug!("subscription {} skipped {skipped} samples", self.id);
                }
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Closed) => return Err(Closed),
            }
        }
    }
}

#[derive(Debug, Default)]
struct State {
    subscribers: HashMap<SubscriptionID, broadcast::Sender<Arc<StatsSample>>>,
    closed: bool,
}

/// Fans samples of one workload out to any number of subscriptions.
///
/// All methods take `&self` and may be called concurrently.
#[derive(Debug)]
pub struct Broker {
    buffer: usize,
    state: Mutex<State>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl Broker {
    /// Creates a broker keeping up to `buffer` unread samples per subscription,
    /// clamped to `1..=MAX_BUFFER`.
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.clamp(1, MAX_BUFFER),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a subscription. It receives every sample published from now on.
    ///
    /// Subscribing to a closed broker yields a stream that has already ended.
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionID::next();
        let (tx, rx) = broadcast::channel(self.buffer);
        let mut state = self.state();
        if !state.closed {
            state.subscribers.insert(id, tx);
        }
        Subscription { id, rx }
    }

    /// Delivers `sample` to every live subscription without waiting on any of them.
    ///
    /// Subscriptions whose receiver was dropped are removed. Returns the
    /// number of subscriptions the sample was delivered to.
    pub fn publish(&self, sample: StatsSample) -> usize {
        let sample = Arc::new(sample);
        let mut state = self.state();
        if state.closed {
            return 0;
        }
        state
            .subscribers
            .retain(|id, tx| match tx.send(Arc::clone(&sample)) {
                Ok(_) => true,
                Err(_) => {
                    log::debug!("pruning dropped subscription {id}");
                    false
                }
            });
        state.subscribers.len()
    }

    /// Ends and removes one subscription. Evicting an unknown or already
    /// evicted subscription does nothing.
    pub fn evict(&self, id: SubscriptionID) {
        self.state().subscribers.remove(&id);
    }

    /// Returns the number of live subscriptions.
    pub fn len(&self) -> usize {
        self.state().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: SubscriptionID) -> bool {
        self.state().subscribers.contains_key(&id)
    }

    /// Ends every subscription. The broker accepts no further subscriptions or samples.
    pub fn close(&self) {
        let mut state = self.state();
        state.closed = true;
        state.subscribers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::stats::WorkloadStats;
    use crate::workload::WorkloadID;

    fn sample(system_usage: u64) -> StatsSample {
        StatsSample::new(
            WorkloadID::new("w").unwrap(),
            WorkloadStats::default(),
            system_usage,
        )
    }

    #[tokio::test]
    async fn test_delivers_to_every_subscription() {
        let broker = Broker::default();
        let mut a = broker.subscribe();
        let mut b = broker.subscribe();
        assert_ne!(a.id(), b.id());
        assert_eq!(broker.len(), 2);

        assert_eq!(broker.publish(sample(1)), 2);
        assert_eq!(a.recv().await.unwrap().system_usage(), 1);
        assert_eq!(b.recv().await.unwrap().system_usage(), 1);
    }

    #[tokio::test]
    async fn test_subscription_starts_with_next_publish() {
        let broker = Broker::default();
        broker.publish(sample(1));
        let mut sub = broker.subscribe();
        assert_eq!(sub.try_recv(), Ok(None));

        broker.publish(sample(2));
        assert_eq!(sub.recv().await.unwrap().system_usage(), 2);
    }

    #[tokio::test]
    async fn test_evict_ends_stream() {
        let broker = Broker::default();
        let mut sub = broker.subscribe();
        let mut other = broker.subscribe();

        broker.evict(sub.id());
        broker.evict(sub.id());
        assert_eq!(broker.len(), 1);
        assert!(!broker.contains(sub.id()));
        assert!(sub.recv().await.is_none());

        broker.publish(sample(3));
        assert_eq!(other.recv().await.unwrap().system_usage(), 3);
    }

    #[tokio::test]
    async fn test_close_ends_every_stream_once() {
        let broker = Broker::default();
        let mut subs: Vec<_> = (0..3).map(|_| broker.subscribe()).collect();

        broker.close();
        assert!(broker.is_closed());
        assert_eq!(broker.len(), 0);
        assert_eq!(broker.publish(sample(1)), 0);

        for sub in &mut subs {
            assert!(sub.recv().await.is_none());
            assert_eq!(sub.try_recv(), Err(Closed));
        }
    }

    #[tokio::test]
    async fn test_subscribe_after_close_is_ended() {
        let broker = Broker::default();
        broker.close();
        let mut sub = broker.subscribe();
        assert_eq!(broker.len(), 0);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_slow_subscriber_keeps_newest_in_order() {
        let broker = Broker::new(4);
        let mut slow = broker.subscribe();
        let mut fast = broker.subscribe();

        let start = Instant::now();
        for i in 0..10_000 {
            broker.publish(sample(i));
            assert_eq!(fast.try_recv().unwrap().unwrap().system_usage(), i);
        }
        assert!(start.elapsed() < Duration::from_secs(5));

        let mut seen = Vec::new();
        while let Ok(Some(s)) = slow.try_recv() {
            seen.push(s.system_usage());
        }
        assert_eq!(seen, vec![9_996, 9_997, 9_998, 9_999]);
    }

    #[tokio::test]
    async fn test_oversized_buffer_is_clamped() {
        let broker = Broker::new(usize::MAX);
        let mut sub = broker.subscribe();
        assert_eq!(broker.publish(sample(7)), 1);
        assert_eq!(sub.recv().await.unwrap().system_usage(), 7);

        let broker = Broker::new(0);
        let mut sub = broker.subscribe();
        broker.publish(sample(1));
        broker.publish(sample(2));
        assert_eq!(sub.recv().await.unwrap().system_usage(), 2);
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let broker = Broker::default();
        let sub = broker.subscribe();
        let _kept = broker.subscribe();
        drop(sub);

        assert_eq!(broker.len(), 2);
        assert_eq!(broker.publish(sample(1)), 1);
        assert_eq!(broker.len(), 1);
    }

    #[tokio::test]
    async fn test_pending_samples_are_drained_before_end() {
        let broker = Broker::default();
        let mut sub = broker.subscribe();
        broker.publish(sample(1));
        broker.close();

        assert_eq!(sub.recv().await.unwrap().system_usage(), 1);
        assert!(sub.recv().await.is_none());
    }
}
