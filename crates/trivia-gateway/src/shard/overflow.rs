//! Mass-disconnect handling (spec.md §4.2 "Overflow").
//!
//! When a shard's transport all drops at once (e.g. the process restarts
//! under it, or a downstream proxy recycles connections), unregistering
//! every connection synchronously would serialize thousands of map
//! removals behind the shard's single dispatch loop. Instead disconnects
//! are queued and drained in adaptively-sized batches, so the loop keeps
//! making progress on ordinary traffic between batches.

use super::Shard;
use crate::connection::Connection;
use crate::ids::ConnectionId;
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// A bounded queue of connection ids pending unregistration.
pub struct OverflowQueue {
    pending: Mutex<VecDeque<ConnectionId>>,
    capacity: usize,
}

impl OverflowQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        OverflowQueue {
            pending: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Queue a connection for unregistration. Returns `false` and drops the
    /// request if the overflow buffer itself is full — at that point the
    /// shard is shedding faster than it can keep bookkeeping for, and the
    /// caller falls back to inline processing (spec.md §4.2).
    pub async fn push(&self, connection_id: ConnectionId) -> bool {
        let mut pending = self.pending.lock().await;
        if pending.len() >= self.capacity {
            warn!(capacity = self.capacity, "overflow queue full, dropping disconnect notice");
            return false;
        }
        pending.push_back(connection_id);
        true
    }

    async fn drain_batch(&self, max: usize) -> Vec<ConnectionId> {
        let mut pending = self.pending.lock().await;
        let take = max.min(pending.len());
        pending.drain(..take).collect()
    }

    #[must_use]
    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

const BATCH_GROW_THRESHOLD: Duration = Duration::from_millis(20);
const BATCH_SHRINK_THRESHOLD: Duration = Duration::from_millis(100);

/// How a single disconnect was routed by [`Shard::handle_disconnect`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DisconnectRoute {
    /// Below the diversion threshold: unregistered inline.
    Inline,
    /// Above the diversion threshold: queued for the overflow drain loop.
    Diverted,
    /// Above the diversion threshold, but the overflow buffer itself was
    /// full, so this one was processed inline anyway.
    OverflowFullFallback,
}

impl Shard {
    /// Entry point for a connection's own terminal disconnect (read/write
    /// loop exit, or a liveness sweep). Tracks an in-flight counter of
    /// pending disconnects; once it crosses `overflow_batch_threshold`
    /// (spec.md §4.2: "above a threshold (100) it diverts new
    /// unregistrations into the overflow queue") new disconnects are
    /// queued instead of unregistered inline, falling back to inline if
    /// the overflow buffer itself is full.
    pub async fn handle_disconnect(&self, user_id: &str, connection: &Connection) -> DisconnectRoute {
        let pending = self.pending_disconnects.fetch_add(1, Ordering::AcqRel) + 1;

        let route = if pending > self.config.overflow_batch_threshold() {
            if self.queue_disconnect(connection.id()).await {
                DisconnectRoute::Diverted
            } else {
                self.unregister(user_id, connection);
                DisconnectRoute::OverflowFullFallback
            }
        } else {
            self.unregister(user_id, connection);
            DisconnectRoute::Inline
        };

        self.pending_disconnects.fetch_sub(1, Ordering::AcqRel);
        route
    }

    /// Process one adaptive batch of queued disconnects. The batch size is
    /// a running value (seeded at `overflow_batch_min`) that grows toward
    /// `overflow_batch_max` whenever the previous batch's processing time
    /// was under 20ms, and shrinks back toward `overflow_batch_min` once it
    /// exceeds 100ms (spec.md §4.2), rather than keying off the backlog
    /// depth.
    pub async fn drain_overflow(&self) -> usize {
        let backlog = self.overflow.len().await;
        if backlog == 0 {
            return 0;
        }

        let batch_size = self.overflow_batch_size.load(Ordering::Acquire);
        let batch = self.overflow.drain_batch(batch_size).await;
        let drained = batch.len();

        let started = Instant::now();
        for connection_id in batch {
            if let Some((_, connection)) = self.by_id.remove(&connection_id) {
                self.unregister(connection.user_id(), &connection);
            }
        }
        let elapsed = started.elapsed();

        let min = self.config.overflow_batch_min();
        let max = self.config.overflow_batch_max();
        let next = if elapsed < BATCH_GROW_THRESHOLD {
            (batch_size + min).min(max)
        } else if elapsed > BATCH_SHRINK_THRESHOLD {
            batch_size.saturating_sub(min).max(min)
        } else {
            batch_size
        };
        self.overflow_batch_size.store(next, Ordering::Release);

        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::ShardConfig;

    #[tokio::test]
    async fn overflow_queue_rejects_past_capacity() {
        let queue = OverflowQueue::new(2);
        assert!(queue.push(ConnectionId::generate()).await);
        assert!(queue.push(ConnectionId::generate()).await);
        assert!(!queue.push(ConnectionId::generate()).await);
    }

    #[tokio::test]
    async fn batch_size_scales_with_backlog() {
        let queue = OverflowQueue::new(1000);
        for _ in 0..150 {
            queue.push(ConnectionId::generate()).await;
        }
        let batch = queue.drain_batch(200).await;
        assert_eq!(batch.len(), 150);
    }

    #[tokio::test]
    async fn fast_batches_grow_the_adaptive_batch_size() {
        let config = ShardConfig::builder()
            .overflow_batch_min(10)
            .overflow_batch_max(40)
            .build();
        let shard = Shard::new(0, config);
        for _ in 0..20 {
            shard.overflow.push(ConnectionId::generate()).await;
        }

        assert_eq!(shard.overflow_batch_size.load(Ordering::Acquire), 10);
        shard.drain_overflow().await;
        // The drained batch was well under the 20ms growth threshold, so
        // the next batch size should have grown past the starting minimum.
        assert!(shard.overflow_batch_size.load(Ordering::Acquire) > 10);
    }

    #[tokio::test]
    async fn disconnects_divert_to_the_overflow_queue_past_the_threshold() {
        use crate::connection::Connection;

        let config = ShardConfig::builder().overflow_batch_threshold(0).build();
        let shard = Shard::new(0, config);
        let (conn, _rx) = Connection::new("user-1".into(), 4);
        shard.register("user-1".into(), conn.clone());

        let route = shard.handle_disconnect("user-1", &conn).await;
        assert_eq!(route, DisconnectRoute::Diverted);
        assert_eq!(shard.overflow.len().await, 1);
    }
}
