//! A shard: one partition of the connection space (spec.md §3 `Shard`,
//! §4.2, C2).
//!
//! Modeled on the teacher's per-shard processor
//! (`gateway/src/shard/processor/impl.rs`): each shard owns its slice of
//! connections and runs its own dispatch/liveness loops, so work on one
//! shard never blocks another.

mod config;
mod fanout;
mod liveness;
mod overflow;
mod registration;

pub use self::config::{ShardConfig, ShardConfigBuilder};
pub use self::fanout::FanoutStats;
pub use self::overflow::DisconnectRoute;
pub use self::registration::RegisterOutcome;

use crate::connection::Connection;
use crate::ids::{ConnectionId, UserId};
use dashmap::DashMap;
use overflow::OverflowQueue;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio::sync::Notify;
use trivia_queue::{OutboundTask, PriorityQueue};

/// One partition of the hub's connection space.
///
/// `connections` is keyed by user id (one active connection per user at a
/// time, modulo the brief replacement-grace overlap); `by_id` additionally
/// indexes by connection id so a replaced-but-not-yet-closed connection
/// can still be found and force-closed by the grace watchdog even after a
/// newer one has taken its spot in `connections`.
pub struct Shard {
    pub id: u64,
    config: ShardConfig,
    connections: DashMap<UserId, Connection>,
    by_id: DashMap<ConnectionId, Connection>,
    overflow: OverflowQueue,
    overflow_batch_size: AtomicUsize,
    pending_disconnects: AtomicUsize,
    queue: PriorityQueue<OutboundTask>,
    queue_notify: Notify,
}

impl Shard {
    #[must_use]
    pub fn new(id: u64, config: ShardConfig) -> Self {
        let overflow = OverflowQueue::new(config.overflow_buffer());
        let overflow_batch_size = AtomicUsize::new(config.overflow_batch_min());
        let queue = config.new_priority_queue();
        Shard {
            id,
            config,
            connections: DashMap::new(),
            by_id: DashMap::new(),
            overflow,
            overflow_batch_size,
            pending_disconnects: AtomicUsize::new(0),
            queue,
            queue_notify: Notify::new(),
        }
    }

    #[must_use]
    pub fn new_shared(id: u64, config: ShardConfig) -> Arc<Self> {
        Arc::new(Self::new(id, config))
    }

    /// Queue an outbound task for this shard's dispatch loop to drain in
    /// priority order, and wake the loop if it's idle.
    pub fn enqueue(&self, task: OutboundTask) -> bool {
        let accepted = self.queue.enqueue(task.priority(), task);
        self.queue_notify.notify_one();
        accepted
    }

    #[must_use]
    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn load_ratio(&self) -> f64 {
        self.client_count() as f64 / self.config.max_clients().max(1) as f64
    }

    #[must_use]
    pub fn connection_for(&self, user_id: &str) -> Option<Connection> {
        self.connections.get(user_id).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn has_connection(&self, user_id: &str) -> bool {
        self.connections.contains_key(user_id)
    }

    /// Queue a connection's id for batched unregistration rather than
    /// removing it inline (used by the disconnect-storm path; see
    /// [`overflow`]).
    pub async fn queue_disconnect(&self, connection_id: ConnectionId) -> bool {
        self.overflow.push(connection_id).await
    }

    pub fn user_ids(&self) -> Vec<UserId> {
        self.connections.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Current depth of the in-flight disconnect counter (spec.md §4.7
    /// "pending-disconnect depth"), sampled periodically by the liveness
    /// sweeper rather than tracked as a running metric — it moves too
    /// quickly within [`Shard::handle_disconnect`] to be worth reporting
    /// mid-call.
    #[must_use]
    pub fn pending_disconnects(&self) -> usize {
        self.pending_disconnects.load(std::sync::atomic::Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_two_connections_for_same_user_replaces() {
        let shard = Shard::new(0, ShardConfig::default());
        let (first, _rx1) = Connection::new("user-1".into(), 4);
        let (second, _rx2) = Connection::new("user-1".into(), 4);

        matches!(shard.register("user-1".into(), first.clone()), RegisterOutcome::Fresh);
        match shard.register("user-1".into(), second.clone()) {
            RegisterOutcome::Replaced { previous } => assert_eq!(previous.id(), first.id()),
            other => panic!("expected Replaced, got {other:?}"),
        }

        assert_eq!(shard.connection_for("user-1").unwrap().id(), second.id());
    }

    #[test]
    fn at_capacity_rejects_new_users() {
        let config = ShardConfig::builder().max_clients(1).build();
        let shard = Shard::new(0, config);
        let (a, _rx) = Connection::new("user-1".into(), 4);
        matches!(shard.register("user-1".into(), a), RegisterOutcome::Fresh);

        let (b, _rx2) = Connection::new("user-2".into(), 4);
        matches!(shard.register("user-2".into(), b), RegisterOutcome::AtCapacity);
    }
}
