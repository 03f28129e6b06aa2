//! Local (within-shard) fan-out (spec.md §4.2 step 2, §4.1 "Send
//! semantics").
//!
//! A shard's dispatch loop is single-threaded per shard — the teacher's
//! equivalent is one inflater/processor per shard in
//! `gateway/src/shard/processor/impl.rs` — so delivery to a shard's own
//! connections never races with itself. Parallelism across shards comes
//! from the hub handing each shard its own fan-out job on the shared
//! worker pool.

use super::Shard;
use crate::connection::SendOutcome;
use crate::metrics::MetricsStore;
use std::sync::Arc;
use std::time::Duration;
use trivia_model::MessageType;
use trivia_queue::OutboundTask;

/// Result of fanning a single frame out across this shard's connections.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FanoutStats {
    pub delivered: usize,
    pub dropped: usize,
}

impl Shard {
    /// Broadcast `frame` to every connection subscribed to `message_type`,
    /// or to all connections if `message_type` is system-distinguished
    /// (spec.md §4.1: token revocation and shard-migration notices bypass
    /// subscription filtering).
    pub fn fanout_broadcast(&self, message_type: &MessageType, frame: &str) -> FanoutStats {
        let mut stats = FanoutStats::default();
        let unconditional = message_type.is_system_distinguished();

        for entry in self.connections.iter() {
            let connection = entry.value();
            if !unconditional && !connection.is_subscribed(message_type) {
                continue;
            }
            match connection.send(frame.to_owned()) {
                SendOutcome::Accepted => stats.delivered += 1,
                SendOutcome::Dropped => {
                    stats.dropped += 1;
                    self.unregister(connection.user_id(), connection);
                }
            }
        }

        stats
    }

    /// Deliver `frame` to exactly one user's locally-registered connection,
    /// if any. Returns `None` if this shard has no connection for
    /// `user_id` — the hub falls back to a cluster publish in that case
    /// (spec.md §4.5).
    pub fn fanout_unicast(&self, user_id: &str, frame: &str) -> Option<SendOutcome> {
        let connection = self.connections.get(user_id)?.value().clone();
        let outcome = connection.send(frame.to_owned());
        if outcome == SendOutcome::Dropped {
            self.unregister(user_id, &connection);
        }
        Some(outcome)
    }

    /// Queue `task` for this shard's dispatch loop, unless the queue
    /// rejects it (tier at capacity) *and* its priority is one that must
    /// bypass backpressure (spec.md §4.5 "Prioritised broadcast": critical
    /// and high tiers are delivered inline rather than silently dropped).
    ///
    /// This shard's single [`trivia_queue::PriorityQueue`], bounded
    /// per-tier, stands in for the separate per-shard bounded broadcast
    /// channel spec.md §4.5 describes (see SPEC_FULL.md §3): a full tier
    /// is the equivalent of a full channel, and this bypass path is the
    /// "send directly to connections" fallback spec.md asks for instead
    /// of an awaited 1s timeout, since the queue itself never blocks.
    pub fn enqueue_or_bypass(&self, task: OutboundTask, metrics: &MetricsStore) {
        let priority = task.priority();
        let bypass = priority.bypasses_backpressure();
        let fallback = if bypass { Some(task.clone()) } else { None };

        if self.enqueue(task) {
            metrics.record_enqueued(priority, 1);
            return;
        }

        metrics.record_priority_dropped(priority, 1);

        let Some(OutboundTask::Broadcast { message_type, frame, .. }) = fallback else {
            metrics.record_dropped(1);
            return;
        };

        let stats = self.fanout_broadcast(&MessageType::from(message_type), &frame);
        metrics.record_delivered(stats.delivered as u64);
        metrics.record_dropped(stats.dropped as u64);
    }

    /// Pull and execute exactly one queued task, if any.
    fn dispatch_one(&self, metrics: &MetricsStore) -> bool {
        let Some((_, task)) = self.queue.dequeue() else {
            return false;
        };

        match task {
            OutboundTask::Broadcast { message_type, frame, priority } => {
                metrics.record_dequeued(priority, 1);
                let stats = self.fanout_broadcast(&MessageType::from(message_type), &frame);
                metrics.record_delivered(stats.delivered as u64);
                metrics.record_dropped(stats.dropped as u64);
            }
        }

        true
    }

    /// Spawn this shard's dispatch loop: waits to be woken by
    /// [`Shard::enqueue`], then drains the queue until empty before
    /// waiting again. Single loop per shard, so delivery within a shard is
    /// always serialized (spec.md §4.2, C2).
    pub fn spawn_dispatch_loop(self: &Arc<Self>, metrics: Arc<MetricsStore>) -> tokio::task::JoinHandle<()> {
        let shard = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                while shard.dispatch_one(&metrics) {}
                tokio::time::timeout(Duration::from_secs(1), shard.queue_notify.notified())
                    .await
                    .ok();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::shard::{Shard, ShardConfig};

    fn make_shard() -> Shard {
        Shard::new(0, ShardConfig::default())
    }

    #[test]
    fn unconditional_types_reach_everyone_regardless_of_subscription() {
        let shard = make_shard();
        let (conn, mut rx) = Connection::new("user-1".into(), 8);
        conn.subscribe(MessageType::from("QUIZ_START"));
        shard.register("user-1".into(), conn);

        let stats = shard.fanout_broadcast(&MessageType::from("token_revoked"), "{}");
        assert_eq!(stats.delivered, 1);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn subscribed_only_filters_out_non_subscribers() {
        let shard = make_shard();
        let (conn, mut rx) = Connection::new("user-1".into(), 8);
        conn.subscribe(MessageType::from("RESULT_UPDATE"));
        shard.register("user-1".into(), conn);

        let stats = shard.fanout_broadcast(&MessageType::from("QUIZ_START"), "{}");
        assert_eq!(stats.delivered, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unicast_misses_return_none_for_unknown_user() {
        let shard = make_shard();
        assert!(shard.fanout_unicast("ghost", "{}").is_none());
    }

    #[test]
    fn a_full_critical_tier_bypasses_the_queue_instead_of_dropping() {
        use trivia_model::Priority;

        let shard = Shard::new(
            0,
            ShardConfig::builder().priority_capacities([1, 1, 1, 1]).build(),
        );
        let (conn, mut rx) = Connection::new("user-1".into(), 8);
        shard.register("user-1".into(), conn);
        let metrics = MetricsStore::new();

        // Fill the critical tier so the next enqueue is rejected.
        shard.enqueue(OutboundTask::Broadcast {
            message_type: "token_revoked".into(),
            frame: "{}".into(),
            priority: Priority::Critical,
        });

        shard.enqueue_or_bypass(
            OutboundTask::Broadcast {
                message_type: "token_revoked".into(),
                frame: "{}".into(),
                priority: Priority::Critical,
            },
            &metrics,
        );

        // The bypassed frame was delivered straight to the connection,
        // ahead of whatever the dispatch loop would later drain.
        assert!(rx.try_recv().is_ok());
        assert_eq!(metrics.snapshot().messages_delivered, 1);
    }

    #[test]
    fn a_full_normal_tier_drops_rather_than_bypasses() {
        use trivia_model::Priority;

        let shard = Shard::new(
            0,
            ShardConfig::builder().priority_capacities([1, 1, 1, 1]).build(),
        );
        let (conn, mut rx) = Connection::new("user-1".into(), 8);
        shard.register("user-1".into(), conn);
        let metrics = MetricsStore::new();

        shard.enqueue(OutboundTask::Broadcast {
            message_type: "USER_ANSWER".into(),
            frame: "{}".into(),
            priority: Priority::Normal,
        });

        shard.enqueue_or_bypass(
            OutboundTask::Broadcast {
                message_type: "USER_ANSWER".into(),
                frame: "{}".into(),
                priority: Priority::Normal,
            },
            &metrics,
        );

        assert_eq!(metrics.snapshot().messages_dropped, 1);
        // Only the first (queued, not yet dispatched) frame is pending.
        assert!(rx.try_recv().is_err());
    }
}
