//! The [`Connection`] handle: one entry per live transport (spec.md §4.1,
//! C1).
//!
//! A `Connection` is a cheap, `Clone`-able handle — it owns no transport
//! I/O itself. The actual socket lives inside the read/write loops spawned
//! by [`io::spawn_io_loops`]; the handle is what a [`crate::shard::Shard`]
//! stores in its maps and what the event manager's handlers are given.
//! This avoids the Connection-to-Hub backpointer the teacher's Discord
//! gateway uses internally (spec.md §9): a `Connection` knows how to reach
//! its owning shard only through the narrow `unregister` callback it was
//! constructed with.

pub mod config;
pub mod io;
mod state;

pub use self::{
    config::ConnectionConfig,
    state::{AtomicStage, Stage},
};

use crate::ids::{ConnectionId, UserId};
use dashmap::DashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, Notify};
use trivia_model::MessageType;

/// Outcome of a non-blocking send attempt (spec.md §4.1 "Send semantics").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SendOutcome {
    Accepted,
    Dropped,
}

struct ConnectionInner {
    id: ConnectionId,
    user_id: UserId,
    outbound_tx: mpsc::Sender<String>,
    subscriptions: DashSet<MessageType>,
    roles: DashSet<String>,
    last_activity_millis: AtomicU64,
    closed: AtomicBool,
    stage: AtomicStage,
    registration_complete: Notify,
}

/// A handle to one live transport.
///
/// Cloning a `Connection` is cheap (an `Arc` clone) and yields another
/// handle to the same underlying state; this is what lets a shard's map,
/// the read loop, and the write loop all observe the same subscription set
/// and liveness clock.
#[derive(Clone)]
pub struct Connection(Arc<ConnectionInner>);

impl Connection {
    /// Create a new connection handle and the outbound channel its write
    /// loop will drain. Returns the handle plus the receiving half of the
    /// outbound channel, which the caller hands to
    /// [`io::spawn_io_loops`].
    #[must_use]
    pub fn new(user_id: UserId, send_buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(send_buffer.max(1));

        let inner = ConnectionInner {
            id: ConnectionId::generate(),
            user_id,
            outbound_tx,
            subscriptions: DashSet::new(),
            roles: DashSet::new(),
            last_activity_millis: AtomicU64::new(now_millis()),
            closed: AtomicBool::new(false),
            stage: AtomicStage::new(Stage::Unregistered),
            registration_complete: Notify::new(),
        };

        (Connection(Arc::new(inner)), outbound_rx)
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.0.id
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.0.user_id
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.0.stage.get()
    }

    pub fn set_stage(&self, stage: Stage) {
        self.0.stage.set(stage);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::Acquire)
    }

    /// Attempt a non-blocking enqueue onto the outbound channel.
    ///
    /// Per spec.md §4.1: if the channel is full the connection is
    /// considered unhealthy. This method does not itself unregister the
    /// connection — that's the shard's responsibility on observing
    /// `Dropped` — it only reports the outcome.
    pub fn send(&self, frame: String) -> SendOutcome {
        if self.is_closed() {
            return SendOutcome::Dropped;
        }

        match self.0.outbound_tx.try_send(frame) {
            Ok(()) => SendOutcome::Accepted,
            Err(_) => SendOutcome::Dropped,
        }
    }

    /// A cheap, non-blocking liveness probe used during replacement
    /// (spec.md §4.2 step 2): attempts to enqueue an empty keepalive
    /// marker frame without consuming outbound capacity meant for real
    /// traffic.
    #[must_use]
    pub fn probe_liveness(&self) -> bool {
        !self.is_closed() && !self.0.outbound_tx.is_closed()
    }

    pub fn subscribe(&self, message_type: impl Into<MessageType>) {
        self.0.subscriptions.insert(message_type.into());
    }

    pub fn unsubscribe(&self, message_type: &MessageType) {
        self.0.subscriptions.remove(message_type);
    }

    /// Bulk-subscribe to the standard quiz-lifecycle event family
    /// atomically (spec.md §4.1).
    pub fn subscribe_quiz_lifecycle(&self) {
        for message_type in trivia_model::QUIZ_LIFECYCLE_TYPES {
            self.subscribe(MessageType::from(message_type));
        }
    }

    /// Whether this connection should receive a message of the given type:
    /// true if explicitly subscribed, or if the subscription set is empty
    /// (implicit universal subscription), per spec.md §4.1.
    #[must_use]
    pub fn is_subscribed(&self, message_type: &MessageType) -> bool {
        self.0.subscriptions.is_empty()
            || self.0.subscriptions.contains(message_type)
            || self.0.subscriptions.contains(&MessageType::wildcard())
    }

    pub fn add_role(&self, role: impl Into<String>) {
        self.0.roles.insert(role.into());
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.0.roles.contains(role)
    }

    /// Refresh the liveness clock. Monotonic: never moves backward, even
    /// under concurrent calls from the read loop.
    pub fn touch(&self) {
        let now = now_millis();
        let _ = self
            .0
            .last_activity_millis
            .fetch_max(now, Ordering::AcqRel);
    }

    #[must_use]
    pub fn last_activity_millis(&self) -> u64 {
        self.0.last_activity_millis.load(Ordering::Acquire)
    }

    /// Mark the connection closed. Idempotent; a closed connection never
    /// accepts further sends.
    pub fn close(&self) {
        self.0.closed.store(true, Ordering::Release);
        self.set_stage(Stage::Closed);
    }

    /// Signal that registration has completed, waking any `registerSync`
    /// caller blocked on [`Connection::wait_for_registration`].
    pub fn signal_registered(&self) {
        self.0.registration_complete.notify_waiters();
    }

    pub async fn wait_for_registration(&self) {
        self.0.registration_complete.notified().await;
    }

    /// The current size of the outbound backlog, used when building a
    /// shadow connection during migration (spec.md §4.5 step 1).
    #[must_use]
    pub fn outbound_capacity(&self) -> usize {
        self.0.outbound_tx.capacity()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_after_close_is_dropped() {
        let (conn, _rx) = Connection::new("user-1".into(), 4);
        conn.close();
        assert_eq!(conn.send("frame".into()), SendOutcome::Dropped);
    }

    #[test]
    fn full_buffer_is_dropped_not_blocking() {
        let (conn, _rx) = Connection::new("user-1".into(), 1);
        assert_eq!(conn.send("a".into()), SendOutcome::Accepted);
        assert_eq!(conn.send("b".into()), SendOutcome::Dropped);
    }

    #[test]
    fn subscription_filtering_matches_spec() {
        let (conn, _rx) = Connection::new("user-1".into(), 4);
        // Empty subscription set: implicit universal subscription.
        assert!(conn.is_subscribed(&MessageType::from("QUIZ_START")));

        conn.subscribe(MessageType::from("QUIZ_START"));
        assert!(conn.is_subscribed(&MessageType::from("QUIZ_START")));
        assert!(!conn.is_subscribed(&MessageType::from("RESULT_UPDATE")));
    }

    #[test]
    fn touch_never_moves_backward() {
        let (conn, _rx) = Connection::new("user-1".into(), 4);
        let first = conn.last_activity_millis();
        conn.0.last_activity_millis.store(first + 1000, Ordering::Release);
        conn.touch();
        assert!(conn.last_activity_millis() >= first + 1000);
    }

    #[test]
    fn roles_and_bulk_quiz_subscription() {
        let (conn, _rx) = Connection::new("user-1".into(), 4);
        conn.add_role("moderator");
        assert!(conn.has_role("moderator"));
        assert!(!conn.has_role("admin"));

        let (other, _rx2) = Connection::new("user-2".into(), 4);
        other.subscribe_quiz_lifecycle();
        assert!(other.is_subscribed(&MessageType::from("QUIZ_START")));
        assert!(other.is_subscribed(&MessageType::from("RESULT_UPDATE")));
        assert!(!other.is_subscribed(&MessageType::from("token_about_to_expire")));
    }
}
