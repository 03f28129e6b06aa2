//! The deferred-replacement-with-grace algorithm (spec.md §4.2).
//!
//! When a second connection arrives for a user who already has one
//! registered, the old connection is not dropped immediately: it is
//! demoted so it stops receiving new traffic and given `replacement_grace`
//! to close on its own (the common case — a client reconnecting after a
//! network blip sends a close frame shortly after the new socket opens).
//! If it hasn't gone away by the end of the grace window, the shard force
//! closes it. This avoids punishing a still-healthy old connection for a
//! replacement that turns out to be transient, at the cost of briefly
//! holding two sockets open per user.

use super::Shard;
use crate::connection::{Connection, Stage};
use crate::ids::UserId;
use std::time::Duration;
use tracing::debug;

/// Outcome of attempting to register a connection for a user.
#[derive(Debug)]
pub enum RegisterOutcome {
    /// No prior connection existed; this one is now active immediately.
    Fresh,
    /// A prior connection existed and has been demoted to `Replaced`; it
    /// will be force-closed after the grace window unless it closes
    /// itself first.
    Replaced { previous: Connection },
    /// The shard is at capacity; the caller should reject the connection.
    AtCapacity,
}

impl Shard {
    /// Register `connection` under `user_id`, running the
    /// deferred-replacement algorithm if one is already registered.
    ///
    /// Per spec.md §4.2 step 3, an existing connection is probed for
    /// liveness first: if the probe fails it is removed immediately (no
    /// grace window, nothing to defer), and only a live probe falls
    /// through to the deferred-replacement-with-grace path below.
    pub fn register(&self, user_id: UserId, connection: Connection) -> RegisterOutcome {
        if self.connections.len() >= self.config.max_clients()
            && !self.connections.contains_key(&user_id)
        {
            return RegisterOutcome::AtCapacity;
        }

        connection.set_stage(Stage::Registering);

        let stale = self.connections.get(&user_id).and_then(|entry| {
            let existing = entry.value();
            (existing.id() != connection.id() && !existing.probe_liveness())
                .then(|| existing.clone())
        });
        if let Some(stale) = stale {
            debug!(
                user_id = %user_id,
                stale = %stale.id(),
                "liveness probe failed, removing stale connection immediately"
            );
            stale.close();
            self.by_id.remove(&stale.id());
        }

        let outcome = match self.connections.insert(user_id.clone(), connection.clone()) {
            Some(previous) if previous.id() != connection.id() => {
                if previous.is_closed() {
                    // Already torn down by the probe-failed branch above.
                    RegisterOutcome::Fresh
                } else {
                    previous.set_stage(Stage::Replaced);
                    debug!(
                        user_id = %user_id,
                        previous = %previous.id(),
                        next = %connection.id(),
                        "deferring replacement of existing connection"
                    );
                    RegisterOutcome::Replaced { previous }
                }
            }
            _ => RegisterOutcome::Fresh,
        };

        self.by_id.insert(connection.id(), connection.clone());
        connection.set_stage(Stage::Active);
        connection.signal_registered();
        outcome
    }

    /// Spawn the grace-window watchdog for a replaced connection. Call this
    /// once, immediately after a [`RegisterOutcome::Replaced`].
    pub fn spawn_replacement_watchdog(self: &std::sync::Arc<Self>, previous: Connection) {
        let shard = std::sync::Arc::clone(self);
        let grace = self.config.replacement_grace();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if !previous.is_closed() {
                debug!(
                    connection = %previous.id(),
                    grace_ms = grace.as_millis(),
                    "grace window elapsed, force-closing replaced connection"
                );
                previous.close();
            }
            shard.by_id.remove(&previous.id());
        });
    }

    /// Remove a connection entirely: drops it from both lookup maps. A
    /// no-op if `connection_id` has already been replaced by a newer
    /// registration for the same user (the map entry would point at the
    /// newer connection, not this one).
    pub fn unregister(&self, user_id: &str, connection: &Connection) {
        self.by_id.remove(&connection.id());
        self.connections.remove_if(user_id, |_, current| {
            current.id() == connection.id()
        });
    }

    #[must_use]
    pub fn replacement_grace(&self) -> Duration {
        self.config.replacement_grace()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::{Shard, ShardConfig};

    #[test]
    fn a_dead_probe_is_removed_immediately_without_a_grace_window() {
        let shard = Shard::new(0, ShardConfig::default());
        let (first, rx) = Connection::new("user-1".into(), 4);
        matches!(shard.register("user-1".into(), first.clone()), RegisterOutcome::Fresh);

        // Drop the receiver so the outbound channel itself closes; this is
        // what `probe_liveness` actually detects, unlike `Connection::close`
        // which only flips a flag the probe doesn't look at.
        drop(rx);

        let (second, _rx2) = Connection::new("user-1".into(), 4);
        match shard.register("user-1".into(), second.clone()) {
            RegisterOutcome::Fresh => {}
            other => panic!("expected Fresh (stale probe removed inline), got {other:?}"),
        }
        assert!(first.is_closed());
    }

    #[test]
    fn a_live_probe_still_defers_to_the_grace_window() {
        let shard = Shard::new(0, ShardConfig::default());
        let (first, _rx) = Connection::new("user-1".into(), 4);
        matches!(shard.register("user-1".into(), first.clone()), RegisterOutcome::Fresh);

        let (second, _rx2) = Connection::new("user-1".into(), 4);
        match shard.register("user-1".into(), second.clone()) {
            RegisterOutcome::Replaced { previous } => assert_eq!(previous.id(), first.id()),
            other => panic!("expected Replaced, got {other:?}"),
        }
    }
}
