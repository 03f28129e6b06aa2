//! Liveness sweeping (spec.md §4.2, resolving the cadence Open Question in
//! SPEC_FULL.md §3: every shard runs the same 30s sweep / 30s inactivity
//! window, independent of shard count).

use super::Shard;
use crate::metrics::MetricsStore;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

impl Shard {
    /// Close any connection that hasn't been touched within the
    /// inactivity window. A connection whose read loop already exited will
    /// have unregistered itself; this sweep catches the rarer case of a
    /// half-open transport the OS hasn't reported as dead yet.
    pub fn sweep_liveness(&self) -> usize {
        let window = self.config.liveness_inactivity_window();
        let now = now_millis();
        let mut swept = 0;

        let stale: Vec<_> = self
            .connections
            .iter()
            .filter(|entry| {
                let last = entry.value().last_activity_millis();
                now.saturating_sub(last) > window.as_millis() as u64
            })
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (user_id, connection) in stale {
            debug!(user_id = %user_id, connection = %connection.id(), "sweeping inactive connection");
            connection.close();
            self.unregister(&user_id, &connection);
            swept += 1;
        }

        swept
    }

    /// Spawn the periodic sweep task. Returns its join handle so the shard
    /// owner can abort it on shutdown.
    pub fn spawn_liveness_sweeper(
        self: &std::sync::Arc<Self>,
        metrics: std::sync::Arc<MetricsStore>,
    ) -> tokio::task::JoinHandle<()> {
        let shard = std::sync::Arc::clone(self);
        let interval = self.config.liveness_sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let swept = shard.sweep_liveness();
                let drained = shard.drain_overflow().await;
                metrics.record_inactive_eviction(swept as u64);
                metrics.record_pending_disconnects(shard.id, shard.pending_disconnects());
                metrics.record_cleanup();
                if swept > 0 || drained > 0 {
                    debug!(shard = shard.id, swept, drained, "liveness sweep completed");
                }
            }
        })
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
