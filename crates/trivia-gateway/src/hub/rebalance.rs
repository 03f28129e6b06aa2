//! Periodic rebalancing (spec.md §4.5 step 3, Scenario S4, Testable
//! Properties 7-8).
//!
//! Triggers on a fixed period, but an "emergency" pass can run early if a
//! large fraction of shards are critically loaded — the same two-speed
//! posture the teacher's cluster queue backpressure uses in
//! `gateway-queue/src/lib.rs` (a steady cadence with a fast path for the
//! case that can't wait).

use crate::hub::Hub;
use tracing::info;

/// One planned move: `count` connections from `from` to `to`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RebalancePlan {
    pub from: u64,
    pub to: u64,
    pub count: usize,
}

impl Hub {
    /// Decide whether a rebalance pass should run right now: either the
    /// configured period has elapsed, or enough shards are emergency-hot
    /// that waiting for the next tick would be worse than acting early.
    #[must_use]
    pub fn should_rebalance(&self) -> bool {
        self.is_emergency_hot()
    }

    #[must_use]
    pub fn is_emergency_hot(&self) -> bool {
        let hot_shards = self
            .shards
            .iter()
            .filter(|shard| shard.load_ratio() >= self.config.rebalance_emergency_load_trigger())
            .count();

        hot_shards as f64 / self.shards.len() as f64
            >= self.config.rebalance_emergency_shard_fraction()
    }

    /// Compute a batch rebalance plan: move up to `rebalance_batch`
    /// connections from the hottest shard to the coldest, provided the
    /// hottest shard both clears `rebalance_min_clients` and exceeds the
    /// coldest by more than `rebalance_ratio_trigger`.
    #[must_use]
    pub fn plan_rebalance(&self) -> Option<RebalancePlan> {
        let hottest = self
            .shards
            .iter()
            .max_by_key(|shard| shard.client_count())?;
        let coldest = self
            .shards
            .iter()
            .min_by_key(|shard| shard.client_count())?;

        if hottest.id == coldest.id {
            return None;
        }

        let hot_count = hottest.client_count();
        let cold_count = coldest.client_count().max(1);

        if hot_count < self.config.rebalance_min_clients() {
            return None;
        }
        if (hot_count as f64 / cold_count as f64) < self.config.rebalance_ratio_trigger() {
            return None;
        }

        let target_delta = (hot_count - coldest.client_count()) / 2;
        let count = target_delta.min(self.config.rebalance_batch()).max(1);

        Some(RebalancePlan {
            from: hottest.id,
            to: coldest.id,
            count,
        })
    }

    /// Execute one rebalance plan, migrating up to `plan.count` users.
    pub async fn apply_rebalance(&self, plan: RebalancePlan) -> usize {
        let candidates = self.shards[plan.from as usize].user_ids();
        let mut migrated = 0;

        for user_id in candidates.into_iter().take(plan.count) {
            let succeeded = self
                .migrate_connection(&user_id, plan.from, plan.to)
                .await
                .is_ok();
            self.metrics.record_rebalance_migration(succeeded);
            if succeeded {
                migrated += 1;
            }
        }

        if migrated > 0 {
            info!(from = plan.from, to = plan.to, migrated, "rebalance batch applied");
        }
        migrated
    }

    /// Spawn the periodic rebalance task. Alongside the fixed-period tick,
    /// a much shorter emergency tick checks [`Hub::should_rebalance`]
    /// independently, so a sudden hot-shard spike doesn't have to wait out
    /// the full `rebalance_period` before a pass runs (spec.md §4.5 step
    /// 3, Testable Property 7).
    pub fn spawn_rebalancer(self: &std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        let hub = std::sync::Arc::clone(self);
        let period = hub.config.rebalance_period();
        let emergency_period = EMERGENCY_CHECK_INTERVAL.min(period);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let mut emergency_ticker = tokio::time::interval(emergency_period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        rebalance_once(&hub).await;
                    }
                    _ = emergency_ticker.tick() => {
                        hub.check_high_latency();
                        if hub.should_rebalance() {
                            rebalance_once(&hub).await;
                        }
                    }
                }
            }
        })
    }
}

/// How often the emergency fast path re-checks `should_rebalance`,
/// independent of `rebalance_period`.
const EMERGENCY_CHECK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

async fn rebalance_once(hub: &std::sync::Arc<Hub>) {
    if let Some(plan) = hub.plan_rebalance() {
        hub.apply_rebalance(plan).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::hub::{Hub, HubConfig};

    fn hub_with(shard_count: u64, min_clients: usize) -> Hub {
        Hub::new(
            HubConfig::builder()
                .shard_count(shard_count)
                .rebalance_min_clients(min_clients)
                .rebalance_ratio_trigger(1.3)
                .build(),
        )
    }

    #[tokio::test]
    async fn no_plan_below_min_clients_threshold() {
        let hub = hub_with(2, 100);
        let (conn, _rx) = Connection::new("user-1".into(), 4);
        hub.shards[0].register("user-1".into(), conn);
        assert!(hub.plan_rebalance().is_none());
    }

    #[tokio::test]
    async fn plans_a_move_when_hot_and_above_ratio() {
        let hub = hub_with(2, 2);
        for i in 0..10 {
            let (conn, _rx) = Connection::new(format!("user-{i}"), 4);
            hub.shards[0].register(format!("user-{i}"), conn);
        }

        let plan = hub.plan_rebalance().expect("expected a rebalance plan");
        assert_eq!(plan.from, 0);
        assert_eq!(plan.to, 1);
        assert!(plan.count > 0);
    }
}
