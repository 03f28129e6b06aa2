//! Metrics and alerting (spec.md §4.7, C7).
//!
//! Counters are recorded two ways: through the `metrics` crate's global
//! facade (for whatever exporter the embedding binary wires up, mirroring
//! how `twilight-gateway` leaves recording to the `metrics` facade rather
//! than bundling its own exporter) and into [`MetricsStore`], the
//! canonical in-process snapshot source this crate's own
//! `/api/ws/metrics` endpoint reads from.

use dashmap::DashMap;
use metrics::{counter, gauge, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use trivia_model::Priority;

fn priority_index(priority: Priority) -> usize {
    match priority {
        Priority::Low => 0,
        Priority::Normal => 1,
        Priority::High => 2,
        Priority::Critical => 3,
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A point-in-time view of one priority tier's queue traffic.
#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct PrioritySnapshot {
    pub priority: String,
    pub enqueued: u64,
    pub dequeued: u64,
    pub dropped: u64,
}

/// A point-in-time view of the hub's health, serializable for the metrics
/// endpoint (spec.md §4.7: "a JSON shape is the canonical external form").
#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub active_connections: u64,
    pub total_connections: u64,
    pub connections_closed: u64,
    pub connection_errors: u64,
    pub messages_delivered: u64,
    pub messages_dropped: u64,
    pub inactive_client_evictions: u64,
    pub pending_disconnect_depth: u64,
    pub per_priority: Vec<PrioritySnapshot>,
    pub rebalance_migrations_succeeded: u64,
    pub rebalance_migrations_failed: u64,
    pub cluster_messages_published: u64,
    pub cluster_messages_received: u64,
    pub cluster_messages_deduped: u64,
    pub per_shard_clients: Vec<(u64, usize)>,
    pub p99_dispatch_latency_ms: u64,
    pub last_cleanup_at_millis: u64,
    pub last_alert_at_millis: u64,
}

#[derive(Default)]
struct PriorityCounters {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Default)]
struct Counters {
    total_connections: AtomicU64,
    connections_closed: AtomicU64,
    connection_errors: AtomicU64,
    messages_delivered: AtomicU64,
    messages_dropped: AtomicU64,
    inactive_client_evictions: AtomicU64,
    rebalance_migrations_succeeded: AtomicU64,
    rebalance_migrations_failed: AtomicU64,
    cluster_messages_published: AtomicU64,
    cluster_messages_received: AtomicU64,
    cluster_messages_deduped: AtomicU64,
    last_cleanup_at_millis: AtomicU64,
    last_alert_at_millis: AtomicU64,
}

/// The canonical, in-process metrics store.
///
/// Latency is tracked with a small fixed-size ring rather than a full
/// histogram implementation; good enough for a p99 threshold check, not
/// meant to replace a real exporter.
pub struct MetricsStore {
    counters: Counters,
    priority_counters: [PriorityCounters; 4],
    per_shard_clients: DashMap<u64, usize>,
    per_shard_pending_disconnects: DashMap<u64, usize>,
    latency_samples: std::sync::Mutex<Vec<u64>>,
}

const LATENCY_RING_CAPACITY: usize = 1024;

impl MetricsStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(MetricsStore {
            counters: Counters::default(),
            priority_counters: Default::default(),
            per_shard_clients: DashMap::new(),
            per_shard_pending_disconnects: DashMap::new(),
            latency_samples: std::sync::Mutex::new(Vec::with_capacity(LATENCY_RING_CAPACITY)),
        })
    }

    pub fn record_connection_opened(&self) {
        self.counters.total_connections.fetch_add(1, Ordering::Relaxed);
        counter!("trivia_hub_connections_total").increment(1);
    }

    /// A connection's terminal disconnect, whatever the route (spec.md
    /// §4.2 "Overflow"). Cumulative; `active_connections` in the snapshot
    /// is derived from this against `total_connections`.
    pub fn record_connection_closed(&self) {
        self.counters.connections_closed.fetch_add(1, Ordering::Relaxed);
        counter!("trivia_hub_connections_closed_total").increment(1);
    }

    /// An upgrade that never became a connection because authentication
    /// failed (Scenario S6: the only counter this path may touch).
    pub fn record_connection_error(&self) {
        self.counters.connection_errors.fetch_add(1, Ordering::Relaxed);
        counter!("trivia_hub_connection_errors_total").increment(1);
    }

    pub fn record_delivered(&self, count: u64) {
        self.counters.messages_delivered.fetch_add(count, Ordering::Relaxed);
        counter!("trivia_hub_messages_delivered_total").increment(count);
    }

    pub fn record_dropped(&self, count: u64) {
        self.counters.messages_dropped.fetch_add(count, Ordering::Relaxed);
        counter!("trivia_hub_messages_dropped_total").increment(count);
    }

    pub fn record_inactive_eviction(&self, count: u64) {
        self.counters
            .inactive_client_evictions
            .fetch_add(count, Ordering::Relaxed);
        counter!("trivia_hub_inactive_evictions_total").increment(count);
    }

    /// A task accepted onto a shard's priority queue.
    pub fn record_enqueued(&self, priority: Priority, count: u64) {
        self.priority_counters[priority_index(priority)]
            .enqueued
            .fetch_add(count, Ordering::Relaxed);
        counter!("trivia_hub_queue_enqueued_total", "priority" => priority.to_string()).increment(count);
    }

    /// A task pulled off a shard's priority queue by its dispatch loop.
    pub fn record_dequeued(&self, priority: Priority, count: u64) {
        self.priority_counters[priority_index(priority)]
            .dequeued
            .fetch_add(count, Ordering::Relaxed);
        counter!("trivia_hub_queue_dequeued_total", "priority" => priority.to_string()).increment(count);
    }

    /// A task rejected by a full tier, whether or not a bypass path
    /// ([`crate::shard::Shard::enqueue_or_bypass`]) went on to deliver it
    /// directly.
    pub fn record_priority_dropped(&self, priority: Priority, count: u64) {
        self.priority_counters[priority_index(priority)]
            .dropped
            .fetch_add(count, Ordering::Relaxed);
        counter!("trivia_hub_queue_dropped_total", "priority" => priority.to_string()).increment(count);
    }

    pub fn record_cluster_published(&self) {
        self.counters
            .cluster_messages_published
            .fetch_add(1, Ordering::Relaxed);
        counter!("trivia_hub_cluster_messages_published_total").increment(1);
    }

    pub fn record_cluster_received(&self) {
        self.counters
            .cluster_messages_received
            .fetch_add(1, Ordering::Relaxed);
        counter!("trivia_hub_cluster_messages_received_total").increment(1);
    }

    pub fn record_cluster_deduped(&self) {
        self.counters
            .cluster_messages_deduped
            .fetch_add(1, Ordering::Relaxed);
        counter!("trivia_hub_cluster_messages_deduped_total").increment(1);
    }

    pub fn record_rebalance_migration(&self, succeeded: bool) {
        if succeeded {
            self.counters
                .rebalance_migrations_succeeded
                .fetch_add(1, Ordering::Relaxed);
            counter!("trivia_hub_rebalance_migrations_succeeded_total").increment(1);
        } else {
            self.counters
                .rebalance_migrations_failed
                .fetch_add(1, Ordering::Relaxed);
            counter!("trivia_hub_rebalance_migrations_failed_total").increment(1);
        }
    }

    pub fn record_shard_clients(&self, shard_id: u64, count: usize) {
        self.per_shard_clients.insert(shard_id, count);
        gauge!("trivia_hub_shard_clients", "shard" => shard_id.to_string()).set(count as f64);
    }

    pub fn record_pending_disconnects(&self, shard_id: u64, count: usize) {
        self.per_shard_pending_disconnects.insert(shard_id, count);
        gauge!("trivia_hub_shard_pending_disconnects", "shard" => shard_id.to_string()).set(count as f64);
    }

    /// Stamp the last time a liveness sweep (and its paired overflow
    /// drain) ran, surfaced in the snapshot as `last_cleanup_at_millis`.
    pub fn record_cleanup(&self) {
        self.counters
            .last_cleanup_at_millis
            .store(now_millis(), Ordering::Relaxed);
    }

    /// Stamp the last time this process raised an alert. Only alerts
    /// raised by the hub itself update this; the cluster bridge raises its
    /// own `message_loss` alert without a `MetricsStore` handle, so a
    /// reconnect-failure alert won't move this timestamp.
    pub fn record_alert_raised(&self) {
        self.counters
            .last_alert_at_millis
            .store(now_millis(), Ordering::Relaxed);
    }

    /// Record one dispatch's observed latency, used by the `high_latency`
    /// alert (spec.md §9 Open Question, resolved in SPEC_FULL.md §3: wired
    /// to real measured p99 dispatch latency rather than left dead).
    pub fn record_dispatch_latency(&self, elapsed: Duration) {
        let millis = elapsed.as_millis() as u64;
        histogram!("trivia_hub_dispatch_latency_ms").record(millis as f64);

        let mut samples = self.latency_samples.lock().unwrap_or_else(|e| e.into_inner());
        if samples.len() >= LATENCY_RING_CAPACITY {
            samples.remove(0);
        }
        samples.push(millis);
    }

    #[must_use]
    pub fn p99_dispatch_latency_ms(&self) -> u64 {
        let mut samples = self
            .latency_samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if samples.is_empty() {
            return 0;
        }
        samples.sort_unstable();
        let index = ((samples.len() as f64) * 0.99).floor() as usize;
        samples[index.min(samples.len() - 1)]
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_connections = self.counters.total_connections.load(Ordering::Relaxed);
        let connections_closed = self.counters.connections_closed.load(Ordering::Relaxed);

        let per_priority = Priority::TIERS_DESCENDING
            .iter()
            .map(|&priority| {
                let counters = &self.priority_counters[priority_index(priority)];
                PrioritySnapshot {
                    priority: priority.to_string(),
                    enqueued: counters.enqueued.load(Ordering::Relaxed),
                    dequeued: counters.dequeued.load(Ordering::Relaxed),
                    dropped: counters.dropped.load(Ordering::Relaxed),
                }
            })
            .collect();

        MetricsSnapshot {
            active_connections: total_connections.saturating_sub(connections_closed),
            total_connections,
            connections_closed,
            connection_errors: self.counters.connection_errors.load(Ordering::Relaxed),
            messages_delivered: self.counters.messages_delivered.load(Ordering::Relaxed),
            messages_dropped: self.counters.messages_dropped.load(Ordering::Relaxed),
            inactive_client_evictions: self.counters.inactive_client_evictions.load(Ordering::Relaxed),
            pending_disconnect_depth: self
                .per_shard_pending_disconnects
                .iter()
                .map(|entry| *entry.value() as u64)
                .sum(),
            per_priority,
            rebalance_migrations_succeeded: self
                .counters
                .rebalance_migrations_succeeded
                .load(Ordering::Relaxed),
            rebalance_migrations_failed: self.counters.rebalance_migrations_failed.load(Ordering::Relaxed),
            cluster_messages_published: self
                .counters
                .cluster_messages_published
                .load(Ordering::Relaxed),
            cluster_messages_received: self
                .counters
                .cluster_messages_received
                .load(Ordering::Relaxed),
            cluster_messages_deduped: self.counters.cluster_messages_deduped.load(Ordering::Relaxed),
            per_shard_clients: self
                .per_shard_clients
                .iter()
                .map(|entry| (*entry.key(), *entry.value()))
                .collect(),
            p99_dispatch_latency_ms: self.p99_dispatch_latency_ms(),
            last_cleanup_at_millis: self.counters.last_cleanup_at_millis.load(Ordering::Relaxed),
            last_alert_at_millis: self.counters.last_alert_at_millis.load(Ordering::Relaxed),
        }
    }
}

/// A scope guard that records dispatch latency on drop, used to time a
/// fan-out call without threading an explicit `Instant` through every
/// call site.
pub struct DispatchTimer {
    start: Instant,
    metrics: Arc<MetricsStore>,
}

impl DispatchTimer {
    #[must_use]
    pub fn start(metrics: Arc<MetricsStore>) -> Self {
        DispatchTimer {
            start: Instant::now(),
            metrics,
        }
    }
}

impl Drop for DispatchTimer {
    fn drop(&mut self) {
        self.metrics.record_dispatch_latency(self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p99_is_zero_with_no_samples() {
        let store = MetricsStore::new();
        assert_eq!(store.p99_dispatch_latency_ms(), 0);
    }

    #[test]
    fn p99_reflects_recorded_samples() {
        let store = MetricsStore::new();
        for ms in 1..=100u64 {
            store.record_dispatch_latency(Duration::from_millis(ms));
        }
        let p99 = store.p99_dispatch_latency_ms();
        assert!(p99 >= 95, "expected a high percentile sample, got {p99}");
    }

    #[test]
    fn snapshot_reports_per_shard_counts() {
        let store = MetricsStore::new();
        store.record_shard_clients(0, 5);
        store.record_shard_clients(1, 9);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.per_shard_clients.len(), 2);
    }

    #[test]
    fn active_connections_is_opened_minus_closed() {
        let store = MetricsStore::new();
        store.record_connection_opened();
        store.record_connection_opened();
        store.record_connection_closed();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.total_connections, 2);
        assert_eq!(snapshot.connections_closed, 1);
        assert_eq!(snapshot.active_connections, 1);
    }

    #[test]
    fn connection_errors_only_increment_on_auth_failure() {
        let store = MetricsStore::new();
        store.record_connection_error();
        assert_eq!(store.snapshot().connection_errors, 1);
    }

    #[test]
    fn per_priority_counters_track_independently() {
        let store = MetricsStore::new();
        store.record_enqueued(Priority::Critical, 3);
        store.record_dequeued(Priority::Critical, 1);
        store.record_priority_dropped(Priority::Low, 2);

        let snapshot = store.snapshot();
        let critical = snapshot
            .per_priority
            .iter()
            .find(|p| p.priority == "critical")
            .unwrap();
        assert_eq!(critical.enqueued, 3);
        assert_eq!(critical.dequeued, 1);

        let low = snapshot.per_priority.iter().find(|p| p.priority == "low").unwrap();
        assert_eq!(low.dropped, 2);
    }

    #[test]
    fn cluster_dedup_is_tracked_separately_from_receive() {
        let store = MetricsStore::new();
        store.record_cluster_received();
        store.record_cluster_deduped();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.cluster_messages_received, 1);
        assert_eq!(snapshot.cluster_messages_deduped, 1);
    }
}
