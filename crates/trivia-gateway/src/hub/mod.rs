//! The hub: owns every shard and routes work across them (spec.md §3
//! `Hub`, §4.5, C5).
//!
//! There is exactly one `Hub` type (SPEC_FULL.md §3 resolves the
//! polymorphism Open Question this way): a degenerate single-shard
//! deployment is just a `Hub` built with `shard_count: 1`, not a separate
//! "simple hub" implementation.

mod config;
mod migration;
mod rebalance;

pub use self::config::{HubConfig, HubConfigBuilder};
pub use self::rebalance::RebalancePlan;

use crate::alert::{Alert, AlertCategory, AlertSink};
use crate::cluster::ClusterBridge;
use crate::connection::{Connection, SendOutcome};
use crate::ids::{shard_for, UserId};
use crate::metrics::{DispatchTimer, MetricsStore};
use crate::shard::{DisconnectRoute, RegisterOutcome, Shard, ShardConfig};
use std::sync::Arc;
use tracing::debug;
use trivia_model::{MessageType, Priority};
use trivia_queue::{OutboundTask, WorkerPool};

/// The top-level fan-out core for one process instance.
pub struct Hub {
    pub(crate) shards: Vec<Arc<Shard>>,
    config: HubConfig,
    worker_pool: WorkerPool,
    cluster: std::sync::RwLock<Option<Arc<ClusterBridge>>>,
    metrics: Arc<MetricsStore>,
    alert_sink: AlertSink,
    origin_id: String,
    dispatch_loops: std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl Hub {
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self::with_shard_config(config, ShardConfig::default())
    }

    #[must_use]
    pub fn with_shard_config(config: HubConfig, shard_config: ShardConfig) -> Self {
        let shards: Vec<Arc<Shard>> = (0..config.shard_count())
            .map(|id| Shard::new_shared(id, shard_config.clone()))
            .collect();

        let hub = Hub {
            shards,
            worker_pool: WorkerPool::new(config.worker_count()),
            config,
            cluster: std::sync::RwLock::new(None),
            metrics: MetricsStore::new(),
            alert_sink: crate::alert::spawn_alert_consumer(),
            origin_id: generate_origin_id(),
            dispatch_loops: std::sync::Mutex::new(Vec::new()),
        };

        let metrics = hub.metrics();
        let handles = hub
            .shards
            .iter()
            .map(|shard| shard.spawn_dispatch_loop(Arc::clone(&metrics)))
            .collect();
        *hub.dispatch_loops.lock().unwrap_or_else(|e| e.into_inner()) = handles;

        hub
    }

    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<MetricsStore> {
        Arc::clone(&self.metrics)
    }

    /// The hub's alert sink, shared with any component (e.g. the cluster
    /// bridge) that needs to raise the same four tagged alert categories.
    #[must_use]
    pub fn alert_sink(&self) -> AlertSink {
        self.alert_sink.clone()
    }

    #[must_use]
    pub fn origin_id(&self) -> &str {
        &self.origin_id
    }

    pub fn attach_cluster(&self, bridge: Arc<ClusterBridge>) {
        *self.cluster.write().unwrap_or_else(|e| e.into_inner()) = Some(bridge);
    }

    #[must_use]
    pub fn shard_count(&self) -> u64 {
        self.shards.len() as u64
    }

    #[must_use]
    pub fn shard_for_user(&self, user_id: &str) -> u64 {
        shard_for(user_id, self.shard_count())
    }

    #[must_use]
    pub fn shard(&self, index: u64) -> &Arc<Shard> {
        &self.shards[index as usize]
    }

    /// Register a new connection, routing it to its shard by consistent
    /// hash of `user_id` (spec.md §4.5).
    pub fn register(&self, user_id: UserId, connection: Connection) -> RegisterOutcome {
        let shard = self.shard(self.shard_for_user(&user_id));
        let outcome = shard.register(user_id, connection);
        if let RegisterOutcome::Replaced { previous } = &outcome {
            shard.spawn_replacement_watchdog(previous.clone());
        }
        self.metrics.record_connection_opened();
        outcome
    }

    /// Broadcast a message to every subscribed connection across every
    /// shard. Each shard gets its own [`OutboundTask`], enqueued (panic-
    /// isolated, via the worker pool) onto that shard's priority queue;
    /// actual delivery happens on the shard's own dispatch loop, so
    /// fan-out initiation is concurrent across shards while delivery
    /// within a shard stays serialized (spec.md §4.5 step 2, C2/C3).
    ///
    /// A shard whose queue rejects the task still gets it delivered
    /// immediately if the priority is one that must bypass backpressure
    /// (spec.md §4.5 "Prioritised broadcast"; see
    /// [`Shard::enqueue_or_bypass`]).
    pub async fn broadcast(&self, message_type: MessageType, frame: String) {
        let _timer = DispatchTimer::start(self.metrics());
        let priority = Priority::for_message_type(&message_type.0);
        debug!(%message_type, ?priority, "broadcasting");

        for shard in self.shards.clone() {
            let task = OutboundTask::Broadcast {
                message_type: message_type.0.clone(),
                frame: frame.clone(),
                priority,
            };
            let metrics = self.metrics();
            self.worker_pool.submit(Box::pin(async move {
                shard.enqueue_or_bypass(task, &metrics);
            }));
        }

        if let Some(cluster) = self.cluster.read().unwrap_or_else(|e| e.into_inner()).clone() {
            if cluster.publish_broadcast(frame.clone()).await.is_ok() {
                self.metrics.record_cluster_published();
            }
        }
    }

    /// Fan a frame received from the cluster bus out to this instance's
    /// own connections only — never re-publishes, since the cluster bus
    /// already delivered it to every other instance (spec.md §4.6).
    pub fn deliver_local(&self, frame: String) {
        let Some(message_type) = trivia_model::Message::extract_type(&frame) else {
            return;
        };
        let priority = Priority::for_message_type(&message_type.0);

        for shard in &self.shards {
            shard.enqueue_or_bypass(
                OutboundTask::Broadcast {
                    message_type: message_type.0.clone(),
                    frame: frame.clone(),
                    priority,
                },
                &self.metrics,
            );
        }
    }

    /// Deliver a message received from the cluster bus to exactly one
    /// local user (the unicast counterpart of [`Hub::deliver_local`]).
    /// A miss here means the target isn't connected to this instance at
    /// all, which is normal and not an error.
    pub fn deliver_local_unicast(&self, user_id: &str, frame: String) {
        let shard = self.shard(self.shard_for_user(user_id));
        shard.fanout_unicast(user_id, &frame);
    }

    /// Deliver a message to exactly one user, falling back to a cluster
    /// publish if no local shard has that user registered (spec.md §4.5
    /// step 2 unicast path). Unicast targets a single connection rather
    /// than fanning out across shards, so it bypasses the per-shard queue
    /// and sends directly — there's no cross-shard work to serialize.
    pub async fn unicast(&self, user_id: &str, frame: String) -> SendOutcome {
        let shard = self.shard(self.shard_for_user(user_id));
        if let Some(outcome) = shard.fanout_unicast(user_id, &frame) {
            return outcome;
        }

        if let Some(cluster) = self.cluster.read().unwrap_or_else(|e| e.into_inner()).clone() {
            let _ = cluster.publish_unicast(user_id, frame).await;
        }

        SendOutcome::Dropped
    }

    /// Handle a connection's own terminal disconnect (read/write loop
    /// exit). Routes through the owning shard's overflow-diversion logic
    /// (spec.md §4.2 "Overflow") and raises a `buffer_overflow` alert if
    /// the overflow buffer itself was full and the shard had to fall back
    /// to inline processing under load.
    pub async fn handle_disconnect(&self, user_id: &str, connection: &Connection) {
        let shard = self.shard(self.shard_for_user(user_id));
        let route = shard.handle_disconnect(user_id, connection).await;
        if route == DisconnectRoute::OverflowFullFallback {
            self.alert_sink.raise(
                Alert::new(
                    AlertCategory::BufferOverflow,
                    format!("shard {} overflow queue full, disconnect processed inline", shard.id),
                )
                .for_shard(shard.id),
            );
            self.metrics.record_alert_raised();
        }
        self.metrics.record_connection_closed();
    }

    /// Start the background tasks that need the hub wrapped in an `Arc`:
    /// each shard's liveness sweeper and the periodic rebalancer. The
    /// per-shard dispatch loops are already running by the time this
    /// returns (spawned in the constructor, since shards are independently
    /// `Arc`-owned); call this once, right after wrapping the freshly
    /// built `Hub` in an `Arc`.
    pub fn start(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let metrics = self.metrics();
        let mut handles: Vec<_> = self
            .shards
            .iter()
            .map(|shard| shard.spawn_liveness_sweeper(Arc::clone(&metrics)))
            .collect();
        handles.push(self.spawn_rebalancer());
        handles
    }

    #[must_use]
    pub fn total_clients(&self) -> usize {
        self.shards.iter().map(|shard| shard.client_count()).sum()
    }

    pub fn refresh_shard_metrics(&self) {
        for shard in &self.shards {
            self.metrics.record_shard_clients(shard.id, shard.client_count());
        }
    }

    /// Raise a `high_latency` alert if the trailing p99 dispatch latency
    /// exceeds `high_latency_threshold` (spec.md §9 Open Question 2,
    /// resolved in SPEC_FULL.md §3: wired to a real measured threshold
    /// rather than left as a dead category).
    pub fn check_high_latency(&self) {
        let p99 = self.metrics.p99_dispatch_latency_ms();
        let threshold = self.config.high_latency_threshold().as_millis() as u64;
        if p99 > threshold {
            self.alert_sink.raise(Alert::new(
                AlertCategory::HighLatency,
                format!("p99 dispatch latency {p99}ms exceeds {threshold}ms threshold"),
            ));
            self.metrics.record_alert_raised();
        }
    }

    /// Abort every per-shard dispatch loop. Used on process shutdown;
    /// there's no graceful drain, matching the teacher's shard shutdown
    /// (`gateway/src/shard/processor/impl.rs`) which aborts rather than
    /// waits.
    pub fn shutdown(&self) {
        for handle in self.dispatch_loops.lock().unwrap_or_else(|e| e.into_inner()).drain(..) {
            handle.abort();
        }
    }
}

fn generate_origin_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("trivia-hub-{nanos:x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;

    #[tokio::test]
    async fn broadcast_reaches_every_shard() {
        let hub = Hub::new(HubConfig::builder().shard_count(4).worker_count(2).build());
        let mut receivers = Vec::new();
        for i in 0..4 {
            let (conn, rx) = Connection::new(format!("user-{i}"), 4);
            hub.register(format!("user-{i}"), conn);
            receivers.push(rx);
        }

        hub.broadcast(MessageType::from("QUIZ_START"), "{}".into()).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        for mut rx in receivers {
            assert!(rx.try_recv().is_ok());
        }
    }

    #[tokio::test]
    async fn routes_are_stable_across_calls() {
        let hub = Hub::new(HubConfig::builder().shard_count(8).build());
        assert_eq!(hub.shard_for_user("user-42"), hub.shard_for_user("user-42"));
    }
}
