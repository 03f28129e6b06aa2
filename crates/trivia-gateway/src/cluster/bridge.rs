//! The cluster pub/sub bridge (spec.md §4.6, C6).
//!
//! Every instance publishes outbound broadcasts to a shared Redis channel
//! and subscribes to the same channel for messages other instances
//! produced. A locally-originated envelope is recognised and dropped by
//! its own subscriber via `origin_id` (spec.md §4.6 "self-echo
//! suppression"); a short-lived recency set additionally guards against
//! duplicate delivery if Redis itself redelivers a message.
//!
//! Grounded on the teacher's own (stub) `cache/redis` sibling crate as
//! precedent for reaching for `redis` here: the gateway crate proper has
//! no pub/sub dependency of its own, but the monorepo already treats Redis
//! as its caching/bus technology of choice.

use super::error::{ClusterError, ClusterErrorKind, Result};
use crate::alert::{Alert, AlertCategory, AlertSink};
use crate::metrics::MetricsStore;
use dashmap::DashMap;
use futures_util::StreamExt;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use trivia_model::ClusteredEnvelope;

const RECENCY_CAPACITY: usize = 10_000;
const RECENCY_TTL: Duration = Duration::from_secs(30);
const RECONNECT_ALERT_THRESHOLD: u32 = 5;

fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct ClusterBridge {
    client: redis::Client,
    channel: String,
    origin_id: String,
    publish_conn: Mutex<Option<redis::aio::ConnectionManager>>,
    seen: DashMap<String, Instant>,
    alert_sink: AlertSink,
    metrics: Arc<MetricsStore>,
    consecutive_failures: AtomicU32,
}

impl ClusterBridge {
    pub async fn connect(
        redis_url: &str,
        channel: impl Into<String>,
        origin_id: impl Into<String>,
        alert_sink: AlertSink,
        metrics: Arc<MetricsStore>,
    ) -> Result<Arc<Self>> {
        let client = redis::Client::open(redis_url)
            .map_err(|source| ClusterError::with_source(ClusterErrorKind::ConnectFailed, source))?;

        let manager = client
            .get_connection_manager()
            .await
            .map_err(|source| ClusterError::with_source(ClusterErrorKind::ConnectFailed, source))?;

        Ok(Arc::new(ClusterBridge {
            client,
            channel: channel.into(),
            origin_id: origin_id.into(),
            publish_conn: Mutex::new(Some(manager)),
            seen: DashMap::new(),
            alert_sink,
            metrics,
            consecutive_failures: AtomicU32::new(0),
        }))
    }

    /// Publish `payload` (an already-serialised outbound frame) to every
    /// other instance on the cluster bus.
    pub async fn publish_broadcast(&self, payload: String) -> Result<()> {
        let envelope = self.new_envelope(payload);
        self.publish_envelope(envelope).await
    }

    /// Publish `payload` to the cluster bus, tagged so only the instance
    /// holding `user_id`'s connection delivers it locally (spec.md §4.5
    /// unicast path, §4.6).
    pub async fn publish_unicast(&self, user_id: &str, payload: String) -> Result<()> {
        let envelope = self.new_envelope(payload).for_user(user_id);
        self.publish_envelope(envelope).await
    }

    fn new_envelope(&self, payload: String) -> ClusteredEnvelope {
        let message_id = format!("{}-{}", self.origin_id, now_millis());
        ClusteredEnvelope::new(self.origin_id.clone(), message_id, now_millis(), payload)
    }

    async fn publish_envelope(&self, envelope: ClusteredEnvelope) -> Result<()> {
        let body = envelope.to_json();

        let mut guard = self.publish_conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| ClusterError::new(ClusterErrorKind::PublishFailed))?;

        match conn.publish::<_, _, ()>(&self.channel, body).await {
            Ok(()) => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                Ok(())
            }
            Err(source) => {
                self.note_failure();
                Err(ClusterError::with_source(ClusterErrorKind::PublishFailed, source))
            }
        }
    }

    fn note_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures == RECONNECT_ALERT_THRESHOLD {
            self.alert_sink.raise(Alert::new(
                AlertCategory::MessageLoss,
                "repeated cluster bus publish failures",
            ));
        }
    }

    /// Whether `message_id` has been seen in the last [`RECENCY_TTL`].
    /// Marks it seen as a side effect and evicts stale entries
    /// opportunistically, bounding the set at [`RECENCY_CAPACITY`].
    fn already_seen(&self, message_id: &str) -> bool {
        let now = Instant::now();

        if self.seen.len() > RECENCY_CAPACITY {
            self.seen.retain(|_, seen_at| now.duration_since(*seen_at) < RECENCY_TTL);
        }

        match self.seen.get(message_id) {
            Some(seen_at) if now.duration_since(*seen_at) < RECENCY_TTL => true,
            _ => {
                self.seen.insert(message_id.to_owned(), now);
                false
            }
        }
    }

    /// Subscribe to the cluster channel and invoke `on_message` for every
    /// envelope that isn't a self-echo or a recent duplicate. The second
    /// argument is `Some(user_id)` for a unicast envelope, `None` for a
    /// broadcast, so the caller can route accordingly (spec.md §4.5
    /// unicast path). Reconnects with exponential backoff on failure;
    /// raises a `message_loss` alert after enough consecutive reconnect
    /// failures (Scenario S5).
    pub fn spawn_subscriber<F>(self: &Arc<Self>, on_message: F) -> tokio::task::JoinHandle<()>
    where
        F: Fn(String, Option<String>) + Send + Sync + 'static,
    {
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            let mut backoff = Duration::from_millis(100);
            loop {
                match bridge.run_subscriber_once(&on_message).await {
                    Ok(()) => backoff = Duration::from_millis(100),
                    Err(err) => {
                        warn!(error = %err, backoff_ms = backoff.as_millis(), "cluster subscriber disconnected");
                        bridge.note_failure();
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(Duration::from_secs(30));
                    }
                }
            }
        })
    }

    async fn run_subscriber_once<F>(&self, on_message: &F) -> Result<()>
    where
        F: Fn(String, Option<String>),
    {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|source| ClusterError::with_source(ClusterErrorKind::SubscribeFailed, source))?;

        pubsub
            .subscribe(&self.channel)
            .await
            .map_err(|source| ClusterError::with_source(ClusterErrorKind::SubscribeFailed, source))?;

        debug!(channel = %self.channel, "subscribed to cluster bus");
        let mut stream = pubsub.on_message();

        while let Some(message) = stream.next().await {
            let raw: String = match message.get_payload() {
                Ok(raw) => raw,
                Err(source) => {
                    error!(error = %source, "malformed cluster payload");
                    continue;
                }
            };

            let envelope = match ClusteredEnvelope::from_json(&raw) {
                Some(envelope) => envelope,
                None => {
                    error!("failed to parse cluster envelope");
                    continue;
                }
            };

            if envelope.is_self_echo(&self.origin_id) {
                continue;
            }
            if self.already_seen(&envelope.message_id) {
                self.metrics.record_cluster_deduped();
                continue;
            }

            self.metrics.record_cluster_received();
            on_message(envelope.payload, envelope.target_user_id);
        }

        Ok(())
    }
}
