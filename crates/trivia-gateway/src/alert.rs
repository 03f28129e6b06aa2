//! Alerting (spec.md §4.6, C7).
//!
//! Four tagged categories, pushed onto a small bounded channel so a burst
//! of alerts can't build unbounded backpressure into the hot path that's
//! raising them; if the channel is full the alert is logged inline instead
//! of being silently swallowed.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    HotShard,
    MessageLoss,
    BufferOverflow,
    HighLatency,
}

#[derive(Clone, Debug, Serialize)]
pub struct Alert {
    pub category: AlertCategory,
    pub message: String,
    pub shard_id: Option<u64>,
}

impl Alert {
    #[must_use]
    pub fn new(category: AlertCategory, message: impl Into<String>) -> Self {
        Alert {
            category,
            message: message.into(),
            shard_id: None,
        }
    }

    #[must_use]
    pub fn for_shard(mut self, shard_id: u64) -> Self {
        self.shard_id = Some(shard_id);
        self
    }
}

const ALERT_CHANNEL_CAPACITY: usize = 100;

/// Sending half of the alert channel. Cloned into every component that can
/// raise an alert.
#[derive(Clone)]
pub struct AlertSink(mpsc::Sender<Alert>);

impl AlertSink {
    pub fn raise(&self, alert: Alert) {
        if self.0.try_send(alert.clone()).is_err() {
            warn!(
                category = ?alert.category,
                shard = ?alert.shard_id,
                message = %alert.message,
                "alert channel full, logging inline"
            );
        }
    }
}

/// Construct the alert channel and spawn its consumer task, which simply
/// logs each alert as it arrives. A real deployment would instead forward
/// these to a paging system; this crate's Non-goals (spec.md §9) exclude
/// that integration, but the channel and categories are the seam for it.
#[must_use]
pub fn spawn_alert_consumer() -> AlertSink {
    let (tx, mut rx) = mpsc::channel(ALERT_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        while let Some(alert) = rx.recv().await {
            warn!(
                category = ?alert.category,
                shard = ?alert.shard_id,
                message = %alert.message,
                "alert raised"
            );
        }
    });

    AlertSink(tx)
}
