use serde::{Deserialize, Serialize};

/// The wrapper the cluster bridge puts around a locally-originated message
/// before publishing it to the shared bus (spec.md §3, §4.6).
///
/// `origin_id` identifies the publishing process instance so a consumer can
/// discard its own echo; `message_id` enables idempotent deduplication of
/// critical traffic that may be retried or duplicated by the bus.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusteredEnvelope {
    pub origin_id: String,
    pub message_id: String,
    /// Unix epoch milliseconds. Not used for ordering (spec.md guarantees
    /// none across instances), only for diagnostics and dedup-window aging.
    pub timestamp: u64,
    /// The raw JSON frame being relayed, opaque to the bridge itself.
    pub payload: String,
    /// `Some(user_id)` if this envelope should be routed to exactly one
    /// user on each receiving instance rather than fanned out to every
    /// local connection. `None` means broadcast, the default for `new`.
    #[serde(default)]
    pub target_user_id: Option<String>,
}

impl ClusteredEnvelope {
    #[must_use]
    pub fn new(origin_id: String, message_id: String, timestamp: u64, payload: String) -> Self {
        ClusteredEnvelope {
            origin_id,
            message_id,
            timestamp,
            payload,
            target_user_id: None,
        }
    }

    /// Mark this envelope as a unicast targeted at `user_id`.
    #[must_use]
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.target_user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn is_unicast(&self) -> bool {
        self.target_user_id.is_some()
    }

    /// Whether this envelope originated from the given process instance and
    /// should therefore be discarded by that instance's own subscriber
    /// (spec.md §4.6, Testable Property 5).
    #[must_use]
    pub fn is_self_echo(&self, local_origin_id: &str) -> bool {
        self.origin_id == local_origin_id
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    #[must_use]
    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_echo_detection() {
        let envelope = ClusteredEnvelope::new("proc-a".into(), "msg-1".into(), 0, "{}".into());
        assert!(envelope.is_self_echo("proc-a"));
        assert!(!envelope.is_self_echo("proc-b"));
    }

    #[test]
    fn round_trips_through_json() {
        let envelope = ClusteredEnvelope::new("proc-a".into(), "msg-1".into(), 123, "{}".into());
        let json = envelope.to_json();
        let parsed = ClusteredEnvelope::from_json(&json).expect("valid json");
        assert_eq!(parsed.origin_id, "proc-a");
        assert_eq!(parsed.message_id, "msg-1");
        assert_eq!(parsed.timestamp, 123);
    }

    #[test]
    fn for_user_marks_the_envelope_as_a_unicast() {
        let broadcast = ClusteredEnvelope::new("proc-a".into(), "msg-1".into(), 0, "{}".into());
        assert!(!broadcast.is_unicast());

        let unicast = broadcast.for_user("user-9");
        assert!(unicast.is_unicast());
        assert_eq!(unicast.target_user_id.as_deref(), Some("user-9"));

        let json = unicast.to_json();
        let parsed = ClusteredEnvelope::from_json(&json).expect("valid json");
        assert_eq!(parsed.target_user_id.as_deref(), Some("user-9"));
    }
}
