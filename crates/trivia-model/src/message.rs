use crate::priority::Priority;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// A message type tag, e.g. `"QUIZ_START"` or `"user:heartbeat"`.
///
/// Newtype over `String` so call sites can't accidentally compare a type
/// tag against an arbitrary string field.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct MessageType(pub String);

impl MessageType {
    /// The sentinel empty-string type meaning "all" in a subscription set.
    pub fn wildcard() -> Self {
        MessageType(String::new())
    }

    /// Whether this is the wildcard "all" subscription.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.0.is_empty()
    }

    /// Message types that must be delivered unconditionally regardless of a
    /// connection's subscription set (spec.md §4.2 fan-out step 2).
    #[must_use]
    pub fn is_system_distinguished(&self) -> bool {
        matches!(
            self.0.as_str(),
            "token_revoked" | "token_invalidated" | "system:error" | "system:shard_migration"
        )
    }
}

impl From<&str> for MessageType {
    fn from(value: &str) -> Self {
        MessageType(value.to_owned())
    }
}

impl From<String> for MessageType {
    fn from(value: String) -> Self {
        MessageType(value)
    }
}

impl Display for MessageType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

/// The standard quiz-lifecycle event family, used by the bulk subscription
/// helper on [`crate`]'s `Connection` contract in `trivia-gateway`.
pub const QUIZ_LIFECYCLE_TYPES: [&str; 5] = [
    "QUIZ_START",
    "QUIZ_END",
    "QUESTION_START",
    "QUESTION_END",
    "RESULT_UPDATE",
];

/// The JSON-serialised message envelope described in spec.md §3 and §6.
///
/// `priority` is advisory only: the server resolves the effective priority
/// from [`Priority::for_message_type`] and may override whatever the client
/// sent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

impl Message {
    /// Build a new outbound message, resolving its effective priority from
    /// the static by-type table.
    #[must_use]
    pub fn new(message_type: impl Into<MessageType>, data: Value) -> Self {
        let message_type = message_type.into();
        let priority = Priority::for_message_type(&message_type.0);

        Message {
            message_type,
            data,
            priority: Some(priority.to_string().to_uppercase()),
        }
    }

    /// The effective priority for this message, ignoring the client-supplied
    /// advisory value, per spec.md §3: "the client-supplied `priority` is
    /// advisory and may be overridden."
    #[must_use]
    pub fn effective_priority(&self) -> Priority {
        Priority::for_message_type(&self.message_type.0)
    }

    /// Best-effort extraction of the `type` field from a raw JSON frame,
    /// without fully deserializing it. Mirrors the teacher's
    /// `GatewayEventDeserializer::from_json` fast path in
    /// `gateway/src/shard/processor/impl.rs`, which avoids a full `serde`
    /// pass just to pull out a tag used for dispatch.
    #[must_use]
    pub fn extract_type(raw: &str) -> Option<MessageType> {
        let value: Value = serde_json::from_str(raw).ok()?;
        value
            .get("type")
            .and_then(Value::as_str)
            .map(MessageType::from)
    }

    /// Serialize to a compact JSON string, the wire form sent over the
    /// websocket transport.
    #[must_use]
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_subscription_matches_everything_conceptually() {
        assert!(MessageType::wildcard().is_wildcard());
        assert!(!MessageType::from("QUIZ_START").is_wildcard());
    }

    #[test]
    fn system_distinguished_types_bypass_filtering() {
        assert!(MessageType::from("token_revoked").is_system_distinguished());
        assert!(!MessageType::from("QUIZ_START").is_system_distinguished());
    }

    #[test]
    fn extract_type_reads_tag_without_full_deserialize() {
        let raw = r#"{"type":"QUIZ_START","data":{"quiz_id":42}}"#;
        assert_eq!(
            Message::extract_type(raw),
            Some(MessageType::from("QUIZ_START"))
        );
        assert_eq!(Message::extract_type("not json"), None);
    }

    #[test]
    fn new_resolves_priority_server_side() {
        let msg = Message::new("QUIZ_START", serde_json::json!({"quiz_id": 42}));
        assert_eq!(msg.effective_priority(), Priority::High);
    }
}
