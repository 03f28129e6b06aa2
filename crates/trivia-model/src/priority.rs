use std::fmt::{Display, Formatter, Result as FmtResult};

/// One of the four outbound scheduling tiers.
///
/// Ordering is significant: variants are declared highest-to-lowest so that
/// the derived [`Ord`] impl matches dispatch priority (`Critical` is the
/// greatest).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Priority {
    /// Lowest tier. Heartbeats in either direction.
    Low,
    /// User answers, result updates, user-joined notices.
    Normal,
    /// Token-about-to-expire, quiz/question start and end.
    High,
    /// Shard migration notice, token revocation/invalidation, key rotation.
    Critical,
}

impl Priority {
    /// All tiers, highest first. Used by the priority queue's dequeue walk.
    pub const TIERS_DESCENDING: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Resolve the default priority for a message type tag per the
    /// authoritative table in spec.md §6.
    ///
    /// Unknown types default to [`Priority::Normal`].
    #[must_use]
    pub fn for_message_type(message_type: &str) -> Self {
        match message_type {
            "system:shard_migration" | "token_revoked" | "token_invalidated" | "key_rotation" => {
                Priority::Critical
            }
            "token_about_to_expire" | "QUIZ_START" | "QUIZ_END" | "QUESTION_START"
            | "QUESTION_END" => Priority::High,
            "user:heartbeat" | "server:heartbeat" => Priority::Low,
            _ => Priority::Normal,
        }
    }

    /// Parse a client-supplied advisory priority name. Returns `None` for
    /// anything other than the four recognised names; callers treat that as
    /// "no advisory given" rather than an error.
    #[must_use]
    pub fn from_advisory(name: &str) -> Option<Self> {
        match name {
            "LOW" => Some(Priority::Low),
            "NORMAL" => Some(Priority::Normal),
            "HIGH" => Some(Priority::High),
            "CRITICAL" => Some(Priority::Critical),
            _ => None,
        }
    }

    /// Whether this tier's fan-out must bypass a back-pressured shard
    /// broadcast channel per spec.md §4.5's "Prioritised broadcast" rule.
    #[must_use]
    pub const fn bypasses_backpressure(self) -> bool {
        matches!(self, Priority::Critical | Priority::High)
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Priority;

    #[test]
    fn ordering_is_priority_order() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn by_type_table_matches_spec() {
        assert_eq!(Priority::for_message_type("QUIZ_START"), Priority::High);
        assert_eq!(
            Priority::for_message_type("token_revoked"),
            Priority::Critical
        );
        assert_eq!(
            Priority::for_message_type("user:heartbeat"),
            Priority::Low
        );
        assert_eq!(
            Priority::for_message_type("USER_ANSWER"),
            Priority::Normal
        );
        assert_eq!(Priority::for_message_type("unknown:type"), Priority::Normal);
    }

    #[test]
    fn advisory_parsing_is_case_sensitive_and_strict() {
        assert_eq!(Priority::from_advisory("HIGH"), Some(Priority::High));
        assert_eq!(Priority::from_advisory("high"), None);
        assert_eq!(Priority::from_advisory("URGENT"), None);
    }
}
