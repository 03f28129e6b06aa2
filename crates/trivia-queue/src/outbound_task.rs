use trivia_model::Priority;

/// A unit of fan-out work queued by a shard's dispatch loop (spec.md §3
/// `OutboundTask`).
///
/// There is only a broadcast variant: unicast delivery (`Hub::unicast`)
/// targets exactly one connection and sends to it directly rather than
/// going through a shard's queue — there's no cross-shard fan-out to
/// serialize, so queueing it would only add latency for no isolation
/// benefit.
#[derive(Clone, Debug)]
pub enum OutboundTask {
    /// Deliver `frame` to every (filtered) connection across all shards.
    Broadcast {
        message_type: String,
        frame: String,
        priority: Priority,
    },
}

impl OutboundTask {
    #[must_use]
    pub fn priority(&self) -> Priority {
        match self {
            OutboundTask::Broadcast { priority, .. } => *priority,
        }
    }
}
