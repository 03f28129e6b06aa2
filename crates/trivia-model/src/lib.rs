//! Wire types shared between the gateway core and anything that publishes
//! or consumes its messages: the [`Message`] envelope clients send and
//! receive, the [`Priority`] tiers that govern outbound scheduling, and the
//! [`ClusteredEnvelope`] wrapper used on the cross-instance pub/sub bus.
//!
//! This crate has no transport or concurrency concerns of its own; it is
//! the equivalent of `twilight-model` scoped to exactly what this core
//! needs.

mod envelope;
mod message;
mod priority;

pub use self::{
    envelope::ClusteredEnvelope,
    message::{Message, MessageType, QUIZ_LIFECYCLE_TYPES},
    priority::Priority,
};

#[cfg(test)]
mod tests {
    use super::{ClusteredEnvelope, Message, MessageType, Priority};
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(Priority: Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Send, Sync);
    assert_impl_all!(MessageType: Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Send, Sync);
    assert_impl_all!(Message: Clone, Debug, Send, Sync);
    assert_impl_all!(ClusteredEnvelope: Clone, Debug, Send, Sync);
}
