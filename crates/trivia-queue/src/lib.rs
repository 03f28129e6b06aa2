//! The bounded, priority-tiered outbound pipeline (spec.md §4.3–§4.4).
//!
//! [`PriorityQueue`] is a single shared structure with four independently
//! capacity-bounded tiers; [`WorkerPool`] drains tasks submitted to it with
//! panic isolation so one faulty fan-out job can't tear a worker down.
//! Companion crate to `trivia-gateway`, the same way `twilight-gateway-queue`
//! is a companion to `twilight-gateway`.

mod outbound_task;
mod priority_queue;
mod worker_pool;

pub use self::{
    outbound_task::OutboundTask,
    priority_queue::{PriorityQueue, QueueSnapshot, TierSnapshot},
    worker_pool::{BoxedJob, WorkerPool},
};
