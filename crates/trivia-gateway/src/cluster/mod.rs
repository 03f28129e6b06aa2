//! The cluster bridge: cross-instance pub/sub so a hub can reach a user
//! connected to a different process (spec.md §4.6, C6).

mod bridge;
mod error;

pub use self::bridge::ClusterBridge;
pub use self::error::{ClusterError, ClusterErrorKind, Result};
