//! The real-time fan-out core of the trivia platform's WebSocket hub:
//! connection management, sharding, priority-scheduled fan-out, cluster
//! pub/sub, rebalancing, metrics/alerting, and the event manager façade
//! that sits in front of all of it.
//!
//! Module layout mirrors the component boundaries: [`connection`] is one
//! live transport, [`shard`] is a partition of the connection space,
//! [`hub`] owns every shard and routes across them, [`cluster`] bridges
//! multiple hub instances, [`metrics`] and [`alert`] are the observability
//! surface, and [`manager`] is the façade most callers actually use.

pub mod alert;
pub mod cluster;
pub mod config;
pub mod connection;
pub mod error;
pub mod ids;
pub mod manager;
pub mod metrics;
pub mod shard;

mod hub;

pub use self::config::{ClusterConfig, GatewayConfig, GatewayConfigBuilder};
pub use self::error::{Error, ErrorKind, Result};
pub use self::hub::{Hub, HubConfig, HubConfigBuilder, RebalancePlan};
pub use self::manager::EventManager;

#[cfg(test)]
mod tests {
    use crate::alert::AlertSink;
    use crate::cluster::ClusterBridge;
    use crate::connection::Connection;
    use crate::metrics::MetricsStore;
    use crate::shard::Shard;
    use crate::Hub;
    use static_assertions::assert_impl_all;

    assert_impl_all!(Hub: Send, Sync);
    assert_impl_all!(Shard: Send, Sync);
    assert_impl_all!(Connection: Clone, Send, Sync);
    assert_impl_all!(MetricsStore: Send, Sync);
    assert_impl_all!(AlertSink: Clone, Send, Sync);
    assert_impl_all!(ClusterBridge: Send, Sync);
}
