//! Top-level configuration aggregating every component's tunables
//! (spec.md §6).

use crate::connection::ConnectionConfig;
use crate::hub::HubConfig;
use crate::shard::ShardConfig;

/// Everything needed to stand up a [`crate::hub::Hub`] plus its
/// connections' defaults.
#[derive(Clone, Debug, Default)]
pub struct GatewayConfig {
    pub hub: HubConfig,
    pub shard: ShardConfig,
    pub connection: ConnectionConfig,
    pub cluster: Option<ClusterConfig>,
}

/// Cluster bridge settings (spec.md §4.6, §6). Present only when
/// cross-instance fan-out is enabled.
#[derive(Clone, Debug)]
pub struct ClusterConfig {
    pub redis_url: String,
    pub channel: String,
}

impl GatewayConfig {
    #[must_use]
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }
}

#[derive(Clone, Debug, Default)]
pub struct GatewayConfigBuilder(GatewayConfig);

impl GatewayConfigBuilder {
    #[must_use]
    pub fn hub(mut self, value: HubConfig) -> Self {
        self.0.hub = value;
        self
    }

    #[must_use]
    pub fn shard(mut self, value: ShardConfig) -> Self {
        self.0.shard = value;
        self
    }

    #[must_use]
    pub fn connection(mut self, value: ConnectionConfig) -> Self {
        self.0.connection = value;
        self
    }

    #[must_use]
    pub fn cluster(mut self, redis_url: impl Into<String>, channel: impl Into<String>) -> Self {
        self.0.cluster = Some(ClusterConfig {
            redis_url: redis_url.into(),
            channel: channel.into(),
        });
        self
    }

    #[must_use]
    pub fn build(self) -> GatewayConfig {
        self.0
    }
}
