use std::time::Duration;

/// Hub-wide tunables (spec.md §4.5, §6).
#[derive(Clone, Debug)]
pub struct HubConfig {
    shard_count: u64,
    worker_count: usize,
    rebalance_period: Duration,
    rebalance_min_clients: usize,
    rebalance_ratio_trigger: f64,
    rebalance_batch: usize,
    rebalance_emergency_shard_fraction: f64,
    rebalance_emergency_load_trigger: f64,
    migration_timeout: Duration,
    high_latency_threshold: Duration,
}

impl HubConfig {
    #[must_use]
    pub fn builder() -> HubConfigBuilder {
        HubConfigBuilder::default()
    }

    #[must_use]
    pub fn shard_count(&self) -> u64 {
        self.shard_count
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    #[must_use]
    pub fn rebalance_period(&self) -> Duration {
        self.rebalance_period
    }

    #[must_use]
    pub fn rebalance_min_clients(&self) -> usize {
        self.rebalance_min_clients
    }

    #[must_use]
    pub fn rebalance_ratio_trigger(&self) -> f64 {
        self.rebalance_ratio_trigger
    }

    #[must_use]
    pub fn rebalance_batch(&self) -> usize {
        self.rebalance_batch
    }

    #[must_use]
    pub fn rebalance_emergency_shard_fraction(&self) -> f64 {
        self.rebalance_emergency_shard_fraction
    }

    #[must_use]
    pub fn rebalance_emergency_load_trigger(&self) -> f64 {
        self.rebalance_emergency_load_trigger
    }

    #[must_use]
    pub fn migration_timeout(&self) -> Duration {
        self.migration_timeout
    }

    #[must_use]
    pub fn high_latency_threshold(&self) -> Duration {
        self.high_latency_threshold
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            shard_count: 8,
            worker_count: 16,
            rebalance_period: Duration::from_secs(300),
            rebalance_min_clients: 100,
            rebalance_ratio_trigger: 1.3,
            rebalance_batch: 50,
            rebalance_emergency_shard_fraction: 0.25,
            rebalance_emergency_load_trigger: 0.95,
            migration_timeout: Duration::from_secs(5),
            high_latency_threshold: Duration::from_millis(250),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct HubConfigBuilder(HubConfig);

impl HubConfigBuilder {
    #[must_use]
    pub fn shard_count(mut self, value: u64) -> Self {
        self.0.shard_count = value.max(1);
        self
    }

    #[must_use]
    pub fn worker_count(mut self, value: usize) -> Self {
        self.0.worker_count = value.max(1);
        self
    }

    #[must_use]
    pub fn rebalance_period(mut self, value: Duration) -> Self {
        self.0.rebalance_period = value;
        self
    }

    #[must_use]
    pub fn rebalance_min_clients(mut self, value: usize) -> Self {
        self.0.rebalance_min_clients = value;
        self
    }

    #[must_use]
    pub fn rebalance_ratio_trigger(mut self, value: f64) -> Self {
        self.0.rebalance_ratio_trigger = value;
        self
    }

    #[must_use]
    pub fn rebalance_batch(mut self, value: usize) -> Self {
        self.0.rebalance_batch = value;
        self
    }

    #[must_use]
    pub fn rebalance_emergency_shard_fraction(mut self, value: f64) -> Self {
        self.0.rebalance_emergency_shard_fraction = value;
        self
    }

    #[must_use]
    pub fn rebalance_emergency_load_trigger(mut self, value: f64) -> Self {
        self.0.rebalance_emergency_load_trigger = value;
        self
    }

    #[must_use]
    pub fn migration_timeout(mut self, value: Duration) -> Self {
        self.0.migration_timeout = value;
        self
    }

    #[must_use]
    pub fn high_latency_threshold(mut self, value: Duration) -> Self {
        self.0.high_latency_threshold = value;
        self
    }

    #[must_use]
    pub fn build(self) -> HubConfig {
        self.0
    }
}
