use std::time::Duration;
use trivia_queue::PriorityQueue;

/// Per-shard tunables (spec.md §4.2, §6).
#[derive(Clone, Debug)]
pub struct ShardConfig {
    max_clients: usize,
    replacement_grace: Duration,
    liveness_sweep_interval: Duration,
    liveness_inactivity_window: Duration,
    overflow_buffer: usize,
    overflow_batch_min: usize,
    overflow_batch_max: usize,
    /// Pending-disconnect count above which new disconnects are diverted
    /// into the overflow queue instead of unregistered inline (spec.md
    /// §4.2). Batch *size* is governed separately by measured processing
    /// time, not this value.
    overflow_batch_threshold: usize,
    priority_capacities: [usize; 4],
    send_buffer: usize,
}

impl ShardConfig {
    #[must_use]
    pub fn builder() -> ShardConfigBuilder {
        ShardConfigBuilder::default()
    }

    #[must_use]
    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    #[must_use]
    pub fn replacement_grace(&self) -> Duration {
        self.replacement_grace
    }

    #[must_use]
    pub fn liveness_sweep_interval(&self) -> Duration {
        self.liveness_sweep_interval
    }

    #[must_use]
    pub fn liveness_inactivity_window(&self) -> Duration {
        self.liveness_inactivity_window
    }

    #[must_use]
    pub fn overflow_buffer(&self) -> usize {
        self.overflow_buffer
    }

    #[must_use]
    pub fn overflow_batch_min(&self) -> usize {
        self.overflow_batch_min
    }

    #[must_use]
    pub fn overflow_batch_max(&self) -> usize {
        self.overflow_batch_max
    }

    #[must_use]
    pub fn overflow_batch_threshold(&self) -> usize {
        self.overflow_batch_threshold
    }

    #[must_use]
    pub fn send_buffer(&self) -> usize {
        self.send_buffer
    }

    /// Build a fresh priority queue sized per this config, one per shard.
    #[must_use]
    pub fn new_priority_queue<T>(&self) -> PriorityQueue<T> {
        PriorityQueue::new(self.priority_capacities)
    }
}

impl Default for ShardConfig {
    fn default() -> Self {
        ShardConfig {
            max_clients: 2_000,
            replacement_grace: Duration::from_millis(500),
            liveness_sweep_interval: Duration::from_secs(30),
            liveness_inactivity_window: Duration::from_secs(30),
            overflow_buffer: 1000,
            overflow_batch_min: 50,
            overflow_batch_max: 200,
            overflow_batch_threshold: 100,
            priority_capacities: [5000, 1000, 500, 100],
            send_buffer: 64,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ShardConfigBuilder(ShardConfig);

impl ShardConfigBuilder {
    #[must_use]
    pub fn max_clients(mut self, value: usize) -> Self {
        self.0.max_clients = value;
        self
    }

    #[must_use]
    pub fn replacement_grace(mut self, value: Duration) -> Self {
        self.0.replacement_grace = value;
        self
    }

    #[must_use]
    pub fn liveness_sweep_interval(mut self, value: Duration) -> Self {
        self.0.liveness_sweep_interval = value;
        self
    }

    #[must_use]
    pub fn liveness_inactivity_window(mut self, value: Duration) -> Self {
        self.0.liveness_inactivity_window = value;
        self
    }

    #[must_use]
    pub fn overflow_buffer(mut self, value: usize) -> Self {
        self.0.overflow_buffer = value;
        self
    }

    #[must_use]
    pub fn overflow_batch_min(mut self, value: usize) -> Self {
        self.0.overflow_batch_min = value;
        self
    }

    #[must_use]
    pub fn overflow_batch_max(mut self, value: usize) -> Self {
        self.0.overflow_batch_max = value;
        self
    }

    #[must_use]
    pub fn overflow_batch_threshold(mut self, value: usize) -> Self {
        self.0.overflow_batch_threshold = value;
        self
    }

    #[must_use]
    pub fn priority_capacities(mut self, value: [usize; 4]) -> Self {
        self.0.priority_capacities = value;
        self
    }

    #[must_use]
    pub fn send_buffer(mut self, value: usize) -> Self {
        self.0.send_buffer = value;
        self
    }

    #[must_use]
    pub fn build(self) -> ShardConfig {
        self.0
    }
}
