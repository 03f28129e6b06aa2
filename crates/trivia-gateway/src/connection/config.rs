use std::time::Duration;

/// Per-connection tunables, all overridable, defaulting to the numbers in
/// spec.md §4.1 and §6.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pong_wait: Duration,
    ping_period: Duration,
    write_wait: Duration,
    max_inbound_frame_bytes: usize,
    send_buffer: usize,
}

impl ConnectionConfig {
    #[must_use]
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    #[must_use]
    pub fn pong_wait(&self) -> Duration {
        self.pong_wait
    }

    #[must_use]
    pub fn ping_period(&self) -> Duration {
        self.ping_period
    }

    #[must_use]
    pub fn write_wait(&self) -> Duration {
        self.write_wait
    }

    #[must_use]
    pub fn max_inbound_frame_bytes(&self) -> usize {
        self.max_inbound_frame_bytes
    }

    #[must_use]
    pub fn send_buffer(&self) -> usize {
        self.send_buffer
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            pong_wait: Duration::from_secs(30),
            ping_period: Duration::from_secs(27),
            write_wait: Duration::from_secs(10),
            max_inbound_frame_bytes: 512,
            send_buffer: 64,
        }
    }
}

/// Builder for [`ConnectionConfig`], mirroring the teacher's
/// `ConfigBuilder` shape in `gateway/src/config.rs`.
#[derive(Clone, Debug, Default)]
pub struct ConnectionConfigBuilder(ConnectionConfig);

impl ConnectionConfigBuilder {
    #[must_use]
    pub fn pong_wait(mut self, value: Duration) -> Self {
        self.0.pong_wait = value;
        self
    }

    #[must_use]
    pub fn ping_period(mut self, value: Duration) -> Self {
        self.0.ping_period = value;
        self
    }

    #[must_use]
    pub fn write_wait(mut self, value: Duration) -> Self {
        self.0.write_wait = value;
        self
    }

    #[must_use]
    pub fn max_inbound_frame_bytes(mut self, value: usize) -> Self {
        self.0.max_inbound_frame_bytes = value;
        self
    }

    #[must_use]
    pub fn send_buffer(mut self, value: usize) -> Self {
        self.0.send_buffer = value;
        self
    }

    #[must_use]
    pub fn build(self) -> ConnectionConfig {
        self.0
    }
}
