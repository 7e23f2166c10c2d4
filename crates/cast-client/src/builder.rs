//! Client builder for configuration.

use crate::client::ProtocolClient;
use crate::correlator::CorrelationStrategy;
use crate::events::{EventBus, EventHandler};
use crate::request_id::RequestIdSequence;
use crate::tls::TlsPolicy;
use cast_core::{DeviceDescriptor, Result};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Settings for one protocol client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub tls: TlsPolicy,
    /// Bound on TCP connect plus TLS handshake.
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// How long to wait for a running application after LAUNCH.
    pub launch_timeout: Duration,
    /// How long to wait for media status after LOAD.
    pub load_timeout: Duration,
    pub request_ids: RequestIdSequence,
    pub correlation: CorrelationStrategy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tls: TlsPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(5),
            launch_timeout: Duration::from_secs(8),
            load_timeout: Duration::from_secs(10),
            request_ids: RequestIdSequence::process_wide(),
            correlation: CorrelationStrategy::default(),
        }
    }
}

/// Builder for configuring a [`ProtocolClient`].
pub struct ClientBuilder {
    config: ClientConfig,
    events: EventBus,
}

impl ClientBuilder {
    /// Create new builder with defaults.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            events: EventBus::new(),
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tls_policy(mut self, policy: TlsPolicy) -> Self {
        self.config.tls = policy;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    pub fn launch_timeout(mut self, timeout: Duration) -> Self {
        self.config.launch_timeout = timeout;
        self
    }

    pub fn load_timeout(mut self, timeout: Duration) -> Self {
        self.config.load_timeout = timeout;
        self
    }

    /// Use a dedicated request id sequence instead of the process-wide one.
    pub fn request_ids(mut self, sequence: RequestIdSequence) -> Self {
        self.config.request_ids = sequence;
        self
    }

    pub fn correlation(mut self, strategy: CorrelationStrategy) -> Self {
        self.config.correlation = strategy;
        self
    }

    /// Share an existing event bus.
    pub fn event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Add an event handler.
    pub fn event_handler(self, handler: impl EventHandler + 'static) -> Self {
        self.events.subscribe(handler);
        self
    }

    /// Connect to `host:port`.
    pub async fn connect(self, host: &str, port: u16) -> Result<ProtocolClient> {
        ProtocolClient::connect(host, port, self.config, self.events).await
    }

    /// Connect to a discovered device.
    pub async fn connect_device(self, device: &DeviceDescriptor) -> Result<ProtocolClient> {
        let host = device.connect_host();
        ProtocolClient::connect(&host, device.port, self.config, self.events).await
    }

    /// Run a session over an already-open stream.
    pub async fn from_stream<S>(self, stream: S) -> Result<ProtocolClient>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        ProtocolClient::from_stream(stream, self.config, self.events).await
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
