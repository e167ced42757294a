//! Client configuration.

use std::time::Duration;

use tracing::Dispatch;
use wrapplug_core::{CapabilitySet, HandshakeConfig};

/// QUIC connection settings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Limit on TLS handshake plus in-band hello
    pub connect_timeout: Duration,
    /// Connection is considered dead after this long without traffic
    pub idle_timeout: Duration,
    /// Keep-alive interval; must be below `idle_timeout` to take effect
    pub keep_alive_interval: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(30),
            keep_alive_interval: Some(Duration::from_secs(5)),
        }
    }
}

/// Options for connecting to, or launching, a plugin.
#[derive(Clone, Default)]
pub struct ClientOptions {
    /// Handshake descriptor shared with the plugin
    pub handshake: HandshakeConfig,
    /// Connection settings
    pub transport: TransportConfig,
    /// Capability set known out-of-band; a different advertisement fails
    /// the connection
    pub expected: Option<CapabilitySet>,
    logger: Option<Dispatch>,
}

impl ClientOptions {
    /// Route client logs to `logger` instead of the current default.
    #[must_use]
    pub fn with_logger(mut self, logger: Dispatch) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Use a non-default handshake descriptor.
    #[must_use]
    pub fn with_handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    /// Require the plugin to advertise exactly `capabilities`.
    #[must_use]
    pub fn expect_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.expected = Some(capabilities);
        self
    }

    /// Injected logger, or the subscriber current at the call site.
    pub fn logger(&self) -> Dispatch {
        self.logger.clone().unwrap_or_else(|| tracing::dispatcher::get_default(Dispatch::clone))
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("handshake", &self.handshake)
            .field("transport", &self.transport)
            .field("expected", &self.expected)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}
