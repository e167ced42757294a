//! Plugin bootstrap.
//!
//! [`serve_plugin`] is the entry point a plugin binary calls: it checks the
//! launch environment set by the host, starts the listener, and announces it
//! with a single handshake line on stdout. [`PluginServer`] is the same
//! server without the environment contract, for embedding and tests.

use std::{
    io::Write,
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use base64::{Engine, engine::general_purpose::STANDARD};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, instrument::WithSubscriber};
use wrapplug_core::{
    CapabilitySet, HandshakeConfig, HandshakeLine, Wrapper,
    handshake::{CLIENT_CERT_ENV, PROTOCOL_VERSIONS_ENV},
};

use crate::{WrapperServer, error::ServerError, tls::Identity, transport::PluginListener};

const NOT_A_PLUGIN: &str = "this binary is a wrapplug plugin and is not meant to be run \
                            directly; start the host program that loads it instead";

/// Plugin server options.
#[derive(Clone)]
pub struct PluginOptions {
    /// Handshake descriptor shared with the host
    pub handshake: HandshakeConfig,
    /// Listen address; loopback with an ephemeral port by default
    pub bind_addr: SocketAddr,
    /// Connection idle timeout
    pub idle_timeout: Duration,
    logger: Option<Dispatch>,
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self {
            handshake: HandshakeConfig::default(),
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            idle_timeout: Duration::from_secs(30),
            logger: None,
        }
    }
}

impl PluginOptions {
    /// Route server logs to `logger` instead of the current default.
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

    /// Injected logger, or the subscriber current at the call site.
    pub fn logger(&self) -> Dispatch {
        self.logger.clone().unwrap_or_else(|| tracing::dispatcher::get_default(Dispatch::clone))
    }
}

impl std::fmt::Debug for PluginOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginOptions")
            .field("handshake", &self.handshake)
            .field("bind_addr", &self.bind_addr)
            .field("idle_timeout", &self.idle_timeout)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

/// Running plugin server.
pub struct PluginServer {
    local_addr: SocketAddr,
    server_cert: Vec<u8>,
    capabilities: CapabilitySet,
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), ServerError>>,
}

impl PluginServer {
    /// Probe `wrapper`, bind, and start accepting connections from the holder
    /// of `client_cert`.
    ///
    /// # Errors
    ///
    /// `Wrapper` if `wrapper` is `None`; `Config`/`Transport` if the
    /// listener cannot be set up.
    pub fn start(
        wrapper: Option<Arc<dyn Wrapper>>,
        client_cert: Vec<u8>,
        options: &PluginOptions,
    ) -> Result<Self, ServerError> {
        let dispatch = options.logger();
        let _guard = tracing::dispatcher::set_default(&dispatch);

        let server = WrapperServer::new(wrapper)?;
        let registry = Arc::new(server.registry()?);

        let identity = Identity::generate()?;
        let listener =
            PluginListener::bind(options.bind_addr, &identity, client_cert, options.idle_timeout)?;
        let local_addr = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let serve = listener.serve(registry, options.handshake.clone(), shutdown.clone());
        let task = tokio::spawn(serve.with_subscriber(dispatch.clone()));

        tracing::info!(%local_addr, capabilities = %server.capabilities(), "plugin server started");

        Ok(Self {
            local_addr,
            server_cert: identity.cert_der().to_vec(),
            capabilities: server.capabilities(),
            shutdown,
            task,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Server certificate (DER) the client must pin.
    pub fn server_cert(&self) -> &[u8] {
        &self.server_cert
    }

    /// Capability set registered by this server.
    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    /// Bootstrap line announcing this server.
    pub fn handshake_line(&self, app_version: u32) -> HandshakeLine {
        HandshakeLine::quic(app_version, self.local_addr, self.server_cert.clone())
    }

    /// Token that stops the server when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop accepting and close open connections.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for the server to stop.
    pub async fn wait(self) -> Result<(), ServerError> {
        self.task.await.map_err(|e| ServerError::Transport(format!("server task failed: {e}")))?
    }
}

/// Serve `wrapper` as a plugin of the host that launched this process.
///
/// Checks the cookie and version list in the environment, starts the server,
/// prints the handshake line to stdout, then serves until interrupted.
///
/// # Errors
///
/// `Config` if the process was not launched by a compatible host.
pub async fn serve_plugin(
    wrapper: Option<Arc<dyn Wrapper>>,
    options: PluginOptions,
) -> Result<(), ServerError> {
    let handshake = &options.handshake;

    let cookie = std::env::var(&handshake.cookie_key).ok();
    if !handshake.cookie_matches(cookie.as_deref()) {
        return Err(ServerError::Config(NOT_A_PLUGIN.to_string()));
    }

    let versions = std::env::var(PROTOCOL_VERSIONS_ENV).ok();
    if !handshake.accepts_versions(versions.as_deref()) {
        return Err(ServerError::Config(format!(
            "host offers protocol versions {:?}, plugin speaks {}",
            versions.unwrap_or_default(),
            handshake.protocol_version
        )));
    }

    let client_cert = std::env::var(CLIENT_CERT_ENV)
        .map_err(|_| ServerError::Config(format!("{CLIENT_CERT_ENV} is not set")))?;
    let client_cert = STANDARD
        .decode(client_cert.trim())
        .map_err(|e| ServerError::Config(format!("{CLIENT_CERT_ENV} is not base64: {e}")))?;

    let server = PluginServer::start(wrapper, client_cert, &options)?;
    let line = server.handshake_line(handshake.protocol_version);

    {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}")?;
        stdout.flush()?;
    }

    let shutdown = server.shutdown_token();
    tokio::select! {
        result = server.wait() => result,
        _ = tokio::signal::ctrl_c() => {
            shutdown.cancel();
            Ok(())
        },
    }
}

#[cfg(test)]
mod tests {
    use wrapplug_core::testing::TestWrapper;

    use super::*;

    #[tokio::test]
    async fn start_reports_address_and_capabilities() {
        let client = Identity::generate().unwrap();
        let wrapper = TestWrapper::new(b"secret").with_capabilities(CapabilitySet::Hmac);

        let server = PluginServer::start(
            Some(Arc::new(wrapper)),
            client.cert_der().to_vec(),
            &PluginOptions::default(),
        )
        .unwrap();

        assert!(server.local_addr().ip().is_loopback());
        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(server.capabilities(), CapabilitySet::Hmac);

        let line = server.handshake_line(1);
        assert_eq!(line.server_cert, server.server_cert());
        assert_eq!(line.to_string().parse::<HandshakeLine>().unwrap(), line);

        server.shutdown();
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn start_rejects_missing_wrapper() {
        let result = PluginServer::start(None, Vec::new(), &PluginOptions::default());
        assert!(matches!(result, Err(ServerError::Wrapper(_))));
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn injected_logger_receives_server_events() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();

        let client = Identity::generate().unwrap();
        let options = PluginOptions::default().with_logger(Dispatch::new(subscriber));
        let server = PluginServer::start(
            Some(Arc::new(TestWrapper::new(b"secret"))),
            client.cert_der().to_vec(),
            &options,
        )
        .unwrap();
        server.shutdown();
        server.wait().await.unwrap();

        let logs = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("plugin server started"), "logs: {logs}");
        assert!(logs.contains("listener stopped"), "logs: {logs}");
    }

    #[test]
    fn default_options() {
        let options = PluginOptions::default();
        assert_eq!(options.bind_addr, SocketAddr::from((Ipv4Addr::LOCALHOST, 0)));
        assert_eq!(options.handshake, HandshakeConfig::default());
    }
}
